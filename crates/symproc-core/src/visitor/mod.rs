//! Visitor framework.
//!
//! - [`Visitor`]: one method per node kind and per capability, plus the
//!   required `default_handler`; behavior is selected by [`VisitPolicy`]
//! - [`accept`]: the single dispatch point from a node to its method
//! - `walk_*`: the default method bodies, callable from overrides
//! - [`ValidateVisitor`], [`validate`], [`validate_with`]: resolved-type
//!   checking

pub mod dispatch;
pub mod traits;
pub mod validate;

pub use dispatch::*;
pub use traits::{VisitPolicy, Visitor};
pub use validate::{validate, validate_with, ValidatePredicate, ValidateVisitor};
