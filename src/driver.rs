//! The round driver.
//!
//! One build of one module runs processing units in rounds:
//!
//! 1. every unit sees the files new in this round plus the symbols it
//!    deferred last round, restored into the current cache generation
//! 2. files emitted by units become inputs, and the session starts a new
//!    generation so no node from an earlier round survives
//! 3. rounds repeat while files are generated or deferred sets change
//!
//! When nothing changes but symbols are still deferred, one final round
//! lets units report them. A fatal diagnostic ends the build after the
//! current round. Afterwards every unit gets exactly one `finish` (or
//! `on_error`) call, and on success the incremental caches are updated.

use std::collections::BTreeSet;
use std::rc::Rc;

use tracing::{debug, info, warn};

use symproc_core::Session;

use crate::config::ProcessingConfig;
use crate::deferred::{self, Restorable};
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::error::{DriverError, DriverResult, ExitCode};
use crate::incremental::IncrementalContext;
use crate::inputs::InputSet;
use crate::processing::{GeneratedFile, ProcessingUnit, RoundEnv};

/// Result of a build that ran to completion.
#[derive(Debug, Clone)]
pub struct BuildOutcome {
    /// Rounds run, including the final one.
    pub rounds: u32,
    pub exit_code: ExitCode,
    /// Paths of generated files, in emission order.
    pub generated: Vec<String>,
    pub diagnostics: Vec<Diagnostic>,
}

impl BuildOutcome {
    pub fn is_ok(&self) -> bool {
        self.exit_code.is_ok()
    }
}

/// Drives processing units over one module's inputs.
pub struct RoundDriver {
    config: ProcessingConfig,
    units: Vec<Box<dyn ProcessingUnit>>,
    inputs: InputSet,
}

impl RoundDriver {
    pub fn new(
        config: ProcessingConfig,
        units: Vec<Box<dyn ProcessingUnit>>,
        inputs: InputSet,
    ) -> Self {
        RoundDriver {
            config,
            units,
            inputs,
        }
    }

    /// Run the build.
    ///
    /// Unit failures are reported through diagnostics and the exit code.
    /// `Err` is reserved for configuration, storage and tracking failures,
    /// and for builds that exceed `max_rounds`.
    pub fn run(self) -> DriverResult<BuildOutcome> {
        let RoundDriver {
            config,
            mut units,
            mut inputs,
        } = self;

        config.validate()?;
        let flags = config.resolve_flags()?;
        let config = ProcessingConfig {
            incremental: flags.incremental.value,
            warnings_as_errors: flags.warnings_as_errors.value,
            ..config
        };
        info!(
            module = %config.module_name,
            units = units.len(),
            inputs = inputs.len(),
            incremental = config.incremental,
            incremental_source = ?flags.incremental.source,
            "starting build"
        );

        let removed: BTreeSet<String> = config
            .removed_sources
            .iter()
            .map(|path| config.relative_source(path))
            .collect();
        for path in inputs.paths() {
            if removed.contains(&config.relative_source(&path)) {
                inputs.remove_file(&path);
            }
        }

        let diagnostics = Diagnostics::new(config.warnings_as_errors);
        let session = Session::new(inputs.index());
        let mut context = if config.incremental {
            let context = IncrementalContext::open(&config)?;
            session.set_tracker(context.tracker());
            Some(context)
        } else {
            None
        };

        let all_files = session.files();
        let mut new_files = match context.as_mut() {
            Some(context) => context.calc_dirty_files(&session, &all_files),
            None => all_files,
        };
        let mut processed: BTreeSet<String> = new_files
            .iter()
            .filter_map(|&file| session.file_path(file))
            .collect();

        let mut taken_paths = inputs.paths();
        let mut deferred: Vec<Vec<Restorable>> = vec![Vec::new(); units.len()];
        let mut generated_paths: Vec<String> = Vec::new();
        let mut round = 0u32;
        let mut final_round = false;

        loop {
            round += 1;
            if round > config.max_rounds {
                let env = RoundEnv::new(
                    config.max_rounds,
                    true,
                    &session,
                    &config,
                    &diagnostics,
                    session.files(),
                    Vec::new(),
                    &taken_paths,
                );
                abort_units(&mut units, &env);
                return Err(DriverError::RoundLimit {
                    max_rounds: config.max_rounds,
                });
            }
            info!(round, new_files = new_files.len(), final_round, "round started");

            let env = RoundEnv::new(
                round,
                final_round,
                &session,
                &config,
                &diagnostics,
                session.files(),
                new_files.clone(),
                &taken_paths,
            );
            let mut next_deferred = Vec::with_capacity(units.len());
            for (unit, carried) in units.iter_mut().zip(&deferred) {
                let restored = deferred::restore_all(&session, unit.name(), carried);
                debug!(
                    unit = unit.name(),
                    carried = carried.len(),
                    restored = restored.len(),
                    "restored deferred symbols"
                );
                let returned = unit.process(&env, &new_files, &restored);
                next_deferred.push(deferred::capture_all(&session, unit.name(), &returned));
            }
            let generated = env.into_generated();
            if let Some(error) = session.take_tracking_error() {
                let env = RoundEnv::new(
                    round,
                    true,
                    &session,
                    &config,
                    &diagnostics,
                    session.files(),
                    Vec::new(),
                    &taken_paths,
                );
                abort_units(&mut units, &env);
                return Err(error.into());
            }

            let deferred_changed = next_deferred
                .iter()
                .zip(&deferred)
                .any(|(next, previous)| deferred::keys(next) != deferred::keys(previous));
            deferred = next_deferred;

            register_outputs(&generated, &mut inputs, &mut taken_paths, &mut generated_paths);
            if let Some(context) = context.as_mut() {
                context.record_outputs(&generated);
            }
            info!(
                round,
                generated = generated.len(),
                deferred = deferred.iter().map(Vec::len).sum::<usize>(),
                "round finished"
            );

            if diagnostics.has_errors() {
                info!(round, errors = diagnostics.error_count(), "stopping after errors");
                break;
            }
            if final_round {
                break;
            }
            if generated.is_empty() {
                if deferred.iter().all(Vec::is_empty) {
                    break;
                }
                if !deferred_changed {
                    final_round = true;
                }
            }

            session.begin_generation(inputs.index());
            let index = session.index();
            new_files = generated
                .iter()
                .filter_map(|output| index.file(output.path()))
                .map(|file| session.materialize(Rc::clone(file)))
                .collect();
            if let Some(context) = context.as_mut() {
                context.register_generated_files(&session, &new_files);
            }
            processed.extend(generated.iter().map(|output| output.path().to_string()));
        }

        let failed = diagnostics.has_errors();
        let env = RoundEnv::new(
            round,
            true,
            &session,
            &config,
            &diagnostics,
            session.files(),
            Vec::new(),
            &taken_paths,
        );
        for unit in units.iter_mut() {
            if failed {
                unit.on_error(&env);
            } else {
                unit.finish(&env);
            }
        }
        let late = env.into_generated();
        if let Some(error) = session.take_tracking_error() {
            return Err(error.into());
        }
        register_outputs(&late, &mut inputs, &mut taken_paths, &mut generated_paths);

        let exit_code = if diagnostics.has_errors() {
            ExitCode::ProcessingError
        } else {
            ExitCode::Ok
        };
        if let Some(mut context) = context {
            if exit_code.is_ok() {
                context.record_outputs(&late);
                processed.extend(late.iter().map(|output| output.path().to_string()));
                context.update_caches(&processed, &inputs.paths())?;
            }
        }

        info!(
            rounds = round,
            exit_code = %exit_code,
            generated = generated_paths.len(),
            "build finished"
        );
        Ok(BuildOutcome {
            rounds: round,
            exit_code,
            generated: generated_paths,
            diagnostics: diagnostics.entries(),
        })
    }
}

/// Tell every unit the build ended without success.
fn abort_units(units: &mut [Box<dyn ProcessingUnit>], env: &RoundEnv<'_>) {
    warn!(round = env.round(), "build aborted");
    for unit in units.iter_mut() {
        unit.on_error(env);
    }
}

fn register_outputs(
    generated: &[GeneratedFile],
    inputs: &mut InputSet,
    taken_paths: &mut BTreeSet<String>,
    generated_paths: &mut Vec<String>,
) {
    for output in generated {
        inputs.add_file(Rc::clone(&output.file));
        taken_paths.insert(output.path().to_string());
        generated_paths.push(output.path().to_string());
    }
}
