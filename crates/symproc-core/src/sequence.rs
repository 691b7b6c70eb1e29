//! Replay-safe lazy sequences.
//!
//! [`MemoizedSequence`] wraps a single-pass iterator so any number of
//! independent iterators can walk it. Elements are pulled from the source at
//! most once in total: the first iterator to reach an element pulls it into
//! a shared buffer, later iterators replay it from there.
//!
//! The buffer is never trimmed. A sequence that has been fully walked holds
//! every element until the sequence itself is dropped.
//!
//! The source is moved out of the shared state while it produces an
//! element. A source that reads its own sequence meanwhile sees only the
//! elements buffered so far.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

struct Shared<I: Iterator> {
    buffer: Vec<I::Item>,
    /// Unconsumed tail; `None` while it is producing or once exhausted.
    source: Option<I>,
    exhausted: bool,
}

/// Element `index`, pulling from the source as needed.
///
/// No borrow of `shared` is held across `next()`.
fn pull<I>(shared: &RefCell<Shared<I>>, index: usize) -> Option<I::Item>
where
    I: Iterator,
    I::Item: Clone,
{
    loop {
        let mut source = {
            let mut state = shared.borrow_mut();
            if let Some(item) = state.buffer.get(index) {
                return Some(item.clone());
            }
            if state.exhausted {
                return None;
            }
            // Taken by an outer pull still in progress.
            state.source.take()?
        };
        let next = source.next();
        let mut state = shared.borrow_mut();
        match next {
            Some(item) => {
                state.buffer.push(item);
                state.source = Some(source);
            }
            None => state.exhausted = true,
        }
    }
}

/// A lazily produced sequence that can be iterated repeatedly.
pub struct MemoizedSequence<I: Iterator> {
    shared: Rc<RefCell<Shared<I>>>,
}

impl<I: Iterator> Clone for MemoizedSequence<I> {
    fn clone(&self) -> Self {
        MemoizedSequence {
            shared: Rc::clone(&self.shared),
        }
    }
}

impl<I> MemoizedSequence<I>
where
    I: Iterator,
    I::Item: Clone,
{
    /// Wrap a single-pass source.
    pub fn new(source: impl IntoIterator<IntoIter = I>) -> Self {
        MemoizedSequence {
            shared: Rc::new(RefCell::new(Shared {
                buffer: Vec::new(),
                source: Some(source.into_iter()),
                exhausted: false,
            })),
        }
    }

    /// Start a new iterator at the first element.
    pub fn iter(&self) -> MemoizedIter<I> {
        MemoizedIter {
            shared: Rc::clone(&self.shared),
            position: 0,
        }
    }

    /// Element at `index`, pulling from the source if needed.
    pub fn get(&self, index: usize) -> Option<I::Item> {
        pull(&self.shared, index)
    }

    /// Number of elements pulled so far.
    pub fn buffered(&self) -> usize {
        self.shared.borrow().buffer.len()
    }

    /// True once the source has been drained.
    pub fn is_exhausted(&self) -> bool {
        self.shared.borrow().exhausted
    }

    /// Drain the source and return every element.
    pub fn to_vec(&self) -> Vec<I::Item> {
        self.iter().collect()
    }
}

impl<I: Iterator> fmt::Debug for MemoizedSequence<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shared = self.shared.borrow();
        f.debug_struct("MemoizedSequence")
            .field("buffered", &shared.buffer.len())
            .field("exhausted", &shared.exhausted)
            .finish()
    }
}

impl<'a, I> IntoIterator for &'a MemoizedSequence<I>
where
    I: Iterator,
    I::Item: Clone,
{
    type Item = I::Item;
    type IntoIter = MemoizedIter<I>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Independent cursor over a [`MemoizedSequence`].
pub struct MemoizedIter<I: Iterator> {
    shared: Rc<RefCell<Shared<I>>>,
    position: usize,
}

impl<I> Iterator for MemoizedIter<I>
where
    I: Iterator,
    I::Item: Clone,
{
    type Item = I::Item;

    fn next(&mut self) -> Option<Self::Item> {
        let item = pull(&self.shared, self.position)?;
        self.position += 1;
        Some(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn counted(n: u32, pulls: Rc<Cell<u32>>) -> impl Iterator<Item = u32> {
        (0..n).map(move |i| {
            pulls.set(pulls.get() + 1);
            i
        })
    }

    #[test]
    fn interleaved_iterators_pull_each_element_once() {
        let pulls = Rc::new(Cell::new(0));
        let seq = MemoizedSequence::new(counted(5, Rc::clone(&pulls)));

        let mut a = seq.iter();
        let mut b = seq.iter();
        let mut seen_a = Vec::new();
        let mut seen_b = Vec::new();

        seen_a.push(a.next().unwrap());
        seen_a.push(a.next().unwrap());
        seen_b.push(b.next().unwrap());
        seen_b.push(b.next().unwrap());
        seen_b.push(b.next().unwrap());
        seen_a.extend(a.by_ref());
        seen_b.extend(b.by_ref());

        assert_eq!(seen_a, vec![0, 1, 2, 3, 4]);
        assert_eq!(seen_b, vec![0, 1, 2, 3, 4]);
        assert_eq!(pulls.get(), 5);
    }

    #[test]
    fn nothing_is_pulled_until_iterated() {
        let pulls = Rc::new(Cell::new(0));
        let seq = MemoizedSequence::new(counted(3, Rc::clone(&pulls)));
        assert_eq!(pulls.get(), 0);
        assert_eq!(seq.get(1), Some(1));
        assert_eq!(pulls.get(), 2);
        assert!(!seq.is_exhausted());
    }

    #[test]
    fn replay_after_exhaustion() {
        let pulls = Rc::new(Cell::new(0));
        let seq = MemoizedSequence::new(counted(3, Rc::clone(&pulls)));
        assert_eq!(seq.to_vec(), vec![0, 1, 2]);
        assert!(seq.is_exhausted());
        assert_eq!(seq.to_vec(), vec![0, 1, 2]);
        assert_eq!(pulls.get(), 3);
        assert_eq!(seq.buffered(), 3);
    }

    #[test]
    fn clones_share_the_buffer() {
        let pulls = Rc::new(Cell::new(0));
        let seq = MemoizedSequence::new(counted(4, Rc::clone(&pulls)));
        let other = seq.clone();
        let first: Vec<u32> = (&seq).into_iter().take(2).collect();
        let all = other.to_vec();
        assert_eq!(first, vec![0, 1]);
        assert_eq!(all, vec![0, 1, 2, 3]);
        assert_eq!(pulls.get(), 4);
    }

    #[test]
    fn out_of_range_get() {
        let seq = MemoizedSequence::new(vec!["a", "b"]);
        assert_eq!(seq.get(5), None);
        assert_eq!(seq.get(0), Some("a"));
    }

    #[test]
    fn reentrant_source_sees_the_buffered_prefix() {
        type Seq = MemoizedSequence<Box<dyn Iterator<Item = (usize, usize)>>>;
        let slot: Rc<RefCell<Option<Seq>>> = Rc::new(RefCell::new(None));
        let inner = Rc::clone(&slot);
        let source: Box<dyn Iterator<Item = (usize, usize)>> = Box::new((0..3).map(move |i| {
            let seen = inner.borrow().as_ref().map_or(0, |seq| seq.to_vec().len());
            (i, seen)
        }));
        let seq: Seq = MemoizedSequence::new(source);
        *slot.borrow_mut() = Some(seq.clone());

        assert_eq!(seq.to_vec(), vec![(0, 0), (1, 1), (2, 2)]);
        assert!(seq.is_exhausted());
        *slot.borrow_mut() = None;
    }

    #[test]
    fn empty_source() {
        let seq = MemoizedSequence::new(Vec::<u8>::new());
        assert_eq!(seq.iter().next(), None);
        assert!(seq.is_exhausted());
    }
}
