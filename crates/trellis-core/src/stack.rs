//! Explicit LIFO of pending work.
//!
//! Tree walks push tagged work items here instead of recursing, so the depth
//! of the UI tree never reaches the native stack.

use std::fmt;

pub struct WorkStack<W> {
    items: Vec<W>,
}

impl<W> Default for WorkStack<W> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<W> WorkStack<W> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, item: W) {
        self.items.push(item);
    }

    pub fn pop(&mut self) -> Option<W> {
        self.items.pop()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Pending items, bottom of the stack first.
    pub fn remaining(&self) -> &[W] {
        &self.items
    }

    /// Pushes `items` so they pop in the order given.
    pub fn extend_in_order<I>(&mut self, items: I)
    where
        I: IntoIterator<Item = W>,
        I::IntoIter: DoubleEndedIterator,
    {
        self.items.extend(items.into_iter().rev());
    }

    /// Executes items until the stack is empty.
    ///
    /// A failing item is logged and recorded; the items it would have pushed
    /// are simply never scheduled and draining carries on with the rest.
    pub fn drain<E, F>(&mut self, mut execute: F) -> DrainReport<E>
    where
        E: fmt::Display,
        F: FnMut(&mut Self, W) -> Result<(), E>,
    {
        let mut report = DrainReport::default();
        while let Some(item) = self.items.pop() {
            report.executed += 1;
            if let Err(err) = execute(self, item) {
                log::error!("work item failed: {err}");
                report.errors.push(err);
            }
        }
        report
    }
}

impl<W: fmt::Debug> fmt::Debug for WorkStack<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.items.iter().rev()).finish()
    }
}

/// Outcome of [`WorkStack::drain`].
#[derive(Debug)]
pub struct DrainReport<E> {
    pub errors: Vec<E>,
    pub executed: usize,
}

impl<E> Default for DrainReport<E> {
    fn default() -> Self {
        Self {
            errors: Vec::new(),
            executed: 0,
        }
    }
}

impl<E> DrainReport<E> {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn first_error(&self) -> Option<&E> {
        self.errors.first()
    }

    /// Folds another report's results into this one.
    pub fn absorb(&mut self, other: DrainReport<E>) {
        self.executed += other.executed;
        self.errors.extend(other.errors);
    }

    /// The first recorded error, if any.
    pub fn into_result(self) -> Result<(), E> {
        match self.errors.into_iter().next() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
