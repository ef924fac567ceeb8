//! Generic expected/actual diff.
//!
//! The diff is a set symmetric difference under structural equality. A changed
//! element shows up as a `Remove` of the old value plus an `Add` of the new
//! one; there is no in-place update.

use serde::Serialize;

/// One element present on only one side of a diff.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum Change<E> {
    /// Present in actual, absent from expected.
    Remove(E),
    /// Present in expected, absent from actual.
    Add(E),
}

impl<E> Change<E> {
    /// Returns the element.
    pub const fn element(&self) -> &E {
        match self {
            Self::Remove(e) | Self::Add(e) => e,
        }
    }

    /// Consumes the change, returning the element.
    pub fn into_element(self) -> E {
        match self {
            Self::Remove(e) | Self::Add(e) => e,
        }
    }

    /// Returns true for a removal.
    pub const fn is_remove(&self) -> bool {
        matches!(self, Self::Remove(_))
    }
}

/// Diffs `actual` against `expected`.
///
/// Every element of `actual` without an equal counterpart in `expected`
/// yields one `Remove`; every element of `expected` without an equal
/// counterpart in `actual` yields one `Add`. All removals come before all
/// additions, each group in input order.
pub fn diff<E: PartialEq + Clone>(actual: &[E], expected: &[E]) -> Vec<Change<E>> {
    let removals = actual
        .iter()
        .filter(|a| !expected.contains(a))
        .cloned()
        .map(Change::Remove);
    let additions = expected
        .iter()
        .filter(|e| !actual.contains(e))
        .cloned()
        .map(Change::Add);
    removals.chain(additions).collect()
}
