//! Set difference between a stored snapshot and a fresh fetch.

use std::collections::HashSet;

use crate::domain::ExternalId;

/// Changes between two following sets. Order of the lists is incidental.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Delta {
    pub added: Vec<ExternalId>,
    pub removed: Vec<ExternalId>,
}

impl Delta {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// `added = latest - current`, `removed = current - latest`.
pub fn diff(current: &HashSet<ExternalId>, latest: &HashSet<ExternalId>) -> Delta {
    let added = latest.difference(current).cloned().collect();
    let removed = current.difference(latest).cloned().collect();
    Delta { added, removed }
}
