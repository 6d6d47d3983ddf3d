//! Backup lists of successors and predecessors.

use serde::Deserialize;
use serde::Serialize;

use crate::dht::Did;

/// Ordered failover candidates for the successor or the predecessor of a node,
/// most preferred first. The list never holds the node itself, the primary
/// pointer it backs up, or duplicates, and is bounded by `max`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackupList {
    /// Node did
    did: Did,
    /// Max backup num
    max: usize,
    /// Backups
    backups: Vec<Did>,
}

impl BackupList {
    /// An empty list for the node `did`.
    pub fn new(did: Did, max: usize) -> Self {
        Self {
            did,
            max,
            backups: vec![],
        }
    }

    /// Replace the content with `ids`, dropping the node, `primary` and duplicates.
    pub fn assign(&mut self, ids: Vec<Did>, primary: &Did) {
        let mut backups: Vec<Did> = Vec::with_capacity(ids.len());
        for id in ids {
            if id != self.did && &id != primary && !backups.contains(&id) {
                backups.push(id);
            }
        }
        backups.truncate(self.max);
        self.backups = backups;
    }

    /// Take the most preferred backup out of the list.
    pub fn shift(&mut self) -> Option<Did> {
        if self.backups.is_empty() {
            None
        } else {
            Some(self.backups.remove(0))
        }
    }

    /// The backup right after `did`, if `did` is in the list.
    /// `Some(None)` means `did` is the last one.
    pub fn next_of(&self, did: &Did) -> Option<Option<Did>> {
        let pos = self.backups.iter().position(|x| x == did)?;
        Some(self.backups.get(pos + 1).cloned())
    }

    /// Drop `did` from the list.
    pub fn remove(&mut self, did: &Did) {
        self.backups.retain(|x| x != did)
    }

    /// `primary` followed by the backups, without the node itself and duplicates,
    /// bounded by `max`. This is what a node reports to its neighbors.
    pub fn with_primary(&self, primary: &Did) -> Vec<Did> {
        let mut ids: Vec<Did> = Vec::with_capacity(self.backups.len() + 1);
        for id in std::iter::once(primary).chain(self.backups.iter()).take(self.max) {
            if id != &self.did && !ids.contains(id) {
                ids.push(id.clone());
            }
        }
        ids
    }

    /// contains
    pub fn contains(&self, did: &Did) -> bool {
        self.backups.contains(did)
    }

    /// list
    pub fn list(&self) -> &Vec<Did> {
        &self.backups
    }

    /// len
    pub fn len(&self) -> usize {
        self.backups.len()
    }

    /// is_empty
    pub fn is_empty(&self) -> bool {
        self.backups.is_empty()
    }
}
