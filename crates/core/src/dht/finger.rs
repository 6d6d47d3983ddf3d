#![warn(missing_docs)]
use std::ops::Index;

use serde::Deserialize;
use serde::Serialize;

use crate::dht::did::in_range;
use crate::dht::Did;

/// Finger table of Chord DHT.
/// Slot `i` should hold the successor of `did + 2^i`, slot 0 is the successor of
/// the node itself. A slot that knows nothing better holds the node's own did.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct FingerTable {
    did: Did,
    finger: Vec<Did>,
    #[serde(skip)]
    fix_finger_index: usize,
}

impl FingerTable {
    /// builder, every slot starts pointing at `did`
    pub fn new(did: Did, size: usize) -> Self {
        Self {
            finger: vec![did.clone(); size.max(1)],
            did,
            fix_finger_index: 0,
        }
    }

    /// The successor, aliased to slot 0.
    pub fn successor(&self) -> &Did {
        &self.finger[0]
    }

    /// Replace the successor, which is slot 0.
    pub fn set_successor(&mut self, did: Did) {
        self.finger[0] = did
    }

    /// getter
    pub fn get(&self, index: usize) -> Option<&Did> {
        self.finger.get(index)
    }

    /// setter, `index == len` appends a new slot
    pub fn set(&mut self, index: usize, did: Did) {
        tracing::debug!("set finger table index: {} did: {}", index, did);
        match index.cmp(&self.finger.len()) {
            std::cmp::Ordering::Less => self.finger[index] = did,
            std::cmp::Ordering::Equal => self.finger.push(did),
            std::cmp::Ordering::Greater => {
                tracing::error!("set finger index out of range, index: {}", index);
            }
        }
    }

    /// Drop the farthest slot. The successor slot is never dropped.
    pub fn pop(&mut self) -> Option<Did> {
        if self.finger.len() <= 1 {
            return None;
        }
        let did = self.finger.pop();
        if self.fix_finger_index >= self.finger.len() {
            self.fix_finger_index = 0;
        }
        did
    }

    /// Point every slot holding `did` at `replacement` instead.
    pub fn replace(&mut self, did: &Did, replacement: &Did) {
        for slot in self.finger.iter_mut().filter(|x| *x == did) {
            *slot = replacement.clone();
        }
    }

    /// Check finger contains some node
    pub fn contains(&self, did: &Did) -> bool {
        self.finger.contains(did)
    }

    /// The farthest finger lying strictly between the node and `id`,
    /// or the node itself if none does.
    pub fn closest_preceding(&self, id: &Did) -> Did {
        self.finger
            .iter()
            .rev()
            .find(|f| in_range(&self.did, f, id))
            .unwrap_or(&self.did)
            .clone()
    }

    /// Next `count` slot indices to refresh, rotating over `1..len` so the
    /// whole table is refreshed over several calls.
    pub fn next_fix_window(&mut self, count: usize) -> Vec<usize> {
        let slots = self.finger.len() - 1;
        if slots == 0 {
            return vec![];
        }
        let start = self.fix_finger_index % slots;
        let count = count.min(slots);
        self.fix_finger_index = (start + count) % slots;
        (0..count).map(|j| (start + j) % slots + 1).collect()
    }

    /// number of slots
    pub fn len(&self) -> usize {
        self.finger.len()
    }

    /// is empty
    pub fn is_empty(&self) -> bool {
        self.finger.is_empty()
    }

    /// get finger list
    pub fn list(&self) -> &Vec<Did> {
        &self.finger
    }

    /// Overwrite the whole table, used once join has resolved every slot.
    pub fn assign(&mut self, finger: Vec<Did>) {
        if finger.is_empty() {
            return;
        }
        self.finger = finger;
        self.fix_finger_index = 0;
    }
}

impl Index<usize> for FingerTable {
    type Output = Did;
    fn index(&self, index: usize) -> &Self::Output {
        &self.finger[index]
    }
}
