//! Ordered membership view.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::peer::PeerId;

/// A node's local view of mesh membership.
///
/// The table is an ordered sequence, not a set. Duplicate entries are
/// allowed and preserved, and removal deletes only the first matching
/// entry. Both properties are observable on the wire (`table` snapshots
/// carry the order) and load-bearing for healing, which picks the first
/// entry that is not the local node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerTable(Vec<PeerId>);

impl PeerTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a peer, keeping any existing entries for the same id.
    pub fn push(&mut self, peer: PeerId) {
        self.0.push(peer);
    }

    /// Remove the first entry equal to `peer`. Returns whether an entry
    /// was removed; later duplicates stay.
    pub fn remove_first(&mut self, peer: &PeerId) -> bool {
        match self.0.iter().position(|p| p == peer) {
            Some(index) => {
                self.0.remove(index);
                true
            }
            None => false,
        }
    }

    /// Replace the whole table with `snapshot`. Nothing is merged.
    pub fn replace(&mut self, snapshot: PeerTable) {
        self.0 = snapshot.0;
    }

    /// The first entry that is not `local`, used to pick a reconnect
    /// candidate after a close. Returns `None` when fewer than two peers
    /// are known; a mesh that small has nothing to heal into.
    pub fn first_other(&self, local: &PeerId) -> Option<&PeerId> {
        if self.0.len() < 2 {
            return None;
        }
        self.0.iter().find(|p| *p != local)
    }

    /// Whether any entry equals `peer`.
    pub fn contains(&self, peer: &PeerId) -> bool {
        self.0.iter().any(|p| p == peer)
    }

    /// Iterate entries in table order.
    pub fn iter(&self) -> impl Iterator<Item = &PeerId> {
        self.0.iter()
    }

    /// The entries as a slice, in table order.
    pub fn peers(&self) -> &[PeerId] {
        &self.0
    }

    /// Number of entries, duplicates included.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the table holds no entries.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<PeerId>> for PeerTable {
    fn from(peers: Vec<PeerId>) -> Self {
        Self(peers)
    }
}

impl fmt::Display for PeerTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, peer) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{peer}")?;
        }
        write!(f, "]")
    }
}
