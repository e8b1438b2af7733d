use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::provider::{ProviderId, ServiceId};
use crate::domain::slot::Slot;

/// Identity of the client asking for a place in the line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClientId(pub i64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QueueEntryId(pub i64);

/// How an entry sits in a provider's line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum EntryMode {
    /// Arrival-ordered; positions are strictly positive and unique per provider.
    WalkIn { position: u32 },
    /// Bound to a date/time slot.
    Scheduled { slot: Slot },
}

impl EntryMode {
    pub fn position(&self) -> Option<u32> {
        match self {
            Self::WalkIn { position } => Some(*position),
            Self::Scheduled { .. } => None,
        }
    }

    pub fn slot(&self) -> Option<Slot> {
        match self {
            Self::WalkIn { .. } => None,
            Self::Scheduled { slot } => Some(*slot),
        }
    }

    pub fn is_walk_in(&self) -> bool {
        matches!(self, Self::WalkIn { .. })
    }

    pub fn lane(&self) -> QueueLane {
        match self {
            Self::WalkIn { .. } => QueueLane::WalkIn,
            Self::Scheduled { .. } => QueueLane::Scheduled,
        }
    }
}

impl PartialOrd for EntryMode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Queue view order: every walk-in (by position) precedes every scheduled entry (by slot).
impl Ord for EntryMode {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::WalkIn { position: a }, Self::WalkIn { position: b }) => a.cmp(b),
            (Self::WalkIn { .. }, Self::Scheduled { .. }) => Ordering::Less,
            (Self::Scheduled { .. }, Self::WalkIn { .. }) => Ordering::Greater,
            (Self::Scheduled { slot: a }, Self::Scheduled { slot: b }) => a.cmp(b),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: QueueEntryId,
    pub provider_id: ProviderId,
    pub client_id: ClientId,
    pub service_id: ServiceId,
    pub mode: EntryMode,
}

/// Queue entry joined with its service display name.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueListing {
    pub entry: QueueEntry,
    pub service_name: String,
}

/// Which collection a pop reads from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueLane {
    WalkIn,
    Scheduled,
}

impl QueueLane {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WalkIn => "walk_in",
            Self::Scheduled => "scheduled",
        }
    }
}

/// Sorts listings into queue view order, breaking exact ties by entry id.
pub fn sort_listings(listings: &mut [QueueListing]) {
    listings.sort_by(|a, b| a.entry.mode.cmp(&b.entry.mode).then(a.entry.id.cmp(&b.entry.id)));
}
