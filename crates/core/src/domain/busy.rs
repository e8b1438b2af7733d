use serde::{Deserialize, Serialize};

use crate::domain::provider::ProviderId;
use crate::domain::slot::Slot;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BusyBlockId(pub i64);

/// A slot the provider reserved for themselves; only ever subtracts availability.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusyBlock {
    pub id: BusyBlockId,
    pub provider_id: ProviderId,
    pub slot: Slot,
}
