//! Process instance identity.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity written to the `holder` column (UUID v4 newtype).
///
/// Generated once per coordinator and never changed, so every lease the
/// coordinator hands out renews under the same holder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceId(pub Uuid);

impl InstanceId {
    /// A fresh random identity.
    pub fn random() -> Self {
        InstanceId(Uuid::new_v4())
    }
}

impl std::fmt::Display for InstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
