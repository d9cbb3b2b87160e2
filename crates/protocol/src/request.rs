use serde::{Deserialize, Serialize};

use crate::types::ReadingPayload;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DaemonRequest {
    GetStatus,
    GetStats,
    /// Reload the config file and reselect the battery provider.
    Reconfigure,
    /// Feed a reading to the networked provider.
    PushReading(ReadingPayload),
    Subscribe,
    Unsubscribe,
    Shutdown,
}

impl DaemonRequest {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}
