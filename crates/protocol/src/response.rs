use serde::{Deserialize, Serialize};

use crate::types::{DaemonStatus, ReconfigureResult, StatsSnapshot};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DaemonResponse {
    Status(DaemonStatus),
    Stats(StatsSnapshot),
    Reconfigured(ReconfigureResult),
    StatsUpdate(StatsSnapshot),
    Ok,
    Error(String),
    Subscribed,
    Unsubscribed,
    SubscriptionRejected { reason: String },
}

impl DaemonResponse {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}
