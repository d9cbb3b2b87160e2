mod request;
mod response;
mod types;
mod version;

pub use request::DaemonRequest;
pub use response::DaemonResponse;
pub use types::{
    ChargeState, DaemonStatus, PortOwner, ReadingPayload, ReconfigureResult, StatsSnapshot,
    MAX_SUBSCRIBERS,
};
pub use version::{MIN_SUPPORTED_VERSION, PROTOCOL_VERSION};
