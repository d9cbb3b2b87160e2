//! Protocol versioning for daemon IPC.
//!
//! | Version | Changes |
//! |---------|---------|
//! | 1 | Initial protocol version |
//!
//! Bump `PROTOCOL_VERSION` when removing or renaming fields, changing field
//! types or removing variants. New `#[serde(default)]` fields and new
//! variants do not need a bump.

/// Current protocol version.
pub const PROTOCOL_VERSION: u32 = 1;

/// Oldest protocol version this build can talk to.
pub const MIN_SUPPORTED_VERSION: u32 = 1;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_the_current_version_is_supported() {
        assert_eq!(PROTOCOL_VERSION, 1);
        assert_eq!(MIN_SUPPORTED_VERSION, PROTOCOL_VERSION);
    }
}
