pub mod config;
pub mod daemon;
pub mod logs;
pub mod stats;
