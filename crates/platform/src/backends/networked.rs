use std::sync::Arc;

use color_eyre::eyre::{eyre, Result};
use tracing::info;

use super::feed::{FeedConsumer, ReadingFeed};
use crate::provider::BatteryProvider;
use crate::stats::BatteryStats;
use crate::types::{HardwarePort, ProviderKind};

/// Battery data published by another device on the network.
pub struct NetworkedFeed {
    topic: String,
    subscribed: bool,
    consumer: FeedConsumer,
}

impl NetworkedFeed {
    pub fn new(topic: impl Into<String>, feed: ReadingFeed) -> Self {
        Self {
            topic: topic.into(),
            subscribed: false,
            consumer: FeedConsumer::new(ProviderKind::Networked, feed),
        }
    }
}

fn validate_topic(topic: &str) -> Result<()> {
    if topic.trim().is_empty() {
        return Err(eyre!("no feed topic configured"));
    }
    if topic.contains(['#', '+']) {
        return Err(eyre!("feed topic {topic:?} must not contain wildcards"));
    }
    Ok(())
}

impl BatteryProvider for NetworkedFeed {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Networked
    }

    fn initialize(&mut self, verbose_logging: bool) -> Result<()> {
        validate_topic(&self.topic)?;
        self.consumer.start(verbose_logging);
        self.subscribed = true;
        info!(topic = %self.topic, "Subscribed to battery feed");
        Ok(())
    }

    fn used_hardware_port(&self) -> Option<HardwarePort> {
        None
    }

    fn periodic_step(&mut self) {
        if self.subscribed {
            self.consumer.consume();
        }
    }

    fn deinitialize(&mut self) {
        if self.subscribed {
            self.subscribed = false;
            info!(topic = %self.topic, "Unsubscribed from battery feed");
        }
    }

    fn stats(&self) -> Arc<BatteryStats> {
        self.consumer.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_validation() {
        assert!(validate_topic("battery/feed").is_ok());
        assert!(validate_topic("").is_err());
        assert!(validate_topic("  ").is_err());
        assert!(validate_topic("battery/#").is_err());
        assert!(validate_topic("battery/+/soc").is_err());
    }
}
