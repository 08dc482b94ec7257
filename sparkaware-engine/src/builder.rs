use std::sync::Arc;
use std::time::Duration;

use sparkaware_broker::{Broker, DynBroker, DynEventSource, EventSource};
use sparkaware_types::{DynPayloadCodec, PayloadCodec};

use crate::{
    aware::{AwareHandle, SparkplugAware},
    config::AwareConfig,
    engine::Engine,
    error::BuildError,
};

/// A builder for creating and configuring [SparkplugAware] instances.
pub struct SparkplugAwareBuilder {
    source: Box<DynEventSource>,
    broker: Arc<DynBroker>,
    codec: Arc<DynPayloadCodec>,
    staleness_timeout: Option<Duration>,
    sweep_interval: Option<Duration>,
    rebirth_cooldown: Option<Duration>,
    lock_timeout: Option<Duration>,
    sys_topic: Option<String>,
    systopic_message_expiry: Option<u64>,
    refresh_death_timestamps: bool,
    json_log: bool,
    enabled: bool,
}

impl SparkplugAwareBuilder {
    /// Creates a new builder with the specified event source, broker and payload codec.
    pub fn new<E, B, C>(source: E, broker: B, codec: C) -> Self
    where
        E: EventSource + Send + 'static,
        B: Broker + Send + Sync + 'static,
        C: PayloadCodec + 'static,
    {
        Self {
            source: Box::new(source),
            broker: Arc::new(broker),
            codec: Arc::new(codec),
            staleness_timeout: None,
            sweep_interval: None,
            rebirth_cooldown: None,
            lock_timeout: None,
            sys_topic: None,
            systopic_message_expiry: None,
            refresh_death_timestamps: true,
            json_log: false,
            enabled: true,
        }
    }

    /// Use a fully specified configuration instead of individual setters.
    pub fn with_config(mut self, config: AwareConfig) -> Self {
        self.staleness_timeout = Some(config.staleness_timeout);
        self.sweep_interval = Some(config.sweep_interval);
        self.rebirth_cooldown = Some(config.rebirth_cooldown);
        self.lock_timeout = Some(config.lock_timeout);
        self.sys_topic = config.sys_topic;
        self.systopic_message_expiry = config.systopic_message_expiry;
        self.refresh_death_timestamps = config.refresh_death_timestamps;
        self.json_log = config.json_log;
        self.enabled = config.enabled;
        self
    }

    /// How long a session may stay quiet before the sweep declares it dead. Required.
    pub fn with_staleness_timeout(mut self, timeout: Duration) -> Self {
        self.staleness_timeout = Some(timeout);
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = Some(interval);
        self
    }

    pub fn with_rebirth_cooldown(mut self, cooldown: Duration) -> Self {
        self.rebirth_cooldown = Some(cooldown);
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = Some(timeout);
        self
    }

    /// Republish accepted birth certificates retained under the given prefix.
    pub fn with_certificate_sys_topic<S: Into<String>>(mut self, prefix: S) -> Self {
        self.sys_topic = Some(prefix.into());
        self
    }

    pub fn with_systopic_message_expiry(mut self, seconds: u64) -> Self {
        self.systopic_message_expiry = Some(seconds);
        self
    }

    pub fn with_refresh_death_timestamps(mut self, refresh: bool) -> Self {
        self.refresh_death_timestamps = refresh;
        self
    }

    pub fn with_json_log(mut self, enabled: bool) -> Self {
        self.json_log = enabled;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Builds the instance with the configured settings.
    ///
    /// Returns an error if required configuration is missing.
    pub fn build(self) -> Result<(SparkplugAware, AwareHandle), BuildError> {
        let staleness_timeout = self
            .staleness_timeout
            .ok_or(BuildError::MissingStalenessTimeout)?;
        if staleness_timeout.is_zero() {
            return Err(BuildError::ZeroStalenessTimeout);
        }

        let mut config = AwareConfig::new(staleness_timeout);
        if let Some(interval) = self.sweep_interval {
            config.sweep_interval = interval;
        }
        if let Some(cooldown) = self.rebirth_cooldown {
            config.rebirth_cooldown = cooldown;
        }
        if let Some(timeout) = self.lock_timeout {
            config.lock_timeout = timeout;
        }
        config.sys_topic = self.sys_topic;
        config.systopic_message_expiry = self.systopic_message_expiry;
        config.refresh_death_timestamps = self.refresh_death_timestamps;
        config.json_log = self.json_log;
        config.enabled = self.enabled;

        let sweep_interval = config.sweep_interval;
        let engine = Arc::new(Engine::from_parts(self.broker, self.codec, config));
        Ok(SparkplugAware::new(engine, self.source, sweep_interval))
    }
}
