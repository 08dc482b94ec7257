use std::time::Duration;

use serde::Deserialize;

pub(crate) const DEFAULT_REBIRTH_COOLDOWN: Duration = Duration::from_secs(5);
pub(crate) const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(500);
const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Configuration for the session engine.
///
/// There is no default staleness timeout; the right value depends on how chatty the
/// deployment's edge nodes are, so it must be supplied.
#[derive(Debug, Clone)]
pub struct AwareConfig {
    /// Whether the engine inspects events at all. When false every event passes through.
    pub enabled: bool,
    /// How long a session may stay quiet before the sweep declares it dead.
    pub staleness_timeout: Duration,
    /// How often the background sweep runs.
    pub sweep_interval: Duration,
    /// Minimum gap between rebirth requests for the same node.
    pub rebirth_cooldown: Duration,
    /// Deadline for acquiring a per-identity session lock.
    pub lock_timeout: Duration,
    /// Prefix under which accepted birth certificates are republished retained.
    /// `None` disables the republish.
    pub sys_topic: Option<String>,
    /// Message expiry interval in seconds for republished birth certificates.
    pub systopic_message_expiry: Option<u64>,
    /// Re-stamp accepted NDEATH payloads with the arrival time. Death certificates are
    /// stored as MQTT wills at connect time, so their original timestamp predates the
    /// actual disconnect.
    pub refresh_death_timestamps: bool,
    /// Log decoded Sparkplug payloads as JSON on the `sparkaware::json` target.
    pub json_log: bool,
}

impl AwareConfig {
    /// Create a configuration with the given staleness timeout and defaults for
    /// everything else.
    pub fn new(staleness_timeout: Duration) -> Self {
        Self {
            enabled: true,
            staleness_timeout,
            sweep_interval: Self::default_sweep_interval(staleness_timeout),
            rebirth_cooldown: DEFAULT_REBIRTH_COOLDOWN,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            sys_topic: None,
            systopic_message_expiry: None,
            refresh_death_timestamps: true,
            json_log: false,
        }
    }

    fn default_sweep_interval(staleness_timeout: Duration) -> Duration {
        (staleness_timeout / 4).max(MIN_SWEEP_INTERVAL)
    }
}

/// Wire form of [AwareConfig], all intervals in milliseconds.
#[derive(Deserialize)]
struct RawAwareConfig {
    #[serde(default = "default_true")]
    enabled: bool,
    staleness_timeout_ms: u64,
    #[serde(default)]
    sweep_interval_ms: Option<u64>,
    #[serde(default)]
    rebirth_cooldown_ms: Option<u64>,
    #[serde(default)]
    lock_timeout_ms: Option<u64>,
    #[serde(default)]
    sys_topic: Option<String>,
    #[serde(default)]
    systopic_message_expiry: Option<u64>,
    #[serde(default = "default_true")]
    refresh_death_timestamps: bool,
    #[serde(default)]
    json_log: bool,
}

fn default_true() -> bool {
    true
}

impl<'de> Deserialize<'de> for AwareConfig {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = RawAwareConfig::deserialize(deserializer)?;
        if raw.staleness_timeout_ms == 0 {
            return Err(serde::de::Error::custom(
                "staleness_timeout_ms must be greater than zero",
            ));
        }
        let staleness_timeout = Duration::from_millis(raw.staleness_timeout_ms);
        let mut config = AwareConfig::new(staleness_timeout);
        config.enabled = raw.enabled;
        if let Some(ms) = raw.sweep_interval_ms {
            config.sweep_interval = Duration::from_millis(ms.max(1));
        }
        if let Some(ms) = raw.rebirth_cooldown_ms {
            config.rebirth_cooldown = Duration::from_millis(ms);
        }
        if let Some(ms) = raw.lock_timeout_ms {
            config.lock_timeout = Duration::from_millis(ms.max(1));
        }
        config.sys_topic = raw.sys_topic;
        config.systopic_message_expiry = raw.systopic_message_expiry;
        config.refresh_death_timestamps = raw.refresh_death_timestamps;
        config.json_log = raw.json_log;
        Ok(config)
    }
}
