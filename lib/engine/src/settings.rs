//! Engine configuration.
//!
//! Strongly-typed settings loaded via the `config` crate from
//! environment variables (`PARLEY_ENGINE__MAX_STEPS_PER_RUN`,
//! `PARLEY_ENGINE__RETRY__MAX_ATTEMPTS`, ...). Every field has a
//! default, so `EngineSettings::default()` is a working configuration.

use serde::Deserialize;

/// Runtime settings for the workflow engine.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineSettings {
    /// Maximum executed steps per synchronous run segment.
    /// Cyclic graphs are legal; this bound guarantees termination.
    #[serde(default = "default_max_steps_per_run")]
    pub max_steps_per_run: u32,

    /// Retry policy for transient step failures.
    #[serde(default)]
    pub retry: RetrySettings,

    /// Per-call timeout for outbound HTTP, in seconds.
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
}

/// Bounded exponential backoff parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct RetrySettings {
    /// Total attempts, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry, in milliseconds.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Multiplier applied to the delay after each attempt.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

fn default_max_steps_per_run() -> u32 {
    256
}

fn default_http_timeout_secs() -> u64 {
    10
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    250
}

fn default_multiplier() -> f64 {
    2.0
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_steps_per_run: default_max_steps_per_run(),
            retry: RetrySettings::default(),
            http_timeout_secs: default_http_timeout_secs(),
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            multiplier: default_multiplier(),
        }
    }
}

impl EngineSettings {
    /// Loads settings from `PARLEY_ENGINE`-prefixed environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable cannot be parsed into its field.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(
                config::Environment::with_prefix("PARLEY_ENGINE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}
