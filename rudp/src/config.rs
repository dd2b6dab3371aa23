//! Transport configuration

use rudp_io::{FaultError, RandomFaults};
use rudp_protocol::packet::DIGEST_LEN;
use rudp_protocol::sequence::{SeqSpace, DEFAULT_MODULUS, DEFAULT_WINDOW};
use rudp_protocol::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Smallest datagram buffer that fits a control frame with room to spare
pub const MIN_DATAGRAM: usize = DIGEST_LEN + 32;

/// Longest accepted retransmission timeout (one hour)
pub const MAX_TIMEOUT_MS: u64 = 60 * 60 * 1000;

/// Retry bounds as written in configuration files
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Give up after this many attempts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    /// Give up after this many milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_duration_ms: Option<u64>,
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            max_duration: self.max_duration_ms.map(Duration::from_millis),
        }
    }
}

impl From<RetryPolicy> for RetryConfig {
    fn from(policy: RetryPolicy) -> Self {
        RetryConfig {
            max_attempts: policy.max_attempts,
            max_duration_ms: policy.max_duration.map(|d| d.as_millis() as u64),
        }
    }
}

/// Per-endpoint transport settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Probability that an outbound data frame is dropped
    #[serde(default = "default_loss")]
    pub loss_probability: f64,
    /// Probability that an inbound datagram has one byte flipped
    #[serde(default = "default_corruption")]
    pub corruption_probability: f64,
    /// Retransmission timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Go-Back-N window size
    #[serde(default = "default_window_size")]
    pub window_size: u32,
    /// Go-Back-N sequence space
    #[serde(default = "default_sequence_modulus")]
    pub sequence_modulus: u32,
    /// Receive buffer size per datagram
    #[serde(default = "default_max_datagram")]
    pub max_datagram: usize,
    /// Fault RNG seed, OS entropy if unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    /// Retransmission bounds
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_loss() -> f64 {
    0.1
}

fn default_corruption() -> f64 {
    0.1
}

fn default_timeout_ms() -> u64 {
    2000
}

fn default_window_size() -> u32 {
    DEFAULT_WINDOW
}

fn default_sequence_modulus() -> u32 {
    DEFAULT_MODULUS
}

fn default_max_datagram() -> usize {
    4096
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig {
            loss_probability: default_loss(),
            corruption_probability: default_corruption(),
            timeout_ms: default_timeout_ms(),
            window_size: default_window_size(),
            sequence_modulus: default_sequence_modulus(),
            max_datagram: default_max_datagram(),
            seed: None,
            retry: RetryConfig::default(),
        }
    }
}

impl TransportConfig {
    /// Defaults with fault injection disabled
    pub fn reliable() -> Self {
        TransportConfig {
            loss_probability: 0.0,
            corruption_probability: 0.0,
            ..Default::default()
        }
    }

    pub fn with_loss(mut self, p: f64) -> Self {
        self.loss_probability = p;
        self
    }

    pub fn with_corruption(mut self, p: f64) -> Self {
        self.corruption_probability = p;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_window(mut self, window_size: u32, sequence_modulus: u32) -> Self {
        self.window_size = window_size;
        self.sequence_modulus = sequence_modulus;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy.into();
        self
    }

    /// Retransmission timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry.policy()
    }

    /// Go-Back-N sequence space; call after [`validate`](Self::validate)
    pub fn seq_space(&self) -> Result<SeqSpace, ConfigError> {
        self.validate_window()?;
        Ok(SeqSpace::new(self.sequence_modulus, self.window_size))
    }

    /// Random fault model from the configured probabilities and seed
    pub fn fault_model(&self) -> Result<RandomFaults, ConfigError> {
        let faults = match self.seed {
            Some(seed) => {
                RandomFaults::with_seed(self.loss_probability, self.corruption_probability, seed)
            }
            None => RandomFaults::new(self.loss_probability, self.corruption_probability),
        };
        Ok(faults?)
    }

    /// Check every field for a usable value
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("loss_probability", self.loss_probability),
            ("corruption_probability", self.corruption_probability),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Probability { name, value });
            }
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.timeout_ms > MAX_TIMEOUT_MS {
            return Err(ConfigError::TimeoutTooLong(self.timeout_ms));
        }
        if self.max_datagram < MIN_DATAGRAM {
            return Err(ConfigError::DatagramTooSmall(self.max_datagram));
        }
        if self.retry.max_attempts == Some(0) {
            return Err(ConfigError::ZeroAttempts);
        }
        self.validate_window()
    }

    fn validate_window(&self) -> Result<(), ConfigError> {
        if self.window_size == 0 || self.window_size >= self.sequence_modulus {
            return Err(ConfigError::Window {
                window: self.window_size,
                modulus: self.sequence_modulus,
            });
        }
        Ok(())
    }
}

/// Configuration errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{name} must be within [0, 1], got {value}")]
    Probability { name: &'static str, value: f64 },

    #[error("Retransmission timeout must be non-zero")]
    ZeroTimeout,

    #[error("Retransmission timeout of {0} ms exceeds the maximum of {MAX_TIMEOUT_MS} ms")]
    TimeoutTooLong(u64),

    #[error("Window size {window} must be non-zero and below the sequence modulus {modulus}")]
    Window { window: u32, modulus: u32 },

    #[error("Datagram buffer of {0} bytes is below the minimum of {MIN_DATAGRAM}")]
    DatagramTooSmall(usize),

    #[error("Retry policy must allow at least one attempt")]
    ZeroAttempts,

    #[error("Fault model: {0}")]
    Faults(#[from] FaultError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TransportConfig::default();
        assert_eq!(config.loss_probability, 0.1);
        assert_eq!(config.corruption_probability, 0.1);
        assert_eq!(config.timeout(), Duration::from_secs(2));
        assert_eq!(config.window_size, 4);
        assert_eq!(config.sequence_modulus, 256);
        assert_eq!(config.max_datagram, 4096);
        assert_eq!(config.retry_policy(), RetryPolicy::forever());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_probability() {
        let config = TransportConfig::default().with_loss(1.2);
        assert_eq!(
            config.validate(),
            Err(ConfigError::Probability {
                name: "loss_probability",
                value: 1.2
            })
        );
        assert!(TransportConfig::default()
            .with_corruption(-0.5)
            .validate()
            .is_err());
    }

    #[test]
    fn test_invalid_window() {
        let config = TransportConfig::default().with_window(256, 256);
        assert!(matches!(config.validate(), Err(ConfigError::Window { .. })));
        assert!(TransportConfig::default().with_window(0, 8).validate().is_err());
        assert!(config.seq_space().is_err());

        let space = TransportConfig::default().with_window(7, 8).seq_space().unwrap();
        assert_eq!(space.window(), 7);
    }

    #[test]
    fn test_zero_timeout() {
        let config = TransportConfig::default().with_timeout(Duration::ZERO);
        assert_eq!(config.validate(), Err(ConfigError::ZeroTimeout));
    }

    #[test]
    fn test_timeout_upper_bound() {
        let mut config = TransportConfig::default();
        config.timeout_ms = MAX_TIMEOUT_MS;
        assert!(config.validate().is_ok());

        config.timeout_ms = u64::MAX;
        assert_eq!(config.validate(), Err(ConfigError::TimeoutTooLong(u64::MAX)));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: TransportConfig = toml::from_str(
            r#"
            loss_probability = 0.0
            timeout_ms = 250

            [retry]
            max_attempts = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.loss_probability, 0.0);
        assert_eq!(config.corruption_probability, 0.1);
        assert_eq!(config.timeout(), Duration::from_millis(250));
        assert_eq!(config.retry_policy(), RetryPolicy::attempts(5));
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = TransportConfig::reliable()
            .with_seed(11)
            .with_retry(RetryPolicy::within(Duration::from_secs(3)));
        let text = toml::to_string(&config).unwrap();
        let parsed: TransportConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }
}
