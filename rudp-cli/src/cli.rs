//! Flags and logging shared by every binary

use crate::config::{Config, ConfigError};
use clap::Args;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Fault injection, timing and config file flags
#[derive(Args, Debug, Clone, Default)]
pub struct CommonArgs {
    /// Probability of dropping an outbound data frame (0.0 to 1.0)
    #[arg(long)]
    pub loss: Option<f64>,

    /// Probability of corrupting an inbound datagram (0.0 to 1.0)
    #[arg(long)]
    pub corrupt: Option<f64>,

    /// Retransmission timeout in milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Seed for the fault injection RNG
    #[arg(long)]
    pub seed: Option<u64>,

    /// TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl CommonArgs {
    /// Configuration file (or defaults) with command-line overrides applied
    pub fn load(&self) -> Result<Config, ConfigError> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };

        if let Some(loss) = self.loss {
            config.transport.loss_probability = loss;
        }
        if let Some(corrupt) = self.corrupt {
            config.transport.corruption_probability = corrupt;
        }
        if let Some(timeout_ms) = self.timeout_ms {
            config.transport.timeout_ms = timeout_ms;
        }
        if self.seed.is_some() {
            config.transport.seed = self.seed;
        }

        config.validate()?;
        Ok(config)
    }
}

/// Install the tracing subscriber
///
/// `RUST_LOG` takes precedence; otherwise `info`, or `debug` when verbose.
pub fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser, Debug)]
    struct TestArgs {
        #[command(flatten)]
        common: CommonArgs,
    }

    #[test]
    fn test_overrides() {
        let args = TestArgs::parse_from(["test", "--loss", "0.3", "--corrupt", "0", "--seed", "5"]);
        let config = args.common.load().unwrap();
        assert_eq!(config.transport.loss_probability, 0.3);
        assert_eq!(config.transport.corruption_probability, 0.0);
        assert_eq!(config.transport.seed, Some(5));
        assert_eq!(config.transport.timeout_ms, 2000);
    }

    #[test]
    fn test_invalid_override() {
        let args = TestArgs::parse_from(["test", "--loss", "1.5"]);
        assert!(args.common.load().is_err());

        let args = TestArgs::parse_from(["test", "--timeout-ms", "18446744073709551615"]);
        assert!(matches!(args.common.load(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_missing_file() {
        let args = TestArgs::parse_from(["test", "--config", "/nonexistent/rudp.toml"]);
        assert!(matches!(args.common.load(), Err(ConfigError::Io(_))));
    }
}
