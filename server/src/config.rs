//! Server configuration
//!
//! Layered with the `config` crate: built-in defaults, then an optional TOML
//! file, then `FLAREPROF_*` environment variables. Command line flags are
//! applied on top by `main`.

use anyhow::{Context, Result};
use flareprof_agent::ProfilerConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Prefix of environment overrides (`FLAREPROF_LISTEN_ADDR`, ...)
pub const ENV_PREFIX: &str = "FLAREPROF";

/// Widest SVG accepted from config or a query string
pub const MAX_SVG_WIDTH: u32 = 20_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    pub listen_addr: String,

    /// Directory session output paths point into
    pub profile_dir: PathBuf,

    /// Samples kept per session
    pub max_samples: usize,

    /// Default SVG width in pixels
    pub svg_width: u32,

    /// SVG frame height in pixels
    pub svg_frame_height: u32,

    /// Write collapsed stacks to the output path on stop
    pub persist_on_stop: bool,

    /// Run the built-in CPU and heap workload
    pub demo_workload: bool,

    /// Sampling interval of the demo workload
    pub demo_sample_interval_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8787".to_string(),
            profile_dir: PathBuf::from("/tmp/flareprof"),
            max_samples: 1_000_000,
            svg_width: 1200,
            svg_frame_height: 16,
            persist_on_stop: false,
            demo_workload: false,
            demo_sample_interval_ms: 10,
        }
    }
}

impl ServerConfig {
    /// Load defaults, the optional file and the process environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, None)
    }

    /// Like [`ServerConfig::load`], reading overrides from `env` instead of
    /// the process environment when given
    pub fn load_with_env(
        path: Option<&Path>,
        env: Option<config::Map<String, String>>,
    ) -> Result<Self> {
        let defaults = config::Config::try_from(&ServerConfig::default())
            .context("Failed to build default configuration")?;

        let mut builder = config::Config::builder().add_source(defaults);
        if let Some(path) = path {
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Toml)
                    .required(true),
            );
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .try_parsing(true)
                .source(env),
        );

        let config: ServerConfig = builder
            .build()
            .context("Failed to load configuration")?
            .try_deserialize()
            .context("Invalid configuration values")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.socket_addr()?;

        if self.max_samples == 0 {
            anyhow::bail!("max_samples must be greater than 0");
        }

        if self.svg_width == 0 || self.svg_width > MAX_SVG_WIDTH {
            anyhow::bail!("svg_width must be between 1 and {}", MAX_SVG_WIDTH);
        }

        if self.svg_frame_height == 0 {
            anyhow::bail!("svg_frame_height must be greater than 0");
        }

        if self.demo_sample_interval_ms == 0 {
            anyhow::bail!("demo_sample_interval_ms must be greater than 0");
        }

        self.profiler().validate()
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        self.listen_addr
            .parse()
            .with_context(|| format!("Invalid listen address: {}", self.listen_addr))
    }

    /// Settings handed to the profiler core
    pub fn profiler(&self) -> ProfilerConfig {
        ProfilerConfig {
            profile_dir: self.profile_dir.clone(),
            max_samples: self.max_samples,
            persist_on_stop: self.persist_on_stop,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> Option<config::Map<String, String>> {
        Some(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::load_with_env(None, env(&[])).unwrap();
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.socket_addr().unwrap().port(), 8787);
    }

    #[test]
    fn test_file_then_env_layering() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "listen_addr = \"127.0.0.1:9000\"").unwrap();
        writeln!(file, "max_samples = 5000").unwrap();
        writeln!(file, "svg_width = 800").unwrap();

        let config = ServerConfig::load_with_env(
            Some(file.path()),
            env(&[("FLAREPROF_MAX_SAMPLES", "42"), ("FLAREPROF_PERSIST_ON_STOP", "true")]),
        )
        .unwrap();

        assert_eq!(config.listen_addr, "127.0.0.1:9000");
        assert_eq!(config.svg_width, 800);
        assert_eq!(config.max_samples, 42);
        assert!(config.persist_on_stop);
        assert_eq!(config.svg_frame_height, 16);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result = ServerConfig::load_with_env(Some(Path::new("/nonexistent/flareprof.toml")), env(&[]));
        assert!(result.is_err());
    }

    #[test]
    fn test_config_validation() {
        let mut config = ServerConfig::default();
        assert!(config.validate().is_ok());

        config.listen_addr = "not-an-address".to_string();
        assert!(config.validate().is_err());

        let config = ServerConfig {
            svg_width: MAX_SVG_WIDTH + 1,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ServerConfig {
            demo_sample_interval_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_profiler_settings() {
        let config = ServerConfig {
            max_samples: 77,
            persist_on_stop: true,
            ..Default::default()
        };
        let profiler = config.profiler();
        assert_eq!(profiler.max_samples, 77);
        assert!(profiler.persist_on_stop);
    }
}
