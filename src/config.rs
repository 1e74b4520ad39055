use std::net::{IpAddr, SocketAddr};

use clap::Parser;
use serde::Serialize;
use thiserror::Error;

use crate::types::WorkDims;

pub const DEFAULT_BIND_PORT: u16 = 9854;
pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Command line. Running without any of the leading arguments lists the
/// values available for the first one that is missing.
#[derive(Parser, Debug, Clone, Default)]
#[command(
    name = "nonce-worker",
    version,
    about = "Searches nonce ranges on an OpenCL device for jobs received over TCP",
    after_help = "Only one connection is served at a time."
)]
pub struct Cli {
    /// OpenCL platform ID
    pub platform: Option<usize>,
    /// OpenCL device ID on that platform
    pub device: Option<usize>,
    /// Work dimension 0 (fastest varying)
    pub dim0: Option<usize>,
    /// Work dimension 1
    pub dim1: Option<usize>,
    /// Work dimension 2
    pub dim2: Option<usize>,
    /// Bind port [default: 9854]
    pub port: Option<u16>,
    /// Bind address [default: 127.0.0.1]
    pub address: Option<String>,

    /// Search on the host instead of an OpenCL device (platform and device IDs are ignored)
    #[arg(long)]
    pub cpu: bool,
    /// Log level used when RUST_LOG is unset
    #[arg(long)]
    pub log_level: Option<String>,
    /// Log search progress every N batches (0 disables)
    #[arg(long)]
    pub stats_interval: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Backend {
    OpenCl,
    Cpu,
}

#[derive(Debug, Clone, Serialize)]
pub struct Config {
    // Device selection
    pub backend: Backend,
    pub platform: Option<usize>,
    pub device: Option<usize>,
    pub work_dims: Option<WorkDims>,

    // Listener
    pub bind_port: u16,
    pub bind_address: String,

    // Logging
    pub log_level: String,
    pub stats_interval_batches: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Invocation {
    ListPlatforms,
    ListDevices { platform: usize },
    ShowMaxDims { platform: usize, device: usize },
    Run { platform: usize, device: usize, dims: WorkDims },
    RunCpu { dims: WorkDims },
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: Backend::OpenCl,
            platform: None,
            device: None,
            work_dims: None,

            bind_port: DEFAULT_BIND_PORT,
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),

            log_level: "info".to_string(),
            stats_interval_batches: 100,
        }
    }
}

impl Config {
    pub fn load<F>(cli: &Cli, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();
        config.apply_env(lookup)?;
        config.apply_cli(cli);
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("LOG_LEVEL") {
            self.log_level = val;
        }

        if let Some(val) = lookup("STATS_INTERVAL_BATCHES") {
            self.stats_interval_batches = val.parse()
                .map_err(|_| ConfigError::InvalidEnvVar("STATS_INTERVAL_BATCHES".to_string(), val))?;
        }

        if let Some(val) = lookup("BIND_PORT") {
            self.bind_port = val.parse()
                .map_err(|_| ConfigError::InvalidEnvVar("BIND_PORT".to_string(), val))?;
        }

        if let Some(val) = lookup("BIND_ADDRESS") {
            self.bind_address = val;
        }

        Ok(())
    }

    pub fn apply_cli(&mut self, cli: &Cli) {
        if cli.cpu {
            self.backend = Backend::Cpu;
        }
        self.platform = cli.platform;
        self.device = cli.device;
        self.work_dims = match (cli.dim0, cli.dim1, cli.dim2) {
            (Some(x), Some(y), Some(z)) => Some(WorkDims::new(x, y, z)),
            _ => None,
        };
        if let Some(port) = cli.port {
            self.bind_port = port;
        }
        if let Some(address) = &cli.address {
            self.bind_address = address.clone();
        }
        if let Some(level) = &cli.log_level {
            self.log_level = level.clone();
        }
        if let Some(n) = cli.stats_interval {
            self.stats_interval_batches = n;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(dims) = self.work_dims {
            if dims.x == 0 || dims.y == 0 || dims.z == 0 {
                return Err(ConfigError::ValidationError("work dimensions must be greater than 0".to_string()));
            }
            if dims.checked_batch_size().is_none() {
                return Err(ConfigError::ValidationError(
                    "work dimensions multiply to more than 2^32 - 1 lanes".to_string(),
                ));
            }
        }

        if self.backend == Backend::Cpu && self.work_dims.is_none() {
            return Err(ConfigError::ValidationError("--cpu needs all three work dimensions".to_string()));
        }

        self.bind_addr()?;
        Ok(())
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self.bind_address.parse().map_err(|_| {
            ConfigError::ValidationError(format!("bind address {} is not an IP address", self.bind_address))
        })?;
        Ok(SocketAddr::new(ip, self.bind_port))
    }

    pub fn invocation(&self) -> Invocation {
        if self.backend == Backend::Cpu {
            if let Some(dims) = self.work_dims {
                return Invocation::RunCpu { dims };
            }
        }
        match (self.platform, self.device, self.work_dims) {
            (None, _, _) => Invocation::ListPlatforms,
            (Some(platform), None, _) => Invocation::ListDevices { platform },
            (Some(platform), Some(device), None) => Invocation::ShowMaxDims { platform, device },
            (Some(platform), Some(device), Some(dims)) => Invocation::Run { platform, device, dims },
        }
    }
}
