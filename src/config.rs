use std::net::Ipv4Addr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::optspec;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Local IPv4 address the client socket binds to.
    pub bind_ip: Ipv4Addr,
    /// Default queue depth for the engine channels. At least 3x the target
    /// request rate is recommended for load runs.
    pub buffer_size: usize,
    /// Whether received OFFERs automatically generate REQUESTs.
    pub auto_request: bool,
    /// Per-packet logging; disables the counter task.
    pub log_verbose: bool,
    /// Discover- and request-phase timer duration.
    pub phase_timeout_seconds: u64,
    pub read_timeout_millis: u64,
    pub write_timeout_millis: u64,
    /// Options added to every outgoing packet, in CODE[FORMAT]=VALUE form.
    pub option_specs: Vec<String>,
    /// Codes requested from the server via option 55.
    pub params_request: Vec<u8>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_ip: Ipv4Addr::UNSPECIFIED,
            buffer_size: 1024,
            auto_request: false,
            log_verbose: false,
            phase_timeout_seconds: 5,
            read_timeout_millis: 2000,
            write_timeout_millis: 2000,
            option_specs: Vec::new(),
            // subnet mask, router, time server, dns, domain name, mtu, ntp
            params_request: vec![1, 3, 4, 6, 15, 26, 42],
        }
    }
}

impl Config {
    pub async fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            let config: Config = serde_json::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save(path).await?;
            Ok(config)
        }
    }

    pub async fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.buffer_size == 0 {
            return Err(Error::InvalidConfig(
                "buffer_size must be greater than 0".to_string(),
            ));
        }

        if self.phase_timeout_seconds == 0 {
            return Err(Error::InvalidConfig(
                "phase_timeout_seconds must be greater than 0".to_string(),
            ));
        }

        if self.read_timeout_millis == 0 || self.write_timeout_millis == 0 {
            return Err(Error::InvalidConfig(
                "socket timeouts must be greater than 0".to_string(),
            ));
        }

        optspec::parse_specs(&self.option_specs)
            .map_err(|error| Error::InvalidConfig(error.to_string()))?;

        Ok(())
    }

    pub fn phase_timeout(&self) -> Duration {
        Duration::from_secs(self.phase_timeout_seconds)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_millis)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_millis)
    }
}
