//! Daemon configuration, loaded from a TOML file.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use serde::Deserialize;

use cellrep_api::CellSettings;
use cellrep_client::TlsConfig;
use cellrep_models::{Resources, StackPathMap};

const INVALID_ROOTFS: &str = "Invalid preloaded RootFS value";

/// Capacity and drivers of the simulated executor.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub memory_mb: i32,
    pub disk_mb: i32,
    pub containers: i32,
    pub volume_drivers: Vec<String>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            memory_mb: 8192,
            disk_mb: 16384,
            containers: 250,
            volume_drivers: Vec::new(),
        }
    }
}

impl SimConfig {
    pub fn capacity(&self) -> Resources {
        Resources::new(self.memory_mb, self.disk_mb, self.containers)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CellRepConfig {
    pub cell_id: String,
    pub zone: String,

    /// Plaintext operator listener (ping, evacuate, containers).
    pub listen_addr: SocketAddr,
    /// Auctioneer listener; TLS when `require_tls` is set.
    pub listen_addr_securable: SocketAddr,
    pub require_tls: bool,

    pub ca_cert_file: Option<PathBuf>,
    pub server_cert_file: Option<PathBuf>,
    pub server_key_file: Option<PathBuf>,
    pub client_cert_file: Option<PathBuf>,
    pub client_key_file: Option<PathBuf>,
    pub client_session_cache_size: usize,
    pub insecure_skip_verify: bool,

    /// e.g. `"10s"`, `"500ms"`, `"1m"`.
    pub communication_timeout: String,
    /// Defaults to twice `communication_timeout`.
    pub state_timeout: Option<String>,

    /// `"stack-name:path"` entries.
    pub preloaded_root_fs: Vec<String>,
    pub supported_providers: Vec<String>,
    pub placement_tags: Vec<String>,
    pub optional_placement_tags: Vec<String>,

    pub sim: SimConfig,
}

impl Default for CellRepConfig {
    fn default() -> Self {
        Self {
            cell_id: String::new(),
            zone: String::new(),
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 1800)),
            listen_addr_securable: SocketAddr::from(([0, 0, 0, 0], 1801)),
            require_tls: true,
            ca_cert_file: None,
            server_cert_file: None,
            server_key_file: None,
            client_cert_file: None,
            client_key_file: None,
            client_session_cache_size: 0,
            insecure_skip_verify: false,
            communication_timeout: "10s".to_string(),
            state_timeout: None,
            preloaded_root_fs: Vec::new(),
            supported_providers: Vec::new(),
            placement_tags: Vec::new(),
            optional_placement_tags: Vec::new(),
            sim: SimConfig::default(),
        }
    }
}

impl CellRepConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: CellRepConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.cell_id.is_empty() {
            bail!("cell_id is required");
        }
        if self.require_tls && self.server_tls_files().is_none() {
            bail!("require_tls is set but server_cert_file, server_key_file and ca_cert_file are not all configured");
        }
        self.stack_path_map()?;
        self.communication_timeout()?;
        self.state_timeout()?;
        Ok(())
    }

    /// Certificate, key, and CA for the secure listener, when all are set.
    pub fn server_tls_files(&self) -> Option<(&Path, &Path, &Path)> {
        match (&self.server_cert_file, &self.server_key_file, &self.ca_cert_file) {
            (Some(cert), Some(key), Some(ca)) => Some((cert, key, ca)),
            _ => None,
        }
    }

    pub fn stack_path_map(&self) -> anyhow::Result<StackPathMap> {
        let mut stacks = BTreeMap::new();
        for entry in &self.preloaded_root_fs {
            let Some((stack, path)) = entry.split_once(':') else {
                bail!("{INVALID_ROOTFS}: not of the form 'stack-name:path'");
            };
            if stack.is_empty() {
                bail!("{INVALID_ROOTFS}: blank stack");
            }
            if path.is_empty() {
                bail!("{INVALID_ROOTFS}: blank path");
            }
            stacks.insert(stack.to_string(), path.to_string());
        }
        Ok(StackPathMap(stacks))
    }

    pub fn communication_timeout(&self) -> anyhow::Result<Duration> {
        parse_duration(&self.communication_timeout)
    }

    pub fn state_timeout(&self) -> anyhow::Result<Duration> {
        match &self.state_timeout {
            Some(value) => parse_duration(value),
            None => Ok(self.communication_timeout()? * 2),
        }
    }

    /// TLS settings for talking to other cells.
    pub fn client_tls(&self) -> TlsConfig {
        TlsConfig {
            require_tls: self.require_tls,
            cert_file: self.client_cert_file.clone(),
            key_file: self.client_key_file.clone(),
            ca_cert_file: self.ca_cert_file.clone(),
            client_session_cache_size: self.client_session_cache_size,
            insecure_skip_verify: self.insecure_skip_verify,
        }
    }

    pub fn cell_settings(&self) -> anyhow::Result<CellSettings> {
        Ok(CellSettings {
            cell_id: self.cell_id.clone(),
            zone: self.zone.clone(),
            stack_path_map: self.stack_path_map()?,
            arbitrary_root_fs_schemes: self.supported_providers.clone(),
            placement_tags: self.placement_tags.clone(),
            optional_placement_tags: self.optional_placement_tags.clone(),
        })
    }
}

/// Parse `"250ms"`, `"10s"` or `"2m"`; a bare number is seconds.
pub fn parse_duration(value: &str) -> anyhow::Result<Duration> {
    let value = value.trim();
    let invalid = || anyhow::anyhow!("invalid duration: {value:?}");

    if let Some(ms) = value.strip_suffix("ms") {
        Ok(Duration::from_millis(ms.parse().map_err(|_| invalid())?))
    } else if let Some(secs) = value.strip_suffix('s') {
        Ok(Duration::from_secs(secs.parse().map_err(|_| invalid())?))
    } else if let Some(mins) = value.strip_suffix('m') {
        Ok(Duration::from_secs(mins.parse::<u64>().map_err(|_| invalid())? * 60))
    } else {
        Ok(Duration::from_secs(value.parse().map_err(|_| invalid())?))
    }
}
