use crate::context::ContextOptions;
use crate::reducer::SignalScale;
use crate::traits::FeatureTier;
use crate::{Error, Result};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;

/// Bundled default configuration.
pub const DEFAULT_CONFIG_TOML: &str = include_str!("../../configs/airlist.toml");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Mock,
    Nmcli,
    Nmdbus,
}

/// 顶层应用配置
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub backend: BackendKind,
    pub interface: String,
    pub bind_addr: SocketAddr,
    pub tier: Option<FeatureTier>,
    pub signal: SignalScale,
}

/// 用于解析 TOML 的临时结构
#[derive(Deserialize)]
struct AppConfigFile {
    backend: BackendKind,
    #[serde(default = "default_interface")]
    interface: String,
    bind_addr: String,
    #[serde(default)]
    tier: Option<FeatureTier>,
    #[serde(default)]
    signal: SignalScale,
}

fn default_interface() -> String {
    "wlan0".to_string()
}

impl TryFrom<AppConfigFile> for AppConfig {
    type Error = Error;

    fn try_from(t: AppConfigFile) -> Result<Self> {
        let bind_addr = SocketAddr::from_str(&t.bind_addr)
            .map_err(|e| Error::Config(format!("invalid bind_addr '{}': {}", t.bind_addr, e)))?;
        if t.signal.levels < 2 {
            return Err(Error::Config("signal.levels must be at least 2".into()));
        }
        if t.signal.min_rssi >= t.signal.max_rssi {
            return Err(Error::Config(
                "signal.min_rssi must be below signal.max_rssi".into(),
            ));
        }
        Ok(AppConfig {
            backend: t.backend,
            interface: t.interface,
            bind_addr,
            tier: t.tier,
            signal: t.signal,
        })
    }
}

impl AppConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let parsed: AppConfigFile = toml::from_str(s)?;
        AppConfig::try_from(parsed)
    }

    /// Reads `path`, or the bundled default when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_toml_str(&std::fs::read_to_string(path)?),
            None => Self::from_toml_str(DEFAULT_CONFIG_TOML),
        }
    }

    pub fn context_options(&self) -> ContextOptions {
        ContextOptions {
            tier: self.tier,
            signal: self.signal,
        }
    }
}
