//! Core library for airlist, a Wi-Fi network picker.
//! This crate defines the data model, the platform trait that backends
//! implement, the scan reducer and connection policy, and the reactor that
//! turns platform events and user commands into published state snapshots.

pub mod backends;
pub mod cipher;
pub mod config;
pub mod context;
pub mod factory;
pub mod orchestrator;
pub mod reactor;
pub mod reducer;
pub mod tier;
pub mod traits;
pub mod web_server;

// Define a shared Error and Result type for the entire crate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Command failed: {0}")]
    CommandFailed(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Suggestion rejected: {0}")]
    SuggestionRejected(String),

    #[error("Radio toggling is not supported by this platform")]
    RadioToggleUnsupported,

    #[error("No network named '{0}' in the latest scan")]
    NoMatchingNetwork(String),

    #[error("Platform events are already registered")]
    AlreadyRegistered,

    #[error("Event channel closed")]
    ChannelClosed,

    #[error("Config error: {0}")]
    Config(String),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[cfg(feature = "backend_nmdbus")]
    #[error("D-Bus error: {0}")]
    Dbus(#[from] zbus::Error),

    #[cfg(feature = "backend_nmdbus")]
    #[error("zvariant error: {0}")]
    Zvariant(#[from] zbus::zvariant::Error),

    #[error("UTF-8 conversion error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// A specialized `Result` type for this crate's operations.
pub type Result<T> = std::result::Result<T, Error>;
