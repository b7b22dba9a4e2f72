//! Error types for the wg-host-core crate

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Command execution failed: {cmd} - {message}")]
    Command { cmd: String, message: String },

    #[error("Command not found: {0}")]
    CommandNotFound(String),

    #[error("Key tool error: {0}")]
    KeyTool(String),

    #[error("Key store error: {0}")]
    Store(String),

    #[error("Peer data error: {0}")]
    PeerData(String),

    #[error("Service error: {0}")]
    Service(String),

    #[error("Firewall error: {0}")]
    Firewall(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Deserialization error: {0}")]
    Deserialization(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    pub fn key_tool(msg: impl Into<String>) -> Self {
        Error::KeyTool(msg.into())
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Error::Store(msg.into())
    }

    pub fn peer_data(msg: impl Into<String>) -> Self {
        Error::PeerData(msg.into())
    }

    pub fn service(msg: impl Into<String>) -> Self {
        Error::Service(msg.into())
    }

    pub fn firewall(msg: impl Into<String>) -> Self {
        Error::Firewall(msg.into())
    }
}
