//! Error types of the track finder.

use crate::types::SectorCoord;
use std::path::PathBuf;
use thiserror::Error;

/// Fatal configuration problems, raised before any event is processed.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid parameter `{name}`: {reason}")]
    Invalid { name: &'static str, reason: String },

    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("sector {coord} rejected its configuration: {reason}")]
    Sector { coord: SectorCoord, reason: String },
}

impl ConfigError {
    pub fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            name,
            reason: reason.into(),
        }
    }
}

/// Problems loading primitive-conversion tables.
#[derive(Debug, Error)]
pub enum LutError {
    #[error("LUT set `{0}` is not available")]
    NotFound(String),

    #[error("failed to read LUT file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse LUT file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
