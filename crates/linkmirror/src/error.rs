use std::path::PathBuf;

use thiserror::Error;

use crate::hosts::HostError;

#[derive(Error, Debug)]
pub enum LinkMirrorError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Host error: {0}")]
    Host(#[from] HostError),

    #[error("Reconcile error: {0}")]
    Reconcile(#[from] ReconcileError),

    #[error("Logging setup failed: {0}")]
    Logging(String),

    #[error("Failed to spawn thread '{name}': {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Invalid host '{name}': {reason}")]
    InvalidHost { name: String, reason: String },
}

/// Why a single job could not be reconciled this time around.
#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("no host registered as '{0}'")]
    UnknownHost(String),

    #[error(transparent)]
    Host(#[from] HostError),

    #[error("failed to persist job {auto_id}: {source}")]
    Persist {
        auto_id: i64,
        #[source]
        source: crate::db::DatabaseError,
    },
}

pub type Result<T> = std::result::Result<T, LinkMirrorError>;
