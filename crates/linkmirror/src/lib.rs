pub mod config;
pub mod db;
pub mod error;
pub mod hosts;
pub mod link;
pub mod logging;
pub mod reconciler;
pub mod share;

pub use config::{load_config, HostEndpoint, LoggingConfig, ReconcilerConfig};
pub use db::{Database, DatabaseError};
pub use error::{ConfigError, LinkMirrorError, ReconcileError, Result};
pub use hosts::{Host, HostError, HostRegistry, HttpHost, MemoryHost};
pub use reconciler::{Reconciler, ReconcilerSettings};
pub use share::{ShareState, ShareStatus};
