//! Host integrations: the providers that mirror links and report status.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::share::ShareStatus;

pub mod http;
pub mod memory;

pub use http::HttpHost;
pub use memory::MemoryHost;

/// Errors reported by a host integration.
#[derive(Error, Debug)]
pub enum HostError {
    #[error("request to host '{host}' failed: {source}")]
    Request {
        host: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("host '{host}' rejected the request ({status}): {body}")]
    Rejected {
        host: String,
        status: u16,
        body: String,
    },

    #[error("host '{host}' returned no mirror for '{link}'")]
    LinkNotFound { host: String, link: String },

    #[error("host '{host}' failed: {message}")]
    Other { host: String, message: String },
}

/// A hosting provider that mirrors external links.
#[async_trait]
pub trait Host: Send + Sync {
    /// Name the host is registered and stored under.
    fn name(&self) -> &str;

    /// Makes sure a mirror of `original_link` exists for `user_id` and
    /// returns its current status.
    ///
    /// Must be idempotent: asking again for the same user and link
    /// reports the existing mirror instead of creating another one.
    async fn ensure_mirror(
        &self,
        user_id: &str,
        original_link: &str,
        requested_by: &str,
    ) -> Result<ShareStatus, HostError>;
}

/// Host integrations by name.
#[derive(Clone, Default)]
pub struct HostRegistry {
    hosts: HashMap<String, Arc<dyn Host>>,
}

impl HostRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `host` under its own name, replacing any previous one.
    pub fn register(&mut self, host: Arc<dyn Host>) {
        let name = host.name().to_string();
        if self.hosts.insert(name.clone(), host).is_some() {
            log::warn!("Host '{}' registered twice; keeping the latest", name);
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Host>> {
        self.hosts.get(name).cloned()
    }

    /// Registered host names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.hosts.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}
