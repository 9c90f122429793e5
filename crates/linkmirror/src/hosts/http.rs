//! JSON-over-HTTP host integration.
//!
//! `POST {base_url}/mirrors` with `{"user_id", "links", "requested_by"}`;
//! the host answers `{"mirrors": {"<link>": <ShareStatus>}}`.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{Host, HostError};
use crate::config::HostEndpoint;
use crate::share::ShareStatus;

#[derive(Debug, Serialize)]
struct MirrorRequest<'a> {
    user_id: &'a str,
    links: [&'a str; 1],
    requested_by: &'a str,
}

#[derive(Debug, Deserialize)]
struct MirrorResponse {
    #[serde(default)]
    mirrors: HashMap<String, ShareStatus>,
}

pub struct HttpHost {
    name: String,
    endpoint: String,
    client: reqwest::Client,
}

impl HttpHost {
    pub fn new(name: impl Into<String>, base_url: &str, timeout: Duration) -> Result<Self, HostError> {
        let name = name.into();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| HostError::Request {
                host: name.clone(),
                source,
            })?;
        Ok(Self {
            endpoint: mirrors_url(base_url),
            name,
            client,
        })
    }

    pub fn from_endpoint(endpoint: &HostEndpoint) -> Result<Self, HostError> {
        Self::new(
            endpoint.name.clone(),
            &endpoint.base_url,
            Duration::from_secs(endpoint.timeout_secs),
        )
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn request_error(&self, source: reqwest::Error) -> HostError {
        HostError::Request {
            host: self.name.clone(),
            source,
        }
    }
}

fn mirrors_url(base_url: &str) -> String {
    format!("{}/mirrors", base_url.trim_end_matches('/'))
}

fn pick_mirror(
    host: &str,
    mut response: MirrorResponse,
    original_link: &str,
) -> Result<ShareStatus, HostError> {
    response
        .mirrors
        .remove(original_link)
        .ok_or_else(|| HostError::LinkNotFound {
            host: host.to_string(),
            link: original_link.to_string(),
        })
}

#[async_trait]
impl Host for HttpHost {
    fn name(&self) -> &str {
        &self.name
    }

    async fn ensure_mirror(
        &self,
        user_id: &str,
        original_link: &str,
        requested_by: &str,
    ) -> Result<ShareStatus, HostError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&MirrorRequest {
                user_id,
                links: [original_link],
                requested_by,
            })
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(HostError::Rejected {
                host: self.name.clone(),
                status: status.as_u16(),
                body,
            });
        }

        let body: MirrorResponse = response.json().await.map_err(|e| self.request_error(e))?;
        pick_mirror(&self.name, body, original_link)
    }
}
