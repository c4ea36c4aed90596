//! # HTTP Remote Backend
//!
//! The central server exposes one endpoint per logical store. The wire
//! contract, per store URL `<base>/<name>`:
//!
//! - `HEAD <url>`: existence probe, 404 means provision, 2xx means
//!   proceed, anything else is fatal for that store
//! - `PUT <url>`: provision the remote counterpart
//! - `GET <url>`: metadata read (health verification and heartbeat)
//! - `GET <url>/_changes?since=N&limit=M`: commit-ordered changes page
//! - `POST <url>/_bulk_docs`: apply a batch of documents
//!
//! Every request carries `Authorization: Basic base64(user:pass)`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use reqwest::header::AUTHORIZATION;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::errors::{RemoteError, RemoteResult};
use super::{RemoteBackend, RemoteChanges, RemoteInfo, RemoteStore};
use crate::store::Document;

/// Credential pair for the remote server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteCredentials {
    /// Basic auth user
    pub username: String,
    /// Basic auth password
    pub password: String,
}

impl RemoteCredentials {
    /// `Basic base64(user:pass)` header value.
    pub fn basic_auth_header(&self) -> String {
        let raw = format!("{}:{}", self.username, self.password);
        format!("Basic {}", STANDARD.encode(raw))
    }
}

/// Request body for `POST <url>/_bulk_docs`.
#[derive(Debug, Serialize)]
struct BulkDocsRequest<'a> {
    docs: &'a [Document],
}

/// Remote backend speaking the HTTP wire contract.
pub struct HttpRemoteBackend {
    http: reqwest::Client,
    credentials: RemoteCredentials,
}

impl HttpRemoteBackend {
    /// Build a backend with the given credential pair and network timeout.
    pub fn new(credentials: RemoteCredentials, timeout: Duration) -> RemoteResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RemoteError::Transport(e.to_string()))?;
        Ok(Self { http, credentials })
    }
}

#[async_trait]
impl RemoteBackend for HttpRemoteBackend {
    /// Probe for the remote store and provision it if absent.
    ///
    /// A non-404 failure on the probe is not retried here; once replication
    /// is underway the session supervisor owns retries.
    async fn ensure(&self, url: &str) -> RemoteResult<()> {
        let auth = self.credentials.basic_auth_header();
        // A probe that gets no response at all (refused, DNS, timeout) is
        // the same unreachable class as a bad status.
        let probe = self
            .http
            .head(url)
            .header(AUTHORIZATION, &auth)
            .send()
            .await
            .map_err(|e| RemoteError::Unreachable {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let status = probe.status();
        if status.is_success() {
            debug!(url, "remote store exists");
            return Ok(());
        }
        if status != StatusCode::NOT_FOUND {
            return Err(RemoteError::Unreachable {
                url: url.to_string(),
                reason: format!("answered {status}"),
            });
        }

        let created = self
            .http
            .put(url)
            .header(AUTHORIZATION, &auth)
            .send()
            .await?;
        let status = created.status();
        if !status.is_success() {
            let body = created.text().await.unwrap_or_default();
            return Err(RemoteError::Provision {
                url: url.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        info!(url, "remote store provisioned");
        Ok(())
    }

    fn open(&self, url: &str) -> Arc<dyn RemoteStore> {
        Arc::new(HttpRemoteStore {
            http: self.http.clone(),
            url: url.to_string(),
            auth: self.credentials.basic_auth_header(),
        })
    }
}

/// One remote store endpoint.
pub struct HttpRemoteStore {
    http: reqwest::Client,
    url: String,
    auth: String,
}

impl HttpRemoteStore {
    fn status_err(&self, context: &str, status: StatusCode) -> RemoteError {
        RemoteError::Transport(format!("{context} on {} answered {status}", self.url))
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn info(&self) -> RemoteResult<RemoteInfo> {
        let resp = self
            .http
            .get(&self.url)
            .header(AUTHORIZATION, &self.auth)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(self.status_err("metadata read", resp.status()));
        }
        resp.json()
            .await
            .map_err(|e| RemoteError::InvalidResponse(e.to_string()))
    }

    async fn changes_since(&self, since: u64, limit: usize) -> RemoteResult<RemoteChanges> {
        let url = format!("{}/_changes?since={since}&limit={limit}", self.url);
        let resp = self
            .http
            .get(&url)
            .header(AUTHORIZATION, &self.auth)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(self.status_err("changes read", resp.status()));
        }
        resp.json()
            .await
            .map_err(|e| RemoteError::InvalidResponse(e.to_string()))
    }

    async fn push(&self, docs: &[Document]) -> RemoteResult<usize> {
        let url = format!("{}/_bulk_docs", self.url);
        let resp = self
            .http
            .post(&url)
            .header(AUTHORIZATION, &self.auth)
            .json(&BulkDocsRequest { docs })
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(self.status_err("bulk write", resp.status()));
        }
        Ok(docs.len())
    }
}
