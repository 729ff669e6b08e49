use crate::client::Aria2Error::*;
use crate::entities::{
    Download, DownloadKey, DownloadOptions, GlobalStat, RpcCall, RpcFault, RpcRequest,
    RpcResponse, Version,
};
use crate::utils::{default_port, rpc_url};
use anyhow::{Context, Result};
use log::debug;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::env;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;

/// Request timeout used when the builder is not given one
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// URI schemes aria2 can download from via `aria2.addUri`
const SUPPORTED_SCHEMES: [&str; 5] = ["http://", "https://", "ftp://", "sftp://", "magnet:"];

/// Custom error types for the [`Aria2`] client
#[derive(Error, Debug)]
pub enum Aria2Error {
    #[error("aria2 RPC error: code={code}, message={message}")]
    Rpc { code: i64, message: String },

    #[error("Network request error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("HTTP request failed with status: {0}")]
    Http(u16),

    #[error("Environment variable error: {0}")]
    Environment(#[from] env::VarError),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid input parameter: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Request timed out after {0} ms")]
    Timeout(u64),
}

impl From<RpcFault> for Aria2Error {
    fn from(fault: RpcFault) -> Self {
        Rpc {
            code: fault.code,
            message: fault.message,
        }
    }
}

/// aria2 JSON-RPC client speaking HTTP POST to `/jsonrpc`
pub struct Aria2 {
    url: String,
    secret: Option<String>,
    client: Client,
    next_id: AtomicU64,
}

impl Aria2 {
    /// Creates a new `Aria2` client for the given RPC url, secret and timeout
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The url is empty
    /// - The url doesn't start with "http://" or "https://"
    #[allow(clippy::needless_pass_by_value)]
    pub fn new(url: String, secret: Option<String>, timeout_ms: u64) -> Result<Self> {
        if url.is_empty() {
            return Err(Configuration("RPC url cannot be empty".into()).into());
        }

        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(Configuration(format!(
                "RPC url must start with http:// or https://, got: {url}"
            ))
            .into());
        }

        let url = url.trim_end_matches('/').to_string();
        let secret = secret.filter(|secret| !secret.is_empty());

        Ok(Self {
            url,
            secret,
            client: Self::create_client(timeout_ms),
            next_id: AtomicU64::new(1),
        })
    }

    /// Creates a configured HTTP client
    fn create_client(timeout: u64) -> Client {
        Client::builder()
            .timeout(Duration::from_millis(timeout))
            .build()
            .unwrap_or_default()
    }

    /// Creates a new `Aria2` client with a builder pattern
    #[must_use]
    pub fn builder() -> Aria2Builder {
        Aria2Builder::default()
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Gets overall download/upload speed and download counts
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response cannot be parsed
    pub async fn get_global_stat(&self) -> Result<GlobalStat> {
        self.execute(&RpcCall::get_global_stat())
            .await
            .context("Failed to get global stat")
    }

    /// Gets the daemon's global options. Also used as a connection check.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Network request fails
    /// - The secret is rejected
    /// - Response cannot be parsed
    pub async fn get_global_option(&self) -> Result<HashMap<String, String>> {
        self.execute(&RpcCall::get_global_option())
            .await
            .context("Failed to get global options")
    }

    /// Gets the aria2 version and enabled features
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response cannot be parsed
    pub async fn get_version(&self) -> Result<Version> {
        self.execute(&RpcCall::get_version())
            .await
            .context("Failed to get version")
    }

    /// Adds a new download. All URIs must point to the same resource.
    /// Returns the GID of the new download.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - No URI is given, or a URI is empty
    /// - A URI doesn't start with http://, https://, ftp://, sftp:// or magnet:
    /// - Network request fails
    /// - API returns an error response
    pub async fn add_uri(&self, uris: &[String], options: &DownloadOptions) -> Result<String> {
        if uris.is_empty() {
            return Err(InvalidInput("URIs cannot be empty".into()).into());
        }

        for uri in uris {
            if uri.is_empty() {
                return Err(InvalidInput("URI cannot be empty".into()).into());
            }

            if !SUPPORTED_SCHEMES.iter().any(|scheme| uri.starts_with(scheme)) {
                return Err(InvalidInput(format!(
                    "URI must start with one of {}, got: {uri}",
                    SUPPORTED_SCHEMES.join(", ")
                ))
                .into());
            }
        }

        debug!("Adding download. URIs: {uris:?}, options: {options:?}");

        let gid: String = self
            .execute(&RpcCall::add_uri(uris, options))
            .await
            .context("Failed to add download")?;

        debug!("Successfully added download {gid}");
        Ok(gid)
    }

    /// Lists active downloads
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response cannot be parsed
    pub async fn tell_active(&self, keys: &[DownloadKey]) -> Result<Vec<Download>> {
        self.execute(&RpcCall::tell_active(keys))
            .await
            .context("Failed to list active downloads")
    }

    /// Lists waiting downloads, including paused ones
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response cannot be parsed
    pub async fn tell_waiting(
        &self,
        offset: i64,
        num: u32,
        keys: &[DownloadKey],
    ) -> Result<Vec<Download>> {
        self.execute(&RpcCall::tell_waiting(offset, num, keys))
            .await
            .context("Failed to list waiting downloads")
    }

    /// Lists stopped downloads
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response cannot be parsed
    pub async fn tell_stopped(
        &self,
        offset: i64,
        num: u32,
        keys: &[DownloadKey],
    ) -> Result<Vec<Download>> {
        self.execute(&RpcCall::tell_stopped(offset, num, keys))
            .await
            .context("Failed to list stopped downloads")
    }

    /// Gets one download
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The GID is empty
    /// - Network request fails
    /// - API returns an error response (e.g. unknown GID)
    pub async fn tell_status(&self, gid: &str, keys: &[DownloadKey]) -> Result<Download> {
        Self::check_gid(gid)?;
        self.execute(&RpcCall::tell_status(gid, keys))
            .await
            .context("Failed to get download status")
    }

    /// Pauses a download
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The GID is empty
    /// - Network request fails
    /// - API returns an error response (e.g. download already stopped)
    pub async fn pause(&self, gid: &str) -> Result<String> {
        Self::check_gid(gid)?;
        self.execute(&RpcCall::pause(gid))
            .await
            .context("Failed to pause download")
    }

    /// Resumes a paused download
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The GID is empty
    /// - Network request fails
    /// - API returns an error response (e.g. download is not paused)
    pub async fn unpause(&self, gid: &str) -> Result<String> {
        Self::check_gid(gid)?;
        self.execute(&RpcCall::unpause(gid))
            .await
            .context("Failed to resume download")
    }

    /// Removes a download. Active downloads are stopped first.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The GID is empty
    /// - Network request fails
    /// - API returns an error response
    pub async fn remove(&self, gid: &str) -> Result<String> {
        Self::check_gid(gid)?;
        self.execute(&RpcCall::remove(gid))
            .await
            .context("Failed to remove download")
    }

    /// Runs several calls in a single round trip.
    ///
    /// The outer result fails only when the multicall itself fails; each
    /// entry carries the outcome of its own call.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response cannot be parsed
    pub async fn multicall(&self, calls: &[RpcCall]) -> Result<Vec<Result<Value, RpcFault>>> {
        let request =
            RpcCall::multicall(calls, self.secret.as_deref()).to_request(&self.next_id(), None);

        let entries: Vec<Value> = self
            .post(&request)
            .await
            .context("Failed to run multicall")?;

        if entries.len() != calls.len() {
            return Err(InvalidResponse(format!(
                "multicall returned {} results for {} calls",
                entries.len(),
                calls.len()
            ))
            .into());
        }

        entries.into_iter().map(Self::multicall_entry).collect()
    }

    /// Executes a single call and deserializes its `result`
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Network request fails
    /// - API returns an error response
    /// - Response cannot be parsed into `R`
    pub async fn execute<R>(&self, call: &RpcCall) -> Result<R>
    where
        R: DeserializeOwned,
    {
        let request = call.to_request(&self.next_id(), self.secret.as_deref());
        self.post(&request).await
    }

    fn next_id(&self) -> String {
        self.next_id.fetch_add(1, Ordering::Relaxed).to_string()
    }

    fn check_gid(gid: &str) -> Result<()> {
        if gid.is_empty() {
            return Err(InvalidInput("GID cannot be empty".into()).into());
        }
        Ok(())
    }

    // aria2 wraps each successful multicall result in a one element array
    fn multicall_entry(entry: Value) -> Result<Result<Value, RpcFault>> {
        match entry {
            Value::Array(mut values) if values.len() == 1 => Ok(Ok(values.remove(0))),
            Value::Object(_) => {
                let fault = serde_json::from_value::<RpcFault>(entry)
                    .context("Failed to parse multicall fault")?;
                Ok(Err(fault))
            }
            other => Err(InvalidResponse(format!("Unexpected multicall entry: {other}")).into()),
        }
    }

    /// Posts a JSON-RPC request and unwraps the response envelope
    async fn post<R>(&self, request: &RpcRequest) -> Result<R>
    where
        R: DeserializeOwned,
    {
        debug!(
            "Making RPC request {} (id {}) to: {}",
            request.method, request.id, self.url
        );

        let response = self
            .client
            .post(&self.url)
            .json(request)
            .send()
            .await
            .map_err(Network)
            .context("Failed to make RPC request")?;

        let status = response.status();
        debug!("RPC request status: {status}");

        let body = response
            .text()
            .await
            .context("Failed to read RPC response")?;

        // aria2 reports faults with a 400 status and a regular JSON-RPC body
        let envelope = match serde_json::from_str::<RpcResponse<R>>(&body) {
            Ok(envelope) => envelope,
            Err(_) if !status.is_success() => return Err(Http(status.as_u16()).into()),
            Err(error) => {
                return Err(InvalidResponse(format!(
                    "Failed to parse RPC response to {}: {error}",
                    request.method
                ))
                .into());
            }
        };

        if let Some(fault) = envelope.error {
            return Err(Aria2Error::from(fault).into());
        }

        envelope
            .result
            .ok_or_else(|| InvalidResponse("No result received".into()).into())
    }
}

/// Builder for [`Aria2`] client
#[derive(Default)]
pub struct Aria2Builder {
    host: Option<String>,
    port: Option<u16>,
    secret: Option<String>,
    secure: bool,
    timeout: Option<u64>,
}

impl Aria2Builder {
    /// Sets the host, with or without an `http://`/`https://` scheme
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Sets the RPC port
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Sets the RPC secret (`--rpc-secret`)
    #[must_use]
    pub fn secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    /// Uses https when the host has no scheme
    #[must_use]
    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Sets the request timeout in milliseconds
    #[must_use]
    pub fn timeout(mut self, timeout_millis: u64) -> Self {
        self.timeout = Some(timeout_millis);
        self
    }

    /// Builds the [`Aria2`] client
    ///
    /// # Errors
    ///
    /// Returns an error if the host is not provided or empty
    pub fn build(self) -> Result<Aria2> {
        let host = self
            .host
            .filter(|host| !host.is_empty())
            .ok_or_else(|| Configuration("Host is required".into()))?;
        let port = self.port.unwrap_or_else(|| default_port(&host));
        let timeout = self.timeout.unwrap_or(DEFAULT_TIMEOUT_MS);

        Aria2::new(rpc_url(&host, port, self.secure), self.secret, timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_validates_url() {
        assert!(Aria2::new(String::new(), None, 1000).is_err());
        assert!(Aria2::new("nas.local:6800/jsonrpc".into(), None, 1000).is_err());

        let client = Aria2::new("http://nas.local:6800/jsonrpc/".into(), None, 1000).unwrap();
        assert_eq!("http://nas.local:6800/jsonrpc", client.url());
    }

    #[test]
    fn test_builder() {
        let client = Aria2::builder().host("nas.local").build().unwrap();
        assert_eq!("http://nas.local:6800/jsonrpc", client.url());

        let client = Aria2::builder()
            .host("https://nas.local")
            .secret("")
            .build()
            .unwrap();
        assert_eq!("https://nas.local:443/jsonrpc", client.url());
        assert!(client.secret.is_none());

        assert!(Aria2::builder().build().is_err());
        assert!(Aria2::builder().host("").build().is_err());
    }

    #[test]
    fn test_request_ids_are_unique() {
        let client = Aria2::builder().host("nas.local").build().unwrap();
        assert_ne!(client.next_id(), client.next_id());
    }

    #[test]
    fn test_multicall_entry() {
        let value = Aria2::multicall_entry(json!(["2089b05ecca3d829"])).unwrap();
        assert_eq!(value, Ok(json!("2089b05ecca3d829")));

        let fault = Aria2::multicall_entry(json!({"code": 1, "message": "GID 1 is not found"}))
            .unwrap();
        assert_eq!(
            fault,
            Err(RpcFault {
                code: 1,
                message: "GID 1 is not found".into()
            })
        );

        assert!(Aria2::multicall_entry(json!("bare")).is_err());
    }
}
