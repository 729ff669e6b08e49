use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Value, json};
use std::fmt;
use std::path::Path;

/// JSON-RPC 2.0 request envelope sent to aria2
#[derive(Serialize, Debug)]
pub struct RpcRequest {
    pub jsonrpc: &'static str,
    pub id: String,
    pub method: String,
    pub params: Vec<Value>,
}

/// Response envelope from aria2
#[derive(Deserialize, Debug)]
pub struct RpcResponse<D> {
    #[serde(default)]
    pub id: Option<Value>,
    pub result: Option<D>,
    pub error: Option<RpcFault>,
}

/// Error object returned by aria2, both for plain calls and multicall entries
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RpcFault {
    pub code: i64,
    pub message: String,
}

/// A single aria2 method call, without the secret token
#[derive(Debug, Clone, PartialEq)]
pub struct RpcCall {
    pub method: String,
    pub params: Vec<Value>,
}

impl RpcCall {
    pub fn new(method: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            method: method.into(),
            params,
        }
    }

    #[must_use]
    pub fn get_global_stat() -> Self {
        Self::new("aria2.getGlobalStat", Vec::new())
    }

    #[must_use]
    pub fn get_global_option() -> Self {
        Self::new("aria2.getGlobalOption", Vec::new())
    }

    #[must_use]
    pub fn get_version() -> Self {
        Self::new("aria2.getVersion", Vec::new())
    }

    #[must_use]
    pub fn add_uri(uris: &[String], options: &DownloadOptions) -> Self {
        let mut params = vec![json!(uris)];
        if !options.is_empty() {
            params.push(json!(options));
        }
        Self::new("aria2.addUri", params)
    }

    #[must_use]
    pub fn tell_active(keys: &[DownloadKey]) -> Self {
        Self::new("aria2.tellActive", vec![keys_param(keys)])
    }

    #[must_use]
    pub fn tell_waiting(offset: i64, num: u32, keys: &[DownloadKey]) -> Self {
        Self::new(
            "aria2.tellWaiting",
            vec![json!(offset), json!(num), keys_param(keys)],
        )
    }

    #[must_use]
    pub fn tell_stopped(offset: i64, num: u32, keys: &[DownloadKey]) -> Self {
        Self::new(
            "aria2.tellStopped",
            vec![json!(offset), json!(num), keys_param(keys)],
        )
    }

    #[must_use]
    pub fn tell_status(gid: &str, keys: &[DownloadKey]) -> Self {
        Self::new("aria2.tellStatus", vec![json!(gid), keys_param(keys)])
    }

    #[must_use]
    pub fn pause(gid: &str) -> Self {
        Self::new("aria2.pause", vec![json!(gid)])
    }

    #[must_use]
    pub fn unpause(gid: &str) -> Self {
        Self::new("aria2.unpause", vec![json!(gid)])
    }

    #[must_use]
    pub fn remove(gid: &str) -> Self {
        Self::new("aria2.remove", vec![json!(gid)])
    }

    /// Bundles several calls into one `system.multicall`.
    ///
    /// aria2 does not accept a token on the multicall itself, every bundled
    /// call carries its own, so the returned call must be sent without a secret.
    #[must_use]
    pub fn multicall(calls: &[RpcCall], secret: Option<&str>) -> Self {
        let entries = calls
            .iter()
            .map(|call| {
                json!({
                    "methodName": call.method,
                    "params": call.params_with_token(secret),
                })
            })
            .collect::<Vec<_>>();
        Self::new("system.multicall", vec![Value::Array(entries)])
    }

    /// Builds the request envelope, prepending `token:<secret>` when a secret is set
    #[must_use]
    pub fn to_request(&self, id: &str, secret: Option<&str>) -> RpcRequest {
        RpcRequest {
            jsonrpc: "2.0",
            id: id.to_string(),
            method: self.method.clone(),
            params: self.params_with_token(secret),
        }
    }

    fn params_with_token(&self, secret: Option<&str>) -> Vec<Value> {
        let mut params = Vec::with_capacity(self.params.len() + 1);
        if let Some(secret) = secret.filter(|secret| !secret.is_empty()) {
            params.push(Value::String(format!("token:{secret}")));
        }
        params.extend(self.params.iter().cloned());
        params
    }
}

fn keys_param(keys: &[DownloadKey]) -> Value {
    json!(keys.iter().map(DownloadKey::as_str).collect::<Vec<_>>())
}

/// Global transfer statistics as returned by `aria2.getGlobalStat`
#[derive(Deserialize, Serialize, Default, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GlobalStat {
    /// Overall download speed in bytes/sec
    #[serde(default, deserialize_with = "u64_from_string")]
    pub download_speed: u64,
    /// Overall upload speed in bytes/sec
    #[serde(default, deserialize_with = "u64_from_string")]
    pub upload_speed: u64,
    #[serde(default, deserialize_with = "u64_from_string")]
    pub num_active: u64,
    #[serde(default, deserialize_with = "u64_from_string")]
    pub num_waiting: u64,
    /// Stopped downloads in the current session, capped by `--max-download-result`
    #[serde(default, deserialize_with = "u64_from_string")]
    pub num_stopped: u64,
    /// Stopped downloads in the current session, not capped
    #[serde(default, deserialize_with = "u64_from_string")]
    pub num_stopped_total: u64,
}

/// Download information as returned by the `aria2.tell*` methods.
///
/// Only `gid` is always present, everything else depends on the requested keys.
#[derive(Deserialize, Default, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Download {
    pub gid: String,
    pub status: Option<DownloadStatus>,
    #[serde(default, deserialize_with = "u64_from_string")]
    pub total_length: u64,
    #[serde(default, deserialize_with = "u64_from_string")]
    pub completed_length: u64,
    #[serde(default, deserialize_with = "u64_from_string")]
    pub upload_length: u64,
    #[serde(default, deserialize_with = "u64_from_string")]
    pub download_speed: u64,
    #[serde(default, deserialize_with = "u64_from_string")]
    pub upload_speed: u64,
    #[serde(default, deserialize_with = "u64_from_string")]
    pub connections: u64,
    #[serde(default, deserialize_with = "u64_from_string")]
    pub num_pieces: u64,
    #[serde(default, deserialize_with = "u64_from_string")]
    pub piece_length: u64,
    pub info_hash: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    /// Directory to save files
    pub dir: Option<String>,
    #[serde(default)]
    pub files: Vec<DownloadFile>,
    pub bittorrent: Option<BitTorrent>,
    /// GIDs generated as the result of this download (e.g. a torrent fetched from a metalink)
    #[serde(default)]
    pub followed_by: Vec<String>,
    pub following: Option<String>,
    pub belongs_to: Option<String>,
}

impl Download {
    /// Human facing name: torrent name, then file name, then first URI, then the GID
    #[must_use]
    pub fn name(&self) -> String {
        if let Some(info) = self.bittorrent.as_ref().and_then(|bt| bt.info.as_ref()) {
            return info.name.clone();
        }

        if let Some(file) = self.files.first() {
            if let Some(file_name) = Path::new(&file.path).file_name() {
                return file_name.to_string_lossy().into_owned();
            }
            if let Some(uri) = file.uris.first() {
                return uri.uri.clone();
            }
        }

        self.gid.clone()
    }
}

/// File of a download
#[derive(Deserialize, Default, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct DownloadFile {
    #[serde(default, deserialize_with = "u64_from_string")]
    pub index: u64,
    #[serde(default)]
    pub path: String,
    #[serde(default, deserialize_with = "u64_from_string")]
    pub length: u64,
    #[serde(default, deserialize_with = "u64_from_string")]
    pub completed_length: u64,
    #[serde(default, deserialize_with = "bool_from_string")]
    pub selected: bool,
    #[serde(default)]
    pub uris: Vec<FileUri>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct FileUri {
    pub uri: String,
    /// `used` or `waiting`
    pub status: String,
}

#[derive(Deserialize, Default, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct BitTorrent {
    #[serde(default)]
    pub announce_list: Vec<Vec<String>>,
    pub comment: Option<String>,
    pub mode: Option<String>,
    pub info: Option<BitTorrentInfo>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct BitTorrentInfo {
    pub name: String,
}

/// Download status enum
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DownloadStatus {
    Active,
    Waiting,
    Paused,
    Error,
    Complete,
    Removed,
}

impl DownloadStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            DownloadStatus::Active => "active",
            DownloadStatus::Waiting => "waiting",
            DownloadStatus::Paused => "paused",
            DownloadStatus::Error => "error",
            DownloadStatus::Complete => "complete",
            DownloadStatus::Removed => "removed",
        }
    }
}

impl fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Keys accepted by the `aria2.tell*` methods to restrict the returned fields
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum DownloadKey {
    Gid,
    Status,
    TotalLength,
    CompletedLength,
    UploadLength,
    Bitfield,
    DownloadSpeed,
    UploadSpeed,
    InfoHash,
    NumSeeders,
    Seeder,
    PieceLength,
    NumPieces,
    Connections,
    ErrorCode,
    ErrorMessage,
    FollowedBy,
    Following,
    BelongsTo,
    Dir,
    Files,
    Bittorrent,
    VerifiedLength,
    VerifyIntegrityPending,
}

impl DownloadKey {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadKey::Gid => "gid",
            DownloadKey::Status => "status",
            DownloadKey::TotalLength => "totalLength",
            DownloadKey::CompletedLength => "completedLength",
            DownloadKey::UploadLength => "uploadLength",
            DownloadKey::Bitfield => "bitfield",
            DownloadKey::DownloadSpeed => "downloadSpeed",
            DownloadKey::UploadSpeed => "uploadSpeed",
            DownloadKey::InfoHash => "infoHash",
            DownloadKey::NumSeeders => "numSeeders",
            DownloadKey::Seeder => "seeder",
            DownloadKey::PieceLength => "pieceLength",
            DownloadKey::NumPieces => "numPieces",
            DownloadKey::Connections => "connections",
            DownloadKey::ErrorCode => "errorCode",
            DownloadKey::ErrorMessage => "errorMessage",
            DownloadKey::FollowedBy => "followedBy",
            DownloadKey::Following => "following",
            DownloadKey::BelongsTo => "belongsTo",
            DownloadKey::Dir => "dir",
            DownloadKey::Files => "files",
            DownloadKey::Bittorrent => "bittorrent",
            DownloadKey::VerifiedLength => "verifiedLength",
            DownloadKey::VerifyIntegrityPending => "verifyIntegrityPending",
        }
    }
}

/// Options passed along with `aria2.addUri`
#[derive(Serialize, Default, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct DownloadOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
    /// Output file name, relative to `dir`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub out: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl DownloadOptions {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dir.is_none() && self.out.is_none() && self.referer.is_none() && self.user_agent.is_none()
    }
}

/// Response of `aria2.getVersion`
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Version {
    pub version: String,
    #[serde(default)]
    pub enabled_features: Vec<String>,
}

// aria2 encodes every integer as a decimal string
fn u64_from_string<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Text(String),
        Number(u64),
    }

    match Repr::deserialize(deserializer)? {
        Repr::Text(text) => text.parse().map_err(serde::de::Error::custom),
        Repr::Number(number) => Ok(number),
    }
}

fn bool_from_string<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Text(String),
        Bool(bool),
    }

    match Repr::deserialize(deserializer)? {
        Repr::Text(text) => text.parse().map_err(serde::de::Error::custom),
        Repr::Bool(value) => Ok(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_with_secret() {
        let request = RpcCall::pause("2089b05ecca3d829").to_request("7", Some("s3cret"));
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({
                "jsonrpc": "2.0",
                "id": "7",
                "method": "aria2.pause",
                "params": ["token:s3cret", "2089b05ecca3d829"],
            })
        );
    }

    #[test]
    fn test_request_without_secret() {
        let request = RpcCall::get_global_stat().to_request("1", Some(""));
        assert!(request.params.is_empty());
        let request = RpcCall::get_global_stat().to_request("1", None);
        assert!(request.params.is_empty());
    }

    #[test]
    fn test_tell_waiting_params() {
        let call = RpcCall::tell_waiting(0, 1000, &[DownloadKey::Gid, DownloadKey::Status]);
        assert_eq!(call.method, "aria2.tellWaiting");
        assert_eq!(call.params, vec![json!(0), json!(1000), json!(["gid", "status"])]);
    }

    #[test]
    fn test_add_uri_options_are_kebab_case() {
        let options = DownloadOptions {
            dir: Some("/downloads".into()),
            user_agent: Some("curl/8".into()),
            ..Default::default()
        };
        let call = RpcCall::add_uri(&["https://example.com/a.iso".to_string()], &options);
        assert_eq!(
            call.params,
            vec![
                json!(["https://example.com/a.iso"]),
                json!({"dir": "/downloads", "user-agent": "curl/8"}),
            ]
        );

        let call = RpcCall::add_uri(&["https://example.com/a.iso".to_string()], &DownloadOptions::default());
        assert_eq!(call.params.len(), 1);
    }

    #[test]
    fn test_multicall_tokens_each_call() {
        let call = RpcCall::multicall(
            &[RpcCall::get_global_stat(), RpcCall::remove("abc")],
            Some("tok"),
        );
        let request = call.to_request("9", None);
        assert_eq!(request.method, "system.multicall");
        assert_eq!(
            request.params,
            vec![json!([
                {"methodName": "aria2.getGlobalStat", "params": ["token:tok"]},
                {"methodName": "aria2.remove", "params": ["token:tok", "abc"]},
            ])]
        );
    }

    #[test]
    fn test_global_stat_from_strings() {
        let stat: GlobalStat = serde_json::from_value(json!({
            "downloadSpeed": "21846",
            "uploadSpeed": "0",
            "numActive": "2",
            "numWaiting": "1",
            "numStopped": "4",
        }))
        .unwrap();
        assert_eq!(stat.download_speed, 21846);
        assert_eq!(stat.num_active, 2);
        assert_eq!(stat.num_waiting, 1);
        assert_eq!(stat.num_stopped, 4);
        assert_eq!(stat.num_stopped_total, 0);
    }

    #[test]
    fn test_global_stat_rejects_garbage() {
        let stat = serde_json::from_value::<GlobalStat>(json!({"downloadSpeed": "fast"}));
        assert!(stat.is_err());
    }

    #[test]
    fn test_download_name() {
        let download: Download = serde_json::from_value(json!({
            "gid": "2089b05ecca3d829",
            "status": "active",
            "files": [{
                "index": "1",
                "path": "/downloads/ubuntu-24.04.iso",
                "length": "100",
                "completedLength": "10",
                "selected": "true",
                "uris": [{"uri": "https://example.com/ubuntu-24.04.iso", "status": "used"}],
            }],
        }))
        .unwrap();
        assert_eq!(download.status, Some(DownloadStatus::Active));
        assert_eq!(download.name(), "ubuntu-24.04.iso");
        assert!(download.files[0].selected);

        // Path not yet known, fall back to the URI
        let download: Download = serde_json::from_value(json!({
            "gid": "d829",
            "files": [{"path": "", "uris": [{"uri": "https://example.com/x", "status": "waiting"}]}],
        }))
        .unwrap();
        assert_eq!(download.name(), "https://example.com/x");

        let download: Download = serde_json::from_value(json!({
            "gid": "b05e",
            "bittorrent": {"info": {"name": "debian"}},
        }))
        .unwrap();
        assert_eq!(download.name(), "debian");

        let download: Download = serde_json::from_value(json!({"gid": "ecca"})).unwrap();
        assert_eq!(download.name(), "ecca");
    }
}
