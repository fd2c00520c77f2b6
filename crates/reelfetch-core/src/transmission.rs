//! Transmission JSON-RPC client
//!
//! Covers the four calls the pipeline uses (`torrent-add`, `torrent-get`,
//! `torrent-remove`, `session-get`) including the session-id handshake:
//! the daemon answers 409 with an `X-Transmission-Session-Id` header that
//! must be echoed on every later request.

use crate::config::DaemonConfig;
use crate::error::RpcError;
use crate::gateway::TorrentDaemon;
use crate::types::TorrentHandle;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::Path;
use tokio::sync::Mutex;

const SESSION_HEADER: &str = "X-Transmission-Session-Id";

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    method: &'a str,
    arguments: Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: String,
    arguments: Option<T>,
}

#[derive(Debug, Deserialize)]
struct AddedTorrent {
    id: i64,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct TorrentAddArguments {
    #[serde(rename = "torrent-added")]
    added: Option<AddedTorrent>,
    #[serde(rename = "torrent-duplicate")]
    duplicate: Option<AddedTorrent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TorrentFields {
    id: i64,
    #[serde(default)]
    name: String,
    #[serde(default)]
    percent_done: f64,
}

#[derive(Debug, Deserialize)]
struct TorrentGetArguments {
    torrents: Vec<TorrentFields>,
}

#[derive(Debug, Deserialize)]
struct SessionArguments {
    #[serde(default)]
    version: Option<String>,
}

/// Client for a Transmission daemon's RPC endpoint
pub struct TransmissionClient {
    http: reqwest::Client,
    url: String,
    username: String,
    password: String,
    session_id: Mutex<Option<String>>,
}

impl TransmissionClient {
    pub fn new(config: &DaemonConfig) -> Result<Self, RpcError> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            http,
            url: config.rpc_url(),
            username: config.username.clone(),
            password: config.password.clone(),
            session_id: Mutex::new(None),
        })
    }

    /// Create a client and check the daemon answers
    pub async fn connect(config: &DaemonConfig) -> Result<Self, RpcError> {
        let client = Self::new(config)?;
        let version = client.session_version().await?;
        log::info!(
            "Connected to Transmission {} at {}",
            version.as_deref().unwrap_or("(unknown version)"),
            client.url
        );
        Ok(client)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn session_version(&self) -> Result<Option<String>, RpcError> {
        let args: SessionArguments = self
            .call("session-get", json!({ "fields": ["version"] }))
            .await?;
        Ok(args.version)
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, arguments: Value) -> Result<T, RpcError> {
        let body = RpcRequest { method, arguments };

        // Second attempt only happens after picking up a fresh session id
        for _ in 0..2 {
            let mut request = self
                .http
                .post(&self.url)
                .basic_auth(&self.username, Some(&self.password))
                .json(&body);
            if let Some(id) = self.session_id.lock().await.clone() {
                request = request.header(SESSION_HEADER, id);
            }

            let response = request.send().await?;
            match response.status() {
                StatusCode::CONFLICT => {
                    let id = response
                        .headers()
                        .get(SESSION_HEADER)
                        .and_then(|v| v.to_str().ok())
                        .ok_or(RpcError::MissingSessionId)?;
                    log::debug!("Transmission session id refreshed");
                    *self.session_id.lock().await = Some(id.to_string());
                    continue;
                }
                StatusCode::UNAUTHORIZED => return Err(RpcError::Unauthorized),
                status if !status.is_success() => return Err(RpcError::Status(status.as_u16())),
                _ => {}
            }

            let reply: RpcResponse<T> = response.json().await?;
            if reply.result != "success" {
                return Err(RpcError::Rpc(reply.result));
            }
            return reply.arguments.ok_or_else(|| {
                RpcError::UnexpectedResponse(format!("{} returned no arguments", method))
            });
        }

        Err(RpcError::UnexpectedResponse(format!(
            "session handshake failed: {} still answered 409 after refreshing the session id",
            method
        )))
    }

    async fn torrent_add(&self, filename: &str, download_dir: &Path) -> Result<TorrentHandle, RpcError> {
        let args: TorrentAddArguments = self
            .call(
                "torrent-add",
                json!({
                    "filename": filename,
                    "download-dir": download_dir.to_string_lossy(),
                }),
            )
            .await?;

        let torrent = match (args.added, args.duplicate) {
            (Some(torrent), _) => torrent,
            (None, Some(torrent)) => {
                log::info!("Torrent already present in daemon: {}", torrent.name);
                torrent
            }
            (None, None) => {
                return Err(RpcError::UnexpectedResponse(
                    "torrent-add returned neither torrent-added nor torrent-duplicate".into(),
                ))
            }
        };

        Ok(TorrentHandle {
            id: torrent.id,
            name: torrent.name,
            progress: 0.0,
        })
    }
}

#[async_trait]
impl TorrentDaemon for TransmissionClient {
    async fn add_magnet(&self, uri: &str, download_dir: &Path) -> Result<TorrentHandle, RpcError> {
        self.torrent_add(uri, download_dir).await
    }

    async fn add_file(&self, path: &Path, download_dir: &Path) -> Result<TorrentHandle, RpcError> {
        self.torrent_add(&path.to_string_lossy(), download_dir).await
    }

    async fn status(&self, id: i64) -> Result<Option<TorrentHandle>, RpcError> {
        let args: TorrentGetArguments = self
            .call(
                "torrent-get",
                json!({ "ids": [id], "fields": ["id", "name", "percentDone"] }),
            )
            .await?;

        Ok(args
            .torrents
            .into_iter()
            .find(|t| t.id == id)
            .map(|t| TorrentHandle {
                id: t.id,
                name: t.name,
                progress: t.percent_done * 100.0,
            }))
    }

    async fn remove(&self, id: i64, delete_data: bool) -> Result<(), RpcError> {
        let _: IgnoredAny = self
            .call(
                "torrent-remove",
                json!({ "ids": [id], "delete-local-data": delete_data }),
            )
            .await?;
        Ok(())
    }
}
