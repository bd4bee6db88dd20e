// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Loxone MCP Bridge Contributors

//! HTTP command client (C2): issues authenticated GET requests to
//! `jdev/...` command paths and parses `LL`-wrapped JSON responses.

use std::sync::atomic::{AtomicBool, Ordering};

use reqwest::Client;
use serde::Deserialize;

use crate::error::LoxoneError;
use crate::token::TokenManager;

#[derive(Debug, Deserialize)]
struct LLEnvelope {
    #[serde(rename = "LL")]
    ll: LLBody,
}

#[derive(Debug, Deserialize)]
struct LLBody {
    #[serde(default)]
    code: serde_json::Value,
    #[serde(default)]
    value: serde_json::Value,
}

impl LLBody {
    fn code_str(&self) -> String {
        match &self.code {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Number(n) => n.to_string(),
            _ => String::new(),
        }
    }
}

/// Thin HTTP client for one Miniserver. Holds only transport state; the
/// token lives in [`TokenManager`].
pub struct LoxoneHttpClient {
    base_url: String,
    client: Client,
    broken: AtomicBool,
}

impl LoxoneHttpClient {
    pub fn new(host: &str, port: u16) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self { base_url: format!("http://{host}:{port}"), client, broken: AtomicBool::new(false) }
    }

    pub fn is_broken(&self) -> bool {
        self.broken.load(Ordering::Relaxed)
    }

    fn url(&self, path: &str) -> String {
        if let Some(stripped) = path.strip_prefix('/') {
            format!("{}/{}", self.base_url, stripped)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    /// Issue a plain unauthenticated GET against an absolute path and parse
    /// the `LL` envelope. Used by the token handshake (C3), which has no
    /// token yet to attach.
    pub async fn raw_get(&self, path: &str) -> Result<serde_json::Value, LoxoneError> {
        let url = self.url(path);
        let resp = self.client.get(&url).send().await.map_err(|e| {
            self.broken.store(true, Ordering::Relaxed);
            LoxoneError::Transport(e.to_string())
        })?;

        if resp.status().is_server_error() {
            self.broken.store(true, Ordering::Relaxed);
            return Err(LoxoneError::Transport(format!("server error: {}", resp.status())));
        }

        let text = resp.text().await.map_err(|e| LoxoneError::Transport(e.to_string()))?;
        let envelope: LLEnvelope =
            serde_json::from_str(&text).map_err(|e| LoxoneError::Decode(e.to_string()))?;

        match envelope.ll.code_str().as_str() {
            "200" => {
                self.broken.store(false, Ordering::Relaxed);
                Ok(envelope.ll.value)
            }
            "401" => Err(LoxoneError::Unauthorized),
            other => Err(LoxoneError::Decode(format!("unexpected LL.code: {other}"))),
        }
    }

    /// Reachability probe required before any other request after (re)connect
    /// (spec §4.2): `GET /jdev/cfg/apiKey`.
    pub async fn reachability_probe(&self) -> Result<serde_json::Value, LoxoneError> {
        self.raw_get("jdev/cfg/apiKey").await
    }

    /// Issue an authenticated command, retrying once through the token
    /// manager on a 401 (spec §4.2, §7).
    pub async fn send(
        &self,
        token: &TokenManager,
        path: &str,
        requires_auth: bool,
    ) -> Result<serde_json::Value, LoxoneError> {
        let full_path = self.build_path(token, path, requires_auth).await?;

        match self.raw_get(&full_path).await {
            Ok(value) => Ok(value),
            Err(LoxoneError::Unauthorized) => {
                token.reauth().await?;
                let retried_path = self.build_path(token, path, requires_auth).await?;
                self.raw_get(&retried_path).await
            }
            Err(e) => Err(e),
        }
    }

    async fn build_path(
        &self,
        token: &TokenManager,
        path: &str,
        requires_auth: bool,
    ) -> Result<String, LoxoneError> {
        let authenticated = if requires_auth {
            let jwt = token.current_token().await.unwrap_or_default();
            let user = urlencode(&token.user);
            let sep = if path.contains('?') { '&' } else { '?' };
            format!("{path}{sep}autht={jwt}&user={user}")
        } else {
            path.to_owned()
        };

        match token.encryptor().await {
            Some(encryptor) => match encryptor.encrypt(&authenticated) {
                Ok(wrapped) => Ok(wrapped),
                Err(e) => {
                    tracing::warn!(err = %e, "command encryption failed, falling back to plaintext");
                    Ok(authenticated)
                }
            },
            None => Ok(authenticated),
        }
    }
}

/// Minimal percent-encoding sufficient for Loxone path segments (user names,
/// base64 ciphertext). Matches the character set the Miniserver's own HTTP
/// parser tolerates: alphanumerics and `-_.~` pass through unescaped.
pub fn urlencode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}
