// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Loxone MCP Bridge Contributors

//! Token manager (C3): runs the hash-salt-hmac handshake, obtains a JWT,
//! tracks expiry in the Miniserver's custom epoch, refreshes proactively,
//! and kills the token on shutdown.

use std::sync::Arc;

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha1::Sha1;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::encrypt::CommandEncryptor;
use crate::epoch::{from_loxone_epoch, now_unix};
use crate::error::LoxoneError;
use crate::http::{urlencode, LoxoneHttpClient};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    Unauthenticated,
    Authenticating,
    Authenticated,
    Refreshing,
    Killed,
}

/// The live session token (spec §3). `valid_until_epoch` and
/// `acquired_at_epoch` are Loxone-epoch seconds, never Unix seconds.
#[derive(Debug, Clone)]
pub struct SessionToken {
    pub jwt: String,
    pub valid_until_epoch: i64,
    pub rights: u32,
    pub session_key: Vec<u8>,
    pub acquired_at_epoch: i64,
}

#[derive(Deserialize)]
struct GetKey2Response {
    key: String,
    salt: String,
    #[serde(rename = "hashAlg")]
    hash_alg: String,
}

#[derive(Deserialize)]
struct GetJwtResponse {
    token: String,
    #[serde(default, rename = "validUntil")]
    valid_until: i64,
    #[serde(default, rename = "tokenRights")]
    token_rights: u32,
    #[serde(default)]
    key: String,
}

#[derive(Deserialize)]
struct RefreshJwtResponse {
    token: String,
    #[serde(default, rename = "validUntil")]
    valid_until: i64,
}

pub struct TokenManager {
    http: Arc<LoxoneHttpClient>,
    pub user: String,
    password: String,
    client_uuid: Uuid,
    client_info: String,
    use_encryption: bool,
    refresh_margin_secs: i64,
    state: RwLock<TokenState>,
    token: RwLock<Option<SessionToken>>,
    encryptor: RwLock<Option<Arc<CommandEncryptor>>>,
}

impl TokenManager {
    pub fn new(
        http: Arc<LoxoneHttpClient>,
        user: String,
        password: String,
        use_encryption: bool,
        refresh_margin_secs: i64,
    ) -> Self {
        Self {
            http,
            user,
            password,
            client_uuid: Uuid::new_v4(),
            client_info: "loxone-mcp-server".to_owned(),
            use_encryption,
            refresh_margin_secs,
            state: RwLock::new(TokenState::Unauthenticated),
            token: RwLock::new(None),
            encryptor: RwLock::new(None),
        }
    }

    pub async fn state(&self) -> TokenState {
        *self.state.read().await
    }

    pub async fn current_token(&self) -> Option<String> {
        self.token.read().await.as_ref().map(|t| t.jwt.clone())
    }

    pub async fn encryptor(&self) -> Option<Arc<CommandEncryptor>> {
        self.encryptor.read().await.clone()
    }

    /// Full connect sequence (spec §4.3 steps 1-6).
    pub async fn connect(&self) -> Result<(), LoxoneError> {
        *self.state.write().await = TokenState::Authenticating;

        self.http.reachability_probe().await?;

        if self.use_encryption {
            self.load_public_key().await;
        }

        self.acquire_token().await?;
        *self.state.write().await = TokenState::Authenticated;
        Ok(())
    }

    /// `GET /jdev/sys/getPublicKey`: parse a PEM X.509 certificate and
    /// extract the RSA public key. On failure, encryption is permanently
    /// disabled for this session (spec §4.3 step 2).
    async fn load_public_key(&self) {
        let result = self.http.raw_get("jdev/sys/getPublicKey").await;
        match result {
            Ok(serde_json::Value::String(pem)) => match CommandEncryptor::from_pem(&pem) {
                Ok(encryptor) => *self.encryptor.write().await = Some(Arc::new(encryptor)),
                Err(e) => {
                    tracing::warn!(err = %e, "failed to parse Miniserver public key, disabling command encryption");
                }
            },
            Ok(_) => tracing::warn!("getPublicKey returned a non-string value, disabling command encryption"),
            Err(e) => tracing::warn!(err = %e, "getPublicKey request failed, disabling command encryption"),
        }
    }

    async fn acquire_token(&self) -> Result<(), LoxoneError> {
        let key2_path = format!("jdev/sys/getkey2/{}", urlencode(&self.user));
        let key2_value = self.http.raw_get(&key2_path).await?;
        let key2: GetKey2Response =
            serde_json::from_value(key2_value).map_err(|e| LoxoneError::Decode(e.to_string()))?;

        let pw_hash = match key2.hash_alg.as_str() {
            "SHA1" => hex_upper(&sha1_digest(format!("{}:{}", self.password, key2.salt).as_bytes())),
            "SHA256" => {
                hex_upper(&sha256_digest(format!("{}:{}", self.password, key2.salt).as_bytes()))
            }
            other => return Err(LoxoneError::ProtocolUnsupported(format!("hashAlg {other}"))),
        };

        let key_bytes = hex_decode(&key2.key).map_err(LoxoneError::Decode)?;
        let hmac_hex = match key2.hash_alg.as_str() {
            "SHA1" => hmac_hex::<Hmac<Sha1>>(&key_bytes, format!("{}:{}", self.user, pw_hash).as_bytes()),
            "SHA256" => {
                hmac_hex::<Hmac<Sha256>>(&key_bytes, format!("{}:{}", self.user, pw_hash).as_bytes())
            }
            other => return Err(LoxoneError::ProtocolUnsupported(format!("hashAlg {other}"))),
        };

        let jwt_path = format!(
            "jdev/sys/getjwt/{}/{}/{}/{}/{}",
            hmac_hex,
            urlencode(&self.user),
            4,
            self.client_uuid,
            urlencode(&self.client_info),
        );
        let jwt_value = self.http.raw_get(&jwt_path).await?;
        let resp: GetJwtResponse =
            serde_json::from_value(jwt_value).map_err(|e| LoxoneError::Decode(e.to_string()))?;

        let session_key = hex_decode(&resp.key).unwrap_or_default();
        *self.token.write().await = Some(SessionToken {
            jwt: resp.token,
            valid_until_epoch: resp.valid_until,
            rights: resp.token_rights,
            session_key,
            acquired_at_epoch: crate::epoch::now_loxone(),
        });
        Ok(())
    }

    /// Ensure the token has at least `refresh_margin_secs` of validity left,
    /// refreshing or fully re-authenticating as needed (spec §4.3 refresh
    /// policy, §8 property 1).
    pub async fn ensure_fresh(&self) -> Result<(), LoxoneError> {
        let needs_refresh = {
            let guard = self.token.read().await;
            match guard.as_ref() {
                Some(t) => from_loxone_epoch(t.valid_until_epoch) - now_unix() < self.refresh_margin_secs,
                None => true,
            }
        };
        if needs_refresh {
            self.refresh().await?;
        }
        Ok(())
    }

    pub async fn refresh(&self) -> Result<(), LoxoneError> {
        *self.state.write().await = TokenState::Refreshing;
        let jwt = self.current_token().await;
        let Some(jwt) = jwt else {
            return self.reauth().await;
        };

        let path = format!("jdev/sys/refreshjwt/{}/{}", jwt, urlencode(&self.user));
        let refreshed = match self.http.raw_get(&path).await {
            Ok(value) => serde_json::from_value::<RefreshJwtResponse>(value).ok(),
            Err(_) => None,
        };
        let Some(refreshed) = refreshed else {
            return self.reauth().await;
        };

        if let Some(t) = self.token.write().await.as_mut() {
            t.jwt = refreshed.token;
            t.valid_until_epoch = refreshed.valid_until;
            t.acquired_at_epoch = crate::epoch::now_loxone();
        }
        *self.state.write().await = TokenState::Authenticated;
        Ok(())
    }

    /// Full re-acquire, used on 401 and on refresh failure.
    pub async fn reauth(&self) -> Result<(), LoxoneError> {
        *self.state.write().await = TokenState::Authenticating;
        self.acquire_token().await?;
        *self.state.write().await = TokenState::Authenticated;
        Ok(())
    }

    /// Fire-and-forget kill on shutdown, bounded to 5 seconds (spec §4.3, §5).
    pub async fn kill(&self) {
        let Some(jwt) = self.current_token().await else {
            *self.state.write().await = TokenState::Killed;
            return;
        };
        let path = format!("jdev/sys/killtoken/{}/{}", jwt, urlencode(&self.user));
        let _ = tokio::time::timeout(std::time::Duration::from_secs(5), self.http.raw_get(&path)).await;
        *self.state.write().await = TokenState::Killed;
    }
}

fn sha1_digest(data: &[u8]) -> Vec<u8> {
    use sha1::Digest as _;
    Sha1::digest(data).to_vec()
}

fn sha256_digest(data: &[u8]) -> Vec<u8> {
    Sha256::digest(data).to_vec()
}

fn hex_upper(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02X}")).collect()
}

fn hmac_hex<M: Mac + hmac::digest::KeyInit>(key: &[u8], data: &[u8]) -> String {
    match M::new_from_slice(key) {
        Ok(mut mac) => {
            mac.update(data);
            mac.finalize().into_bytes().iter().map(|b| format!("{b:02x}")).collect()
        }
        Err(_) => String::new(),
    }
}

fn hex_decode(s: &str) -> Result<Vec<u8>, String> {
    if s.len() % 2 != 0 {
        return Err("odd-length hex string".to_owned());
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).map_err(|e| e.to_string()))
        .collect()
}
