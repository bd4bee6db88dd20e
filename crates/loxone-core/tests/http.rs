// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Loxone MCP Bridge Contributors

//! Integration tests for the HTTP command client and token handshake (C2,
//! C3) against a mock Miniserver bound to a real TCP port.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::{Path as AxPath, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use hmac::digest::KeyInit;
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha1::{Digest, Sha1};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use loxone_core::catalogue::Catalogue;
use loxone_core::error::LoxoneError;
use loxone_core::http::LoxoneHttpClient;
use loxone_core::token::TokenManager;

const TEST_USER: &str = "tester";
const TEST_PASSWORD: &str = "s3cret";
const TEST_SALT: &str = "cafebabe";
const TEST_KEY_HEX: &str = "aabbccdd";

fn ll_ok(value: Value) -> Json<Value> {
    Json(json!({ "LL": { "code": "200", "value": value } }))
}

fn ll_err(code: &str) -> Json<Value> {
    Json(json!({ "LL": { "code": code, "value": "" } }))
}

#[derive(Clone)]
struct MockState {
    io_401_once: Arc<AtomicBool>,
    getjwt_count: Arc<AtomicUsize>,
    refreshjwt_count: Arc<AtomicUsize>,
    killtoken_count: Arc<AtomicUsize>,
    expected_hmac: String,
}

async fn reachability() -> impl IntoResponse {
    ll_ok(json!({ "snr": "504F94AABBCC" }))
}

async fn getkey2(AxPath(_user): AxPath<String>) -> impl IntoResponse {
    ll_ok(json!({ "key": TEST_KEY_HEX, "salt": TEST_SALT, "hashAlg": "SHA1" }))
}

/// Asserts the client derived the same HMAC this test computed independently,
/// proving the SHA1-then-HMAC handshake (spec §4.3) round-trips correctly.
async fn getjwt(State(state): State<MockState>, AxPath(rest): AxPath<String>) -> impl IntoResponse {
    let hmac_sent = rest.split('/').next().unwrap_or_default();
    if hmac_sent != state.expected_hmac {
        return ll_err("401").into_response();
    }
    let n = state.getjwt_count.fetch_add(1, Ordering::SeqCst) + 1;
    ll_ok(json!({
        "token": format!("jwt-{n}"),
        "validUntil": valid_until_epoch(),
        "tokenRights": 4,
        "key": "00",
    }))
    .into_response()
}

fn valid_until_epoch() -> i64 {
    const LOXONE_EPOCH_OFFSET: i64 = 1_230_768_000;
    let now_unix = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    now_unix - LOXONE_EPOCH_OFFSET + 3600
}

async fn refreshjwt(State(state): State<MockState>, AxPath(_rest): AxPath<String>) -> impl IntoResponse {
    let n = state.refreshjwt_count.fetch_add(1, Ordering::SeqCst) + 1;
    ll_ok(json!({
        "token": format!("refreshed-jwt-{n}"),
        "validUntil": valid_until_epoch(),
    }))
}

async fn killtoken(State(state): State<MockState>, AxPath(_rest): AxPath<String>) -> impl IntoResponse {
    state.killtoken_count.fetch_add(1, Ordering::SeqCst);
    ll_ok(json!(""))
}

async fn structure_file(State(state): State<MockState>) -> impl IntoResponse {
    if state.io_401_once.swap(false, Ordering::SeqCst) {
        return ll_err("401").into_response();
    }
    ll_ok(json!({
        "rooms": { "10000000-0000-0000-0000-000000000001": { "name": "Living Room" } },
        "cats": {},
        "controls": {
            "30000000-0000-0000-0000-000000000001": {
                "name": "Rolladen",
                "type": "Jalousie",
                "room": "10000000-0000-0000-0000-000000000001",
            },
        },
        "msInfo": { "projectName": "Test Home", "swVersion": "12.0", "location": "Testville" },
    }))
    .into_response()
}

struct MockMiniserver {
    port: u16,
    io_401_once: Arc<AtomicBool>,
    getjwt_count: Arc<AtomicUsize>,
    refreshjwt_count: Arc<AtomicUsize>,
    killtoken_count: Arc<AtomicUsize>,
    serve_task: JoinHandle<()>,
}

impl MockMiniserver {
    async fn start() -> Self {
        let expected_hmac = expected_hmac_for(TEST_PASSWORD, TEST_SALT, TEST_KEY_HEX, TEST_USER);
        let state = MockState {
            io_401_once: Arc::new(AtomicBool::new(false)),
            getjwt_count: Arc::new(AtomicUsize::new(0)),
            refreshjwt_count: Arc::new(AtomicUsize::new(0)),
            killtoken_count: Arc::new(AtomicUsize::new(0)),
            expected_hmac,
        };

        let router = Router::new()
            .route("/jdev/cfg/apiKey", get(reachability))
            .route("/jdev/sys/getkey2/{user}", get(getkey2))
            .route("/jdev/sys/getjwt/{*rest}", get(getjwt))
            .route("/jdev/sys/refreshjwt/{*rest}", get(refreshjwt))
            .route("/jdev/sys/killtoken/{*rest}", get(killtoken))
            .route("/data/LoxAPP3.json", get(structure_file))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind mock listener");
        let port = listener.local_addr().expect("local addr").port();
        let serve_task = tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });

        Self {
            port,
            io_401_once: state.io_401_once,
            getjwt_count: state.getjwt_count,
            refreshjwt_count: state.refreshjwt_count,
            killtoken_count: state.killtoken_count,
            serve_task,
        }
    }
}

impl Drop for MockMiniserver {
    fn drop(&mut self) {
        self.serve_task.abort();
    }
}

/// Independently reproduces the client's SHA1-then-HMAC derivation (spec
/// §4.3) so the mock can assert the client computed it correctly.
fn expected_hmac_for(password: &str, salt: &str, key_hex: &str, user: &str) -> String {
    let pw_hash = hex_upper(&Sha1::digest(format!("{password}:{salt}").as_bytes()));
    let key_bytes = hex_decode(key_hex);
    let mut mac = Hmac::<Sha1>::new_from_slice(&key_bytes).expect("hmac key");
    mac.update(format!("{user}:{pw_hash}").as_bytes());
    mac.finalize().into_bytes().iter().map(|b| format!("{b:02x}")).collect()
}

fn hex_upper(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02X}")).collect()
}

fn hex_decode(s: &str) -> Vec<u8> {
    (0..s.len()).step_by(2).map(|i| u8::from_str_radix(&s[i..i + 2], 16).expect("hex digit")).collect()
}

fn client_and_token(mock: &MockMiniserver) -> (Arc<LoxoneHttpClient>, TokenManager) {
    let http = Arc::new(LoxoneHttpClient::new("127.0.0.1", mock.port));
    let token = TokenManager::new(Arc::clone(&http), TEST_USER.to_owned(), TEST_PASSWORD.to_owned(), false, 300);
    (http, token)
}

#[tokio::test]
async fn reachability_probe_returns_serial_number() {
    let mock = MockMiniserver::start().await;
    let (http, _token) = client_and_token(&mock);
    let value = http.reachability_probe().await.expect("probe succeeds");
    assert_eq!(value["snr"], "504F94AABBCC");
}

#[tokio::test]
async fn raw_get_401_maps_to_unauthorized() {
    let mock = MockMiniserver::start().await;
    let (http, _token) = client_and_token(&mock);
    mock.io_401_once.store(true, Ordering::SeqCst);
    let err = http.raw_get("data/LoxAPP3.json").await.unwrap_err();
    assert_eq!(err, LoxoneError::Unauthorized);
}

#[tokio::test]
async fn connect_performs_the_full_handshake_with_correct_hmac() {
    let mock = MockMiniserver::start().await;
    let (_http, token) = client_and_token(&mock);

    token.connect().await.expect("connect succeeds");
    assert!(token.current_token().await.is_some());
    assert_eq!(mock.getjwt_count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn send_retries_exactly_once_after_a_401() {
    let mock = MockMiniserver::start().await;
    let (http, token) = client_and_token(&mock);
    token.connect().await.expect("connect succeeds");

    mock.io_401_once.store(true, Ordering::SeqCst);
    let value = http.send(&token, "data/LoxAPP3.json", true).await.expect("send recovers from 401");
    assert!(value.get("rooms").is_some());
    assert_eq!(mock.getjwt_count.load(Ordering::SeqCst), 2, "one reauth after the 401");
}

#[tokio::test]
async fn catalogue_load_builds_indices_from_the_live_structure_file() {
    let mock = MockMiniserver::start().await;
    let (http, token) = client_and_token(&mock);
    token.connect().await.expect("connect succeeds");

    let catalogue = Catalogue::load(&http, &token, Some("504F94AABBCC".to_owned())).await.expect("catalogue loads");
    assert_eq!(catalogue.devices.len(), 1);
    assert_eq!(catalogue.by_type.get("Jalousie").map(|v| v.len()), Some(1));
    assert_eq!(catalogue.miniserver.project_name.as_deref(), Some("Test Home"));
}

#[tokio::test]
async fn kill_issues_the_killtoken_request() {
    let mock = MockMiniserver::start().await;
    let (_http, token) = client_and_token(&mock);
    token.connect().await.expect("connect succeeds");

    token.kill().await;
    assert_eq!(mock.killtoken_count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn refresh_updates_the_token_in_place_without_a_full_reauth() {
    let mock = MockMiniserver::start().await;
    let (_http, token) = client_and_token(&mock);
    token.connect().await.expect("connect succeeds");
    let original_jwt = token.current_token().await.expect("connected token present");

    token.refresh().await.expect("refresh succeeds");

    assert_eq!(mock.getjwt_count.load(Ordering::SeqCst), 1, "no fallback reauth");
    assert_eq!(mock.refreshjwt_count.load(Ordering::SeqCst), 1);
    let refreshed_jwt = token.current_token().await.expect("token still present");
    assert_ne!(refreshed_jwt, original_jwt, "refresh must replace the jwt with the server's response");
    assert_eq!(refreshed_jwt, "refreshed-jwt-1");
}

#[tokio::test]
async fn refresh_falls_back_to_reauth_when_refresh_fails() {
    // With no prior token, refresh() must go straight to a full reauth
    // rather than calling refreshjwt with an empty jwt.
    let mock = MockMiniserver::start().await;
    let (_http, token) = client_and_token(&mock);

    token.refresh().await.expect("refresh reauths from scratch");
    assert_eq!(mock.getjwt_count.load(Ordering::SeqCst), 1);
    assert_eq!(mock.refreshjwt_count.load(Ordering::SeqCst), 0);
}
