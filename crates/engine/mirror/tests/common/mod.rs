//! Local catalog stand-in served with tiny_http.
#![allow(dead_code)]

use parking_lot::Mutex;
use serde_json::Value;
use std::{
    collections::HashMap,
    io::Read,
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};
use tiny_http::{Header, Response, Server};

/// glTF document with a two-level hierarchy and no buffers.
pub const CRATE_GLTF: &str = r#"{
    "asset": { "version": "2.0" },
    "scene": 0,
    "scenes": [{ "nodes": [0] }],
    "nodes": [
        { "name": "crate", "children": [1] },
        { "name": "lid", "translation": [0.0, 1.0, 0.0] }
    ]
}"#;

#[derive(Debug, Default)]
pub struct MockState {
    pub listing: Value,
    pub list_status: u16,
    pub list_delay: Duration,
    pub assets: HashMap<String, Vec<u8>>,
    /// Query strings of listing requests, in arrival order.
    pub list_queries: Vec<String>,
    /// `(path, form body)` of every transform POST.
    pub pushes: Vec<(String, String)>,
    /// Shared event log; the mock appends `fetch` per listing request.
    pub events: Option<Arc<Mutex<Vec<String>>>>,
}

pub struct MockCatalog {
    addr: SocketAddr,
    pub state: Arc<Mutex<MockState>>,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl MockCatalog {
    pub fn start() -> Self {
        let server = Server::http("127.0.0.1:0").unwrap();
        let addr = server.server_addr().to_ip().unwrap();
        let state = Arc::new(Mutex::new(MockState {
            listing: Value::Array(Vec::new()),
            list_status: 200,
            ..MockState::default()
        }));
        let running = Arc::new(AtomicBool::new(true));

        let thread = {
            let state = state.clone();
            let running = running.clone();
            thread::spawn(move || {
                while running.load(Ordering::Acquire) {
                    match server.recv_timeout(Duration::from_millis(50)) {
                        Ok(Some(request)) => handle(request, &state),
                        Ok(None) => continue,
                        Err(_) => break,
                    }
                }
            })
        };

        Self {
            addr,
            state,
            running,
            thread: Some(thread),
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn asset_url(&self, name: &str) -> String {
        format!("{}/assets/{name}", self.url())
    }

    pub fn set_listing(&self, listing: Value) {
        self.state.lock().listing = listing;
    }

    pub fn add_asset(&self, name: &str, bytes: &[u8]) {
        self.state.lock().assets.insert(name.to_string(), bytes.to_vec());
    }

    pub fn pushes(&self) -> Vec<(String, String)> {
        self.state.lock().pushes.clone()
    }
}

impl Drop for MockCatalog {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn handle(mut request: tiny_http::Request, state: &Mutex<MockState>) {
    let url = request.url().to_string();
    let (path, query) = url.split_once('?').unwrap_or((url.as_str(), ""));

    let response = if path == "/api/models/search" {
        let (status, body, delay, events) = {
            let mut state = state.lock();
            state.list_queries.push(query.to_string());
            (
                state.list_status,
                state.listing.to_string(),
                state.list_delay,
                state.events.clone(),
            )
        };
        if let Some(events) = events {
            events.lock().push("fetch".to_string());
        }
        thread::sleep(delay);
        json_response(status, body)
    } else if let Some(name) = path.strip_prefix("/assets/") {
        match state.lock().assets.get(name) {
            Some(bytes) => Response::from_data(bytes.clone()),
            None => json_response(404, r#"{"error":"no such asset"}"#.to_string()),
        }
    } else if path.starts_with("/api/models/") && path.ends_with("/transform") {
        let mut body = String::new();
        let _ = request.as_reader().read_to_string(&mut body);
        state.lock().pushes.push((path.to_string(), body));
        json_response(200, r#"{"status":"ok"}"#.to_string())
    } else {
        json_response(404, r#"{"error":"unknown"}"#.to_string())
    };

    let _ = request.respond(response);
}

fn json_response(status: u16, body: String) -> Response<std::io::Cursor<Vec<u8>>> {
    let mut response = Response::from_string(body).with_status_code(status);
    if let Ok(header) = Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]) {
        response.add_header(header);
    }
    response
}

/// Decodes an `application/x-www-form-urlencoded` body.
pub fn form_fields(body: &str) -> HashMap<String, String> {
    reqwest::Url::parse(&format!("http://form.local/?{body}"))
        .map(|url| url.query_pairs().into_owned().collect())
        .unwrap_or_default()
}

/// Polls `check` until it holds or `timeout` passes.
pub async fn wait_for(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
