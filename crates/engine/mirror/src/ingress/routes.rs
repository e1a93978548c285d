//! Request classification and canned replies.

use super::Direction;
use serde_json::json;
use std::io::Cursor;
use tiny_http::{Header, Response, StatusCode};

/// Refresh notification endpoint.
pub const NOTIFY_PATH: &str = "/notify";

const ALLOW_METHODS: &str = "GET, POST, PUT, DELETE";
const ALLOW_HEADERS: &str = "Content-Type";
const JSON: &str = "application/json";
const TEXT: &str = "text/plain; charset=utf-8";

/// What an incoming request asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// CORS preflight, answered on the accepting thread.
    Preflight,
    /// Queue a refresh for the owning thread.
    Notify,
    /// Set the pending movement direction.
    Command(Direction),
    /// Anything else; carries the path for diagnostics.
    Unknown(String),
}

/// Classifies a request by method and URL. Preflight wins over every path,
/// so a browser preflighting `/notify` never queues a refresh.
pub fn classify(method: &str, url: &str) -> Route {
    if method.eq_ignore_ascii_case("OPTIONS") {
        return Route::Preflight;
    }

    let path = url.split(|c| c == '?' || c == '#').next().unwrap_or_default();
    if path == NOTIFY_PATH {
        return Route::Notify;
    }

    match Direction::from_command(path) {
        Some(direction) => Route::Command(direction),
        None => Route::Unknown(path.to_string()),
    }
}

/// A response before it is bound to a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: u16,
    pub content_type: Option<&'static str>,
    pub headers: Vec<(&'static str, &'static str)>,
    pub body: String,
}

impl Reply {
    pub fn preflight() -> Self {
        Self {
            status: 200,
            content_type: None,
            headers: vec![
                ("Access-Control-Allow-Methods", ALLOW_METHODS),
                ("Access-Control-Allow-Headers", ALLOW_HEADERS),
            ],
            body: String::new(),
        }
    }

    pub fn notify_accepted() -> Self {
        Self::json(
            200,
            json!({
                "status": "success",
                "message": "Notification received, refresh queued",
            }),
        )
    }

    pub fn command(direction: Direction) -> Self {
        Self {
            status: 200,
            content_type: Some(TEXT),
            headers: Vec::new(),
            body: format!("Command '{}' executed!", direction.name()),
        }
    }

    pub fn not_found() -> Self {
        Self::json(404, json!({ "error": "Endpoint not found" }))
    }

    fn json(status: u16, body: serde_json::Value) -> Self {
        Self {
            status,
            content_type: Some(JSON),
            headers: Vec::new(),
            body: body.to_string(),
        }
    }

    /// Builds the tiny_http response. Every reply allows any origin.
    pub fn into_response(self) -> Response<Cursor<Vec<u8>>> {
        let mut response =
            Response::from_data(self.body.into_bytes()).with_status_code(StatusCode(self.status));

        let content_type = self.content_type.map(|value| ("Content-Type", value));
        let headers = std::iter::once(("Access-Control-Allow-Origin", "*"))
            .chain(content_type)
            .chain(self.headers);
        for (name, value) in headers {
            if let Ok(header) = Header::from_bytes(name.as_bytes(), value.as_bytes()) {
                response.add_header(header);
            }
        }
        response
    }
}
