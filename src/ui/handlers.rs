//! HTTP handlers

use std::fmt::Write;

use axum::{extract::State, response::Html, Json};

use crate::session::SessionInfo;
use crate::ui::server::AppState;

/// API response wrapper
#[derive(serde::Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

#[derive(serde::Serialize)]
pub struct VersionInfo {
    #[serde(rename = "Version")]
    pub version: &'static str,
}

/// Session table, refreshed by the browser every 30 s
pub async fn status_page(State(state): State<AppState>) -> Html<String> {
    let sessions: Vec<SessionInfo> = state.gateway.registry().sessions().iter().map(|s| s.info()).collect();
    Html(render_status(&sessions))
}

pub async fn status_json(State(state): State<AppState>) -> Json<ApiResponse<Vec<SessionInfo>>> {
    let sessions = state.gateway.registry().sessions().iter().map(|s| s.info()).collect();
    Json(ApiResponse::ok(sessions))
}

pub async fn version() -> Json<VersionInfo> {
    Json(VersionInfo {
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub fn render_status(sessions: &[SessionInfo]) -> String {
    let mut page = String::from(
        "<!DOCTYPE html>\n<html>\n<head>\n  <meta http-equiv=\"refresh\" content=\"30\" />\n  \
         <title>Radio Gateway Status</title>\n</head>\n<body>\n",
    );
    let _ = writeln!(page, "<b>Sessions: {}</b>", sessions.len());
    if !sessions.is_empty() {
        page.push_str(
            "<table border=1>\n<tr><th>client</th><th>ssrc</th><th>frequency range(Hz)</th>\
             <th>frequency(Hz)</th><th>center frequency(Hz)</th><th>bins</th>\
             <th>bin width(Hz)</th><th>Audio</th></tr>\n",
        );
        for s in sessions {
            let _ = writeln!(
                page,
                "<tr><td>{}</td><td>{}</td><td>{} to {}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                escape(&s.client),
                s.ssrc,
                s.low_frequency,
                s.high_frequency,
                s.frequency,
                s.center_frequency,
                s.bins,
                s.bin_width,
                if s.audio_active { "Enabled" } else { "Disabled" },
            );
        }
        page.push_str("</table>\n");
    }
    page.push_str("</body>\n</html>\n");
    page
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
