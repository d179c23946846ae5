//! # Calendar Server
//!
//! HTTP feed answering `GET /calendar/{channel_id}/ical?token=SECRET` with the channel's
//! reminders as iCalendar.
//!
//! - **Version**: 2.0.0
//! - **Since**: 1.0.0
//! - **Toggleable**: true
//!
//! ## Changelog
//! - 2.0.0: Served by an axum router with a concurrency limit; constant-time token check
//! - 1.0.0: Initial read-only calendar feed

use anyhow::Result;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use log::{debug, error, info, warn};
use serde::Deserialize;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower::limit::ConcurrencyLimitLayer;

use super::ical::render_icalendar;
use crate::database::Database;

/// Maximum number of concurrently served requests
const MAX_CONNECTIONS: usize = 32;

const CALENDAR_CONTENT_TYPE: &str = "text/calendar; charset=utf-8";

#[derive(Debug, Deserialize)]
pub struct CalendarParams {
    #[serde(default)]
    pub token: String,
}

/// Failed feed request, mapped to a plain-text status response
#[derive(Debug, PartialEq, Eq)]
pub enum CalendarError {
    NotFound,
    Unauthorized,
    Internal(String),
}

impl IntoResponse for CalendarError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            CalendarError::NotFound => (StatusCode::NOT_FOUND, "not found"),
            CalendarError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized"),
            CalendarError::Internal(e) => {
                error!("Failed to render calendar: {e}");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error")
            }
        };
        (status, message).into_response()
    }
}

impl From<anyhow::Error> for CalendarError {
    fn from(e: anyhow::Error) -> Self {
        CalendarError::Internal(e.to_string())
    }
}

/// Compare secrets without leaking the position of the first mismatch
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Rendered calendar of a channel, if `token` is its secret
pub async fn calendar_for(
    database: &Database,
    channel_id: i64,
    token: &str,
) -> Result<String, CalendarError> {
    let Some(channel) = database.get_channel(channel_id).await? else {
        return Err(CalendarError::NotFound);
    };
    if token.is_empty() || !constant_time_eq(channel.calendar_secret.as_bytes(), token.as_bytes()) {
        warn!("Rejected calendar request for channel {channel_id} with a wrong token");
        return Err(CalendarError::Unauthorized);
    }

    let reminders = database.pending_reminders(channel.id).await?;
    debug!("Serving {} reminders for channel {channel_id}", reminders.len());
    Ok(render_icalendar(&reminders))
}

/// GET /calendar/{channel_id}/ical
async fn calendar_feed(
    State(database): State<Database>,
    Path(channel_id): Path<String>,
    Query(params): Query<CalendarParams>,
) -> Result<Response, CalendarError> {
    let channel_id: i64 = channel_id.parse().map_err(|_| CalendarError::NotFound)?;
    let calendar = calendar_for(&database, channel_id, &params.token).await?;
    Ok(([(header::CONTENT_TYPE, CALENDAR_CONTENT_TYPE)], calendar).into_response())
}

#[derive(Clone)]
pub struct CalendarServer {
    database: Database,
}

impl CalendarServer {
    pub fn new(database: Database) -> Self {
        CalendarServer { database }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/calendar/{channel_id}/ical", get(calendar_feed))
            .layer(ConcurrencyLimitLayer::new(MAX_CONNECTIONS))
            .with_state(self.database.clone())
    }

    /// Bind and serve in a background task; returns the bound address
    pub async fn start(self, addr: SocketAddr) -> Result<SocketAddr> {
        let listener = TcpListener::bind(addr).await?;
        let local = listener.local_addr()?;
        info!("Calendar server listening on {local}");

        let router = self.router();
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                error!("Calendar server stopped: {e}");
            }
        });

        Ok(local)
    }
}
