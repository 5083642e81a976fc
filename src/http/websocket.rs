//! WebSocket relay endpoint.
//!
//! # Responsibilities
//! - Validate the page origin named in the upgrade query against the `Origin` header
//! - Bridge JSON text frames onto a [`Port`] served by the dispatcher
//! - Close the dispatcher channel when the socket goes away
//!
//! # Data Flow
//! ```text
//! page relay ←──── text frames (Envelope) ────→ socket ←── Port ──→ Dispatcher::serve_port
//! ```
//!
//! Closing the socket closes the channel, which abandons its pending approvals.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;

use crate::dispatcher::Dispatcher;
use crate::protocol::Envelope;
use crate::http::server::AppState;
use crate::relay::Port;

#[derive(Debug, Deserialize)]
pub struct RelayQuery {
    pub origin: String,
}

pub async fn relay_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<RelayQuery>,
    headers: HeaderMap,
) -> Response {
    let origin = match page_origin(&query.origin, headers.get(header::ORIGIN)) {
        Ok(origin) => origin,
        Err(rejection) => {
            tracing::warn!(origin = %query.origin, reason = rejection.1, "Rejected relay upgrade");
            return rejection.into_response();
        }
    };

    let dispatcher = state.ctx.dispatcher().clone();
    ws.max_message_size(state.ctx.config().server.max_message_bytes)
        .on_upgrade(move |socket| bridge(socket, dispatcher, origin))
}

/// The origin a relay socket acts for. The query names it and the `Origin`
/// header must agree, so a page cannot speak for another site.
fn page_origin(
    claimed: &str,
    header: Option<&HeaderValue>,
) -> Result<String, (StatusCode, &'static str)> {
    let claimed = normalize_origin(claimed).ok_or((StatusCode::BAD_REQUEST, "origin must be an http(s) origin"))?;
    let sent = header
        .and_then(|value| value.to_str().ok())
        .and_then(normalize_origin)
        .ok_or((StatusCode::FORBIDDEN, "Origin header is missing or invalid"))?;
    if sent != claimed {
        return Err((StatusCode::FORBIDDEN, "Origin header does not match the requested origin"));
    }
    Ok(claimed)
}

fn normalize_origin(raw: &str) -> Option<String> {
    match url::Url::parse(raw) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Some(url.origin().ascii_serialization()),
        _ => None,
    }
}

async fn bridge(socket: WebSocket, dispatcher: Arc<Dispatcher>, origin: String) {
    let (page, backend) = Port::pair();
    tokio::spawn(dispatcher.serve_port(backend, origin.clone()));

    let (tx, mut rx) = page.split();
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<Envelope>(text.as_str()) {
                    Ok(envelope) => {
                        if tx.send(envelope).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => tracing::warn!(origin = %origin, error = %e, "Ignoring malformed relay frame"),
                },
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(origin = %origin, error = %e, "Relay socket error");
                    break;
                }
            },
            envelope = rx.recv() => match envelope {
                Some(envelope) => match serde_json::to_string(&envelope) {
                    Ok(text) => {
                        if sink.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "Dropping unserializable envelope"),
                },
                None => break,
            },
        }
    }
    tracing::debug!(origin = %origin, "Relay socket closed");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(value: &str) -> HeaderValue {
        HeaderValue::from_str(value).unwrap()
    }

    #[test]
    fn origin_header_must_match_the_query() {
        let sent = header("https://app.example");
        assert_eq!(
            page_origin("https://app.example/", Some(&sent)).unwrap(),
            "https://app.example"
        );

        let forged = header("https://evil.example");
        let (status, _) = page_origin("https://bank.example", Some(&forged)).unwrap_err();
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = page_origin("https://bank.example", None).unwrap_err();
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = page_origin("chrome-extension://abc", Some(&sent)).unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
