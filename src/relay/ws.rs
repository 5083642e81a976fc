//! WebSocket transport to a remote `wallet-relay` daemon.
//!
//! Envelopes travel as JSON text frames. Each connect opens a fresh socket
//! bridged onto a [`Port`]; the port closes when the socket does. The page
//! origin goes in both the query and the `Origin` header.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use crate::protocol::Envelope;
use crate::relay::error::RelayError;
use crate::relay::port::{Port, PortConnector};

#[derive(Debug, Clone)]
pub struct WsConnector {
    endpoint: Url,
}

impl WsConnector {
    /// `endpoint` is the daemon's relay URL, e.g. `ws://127.0.0.1:7545/relay`.
    pub fn new(endpoint: &str) -> Result<Self, RelayError> {
        let endpoint: Url = endpoint
            .parse()
            .map_err(|e| RelayError::InvalidEndpoint(format!("{}: {}", endpoint, e)))?;
        if !matches!(endpoint.scheme(), "ws" | "wss") {
            return Err(RelayError::InvalidEndpoint(format!(
                "{}: scheme must be ws or wss",
                endpoint
            )));
        }
        Ok(Self { endpoint })
    }

    /// Relay URL for `origin`.
    pub fn url_for(&self, origin: &str) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut().clear().append_pair("origin", origin);
        url
    }
}

#[async_trait]
impl PortConnector for WsConnector {
    async fn connect(&self, origin: &str) -> Result<Port, RelayError> {
        let url = self.url_for(origin);
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| RelayError::Connect(e.to_string()))?;
        let origin_header =
            HeaderValue::from_str(origin).map_err(|e| RelayError::InvalidEndpoint(format!("{}: {}", origin, e)))?;
        request.headers_mut().insert(header::ORIGIN, origin_header);

        let (socket, _) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| RelayError::Connect(e.to_string()))?;
        tracing::debug!(url = %url, "Relay socket open");

        let (mut sink, mut stream) = socket.split();
        let (page, bridge) = Port::pair();
        let (tx, mut rx) = bridge.split();

        tokio::spawn(async move {
            while let Some(envelope) = rx.recv().await {
                let text = match serde_json::to_string(&envelope) {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::warn!(error = %e, "Dropping unserializable envelope");
                        continue;
                    }
                };
                if sink.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            let _ = sink.close().await;
        });

        tokio::spawn(async move {
            while let Some(frame) = stream.next().await {
                match frame {
                    Ok(Message::Text(text)) => match serde_json::from_str::<Envelope>(text.as_str()) {
                        Ok(envelope) => {
                            if tx.send(envelope).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => tracing::warn!(error = %e, "Ignoring malformed relay frame"),
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        tracing::debug!(error = %e, "Relay socket error");
                        break;
                    }
                }
            }
        });

        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_travels_in_the_query() {
        let connector = WsConnector::new("ws://127.0.0.1:7545/relay").unwrap();
        let url = connector.url_for("https://app.example");
        assert_eq!(url.path(), "/relay");
        assert_eq!(
            url.query_pairs().find(|(k, _)| k == "origin").map(|(_, v)| v.into_owned()),
            Some("https://app.example".to_string())
        );
    }

    #[test]
    fn http_endpoints_are_rejected() {
        assert!(matches!(
            WsConnector::new("http://127.0.0.1:7545/relay"),
            Err(RelayError::InvalidEndpoint(_))
        ));
    }
}
