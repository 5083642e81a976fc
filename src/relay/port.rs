//! Duplex envelope ports and the connectors that open them.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::dispatcher::Dispatcher;
use crate::protocol::Envelope;
use crate::relay::error::RelayError;

const PORT_CAPACITY: usize = 64;

/// One end of a duplex envelope channel. Dropping it closes the other end.
#[derive(Debug)]
pub struct Port {
    tx: mpsc::Sender<Envelope>,
    rx: mpsc::Receiver<Envelope>,
}

impl Port {
    pub fn pair() -> (Port, Port) {
        let (a_tx, b_rx) = mpsc::channel(PORT_CAPACITY);
        let (b_tx, a_rx) = mpsc::channel(PORT_CAPACITY);
        (Port { tx: a_tx, rx: a_rx }, Port { tx: b_tx, rx: b_rx })
    }

    pub async fn send(&self, envelope: Envelope) -> Result<(), RelayError> {
        self.tx.send(envelope).await.map_err(|_| RelayError::Closed)
    }

    pub async fn recv(&mut self) -> Option<Envelope> {
        self.rx.recv().await
    }

    pub fn split(self) -> (mpsc::Sender<Envelope>, mpsc::Receiver<Envelope>) {
        (self.tx, self.rx)
    }
}

/// Opens a port to a dispatcher on behalf of `origin`.
#[async_trait]
pub trait PortConnector: Send + Sync {
    async fn connect(&self, origin: &str) -> Result<Port, RelayError>;
}

/// Connects to a dispatcher in the same process.
#[derive(Debug, Clone)]
pub struct InProcessConnector {
    dispatcher: Arc<Dispatcher>,
}

impl InProcessConnector {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }
}

#[async_trait]
impl PortConnector for InProcessConnector {
    async fn connect(&self, origin: &str) -> Result<Port, RelayError> {
        let (page, backend) = Port::pair();
        tokio::spawn(self.dispatcher.clone().serve_port(backend, origin.to_string()));
        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::RequestEnvelope;
    use serde_json::json;

    #[tokio::test]
    async fn dropping_one_end_closes_the_other() {
        let (a, mut b) = Port::pair();
        a.send(Envelope::Request(RequestEnvelope::new("1", "eth_chainId", json!([]))))
            .await
            .unwrap();
        assert!(matches!(b.recv().await, Some(Envelope::Request(_))));

        drop(a);
        assert!(b.recv().await.is_none());
        assert!(matches!(
            b.send(Envelope::Request(RequestEnvelope::new("2", "eth_chainId", json!([])))).await,
            Err(RelayError::Closed)
        ));
    }
}
