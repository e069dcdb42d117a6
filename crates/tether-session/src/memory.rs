//! In-memory duplex transport, used by the test suite and by embedders that
//! want two sessions in one process.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::transport::{Transport, TransportError, TransportEvent};

/// Messages travelling between the two ends of a pair.
#[derive(Debug)]
enum Signal {
    Text(String),
    Binary(Vec<u8>),
    Close(u16, String),
}

/// Per-direction queue depth. Senders await when the peer is slow, which is
/// the bounded-backpressure policy the session expects from a transport.
const CAPACITY: usize = 64;

/// One end of an in-memory duplex pair.
pub struct MemoryTransport {
    tx: mpsc::Sender<Signal>,
    rx: mpsc::Receiver<Signal>,
    opened: bool,
    closed: bool,
}

/// Create a connected pair of in-memory transports.
///
/// Each end delivers [`TransportEvent::Open`] on its first `recv`. An
/// explicit [`close`] delivers a clean 1000 close to the peer; dropping an
/// end delivers 1006.
///
/// [`close`]: Transport::close
pub fn pair() -> (MemoryTransport, MemoryTransport) {
    let (a_tx, a_rx) = mpsc::channel(CAPACITY);
    let (b_tx, b_rx) = mpsc::channel(CAPACITY);
    (
        MemoryTransport {
            tx: a_tx,
            rx: b_rx,
            opened: false,
            closed: false,
        },
        MemoryTransport {
            tx: b_tx,
            rx: a_rx,
            opened: false,
            closed: false,
        },
    )
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn recv(&mut self) -> TransportEvent {
        if !self.opened {
            self.opened = true;
            return TransportEvent::Open;
        }
        if self.closed {
            return TransportEvent::Closed {
                code: 1000,
                reason: "closed".to_owned(),
            };
        }
        match self.rx.recv().await {
            Some(Signal::Text(text)) => TransportEvent::Text(text),
            Some(Signal::Binary(bytes)) => TransportEvent::Binary(bytes),
            Some(Signal::Close(code, reason)) => {
                self.closed = true;
                TransportEvent::Closed { code, reason }
            }
            None => {
                self.closed = true;
                TransportEvent::Closed {
                    code: 1006,
                    reason: "connection reset".to_owned(),
                }
            }
        }
    }

    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.tx
            .send(Signal::Text(text))
            .await
            .map_err(|_| TransportError::Closed)
    }

    async fn send_binary(&mut self, bytes: Vec<u8>) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.tx
            .send(Signal::Binary(bytes))
            .await
            .map_err(|_| TransportError::Closed)
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            let _ = self
                .tx
                .send(Signal::Close(1000, "normal closure".to_owned()))
                .await;
        }
    }
}
