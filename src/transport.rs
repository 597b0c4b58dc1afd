//! The framed binary transport between peers: message-oriented, ordered,
//! reliable, with binary payload support. Connect/accept, and blocking
//! send/recv of one binary message at a time.
//!
//! A plain (non-async) WebSocket handshake via `tungstenite`, matching this
//! crate's thread-per-stage concurrency model. Session (see session.rs)
//! drives one `Transport` from two threads (Transmit, Receive) behind a
//! shared mutex; a short read timeout keeps the mutex from being held
//! across an indefinite blocking read, so a pending send is never starved
//! by a receive that has nothing to read yet.

use std::net::{TcpListener, TcpStream};
use std::time::Duration;

use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket};
use url::Url;

use crate::error::TransportError;

enum Conn {
    Server(WebSocket<TcpStream>),
    Client(WebSocket<MaybeTlsStream<TcpStream>>),
}

/// One established, message-oriented binary channel to a peer.
pub struct Transport {
    conn: Conn,
}

impl Transport {
    /// Server side: completes a WebSocket upgrade on an already-accepted
    /// TCP connection.
    pub fn accept(stream: TcpStream) -> Result<Self, TransportError> {
        stream
            .set_nodelay(true)
            .map_err(|e| TransportError::Io(e.to_string()))?;
        let ws = tungstenite::accept(stream).map_err(|e| TransportError::Handshake(e.to_string()))?;
        Ok(Self { conn: Conn::Server(ws) })
    }

    /// Client side: dials `url`, mapping an `https`/`wss` scheme to a
    /// secure WebSocket and everything else to plaintext `ws`.
    pub fn dial(url: &str) -> Result<Self, TransportError> {
        let parsed = Url::parse(url).map_err(|e| TransportError::Handshake(e.to_string()))?;
        let secure = matches!(parsed.scheme(), "https" | "wss");
        let host = parsed.host_str().ok_or_else(|| TransportError::Handshake("missing host".into()))?;
        let port = parsed.port().unwrap_or(if secure { 443 } else { 80 });
        let scheme = if secure { "wss" } else { "ws" };
        let ws_url = format!("{scheme}://{host}:{port}/ws");

        let (ws, _response) =
            tungstenite::connect(&ws_url).map_err(|e| TransportError::Handshake(e.to_string()))?;
        Ok(Self { conn: Conn::Client(ws) })
    }

    /// Bounds how long a single `recv_binary` call may block. Used after
    /// the handshake so Session's Transmit and Receive threads can share
    /// this `Transport` behind one mutex without one starving the other.
    pub fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<(), TransportError> {
        let result = match &self.conn {
            Conn::Server(ws) => ws.get_ref().set_read_timeout(timeout),
            Conn::Client(ws) => match ws.get_ref() {
                MaybeTlsStream::Plain(s) => s.set_read_timeout(timeout),
                #[allow(unreachable_patterns)]
                _ => Ok(()),
            },
        };
        result.map_err(|e| TransportError::Io(e.to_string()))
    }

    pub fn send_binary(&mut self, data: Vec<u8>) -> Result<(), TransportError> {
        let result = match &mut self.conn {
            Conn::Server(ws) => ws.send(Message::Binary(data)),
            Conn::Client(ws) => ws.send(Message::Binary(data)),
        };
        result.map_err(|e| TransportError::Io(e.to_string()))
    }

    /// Blocks (up to the read timeout, once set) for the next message and
    /// returns its binary payload. Returns `Ok(None)` when the read timed
    /// out without a full message, so callers can retry without treating
    /// it as a failure.
    pub fn recv_binary(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        loop {
            let message = match &mut self.conn {
                Conn::Server(ws) => ws.read(),
                Conn::Client(ws) => ws.read(),
            };
            match message {
                Ok(Message::Binary(data)) => return Ok(Some(data)),
                Ok(Message::Close(_)) => return Err(TransportError::Closed),
                Ok(_) => continue, // text/ping/pong/frame: not part of this protocol
                Err(tungstenite::Error::ConnectionClosed) => return Err(TransportError::Closed),
                Err(tungstenite::Error::Io(io_err))
                    if matches!(
                        io_err.kind(),
                        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                    ) =>
                {
                    return Ok(None);
                }
                Err(e) => return Err(TransportError::Io(e.to_string())),
            }
        }
    }
}

/// Thin wrapper over a bound `TcpListener`, accepting one call at a time.
pub struct Listener {
    inner: TcpListener,
}

impl Listener {
    pub fn bind(addr: &str) -> Result<Self, TransportError> {
        let inner = TcpListener::bind(addr).map_err(|e| TransportError::Io(e.to_string()))?;
        Ok(Self { inner })
    }

    pub fn accept(&self) -> Result<Transport, TransportError> {
        let (stream, peer) = self.inner.accept().map_err(|e| TransportError::Io(e.to_string()))?;
        log::info!("accepted connection from {peer}");
        Transport::accept(stream)
    }
}
