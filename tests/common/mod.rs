#![allow(
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    reason = "Do not need additional syntax for setting up tests"
)]
#![allow(
    unused,
    reason = "Not every test binary uses every helper"
)]

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use futures_util::{SinkExt as _, StreamExt as _};
use rpi_telemetry_client::endpoint::{Deployment, EndpointConfig, PageLocation};
use rpi_telemetry_client::ws::{Callbacks, Config, Event, ReconnectConfig};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

pub const RECONNECT_DELAY: Duration = Duration::from_millis(300);
pub const WAIT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
enum Command {
    Text(String),
    Close,
}

/// A socket the mock server accepted.
#[derive(Debug, Clone)]
pub struct Accepted {
    pub at: Instant,
    pub path: String,
}

/// Mock telemetry server.
pub struct MockWsServer {
    addr: SocketAddr,
    /// Commands for ALL connected clients
    command_tx: broadcast::Sender<Command>,
    /// One entry per completed handshake
    accepted_rx: mpsc::UnboundedReceiver<Accepted>,
    /// One entry per connection the client closed or dropped
    closed_rx: mpsc::UnboundedReceiver<()>,
    /// One entry per server-initiated close the client answered with a close frame
    close_acked_rx: mpsc::UnboundedReceiver<()>,
}

impl MockWsServer {
    /// Start a mock WebSocket server on a random port.
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (command_tx, _) = broadcast::channel::<Command>(100);
        let (accepted_tx, accepted_rx) = mpsc::unbounded_channel();
        let (closed_tx, closed_rx) = mpsc::unbounded_channel();
        let (close_acked_tx, close_acked_rx) = mpsc::unbounded_channel();

        let commands = command_tx.clone();

        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };

                // Subscribe before the handshake so nothing sent after the client
                // reports a connection can be missed.
                let mut command_rx = commands.subscribe();
                let paths = accepted_tx.clone();
                let Ok(mut ws_stream) =
                    tokio_tungstenite::accept_hdr_async(stream, |req: &Request, resp: Response| {
                        drop(paths.send(Accepted {
                            at: Instant::now(),
                            path: req.uri().path().to_owned(),
                        }));
                        Ok::<_, ErrorResponse>(resp)
                    })
                    .await
                else {
                    continue;
                };

                let closed = closed_tx.clone();
                let close_acked = close_acked_tx.clone();

                tokio::spawn(async move {
                    loop {
                        tokio::select! {
                            msg = ws_stream.next() => {
                                match msg {
                                    Some(Ok(Message::Close(_)) | Err(_)) | None => {
                                        drop(closed.send(()));
                                        break;
                                    }
                                    Some(Ok(_)) => {}
                                }
                            }
                            command = command_rx.recv() => {
                                match command {
                                    Ok(Command::Text(text)) => {
                                        if ws_stream.send(Message::Text(text.into())).await.is_err() {
                                            break;
                                        }
                                    }
                                    Ok(Command::Close) | Err(_) => {
                                        drop(ws_stream.close(None).await);
                                        let reply = timeout(WAIT, async {
                                            loop {
                                                match ws_stream.next().await {
                                                    Some(Ok(Message::Close(_))) => break true,
                                                    Some(Ok(_)) => {}
                                                    Some(Err(_)) | None => break false,
                                                }
                                            }
                                        });
                                        if reply.await.unwrap_or(false) {
                                            drop(close_acked.send(()));
                                        }
                                        break;
                                    }
                                }
                            }
                        }
                    }
                });
            }
        });

        Self {
            addr,
            command_tx,
            accepted_rx,
            closed_rx,
            close_acked_rx,
        }
    }

    /// Endpoint configuration a production dashboard served from this server would derive.
    pub fn endpoint(&self) -> EndpointConfig {
        let page = PageLocation::new("http:", self.addr.ip().to_string(), Some(self.addr.port()));
        EndpointConfig::new(&page, Deployment::Production)
    }

    /// Send a JSON frame to all connected clients.
    pub fn send(&self, message: &Value) {
        self.send_raw(&message.to_string());
    }

    /// Send a text frame verbatim to all connected clients.
    pub fn send_raw(&self, message: &str) {
        drop(self.command_tx.send(Command::Text(message.to_owned())));
    }

    /// Close every open connection from the server side.
    pub fn close_all(&self) {
        drop(self.command_tx.send(Command::Close));
    }

    /// Wait for the next completed handshake.
    pub async fn next_accepted(&mut self) -> Option<Accepted> {
        timeout(WAIT, self.accepted_rx.recv()).await.ok().flatten()
    }

    /// Handshakes completed so far that have not been observed yet.
    pub fn pending_accepted(&mut self) -> usize {
        let mut count = 0;
        while self.accepted_rx.try_recv().is_ok() {
            count += 1;
        }
        count
    }

    /// Wait until a client closes its side of a connection.
    pub async fn client_closed(&mut self) -> bool {
        timeout(WAIT, self.closed_rx.recv()).await.ok().flatten().is_some()
    }

    /// Wait until a client answers a server-initiated close with its own close frame.
    pub async fn close_acknowledged(&mut self) -> bool {
        timeout(WAIT, self.close_acked_rx.recv()).await.ok().flatten().is_some()
    }
}

/// An `https:` page whose port is a plain TCP listener that hangs up on every connection,
/// so each `wss:` handshake fails during TLS. Yields the instant of every accepted connection.
pub async fn plain_tcp_behind_https() -> (EndpointConfig, mpsc::UnboundedReceiver<Instant>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (accepted_tx, accepted_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            drop(accepted_tx.send(Instant::now()));
            drop(stream);
        }
    });

    let page = PageLocation::new("https:", addr.ip().to_string(), Some(addr.port()));
    (EndpointConfig::new(&page, Deployment::Production), accepted_rx)
}

/// An address nothing is listening on.
pub async fn refused_endpoint() -> EndpointConfig {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let page = PageLocation::new("http:", addr.ip().to_string(), Some(addr.port()));
    EndpointConfig::new(&page, Deployment::Production)
}

/// An address that accepts TCP connections but never completes a WebSocket handshake.
pub async fn silent_endpoint() -> EndpointConfig {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });

    let page = PageLocation::new("http:", addr.ip().to_string(), Some(addr.port()));
    EndpointConfig::new(&page, Deployment::Production)
}

pub fn fast_config() -> Config {
    Config::builder()
        .reconnect(ReconnectConfig::builder().delay(RECONNECT_DELAY).build())
        .build()
}

/// Callbacks that record every event together with the instant it fired.
pub fn recorder() -> (Callbacks, mpsc::UnboundedReceiver<(Event, Instant)>) {
    let (tx, rx) = mpsc::unbounded_channel();

    let data = tx.clone();
    let connected = tx.clone();
    let disconnected = tx.clone();
    let error = tx;

    let callbacks = Callbacks::new()
        .on_data(move |value| drop(data.send((Event::Data(value), Instant::now()))))
        .on_connected(move || drop(connected.send((Event::Connected, Instant::now()))))
        .on_disconnected(move || drop(disconnected.send((Event::Disconnected, Instant::now()))))
        .on_error(move |e| drop(error.send((Event::Error(e), Instant::now()))));

    (callbacks, rx)
}

/// Next recorded event, failing the test if none arrives in time.
pub async fn next_event(events: &mut mpsc::UnboundedReceiver<(Event, Instant)>) -> (Event, Instant) {
    timeout(WAIT, events.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("handler was dropped")
}

/// Assert nothing is recorded for `quiet`.
pub async fn assert_quiet(events: &mut mpsc::UnboundedReceiver<(Event, Instant)>, quiet: Duration) {
    if let Ok(Some((event, _))) = timeout(quiet, events.recv()).await {
        panic!("unexpected event {event:?}");
    }
}
