#![expect(
    clippy::module_name_repetitions,
    reason = "Connection types expose their domain in the name for clarity"
)]

use std::sync::Once;
use std::time::{Duration, Instant};

use backoff::backoff::{Backoff as _, Constant};
use futures::StreamExt as _;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use url::Url;

use super::config::Config;
use super::error::WsError;
use super::handler::Handler;
use super::message::{Reading, parse_reading};
use crate::Result;
use crate::endpoint::{EndpointConfig, EndpointPath};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How long to keep polling a closed socket so the close reply reaches the server.
const CLOSE_REPLY_TIMEOUT: Duration = Duration::from_secs(1);

static CRYPTO_PROVIDER: Once = Once::new();

/// Install the process-wide rustls provider used for `wss:` handshakes.
///
/// A provider the application installed earlier is left in place.
fn install_crypto_provider() {
    CRYPTO_PROVIDER.call_once(|| {
        _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// Connection state tracking.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Attempting to connect
    Connecting {
        /// Consecutive failed attempts before this one
        attempt: u32,
    },
    /// Successfully connected
    Connected {
        /// When the connection was established
        since: Instant,
    },
    /// Waiting out the reconnect delay after a disconnect
    Reconnecting {
        /// Consecutive failed attempts so far
        attempt: u32,
    },
    /// Terminal: disposed by the caller, or the retry limit was reached
    Disposed,
}

impl ConnectionState {
    /// Check if the connection is currently active.
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected { .. })
    }

    #[must_use]
    pub const fn is_disposed(self) -> bool {
        matches!(self, Self::Disposed)
    }
}

/// Why a live connection stopped.
enum Ended {
    /// The socket closed or failed; reconnect.
    Closed,
    /// The subscription was disposed; stop.
    Disposed,
}

/// Open a self-healing subscription to `path`.
///
/// Returns immediately; the handshake, frame dispatch and every reconnect run on a spawned
/// task that owns `handler`. Must be called from within a tokio runtime.
///
/// # Example
///
/// ```rust, no_run
/// use std::time::Duration;
///
/// use rpi_telemetry_client::endpoint::EndpointConfig;
/// use rpi_telemetry_client::ws::{Callbacks, Config, connect};
///
/// #[tokio::main]
/// async fn main() -> rpi_telemetry_client::Result<()> {
///     let callbacks = Callbacks::new().on_data(|celsius| println!("{celsius} °C"));
///     let subscription = connect(
///         EndpointConfig::development(),
///         Config::default(),
///         "/raspberry1",
///         callbacks,
///     )?;
///
///     tokio::time::sleep(Duration::from_secs(60)).await;
///     subscription.dispose();
///     Ok(())
/// }
/// ```
pub fn connect<H: Handler>(
    endpoint: EndpointConfig,
    config: Config,
    path: &str,
    handler: H,
) -> Result<Subscription> {
    let path = EndpointPath::new(path)?;
    // Fail fast on a host the URL parser rejects; each attempt resolves again.
    endpoint.resolve(&path)?;
    install_crypto_provider();

    let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting { attempt: 0 });
    let cancel = CancellationToken::new();

    let task = tokio::spawn(connection_loop(
        endpoint,
        path,
        config,
        handler,
        state_tx,
        cancel.clone(),
    ));

    Ok(Subscription {
        cancel,
        state_rx,
        task: Some(task),
    })
}

/// Handle to one logical subscription.
///
/// Disposing (explicitly or by dropping the handle) closes the live socket and cancels any pending
/// reconnect. The task checks for disposal before every handler call, so at most a call that was
/// already running when `dispose` returned can still complete. Await [`Subscription::shutdown`]
/// to know that no call is running or will follow.
#[must_use = "dropping a Subscription disposes it"]
#[derive(Debug)]
pub struct Subscription {
    cancel: CancellationToken,
    state_rx: watch::Receiver<ConnectionState>,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Stop the subscription. Idempotent.
    pub fn dispose(&self) {
        self.cancel.cancel();
    }

    /// Dispose and wait until the socket is closed and the handler dropped.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            #[cfg(feature = "tracing")]
            tracing::error!("Subscription task failed: {e:?}");
            #[cfg(not(feature = "tracing"))]
            let _ = &e;
        }
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.cancel.is_cancelled() || self.state().is_disposed()
    }

    /// Get the current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Subscribe to connection state changes.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Publishes the subscription state and reports `Disposed` however the task ends, panics included.
struct StateReporter(watch::Sender<ConnectionState>);

impl StateReporter {
    fn set(&self, state: ConnectionState) {
        _ = self.0.send(state);
    }
}

impl Drop for StateReporter {
    fn drop(&mut self) {
        _ = self.0.send(ConnectionState::Disposed);
    }
}

/// Hands events to the handler until the subscription is disposed.
struct Delivery<H> {
    handler: H,
    cancel: CancellationToken,
}

impl<H: Handler> Delivery<H> {
    fn is_live(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    fn connected(&mut self) {
        if self.is_live() {
            self.handler.on_connected();
        }
    }

    fn disconnected(&mut self) {
        if self.is_live() {
            self.handler.on_disconnected();
        }
    }

    fn frame(&mut self, bytes: &[u8]) {
        if self.is_live() {
            dispatch(&mut self.handler, bytes);
        }
    }
}

/// Connect, dispatch, and reconnect after a fixed delay until cancelled.
async fn connection_loop<H: Handler>(
    endpoint: EndpointConfig,
    path: EndpointPath,
    config: Config,
    handler: H,
    state_tx: watch::Sender<ConnectionState>,
    cancel: CancellationToken,
) {
    let state = StateReporter(state_tx);
    let mut delivery = Delivery {
        handler,
        cancel: cancel.clone(),
    };
    let mut attempt = 0_u32;
    let mut backoff: Constant = config.reconnect.clone().into();

    loop {
        state.set(ConnectionState::Connecting { attempt });

        let opened = tokio::select! {
            biased;

            () = cancel.cancelled() => break,
            result = open(&endpoint, &path, config.connect_timeout) => result,
        };

        match opened {
            Ok(ws_stream) => {
                attempt = 0;
                backoff.reset();
                state.set(ConnectionState::Connected {
                    since: Instant::now(),
                });

                #[cfg(feature = "tracing")]
                tracing::debug!(%path, "Telemetry connection established");

                delivery.connected();

                let ended = handle_connection(ws_stream, &mut delivery, &cancel).await;
                if matches!(ended, Ended::Disposed) {
                    break;
                }
            }
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(%path, "Unable to connect: {e}");
                #[cfg(not(feature = "tracing"))]
                let _ = &e;
                attempt = attempt.saturating_add(1);
            }
        }

        if cancel.is_cancelled() {
            break;
        }
        delivery.disconnected();

        // Check if we should stop reconnecting
        if let Some(max) = config.reconnect.max_attempts
            && attempt >= max
        {
            #[cfg(feature = "tracing")]
            tracing::warn!(%path, attempt, "Giving up after reaching the reconnect limit");
            break;
        }

        state.set(ConnectionState::Reconnecting { attempt });

        let delay = backoff.next_backoff().unwrap_or(config.reconnect.delay);

        #[cfg(feature = "tracing")]
        tracing::debug!(%path, ?delay, attempt, "Scheduling reconnect");

        tokio::select! {
            biased;

            () = cancel.cancelled() => break,
            () = sleep(delay) => {}
        }
    }
}

/// Resolve the URL for this attempt and perform the handshake.
async fn open(
    endpoint: &EndpointConfig,
    path: &EndpointPath,
    connect_timeout: Option<Duration>,
) -> Result<WsStream> {
    let url: Url = endpoint.resolve(path)?;

    #[cfg(feature = "tracing")]
    tracing::trace!(%url, "Opening telemetry socket");

    let handshake = connect_async(url.as_str());
    let (ws_stream, _) = match connect_timeout {
        Some(limit) => timeout(limit, handshake)
            .await
            .map_err(|_elapsed| WsError::Timeout(limit))??,
        None => handshake.await?,
    };

    Ok(ws_stream)
}

/// Dispatch frames from an open socket until it closes or the subscription is disposed.
async fn handle_connection<H: Handler>(
    mut ws_stream: WsStream,
    delivery: &mut Delivery<H>,
    cancel: &CancellationToken,
) -> Ended {
    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                if let Err(e) = ws_stream.close(None).await {
                    #[cfg(feature = "tracing")]
                    tracing::debug!("Error closing disposed connection: {e}");
                    #[cfg(not(feature = "tracing"))]
                    let _ = &e;
                }
                return Ended::Disposed;
            }

            msg = ws_stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        #[cfg(feature = "tracing")]
                        tracing::trace!(%text, "Received WebSocket text message");

                        delivery.frame(text.as_bytes());
                    }
                    Some(Ok(Message::Close(frame))) => {
                        #[cfg(feature = "tracing")]
                        tracing::debug!(?frame, "Server closed the connection");
                        #[cfg(not(feature = "tracing"))]
                        let _ = &frame;

                        // Keep polling until the peer hangs up so the queued close reply is sent.
                        let flushed = async { while ws_stream.next().await.is_some() {} };
                        return tokio::select! {
                            biased;

                            () = cancel.cancelled() => Ended::Disposed,
                            _ = timeout(CLOSE_REPLY_TIMEOUT, flushed) => Ended::Closed,
                        };
                    }
                    Some(Err(e)) => {
                        let error = WsError::Connection(e);
                        #[cfg(feature = "tracing")]
                        tracing::warn!("Connection lost: {error}");
                        #[cfg(not(feature = "tracing"))]
                        let _ = &error;
                        return Ended::Closed;
                    }
                    None => {
                        #[cfg(feature = "tracing")]
                        tracing::debug!("{}", WsError::ConnectionClosed);
                        return Ended::Closed;
                    }
                    Some(Ok(_)) => {
                        // Ignore binary frames; tungstenite answers pings itself.
                    }
                }
            }
        }
    }
}

fn dispatch<H: Handler>(handler: &mut H, bytes: &[u8]) {
    match parse_reading(bytes) {
        Ok(Some(Reading::Data(value))) => handler.on_data(value),
        Ok(Some(Reading::Error(error))) => handler.on_error(error),
        Ok(None) => {}
        Err(e) => {
            #[cfg(feature = "tracing")]
            tracing::warn!(error = %e, "Failed to parse WebSocket message");
            handler.on_error(e.to_string());
        }
    }
}
