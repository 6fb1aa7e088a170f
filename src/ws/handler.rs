//! Subscriber side of a telemetry subscription.

use tokio::sync::mpsc;

/// Receives lifecycle and data events for one subscription.
///
/// Every method defaults to doing nothing, so implementors only override what they care about.
/// Methods are called from the subscription's task, one at a time and in the order the
/// transport produced the underlying frames.
///
/// # Example
///
/// ```
/// use rpi_telemetry_client::ws::Handler;
///
/// #[derive(Default)]
/// struct Latest(Option<f64>);
///
/// impl Handler for Latest {
///     fn on_data(&mut self, value: f64) {
///         self.0 = Some(value);
///     }
/// }
/// ```
pub trait Handler: Send + 'static {
    /// A successful telemetry frame arrived.
    fn on_data(&mut self, value: f64) {
        let _ = value;
    }

    /// The WebSocket handshake completed.
    fn on_connected(&mut self) {}

    /// The connection closed or could not be opened. A reconnect follows.
    fn on_disconnected(&mut self) {}

    /// The server reported a failure, or a frame could not be decoded.
    fn on_error(&mut self, error: String) {
        let _ = error;
    }
}

type DataFn = Box<dyn FnMut(f64) + Send>;
type LifecycleFn = Box<dyn FnMut() + Send>;
type ErrorFn = Box<dyn FnMut(String) + Send>;

/// Closure-based [`Handler`]; any callback may be left out.
///
/// ```
/// use rpi_telemetry_client::ws::Callbacks;
///
/// let callbacks = Callbacks::new()
///     .on_data(|celsius| println!("{celsius} °C"))
///     .on_error(|error| eprintln!("telemetry error: {error}"));
/// ```
#[derive(Default)]
pub struct Callbacks {
    data: Option<DataFn>,
    connected: Option<LifecycleFn>,
    disconnected: Option<LifecycleFn>,
    error: Option<ErrorFn>,
}

impl Callbacks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn on_data<F: FnMut(f64) + Send + 'static>(mut self, f: F) -> Self {
        self.data = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn on_connected<F: FnMut() + Send + 'static>(mut self, f: F) -> Self {
        self.connected = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn on_disconnected<F: FnMut() + Send + 'static>(mut self, f: F) -> Self {
        self.disconnected = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn on_error<F: FnMut(String) + Send + 'static>(mut self, f: F) -> Self {
        self.error = Some(Box::new(f));
        self
    }
}

impl std::fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callbacks")
            .field("data", &self.data.is_some())
            .field("connected", &self.connected.is_some())
            .field("disconnected", &self.disconnected.is_some())
            .field("error", &self.error.is_some())
            .finish()
    }
}

impl Handler for Callbacks {
    fn on_data(&mut self, value: f64) {
        if let Some(f) = self.data.as_mut() {
            f(value);
        }
    }

    fn on_connected(&mut self) {
        if let Some(f) = self.connected.as_mut() {
            f();
        }
    }

    fn on_disconnected(&mut self) {
        if let Some(f) = self.disconnected.as_mut() {
            f();
        }
    }

    fn on_error(&mut self, error: String) {
        if let Some(f) = self.error.as_mut() {
            f(error);
        }
    }
}

/// A subscription event, for consumers that prefer channels or streams to callbacks.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Connected,
    Disconnected,
    Data(f64),
    Error(String),
}

/// Forwards every event into the channel. Events are dropped once the receiver is gone.
impl Handler for mpsc::UnboundedSender<Event> {
    fn on_data(&mut self, value: f64) {
        _ = self.send(Event::Data(value));
    }

    fn on_connected(&mut self) {
        _ = self.send(Event::Connected);
    }

    fn on_disconnected(&mut self) {
        _ = self.send(Event::Disconnected);
    }

    fn on_error(&mut self, error: String) {
        _ = self.send(Event::Error(error));
    }
}
