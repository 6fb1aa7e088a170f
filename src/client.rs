use std::sync::Arc;

use async_stream::stream;
use futures::Stream;
use tokio::sync::mpsc;
use url::Url;

use crate::Result;
use crate::endpoint::{Deployment, EndpointConfig, EndpointPath, PageLocation};
use crate::ws::{Config, Event, Handler, Subscription, connect};

/// Entry point for telemetry subscriptions against one deployment.
///
/// Holds the endpoint configuration computed at startup together with the connection settings,
/// and opens any number of independent subscriptions with them.
///
/// # Examples
///
/// ```rust, no_run
/// use futures::StreamExt as _;
/// use rpi_telemetry_client::Client;
/// use rpi_telemetry_client::endpoint::Deployment;
/// use rpi_telemetry_client::ws::{Config, Event};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let client = Client::from_location("http://192.168.1.20:8000", Deployment::Production, Config::default())?;
///
///     let (_subscription, stream) = client.stream("/raspberry1")?;
///     let mut stream = Box::pin(stream);
///
///     while let Some(event) = stream.next().await {
///         if let Event::Data(celsius) = event {
///             println!("{celsius} °C");
///         }
///     }
///
///     Ok(())
/// }
/// ```
#[derive(Clone, Debug)]
pub struct Client {
    inner: Arc<ClientInner>,
}

#[derive(Debug)]
struct ClientInner {
    /// Scheme, host and port every stream is reached through
    endpoint: EndpointConfig,
    /// Reconnect and handshake settings shared by all subscriptions
    config: Config,
}

impl Default for Client {
    fn default() -> Self {
        Self::new(EndpointConfig::development(), Config::default())
    }
}

impl Client {
    #[must_use]
    pub fn new(endpoint: EndpointConfig, config: Config) -> Self {
        Self {
            inner: Arc::new(ClientInner { endpoint, config }),
        }
    }

    /// Derive the endpoint from the base URL the consumer was served from.
    pub fn from_location(base_url: &str, deployment: Deployment, config: Config) -> Result<Self> {
        let location = PageLocation::parse(base_url)?;
        Ok(Self::new(
            EndpointConfig::new(&location, deployment),
            config,
        ))
    }

    #[must_use]
    pub fn endpoint_config(&self) -> &EndpointConfig {
        &self.inner.endpoint
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// The URL a subscription to `path` would connect to.
    pub fn url(&self, path: &str) -> Result<Url> {
        self.inner.endpoint.resolve(&EndpointPath::new(path)?)
    }

    /// Open a subscription that reports to `handler`.
    pub fn connect<H: Handler>(&self, path: &str, handler: H) -> Result<Subscription> {
        connect(
            self.inner.endpoint.clone(),
            self.inner.config.clone(),
            path,
            handler,
        )
    }

    /// Open a subscription and receive its events as a stream.
    ///
    /// The stream ends once the subscription is disposed and its task has stopped.
    pub fn stream(&self, path: &str) -> Result<(Subscription, impl Stream<Item = Event>)> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Event>();
        let subscription = self.connect(path, tx)?;

        let events = stream! {
            while let Some(event) = rx.recv().await {
                yield event;
            }
        };

        Ok((subscription, events))
    }
}
