//! WebSocket URL resolution for the telemetry feed.
//!
//! A dashboard served by the telemetry server talks back to the host that served it, while a
//! dashboard running from a local development server talks to the telemetry server on
//! `localhost:8000`. [`EndpointConfig`] captures that decision once at startup and turns
//! logical stream paths such as `/raspberry1` into fully-qualified `ws:`/`wss:` URLs.
//!
//! # Example
//!
//! ```
//! use rpi_telemetry_client::endpoint::{Deployment, EndpointConfig, EndpointPath, PageLocation};
//!
//! # fn main() -> rpi_telemetry_client::Result<()> {
//! let page = PageLocation::parse("https://pi.example.com:8443")?;
//! let config = EndpointConfig::new(&page, Deployment::Production);
//!
//! let url = config.resolve(&EndpointPath::new("/raspberry1")?)?;
//! assert_eq!(url.as_str(), "wss://pi.example.com:8443/raspberry1");
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::str::FromStr;

use url::Url;

use crate::Result;
use crate::error::Error;

/// Host used when the dashboard runs from a local development server.
pub const DEVELOPMENT_HOST: &str = "localhost";

/// Port the telemetry server listens on during local development.
pub const DEVELOPMENT_PORT: u16 = 8000;

const SECURE_PAGE_SCHEME: &str = "https:";

/// How the consumer of the feed was deployed.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Deployment {
    /// Served by the telemetry server itself; connect back to the serving host.
    Production,
    /// Served by a local development server; connect to [`DEVELOPMENT_HOST`]:[`DEVELOPMENT_PORT`].
    #[default]
    Development,
}

/// Scheme of the WebSocket connection, matched to the scheme the page was loaded over.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WsScheme {
    /// `ws:`
    Insecure,
    /// `wss:`
    Secure,
}

impl WsScheme {
    /// Pick `wss:` for pages loaded over `https:` and `ws:` for everything else.
    #[must_use]
    pub fn for_page_scheme(page_scheme: &str) -> Self {
        if page_scheme == SECURE_PAGE_SCHEME {
            Self::Secure
        } else {
            Self::Insecure
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Insecure => "ws:",
            Self::Secure => "wss:",
        }
    }
}

impl fmt::Display for WsScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The location the feed consumer was loaded from.
///
/// The scheme is normalized to the lowercase `scheme:` form (for example `https:`). A port of
/// `None` means the default port for the scheme.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageLocation {
    pub scheme: String,
    pub hostname: String,
    pub port: Option<u16>,
}

impl PageLocation {
    pub fn new<S: AsRef<str>, H: Into<String>>(scheme: S, hostname: H, port: Option<u16>) -> Self {
        let scheme = scheme.as_ref().trim_end_matches(':').to_ascii_lowercase();

        Self {
            scheme: format!("{scheme}:"),
            hostname: hostname.into(),
            port,
        }
    }

    /// Build a location from a base URL such as `http://192.168.1.20:8000`.
    ///
    /// Default ports are dropped, matching what a browser reports for `location.port`.
    pub fn parse(base_url: &str) -> Result<Self> {
        let url = Url::parse(base_url)?;
        let Some(host) = url.host_str() else {
            return Err(Error::validation(format!(
                "base url {base_url} does not contain a host"
            )));
        };

        Ok(Self::new(url.scheme(), host, url.port()))
    }
}

impl FromStr for PageLocation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Path of a logical telemetry stream, such as `/raspberry1`. Always starts with `/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EndpointPath(String);

impl EndpointPath {
    pub fn new<S: Into<String>>(path: S) -> Result<Self> {
        let path = path.into();
        if !path.starts_with('/') {
            return Err(Error::validation(format!(
                "endpoint path {path:?} must start with '/'"
            )));
        }

        Ok(Self(path))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for EndpointPath {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        Self::new(value)
    }
}

impl fmt::Display for EndpointPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Scheme, host and port every telemetry stream is reached through.
///
/// Computed once from the page location and deployment mode, then passed by value to the
/// connection manager. Resolution itself is pure string composition.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    pub scheme: WsScheme,
    pub host: String,
    pub port: Option<u16>,
}

impl EndpointConfig {
    #[must_use]
    pub fn new(location: &PageLocation, deployment: Deployment) -> Self {
        let scheme = WsScheme::for_page_scheme(&location.scheme);
        let (host, port) = match deployment {
            Deployment::Production => (
                strip_scheme(&location.hostname, &location.scheme).to_owned(),
                location.port,
            ),
            Deployment::Development => (DEVELOPMENT_HOST.to_owned(), Some(DEVELOPMENT_PORT)),
        };

        #[cfg(feature = "tracing")]
        tracing::debug!(
            ?deployment,
            page_scheme = %location.scheme,
            ws_scheme = %scheme,
            %host,
            ?port,
            "Resolved telemetry endpoint"
        );

        Self { scheme, host, port }
    }

    /// Development endpoint reached over plain `ws:`.
    #[must_use]
    pub fn development() -> Self {
        Self {
            scheme: WsScheme::Insecure,
            host: DEVELOPMENT_HOST.to_owned(),
            port: Some(DEVELOPMENT_PORT),
        }
    }

    /// Compose the WebSocket URL for `path`.
    ///
    /// The path already carries its leading `/`, so nothing is inserted between port and path.
    pub fn resolve(&self, path: &EndpointPath) -> Result<Url> {
        let raw = format!("{self}{path}");
        Ok(Url::parse(&raw)?)
    }
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self::development()
    }
}

impl fmt::Display for EndpointConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}//{}", self.scheme, self.host)?;
        if let Some(port) = self.port {
            write!(f, ":{port}")?;
        }
        Ok(())
    }
}

/// Host strings may be captured together with their scheme (`http://localhost`).
fn strip_scheme<'host>(host: &'host str, page_scheme: &str) -> &'host str {
    let host = host.strip_prefix(page_scheme).unwrap_or(host);
    let host = host.split_once("://").map_or(host, |(_, rest)| rest);
    host.trim_start_matches('/')
}
