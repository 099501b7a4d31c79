//! Introducer locator parsing.
//!
//! The locator is the shared bootstrap secret of the storage grid: the
//! address every storage client and provider uses to find the introducer.
//! The grammar is deliberately minimal:
//!
//! ```text
//! scheme://identity@transport:host:port/path
//! ```
//!
//! e.g. `pb://u5c2...@tcp:10.100.0.7:3458/introducer`. Parsing preserves the
//! raw string so that locator comparison (the idempotent-regeneration check)
//! is exact rather than canonicalized.

use std::fmt;
use std::str::FromStr;

use snafu::Snafu;

/// Errors rejecting a malformed locator string.
#[derive(Debug, Snafu, PartialEq, Eq)]
pub enum LocatorError {
    #[snafu(display("locator is empty"))]
    Empty,

    #[snafu(display("locator is missing a '<scheme>://' prefix"))]
    MissingScheme,

    #[snafu(display("locator is missing an '@' between identity and transport"))]
    MissingIdentity,

    #[snafu(display("locator is missing a '/<path>' suffix"))]
    MissingPath,

    #[snafu(display("locator endpoint '{endpoint}' is not 'transport:host:port'"))]
    MalformedEndpoint { endpoint: String },

    #[snafu(display("locator port '{port}' is not a valid port number"))]
    InvalidPort { port: String },
}

/// A parsed introducer locator.
///
/// Equality is defined over the raw string: two locators that differ only in
/// formatting are treated as different, which keeps the "has the locator
/// changed" check byte-exact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntroducerLocator {
    raw: String,
    scheme: String,
    identity: String,
    transport: String,
    host: String,
    port: u16,
    path: String,
}

impl IntroducerLocator {
    /// The original locator string, exactly as provided.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn transport(&self) -> &str {
        &self.transport
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl fmt::Display for IntroducerLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for IntroducerLocator {
    type Err = LocatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        if raw.is_empty() {
            return Err(LocatorError::Empty);
        }

        let (scheme, rest) = raw.split_once("://").ok_or(LocatorError::MissingScheme)?;
        if scheme.is_empty() {
            return Err(LocatorError::MissingScheme);
        }

        let (identity, rest) = rest.split_once('@').ok_or(LocatorError::MissingIdentity)?;
        if identity.is_empty() {
            return Err(LocatorError::MissingIdentity);
        }

        let (endpoint, path) = rest.split_once('/').ok_or(LocatorError::MissingPath)?;
        if path.is_empty() {
            return Err(LocatorError::MissingPath);
        }

        // endpoint is transport:host:port; host may itself contain ':'
        // (IPv6), so take the transport from the front and the port from
        // the back.
        let (transport, hostport) = endpoint.split_once(':').ok_or_else(|| LocatorError::MalformedEndpoint {
            endpoint: endpoint.to_string(),
        })?;
        let (host, port_str) = hostport.rsplit_once(':').ok_or_else(|| LocatorError::MalformedEndpoint {
            endpoint: endpoint.to_string(),
        })?;
        if transport.is_empty() || host.is_empty() {
            return Err(LocatorError::MalformedEndpoint {
                endpoint: endpoint.to_string(),
            });
        }
        let port: u16 = port_str.parse().map_err(|_| LocatorError::InvalidPort {
            port: port_str.to_string(),
        })?;

        Ok(Self {
            raw: raw.to_string(),
            scheme: scheme.to_string(),
            identity: identity.to_string(),
            transport: transport.to_string(),
            host: host.to_string(),
            port,
            path: path.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_locator() {
        let locator: IntroducerLocator = "pb://abc123@tcp:10.100.0.1:3458/introducer".parse().unwrap();
        assert_eq!(locator.scheme(), "pb");
        assert_eq!(locator.identity(), "abc123");
        assert_eq!(locator.transport(), "tcp");
        assert_eq!(locator.host(), "10.100.0.1");
        assert_eq!(locator.port(), 3458);
        assert_eq!(locator.path(), "introducer");
        assert_eq!(locator.as_str(), "pb://abc123@tcp:10.100.0.1:3458/introducer");
    }

    #[test]
    fn trims_surrounding_whitespace() {
        let locator: IntroducerLocator = "  pb://x@tcp:host:1/p\n".parse().unwrap();
        assert_eq!(locator.as_str(), "pb://x@tcp:host:1/p");
    }

    #[test]
    fn rejects_empty() {
        assert_eq!("".parse::<IntroducerLocator>(), Err(LocatorError::Empty));
        assert_eq!("   ".parse::<IntroducerLocator>(), Err(LocatorError::Empty));
    }

    #[test]
    fn rejects_missing_scheme() {
        assert_eq!("abc@tcp:h:1/p".parse::<IntroducerLocator>(), Err(LocatorError::MissingScheme));
    }

    #[test]
    fn rejects_missing_identity() {
        assert_eq!(
            "pb://tcp:10.100.0.1:3458/introducer".parse::<IntroducerLocator>(),
            Err(LocatorError::MissingIdentity)
        );
    }

    #[test]
    fn rejects_missing_path() {
        assert_eq!(
            "pb://abc@tcp:10.100.0.1:3458".parse::<IntroducerLocator>(),
            Err(LocatorError::MissingPath)
        );
    }

    #[test]
    fn rejects_bad_port() {
        let err = "pb://abc@tcp:10.100.0.1:notaport/x".parse::<IntroducerLocator>().unwrap_err();
        assert!(matches!(err, LocatorError::InvalidPort { .. }));
    }

    #[test]
    fn rejects_truncated_endpoint() {
        let err = "pb://abc@tcp/x".parse::<IntroducerLocator>().unwrap_err();
        assert!(matches!(err, LocatorError::MalformedEndpoint { .. }));
    }
}
