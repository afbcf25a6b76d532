// SPDX-License-Identifier: MIT OR Apache-2.0
//! Transport configuration: endpoint, TLS selection, timeouts, identity.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Serde helper — `Duration` as integer milliseconds.
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(val: &Duration, ser: S) -> Result<S::Ok, S::Error> {
        (val.as_millis() as u64).serialize(ser)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Duration, D::Error> {
        let ms: u64 = u64::deserialize(de)?;
        Ok(Duration::from_millis(ms))
    }
}

/// TLS settings for an endpoint. Presence selects `https`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsSettings {
    /// Verify the server certificate chain. Disable only against
    /// development endpoints.
    pub verify_certificates: bool,
}

impl Default for TlsSettings {
    fn default() -> Self {
        Self {
            verify_certificates: true,
        }
    }
}

/// Configuration for an [`HttpTransport`](crate::HttpTransport).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Endpoint host name or address.
    pub host: String,
    /// Endpoint port.
    pub port: u16,
    /// TLS settings; `Some` selects `https`, `None` selects `http`.
    pub tls: Option<TlsSettings>,
    /// Connection-establishment deadline.
    #[serde(with = "duration_millis")]
    pub connect_timeout: Duration,
    /// Deadline for the response to complete.
    #[serde(with = "duration_millis")]
    pub read_timeout: Duration,
    /// `Content-Type` sent with non-empty bodies.
    pub content_type: String,
    /// `User-Agent` identifying this client.
    pub client_name: String,
}

impl TransportConfig {
    /// Default connect and read deadlines.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Config for a plain-HTTP endpoint with default timeouts, JSON content
    /// type, and the stock client name.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            tls: None,
            connect_timeout: Self::DEFAULT_TIMEOUT,
            read_timeout: Self::DEFAULT_TIMEOUT,
            content_type: "application/json".to_string(),
            client_name: "courier-http".to_string(),
        }
    }

    /// Enable TLS with the given settings.
    #[must_use]
    pub fn with_tls(mut self, tls: TlsSettings) -> Self {
        self.tls = Some(tls);
        self
    }

    /// Override the connect deadline.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Override the read deadline.
    #[must_use]
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Override the content type sent with bodies.
    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    /// Override the `User-Agent` value.
    #[must_use]
    pub fn with_client_name(mut self, client_name: impl Into<String>) -> Self {
        self.client_name = client_name.into();
        self
    }

    /// `scheme://host:port` for this endpoint; `https` iff TLS is configured.
    #[must_use]
    pub fn base_url(&self) -> String {
        let scheme = if self.tls.is_some() { "https" } else { "http" };
        format!("{scheme}://{}:{}", self.host, self.port)
    }
}
