//! Backend base URL type.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use url::Url;

use crate::error::{Error, InvalidInputError};

/// Path prefix under which the backend mounts its REST API.
const API_PREFIX: &str = "/api";

/// Path of the realtime endpoint, including the Engine.IO v4 WebSocket query.
const SOCKET_PATH: &str = "/socket.io/?EIO=4&transport=websocket";

/// A validated backend base URL.
///
/// This is the single value that selects the backend host. REST endpoints live
/// under `<base>/api`, the realtime channel under `<base>/socket.io/`.
///
/// # Example
///
/// ```
/// use fieldsync_core::BaseUrl;
///
/// let base = BaseUrl::new("https://api.fieldsync.example").unwrap();
/// assert_eq!(base.api_url("/auth/login"),
///            "https://api.fieldsync.example/api/auth/login");
/// assert_eq!(base.socket_url(),
///            "wss://api.fieldsync.example/socket.io/?EIO=4&transport=websocket");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BaseUrl(Url);

impl BaseUrl {
    /// Create a new base URL from a string, validating the format.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is not an absolute http(s) URL with a host.
    pub fn new(s: impl AsRef<str>) -> Result<Self, Error> {
        let s = s.as_ref();
        let url = Url::parse(s).map_err(|e| InvalidInputError::BaseUrl {
            value: s.to_string(),
            reason: e.to_string(),
        })?;

        Self::validate(&url, s)?;

        Ok(Self(url))
    }

    /// Returns the REST endpoint URL for a path such as `/auth/login`.
    pub fn api_url(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        format!("{}{}/{}", self.trimmed(), API_PREFIX, path)
    }

    /// Returns the WebSocket URL of the realtime channel.
    pub fn socket_url(&self) -> String {
        let base = self.trimmed();
        let ws_base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            base.to_string()
        };
        format!("{}{}", ws_base, SOCKET_PATH)
    }

    /// Returns the base URL as a string.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Returns the host string.
    pub fn host(&self) -> Option<&str> {
        self.0.host_str()
    }

    fn trimmed(&self) -> &str {
        // The URL crate always adds a trailing slash to root paths.
        self.0.as_str().trim_end_matches('/')
    }

    fn validate(url: &Url, original: &str) -> Result<(), Error> {
        if url.cannot_be_a_base() {
            return Err(InvalidInputError::BaseUrl {
                value: original.to_string(),
                reason: "must be an absolute URL".to_string(),
            }
            .into());
        }

        // Field deployments talk to LAN backends over plain HTTP, so both
        // schemes are accepted.
        let scheme = url.scheme();
        if scheme != "https" && scheme != "http" {
            return Err(InvalidInputError::BaseUrl {
                value: original.to_string(),
                reason: "must use http or https".to_string(),
            }
            .into());
        }

        if url.host_str().is_none() {
            return Err(InvalidInputError::BaseUrl {
                value: original.to_string(),
                reason: "must have a host".to_string(),
            }
            .into());
        }

        if url.query().is_some() || url.fragment().is_some() {
            return Err(InvalidInputError::BaseUrl {
                value: original.to_string(),
                reason: "must not carry a query or fragment".to_string(),
            }
            .into());
        }

        Ok(())
    }
}

impl fmt::Display for BaseUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.trimmed())
    }
}

impl FromStr for BaseUrl {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl Serialize for BaseUrl {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.trimmed())
    }
}

impl<'de> Deserialize<'de> for BaseUrl {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        BaseUrl::new(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_https_url() {
        let base = BaseUrl::new("https://api.fieldsync.example").unwrap();
        assert_eq!(base.host(), Some("api.fieldsync.example"));
    }

    #[test]
    fn lan_http_url_is_accepted() {
        let base = BaseUrl::new("http://192.168.1.241:8021").unwrap();
        assert_eq!(
            base.api_url("/tickets/engineer/active-ticket"),
            "http://192.168.1.241:8021/api/tickets/engineer/active-ticket"
        );
        assert_eq!(
            base.socket_url(),
            "ws://192.168.1.241:8021/socket.io/?EIO=4&transport=websocket"
        );
    }

    #[test]
    fn trailing_slash_is_normalized() {
        let base = BaseUrl::new("https://api.fieldsync.example/").unwrap();
        assert_eq!(
            base.api_url("auth/login"),
            "https://api.fieldsync.example/api/auth/login"
        );
        assert_eq!(base.to_string(), "https://api.fieldsync.example");
    }

    #[test]
    fn sub_path_is_preserved() {
        let base = BaseUrl::new("https://example.com/fieldsync").unwrap();
        assert_eq!(
            base.api_url("/auth/refresh-token"),
            "https://example.com/fieldsync/api/auth/refresh-token"
        );
    }

    #[test]
    fn rejects_other_schemes() {
        assert!(BaseUrl::new("ftp://example.com").is_err());
        assert!(BaseUrl::new("file:///tmp/backend").is_err());
    }

    #[test]
    fn rejects_relative_url() {
        assert!(BaseUrl::new("/api").is_err());
    }

    #[test]
    fn rejects_query() {
        assert!(BaseUrl::new("https://example.com/?env=dev").is_err());
    }
}
