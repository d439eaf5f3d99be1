//! HTTP transport for backend requests.
//!
//! This layer sends one request and classifies the outcome. It knows nothing
//! about token refresh; that lives in [`ApiClient`](crate::ApiClient).

use reqwest::Method;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, trace};

use fieldsync_core::error::{Error, HttpError, NetworkError};
use fieldsync_core::{AccessToken, BaseUrl, Result};

use crate::config::ClientConfig;
use crate::endpoints::ErrorResponse;

/// Map a reqwest error onto the crate taxonomy.
pub(crate) fn map_reqwest(err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::Network(NetworkError::Timeout)
    } else if err.is_connect() {
        Error::Network(NetworkError::Connection {
            message: err.to_string(),
        })
    } else if err.is_decode() {
        Error::UnexpectedResponse {
            message: err.to_string(),
        }
    } else {
        Error::Network(NetworkError::Other {
            message: err.to_string(),
        })
    }
}

/// A request that can be sent more than once.
#[derive(Debug, Clone)]
pub(crate) struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
        }
    }

    pub fn with_json<B: serde::Serialize + ?Sized>(mut self, body: &B) -> Result<Self> {
        let value = serde_json::to_value(body).map_err(|e| {
            Error::InvalidInput(fieldsync_core::error::InvalidInputError::Other {
                message: format!("request body is not serializable: {}", e),
            })
        })?;
        self.body = Some(value);
        Ok(self)
    }
}

/// HTTP client bound to one backend.
#[derive(Debug, Clone)]
pub(crate) struct HttpTransport {
    client: reqwest::Client,
    base: BaseUrl,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("fieldsync/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()
            .map_err(map_reqwest)?;

        Ok(Self {
            client,
            base: config.base_url.clone(),
        })
    }

    pub fn base(&self) -> &BaseUrl {
        &self.base
    }

    /// Send a request, returning the response only if its status is 2xx.
    #[instrument(skip(self, request, token), fields(method = %request.method, path = %request.path))]
    pub async fn send(
        &self,
        request: &ApiRequest,
        token: Option<&AccessToken>,
    ) -> Result<reqwest::Response> {
        let url = self.base.api_url(&request.path);
        debug!(authed = token.is_some(), "Sending request");

        let mut builder = self.client.request(request.method.clone(), &url);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        if let Some(token) = token {
            builder = builder.bearer_auth(token.as_str());
        }

        let response = builder.send().await.map_err(map_reqwest)?;
        let status = response.status();
        trace!(status = %status, "Response received");

        if status.is_success() {
            Ok(response)
        } else {
            Err(Error::Http(parse_error_response(response).await))
        }
    }
}

/// Decode a JSON body. An empty body decodes as `null`.
pub(crate) async fn decode<R: DeserializeOwned>(response: reqwest::Response) -> Result<R> {
    let bytes = response.bytes().await.map_err(map_reqwest)?;
    let body: &[u8] = if bytes.iter().all(u8::is_ascii_whitespace) {
        b"null"
    } else {
        &bytes
    };

    serde_json::from_slice(body).map_err(|e| Error::UnexpectedResponse {
        message: e.to_string(),
    })
}

async fn parse_error_response(response: reqwest::Response) -> HttpError {
    let status = response.status().as_u16();

    match response.json::<ErrorResponse>().await {
        Ok(body) => HttpError::new(status, body.message.or(body.error)),
        Err(_) => HttpError::new(status, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_creation() {
        let base = BaseUrl::new("https://api.fieldsync.example").unwrap();
        let transport = HttpTransport::new(&ClientConfig::new(base.clone())).unwrap();
        assert_eq!(transport.base(), &base);
    }

    #[test]
    fn request_body_is_captured_for_replay() {
        let request = ApiRequest::new(Method::POST, "/tickets/engineer/location/t-1")
            .with_json(&serde_json::json!({ "latitude": 1.5, "longitude": 2.5 }))
            .unwrap();

        let replay = request.clone();
        assert_eq!(replay.body, request.body);
        assert_eq!(replay.path, "/tickets/engineer/location/t-1");
    }
}
