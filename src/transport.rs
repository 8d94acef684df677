//! Transport seam: how the monolith fetches resources.
//!
//! The monolith borrows a [`Transport`] for the duration of a load and never
//! keeps it. Non-2xx statuses are ordinary responses; only failures to get a
//! response at all are errors.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};

use serde_json::Value;

use crate::error::MonolithError;

#[cfg(feature = "remote")]
use std::time::Duration;

/// Default timeout for HTTP requests (10 seconds).
#[cfg(feature = "remote")]
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// A fetched resource.
#[derive(Debug, Clone, PartialEq)]
pub struct RestResponse {
    pub status: u16,
    /// Path that produced this response.
    pub path: String,
    /// Decoded JSON body (`Null` when the body was not JSON).
    pub body: Value,
    pub headers: BTreeMap<String, String>,
}

impl RestResponse {
    pub fn new(status: u16, path: impl Into<String>, body: Value) -> Self {
        Self {
            status,
            path: path.into(),
            body,
            headers: BTreeMap::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Header lookup, ignoring case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, 200 | 201)
    }
}

/// Fetches REST resources for the monolith.
pub trait Transport {
    /// GET a path relative to the service root.
    fn get(&self, path: &str) -> Result<RestResponse, MonolithError>;

    /// Service base URL, used to name captures.
    fn base_url(&self) -> Option<&str> {
        None
    }
}

impl<T: Transport + ?Sized> Transport for &T {
    fn get(&self, path: &str) -> Result<RestResponse, MonolithError> {
        (**self).get(path)
    }

    fn base_url(&self) -> Option<&str> {
        (**self).base_url()
    }
}

/// In-memory transport serving canned responses.
///
/// Unknown paths answer 404. Every request is logged, which makes it the
/// transport of choice for offline replay and for tests.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    responses: HashMap<String, RestResponse>,
    requests: RefCell<Vec<String>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` with status 200 at `path`.
    pub fn insert(&mut self, path: impl Into<String>, body: Value) -> &mut Self {
        let path = path.into();
        let response = RestResponse::new(200, path.clone(), body);
        self.responses.insert(path, response);
        self
    }

    /// Serve an arbitrary response at its own path.
    pub fn insert_response(&mut self, response: RestResponse) -> &mut Self {
        self.responses.insert(response.path.clone(), response);
        self
    }

    /// Paths requested so far, in order.
    pub fn requests(&self) -> Vec<String> {
        self.requests.borrow().clone()
    }

    /// Number of times `path` was requested.
    pub fn request_count(&self, path: &str) -> usize {
        self.requests.borrow().iter().filter(|p| *p == path).count()
    }
}

impl Transport for MemoryTransport {
    fn get(&self, path: &str) -> Result<RestResponse, MonolithError> {
        self.requests.borrow_mut().push(path.to_string());
        Ok(self
            .responses
            .get(path)
            .cloned()
            .unwrap_or_else(|| RestResponse::new(404, path, Value::Null)))
    }
}

/// Blocking HTTP transport.
///
/// Requires the `remote` feature (enabled by default).
#[cfg(feature = "remote")]
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::blocking::Client,
    base_url: String,
    credentials: Option<(String, String)>,
    session_token: Option<String>,
}

#[cfg(feature = "remote")]
impl HttpTransport {
    /// Create a transport for the service at `base_url` (scheme and host).
    ///
    /// # Errors
    ///
    /// Returns `MonolithError::NetworkError` if the client cannot be built.
    pub fn new(base_url: impl Into<String>) -> Result<Self, MonolithError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let client = reqwest::blocking::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|source| MonolithError::NetworkError {
                url: base_url.clone(),
                source,
            })?;
        Ok(Self {
            client,
            base_url,
            credentials: None,
            session_token: None,
        })
    }

    /// Authenticate every request with HTTP basic auth.
    pub fn basic_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some((username.into(), password.into()));
        self
    }

    /// Authenticate every request with an existing Redfish session token.
    pub fn session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }
}

#[cfg(feature = "remote")]
impl Transport for HttpTransport {
    fn get(&self, path: &str) -> Result<RestResponse, MonolithError> {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!("GET {}", url);

        let mut request = self.client.get(&url);
        if let Some((user, pass)) = &self.credentials {
            request = request.basic_auth(user, Some(pass));
        }
        if let Some(token) = &self.session_token {
            request = request.header("X-Auth-Token", token);
        }

        let response = request
            .send()
            .map_err(|source| MonolithError::NetworkError {
                url: url.clone(),
                source,
            })?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
            .collect();
        let text = response
            .text()
            .map_err(|source| MonolithError::NetworkError {
                url: url.clone(),
                source,
            })?;
        // Error pages are often HTML; the status alone drives the crawl.
        let body = serde_json::from_str(&text).unwrap_or(Value::Null);

        Ok(RestResponse {
            status,
            path: path.to_string(),
            body,
            headers,
        })
    }

    fn base_url(&self) -> Option<&str> {
        Some(&self.base_url)
    }
}
