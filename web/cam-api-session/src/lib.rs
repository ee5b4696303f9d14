//! HTTP session for talking to a camera-management server.
//!
//! The server authenticates requests with two cookies (a session id and a
//! CSRF token) which are obtained out of band. A [HttpSession] carries these
//! in a cookie store, attaches them to every request, stores any cookies the
//! server sets in its responses, and turns non-success status codes into
//! [Error::RequestFailed].
//!
//! # Examples
//!
//! ```rust,no_run
//! use cam_api_session::{HttpSession, SessionCookies};
//!
//! # async fn example() -> Result<(), cam_api_session::Error> {
//! let cookies = SessionCookies::new("abc123", "csrf456");
//! let session = HttpSession::new("http://127.0.0.1:8000", &cookies)?;
//!
//! let url = session.url_for("/api/cams/3dafba3a")?;
//! let response = session.get(&url).await?;
//! let body = cam_api_session::collect_body(response).await?;
//! # Ok(())
//! # }
//! ```

// Copyright 2016-2025 Andrew D. Straw.
//
// Licensed under the Apache License, Version 2.0
// <http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

#![warn(missing_docs)]

use std::sync::Arc;

use http::{header, HeaderMap, HeaderValue, Method};
use parking_lot::RwLock;
use thiserror::Error;

/// Name of the cookie carrying the session id.
pub const SESSION_COOKIE: &str = "sessionid";
/// Name of the cookie carrying the CSRF token.
pub const CSRF_COOKIE: &str = "csrftoken";
/// Name of the header which must echo the CSRF token on mutating requests.
pub const CSRF_HEADER: &str = "x-csrftoken";

/// Request body type used by the session.
pub type MyBody = http_body_util::Full<bytes::Bytes>;

#[cfg(feature = "tls")]
type MyClient = hyper_util::client::legacy::Client<
    hyper_tls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>,
    MyBody,
>;

#[cfg(not(feature = "tls"))]
type MyClient =
    hyper_util::client::legacy::Client<hyper_util::client::legacy::connect::HttpConnector, MyBody>;

/// Errors that can occur during HTTP session operations.
#[derive(Error, Debug)]
pub enum Error {
    /// A wrapped error from the hyper HTTP client crate.
    #[error("hyper error `{0}`")]
    Hyper(#[from] hyper::Error),
    /// A wrapped error from the hyper-util HTTP utilities crate.
    #[error("hyper-util error `{0}`")]
    HyperUtil(#[from] hyper_util::client::legacy::Error),
    /// The request URL could not be parsed.
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The request URL could not be converted for the HTTP client.
    #[error("invalid uri: {0}")]
    InvalidUri(#[from] http::uri::InvalidUri),
    /// A header value contained characters not allowed in HTTP headers.
    #[error("invalid header value: {0}")]
    InvalidHeader(#[from] http::header::InvalidHeaderValue),
    /// The HTTP request could not be assembled.
    #[error("http error: {0}")]
    Http(#[from] http::Error),
    /// A cookie could not be stored.
    #[error("cookie `{name}` rejected: {msg}")]
    Cookie {
        /// Name of the cookie.
        name: String,
        /// Reason given by the cookie store.
        msg: String,
    },
    /// The base URL uses a scheme this session cannot speak.
    #[error("unsupported url scheme `{0}` (https requires the `tls` feature)")]
    UnsupportedScheme(String),
    /// The HTTP request was not successful.
    ///
    /// This error occurs when the server returns a non-success status code
    /// (anything other than 2xx).
    #[error("request not successful. status code: `{0}`")]
    RequestFailed(http::StatusCode),
}

/// The two static cookie values which authenticate us to the server.
#[derive(Clone)]
pub struct SessionCookies {
    session_id: String,
    csrf_token: String,
}

impl SessionCookies {
    /// Create from the session id and CSRF token.
    pub fn new(session_id: impl Into<String>, csrf_token: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            csrf_token: csrf_token.into(),
        }
    }

    /// The CSRF token.
    pub fn csrf_token(&self) -> &str {
        &self.csrf_token
    }
}

impl std::fmt::Debug for SessionCookies {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print the secrets into logs.
        f.debug_struct("SessionCookies")
            .field("session_id", &"<redacted>")
            .field("csrf_token", &"<redacted>")
            .finish()
    }
}

/// An HTTP session for communicating with a single server.
///
/// Cloning is cheap and clones share the cookie store and the connection
/// pool, so one session can serve several concurrent tasks.
#[derive(Clone)]
pub struct HttpSession {
    /// Base URL without trailing slash, e.g. `https://host` or `https://host/prefix`
    base: String,
    csrf_token: String,
    jar: Arc<RwLock<cookie_store::CookieStore>>,
    client: MyClient,
}

impl std::fmt::Debug for HttpSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpSession")
            .field("base", &self.base)
            .finish_non_exhaustive()
    }
}

impl HttpSession {
    /// Creates a new HTTP session for the specified base URL.
    ///
    /// The cookie store is seeded with `cookies` so that every request made
    /// through this session is authenticated. No request is made here.
    pub fn new(base_url: &str, cookies: &SessionCookies) -> Result<Self, Error> {
        let base = base_url.trim_end_matches('/').to_string();
        let parsed = url::Url::parse(&base)?;
        match parsed.scheme() {
            "http" => {}
            #[cfg(feature = "tls")]
            "https" => {}
            other => return Err(Error::UnsupportedScheme(other.to_string())),
        }

        let mut jar = cookie_store::CookieStore::default();
        for (name, value) in [
            (SESSION_COOKIE, &cookies.session_id),
            (CSRF_COOKIE, &cookies.csrf_token),
        ] {
            let mut cookie = cookie_store::RawCookie::new(name.to_string(), value.clone());
            cookie.set_path("/");
            jar.insert_raw(&cookie, &parsed).map_err(|e| Error::Cookie {
                name: name.to_string(),
                msg: e.to_string(),
            })?;
        }

        Ok(Self {
            base,
            csrf_token: cookies.csrf_token.clone(),
            jar: Arc::new(RwLock::new(jar)),
            client: build_client(),
        })
    }

    /// The base URL, without trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base
    }

    /// The CSRF token this session was created with.
    pub fn csrf_token(&self) -> &str {
        &self.csrf_token
    }

    /// Build an absolute URL from a server path such as `/api/cams/x`.
    pub fn url_for(&self, path: &str) -> Result<url::Url, Error> {
        let url = if path.starts_with('/') {
            format!("{}{path}", self.base)
        } else {
            format!("{}/{path}", self.base)
        };
        Ok(url::Url::parse(&url)?)
    }

    /// Makes a GET request.
    pub async fn get(&self, url: &url::Url) -> Result<hyper::Response<hyper::body::Incoming>, Error> {
        self.request(Method::GET, url, HeaderMap::new(), empty_body())
            .await
    }

    /// Makes a POST request.
    pub async fn post(
        &self,
        url: &url::Url,
        body: MyBody,
    ) -> Result<hyper::Response<hyper::body::Incoming>, Error> {
        self.request(Method::POST, url, HeaderMap::new(), body).await
    }

    /// Makes a PATCH request with additional headers.
    pub async fn patch(
        &self,
        url: &url::Url,
        headers: HeaderMap,
        body: MyBody,
    ) -> Result<hyper::Response<hyper::body::Incoming>, Error> {
        self.request(Method::PATCH, url, headers, body).await
    }

    /// Makes an HTTP request with the given method and additional headers.
    ///
    /// Session cookies and `Content-Type: application/json` are always set.
    /// Entries in `headers` are added last and override those.
    #[tracing::instrument(level = "debug", skip(self, url, headers, body), fields(url = %url))]
    pub async fn request(
        &self,
        method: Method,
        url: &url::Url,
        headers: HeaderMap,
        body: MyBody,
    ) -> Result<hyper::Response<hyper::body::Incoming>, Error> {
        let uri: hyper::Uri = url.as_str().parse()?;
        let mut req = hyper::Request::builder().method(method).uri(uri).body(body)?;

        if let Some(cookie) = self.cookie_header(url)? {
            req.headers_mut().insert(header::COOKIE, cookie);
        }
        req.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        for (name, value) in headers.iter() {
            req.headers_mut().insert(name.clone(), value.clone());
        }

        self.make_request(url, req).await
    }

    /// The `Cookie` header for a request to `url`, or `None` if no cookie
    /// applies.
    ///
    /// All applicable cookies are joined into a single header value.
    fn cookie_header(&self, url: &url::Url) -> Result<Option<HeaderValue>, Error> {
        let jar = self.jar.read();
        let pairs: Vec<String> = jar
            .get_request_values(url)
            .map(|(name, value)| format!("{name}={value}"))
            .collect();
        if pairs.is_empty() {
            return Ok(None);
        }
        Ok(Some(HeaderValue::from_str(&pairs.join("; "))?))
    }

    async fn make_request(
        &self,
        url: &url::Url,
        req: hyper::Request<MyBody>,
    ) -> Result<hyper::Response<hyper::body::Incoming>, Error> {
        tracing::trace!("making request {:?}", req);
        let response = self.client.request(req).await.map_err(|e| {
            tracing::error!("encountered error {e}: {e:?}");
            Error::from(e)
        })?;

        tracing::trace!("handling response {:?}", response);
        let response = handle_response(url, &self.jar, response);
        let status_code = response.status();
        if !status_code.is_success() {
            let body_str = match collect_body(response).await {
                Ok(body_bytes) => String::from_utf8_lossy(body_bytes.as_ref()).into_owned(),
                Err(e) => format!("<body unavailable: {e}>"),
            };
            tracing::debug!("response {status_code:?}: \"{body_str}\"");
            return Err(Error::RequestFailed(status_code));
        }
        Ok(response)
    }
}

#[cfg(feature = "tls")]
fn build_client() -> MyClient {
    hyper_util::client::legacy::Client::builder(hyper_util::rt::TokioExecutor::new())
        .build(hyper_tls::HttpsConnector::new())
}

#[cfg(not(feature = "tls"))]
fn build_client() -> MyClient {
    hyper_util::client::legacy::Client::builder(hyper_util::rt::TokioExecutor::new()).build_http()
}

/// An empty request body.
pub fn empty_body() -> MyBody {
    http_body_util::Full::new(bytes::Bytes::new())
}

/// A request body holding `buf`.
pub fn body_from_buf(buf: Vec<u8>) -> MyBody {
    http_body_util::Full::new(bytes::Bytes::from(buf))
}

/// Fold all chunks of a response body into one buffer.
pub async fn collect_body(
    response: hyper::Response<hyper::body::Incoming>,
) -> Result<bytes::Bytes, Error> {
    use http_body_util::BodyExt;
    Ok(response.into_body().collect().await?.to_bytes())
}

/// Store cookies from `Set-Cookie` headers of the response.
fn handle_response(
    url: &url::Url,
    jar: &RwLock<cookie_store::CookieStore>,
    mut response: hyper::Response<hyper::body::Incoming>,
) -> hyper::Response<hyper::body::Incoming> {
    use hyper::header::Entry::*;
    match response.headers_mut().entry(header::SET_COOKIE) {
        Occupied(e) => {
            let (_key, drain) = e.remove_entry_mult();
            let cookies: Vec<_> = drain
                .filter_map(|raw| {
                    let parsed = raw
                        .to_str()
                        .ok()
                        .and_then(|s| cookie_store::RawCookie::parse(s.to_string()).ok());
                    if parsed.is_none() {
                        tracing::warn!("ignoring unparseable Set-Cookie header {raw:?}");
                    }
                    parsed
                })
                .collect();
            jar.write().store_response_cookies(cookies.into_iter(), url);
        }
        Vacant(_) => {}
    }
    response
}
