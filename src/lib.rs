#![doc = include_str!("../README.md")]

mod activity;
mod decode;
mod icy;
mod notify;
pub mod patch;
mod player;
mod playlist;
mod progress;
mod scrobble;
mod views;

pub use activity::*;
pub use decode::{AudioFormat, Codec, NoSeek};
pub use icy::*;
pub use notify::*;
pub use patch::PatchOp;
pub use player::*;
pub use playlist::*;
pub use progress::*;
pub use scrobble::*;
pub use views::*;

use arc_swap::ArcSwap;
use async_recursion::async_recursion;
use reqwest::{Method, StatusCode, header};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::sync::Arc;
use strum_macros::{AsRefStr, Display, EnumString};
use tokio::sync::Semaphore;
use url::Url;

/// Errors produced by the Playout client and player.
///
/// The status-derived variants are the request layer's classification of an
/// HTTP round trip; the remainder cover media resolution, ICY stream
/// handling, and decoding.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// HTTP transport failed (connection, TLS, timeout, body read)
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    /// The server rejected the presented credential (status 401)
    #[error("unauthorized")]
    Unauthorized,
    /// The credential is valid but not allowed to do this (status 403)
    #[error("forbidden")]
    Forbidden,
    /// Any other 4xx status
    #[error("client error: {0}")]
    ClientError(StatusCode),
    /// Any 5xx status
    #[error("server error: {0}")]
    ServerError(StatusCode),
    /// A redirect probe got a response without a `Location` header
    #[error("no redirection")]
    NoRedirection,
    /// JSON encoding or decoding failed
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
    /// A location string could not be parsed as a URL
    #[error(transparent)]
    UrlParse(#[from] url::ParseError),
    /// Reading from a media body failed
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// An ICY metadata block advertised a length over the 1 KiB cap
    #[error("invalid ICY metadata length {0}")]
    InvalidMetadataLength(usize),
    /// An ICY stream advertised a metadata interval over the 4 MiB cap
    #[error("invalid ICY interval length {0}")]
    InvalidIntervalLength(usize),
    /// Neither the MIME type nor the path suffix matched a known codec
    #[error("no decoder for {0}")]
    DecoderUnknown(String),
    /// The selected decoder failed to open the media
    #[error(transparent)]
    Decoder(#[from] rodio::decoder::DecoderError),
    /// The audio output device or media stream could not be initialized
    #[error("stream initialization error: {0}")]
    StreamInitialization(String),
    /// The token store has no credential for the requested bearer mode
    #[error("no {0} token available")]
    NoToken(Bearer),
    /// A code exchange was attempted before a pairing code was stored
    #[error("no pairing code available")]
    NoCode,
    /// A playlist entry carries no location to resolve
    #[error("entry has no location")]
    NoLocation,
}

/// Authorization mode for a single API call.
///
/// Exactly one mode is chosen per call and determines which credential (if
/// any) is attached as `Authorization: Bearer …`. Keeping the selection as an
/// enum keeps the header logic in one place.
#[derive(
    Debug, Serialize, Deserialize, Default, EnumString, AsRefStr, Display, PartialEq, Eq, Clone, Copy,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Bearer {
    /// No Authorization header
    #[default]
    None,
    /// The short-lived code-exchange token used during device pairing
    Code,
    /// The access token (the default for regular API calls)
    Access,
    /// The refresh token, used only against `/api/token`
    Refresh,
    /// The media token, used only to resolve presigned media URLs
    Media,
}

/// Response from `GET /api/code`: the pairing code for the user to enter on
/// an authorized device, and the code-exchange token used to poll for
/// completion.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AccessCode {
    #[serde(rename = "AccessToken")]
    pub access_token: String,
    #[serde(rename = "Code")]
    pub code: String,
}

/// The long-lived credential set issued by a completed code exchange, and
/// returned (with a fresh access token) by `GET /api/token`.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct TokenSet {
    #[serde(rename = "AccessToken")]
    pub access_token: String,
    #[serde(rename = "RefreshToken", default)]
    pub refresh_token: String,
    #[serde(rename = "MediaToken", default)]
    pub media_token: String,
}

/// Capability handed to [`PlayoutClient`] for credential access.
///
/// The store owns the bearer credentials, the device pairing code, the
/// service endpoint URL, and the user-agent string. The client mutates only
/// the access token (through the renewal path); `update_access_token` must
/// persist synchronously so a process restart does not lose the renewal.
/// `store_tokens` replaces the long-lived set atomically after a successful
/// code exchange.
///
/// [`MemoryTokenStore`] is the in-process implementation used by the demo
/// programs and tests; embedding applications supply a persistent store.
pub trait TokenStore: Send + Sync {
    /// Base URL of the service, without a trailing slash.
    fn endpoint(&self) -> String;
    /// User-agent string sent on every request.
    fn user_agent(&self) -> String;
    /// The device pairing code, if a pairing is in progress.
    fn code(&self) -> Option<String>;
    /// The code-exchange token paired with [`TokenStore::code`].
    fn code_token(&self) -> Option<String>;
    fn access_token(&self) -> Option<String>;
    fn refresh_token(&self) -> Option<String>;
    fn media_token(&self) -> Option<String>;
    /// Replace the access token. Must persist before returning.
    fn update_access_token(&self, token: &str);
    /// Record the pairing code and its code-exchange token.
    fn update_code(&self, code: &str, token: &str);
    /// Replace the access/refresh/media set atomically after a code exchange.
    fn store_tokens(&self, tokens: &TokenSet);
}

#[derive(Debug, Clone, Default)]
struct TokenState {
    code: Option<String>,
    code_token: Option<String>,
    access_token: Option<String>,
    refresh_token: Option<String>,
    media_token: Option<String>,
}

/// In-memory [`TokenStore`] backed by an atomic swap, safe under concurrent
/// API calls.
///
/// # Example
///
/// ```no_run
/// use playoutrs::MemoryTokenStore;
///
/// let store = MemoryTokenStore::new("https://music.example.com", "playoutrs/0.1");
/// ```
pub struct MemoryTokenStore {
    endpoint: String,
    user_agent: String,
    state: ArcSwap<TokenState>,
}

impl MemoryTokenStore {
    pub fn new(endpoint: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            user_agent: user_agent.into(),
            state: ArcSwap::from_pointee(TokenState::default()),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn endpoint(&self) -> String {
        self.endpoint.clone()
    }

    fn user_agent(&self) -> String {
        self.user_agent.clone()
    }

    fn code(&self) -> Option<String> {
        self.state.load().code.clone()
    }

    fn code_token(&self) -> Option<String> {
        self.state.load().code_token.clone()
    }

    fn access_token(&self) -> Option<String> {
        self.state.load().access_token.clone()
    }

    fn refresh_token(&self) -> Option<String> {
        self.state.load().refresh_token.clone()
    }

    fn media_token(&self) -> Option<String> {
        self.state.load().media_token.clone()
    }

    fn update_access_token(&self, token: &str) {
        self.state.rcu(|state| {
            let mut next = (**state).clone();
            next.access_token = Some(token.to_string());
            next
        });
    }

    fn update_code(&self, code: &str, token: &str) {
        self.state.rcu(|state| {
            let mut next = (**state).clone();
            next.code = Some(code.to_string());
            next.code_token = Some(token.to_string());
            next
        });
    }

    fn store_tokens(&self, tokens: &TokenSet) {
        self.state.rcu(|state| {
            let mut next = (**state).clone();
            next.access_token = Some(tokens.access_token.clone());
            next.refresh_token = Some(tokens.refresh_token.clone());
            next.media_token = Some(tokens.media_token.clone());
            next
        });
    }
}

/// Client for the Playout API.
///
/// The client builds and executes authenticated HTTP calls against the
/// service endpoint held in the token store, decodes JSON responses, and
/// transparently renews an expired access token using the refresh token.
/// Redirects are never followed; media URL resolution inspects the raw 3xx
/// response instead (see [`PlayoutClient::locate`]).
///
/// # Example
///
/// ```no_run
/// use playoutrs::{MemoryTokenStore, PlayoutClient};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), playoutrs::Error> {
/// let store = Arc::new(MemoryTokenStore::new("https://music.example.com", "playoutrs/0.1"));
/// let client = PlayoutClient::new(store);
/// let spiff = client.playlist().await?;
/// println!("{} entries", spiff.playlist.entries.len());
/// # Ok(())
/// # }
/// ```
///
/// # Thread Safety
///
/// All methods take `&self`; share the client behind an `Arc`. Concurrent
/// calls that all see an expired access token coalesce into a single renewal.
pub struct PlayoutClient {
    http: reqwest::Client,
    tokens: Arc<dyn TokenStore>,
    renew_semaphore: Semaphore,
}

impl PlayoutClient {
    /// Create a client over the given token store.
    ///
    /// The internal HTTP client is built with redirects disabled, which the
    /// redirect-probing media resolution relies on.
    pub fn new(tokens: Arc<dyn TokenStore>) -> Self {
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap_or_default();
        Self {
            http,
            tokens,
            renew_semaphore: Semaphore::new(1),
        }
    }

    /// Replace the HTTP client using the builder pattern.
    ///
    /// The supplied client must keep redirects disabled for
    /// [`PlayoutClient::locate`] to work.
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    /// The token store this client authenticates from.
    pub fn tokens(&self) -> &Arc<dyn TokenStore> {
        &self.tokens
    }

    /// The user-agent string applied to every request.
    pub fn user_agent(&self) -> String {
        self.tokens.user_agent()
    }

    fn token_for(&self, bearer: Bearer) -> Result<Option<String>, Error> {
        let token = match bearer {
            Bearer::None => return Ok(None),
            Bearer::Code => self.tokens.code_token(),
            Bearer::Access => self.tokens.access_token(),
            Bearer::Refresh => self.tokens.refresh_token(),
            Bearer::Media => self.tokens.media_token(),
        };
        match token {
            Some(token) => Ok(Some(token)),
            None => Err(Error::NoToken(bearer)),
        }
    }

    fn classify(status: StatusCode) -> Option<Error> {
        if status == StatusCode::UNAUTHORIZED {
            Some(Error::Unauthorized)
        } else if status == StatusCode::FORBIDDEN {
            Some(Error::Forbidden)
        } else if status.is_client_error() {
            Some(Error::ClientError(status))
        } else if status.is_server_error() {
            Some(Error::ServerError(status))
        } else {
            None
        }
    }

    fn build_request(
        &self,
        method: Method,
        url: &str,
        token: Option<&str>,
        body: Option<&serde_json::Value>,
    ) -> reqwest::RequestBuilder {
        let mut req = self.http.request(method, url);
        if let Some(token) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        req = req.header(header::USER_AGENT, self.tokens.user_agent());
        if let Some(body) = body {
            req = req.json(body);
        }
        req
    }

    // Execute one authenticated call and decode the JSON body. `renew` guards
    // the single transparent retry after an access-token refresh.
    #[async_recursion]
    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        bearer: Bearer,
        body: Option<serde_json::Value>,
        renew: bool,
    ) -> Result<T, Error> {
        let url = format!("{}{}", self.tokens.endpoint(), path);
        let token = self.token_for(bearer)?;

        let resp = self
            .build_request(method.clone(), &url, token.as_deref(), body.as_ref())
            .send()
            .await?;

        let status = resp.status();
        if let Some(err) = Self::classify(status) {
            if matches!(err, Error::Unauthorized) && bearer == Bearer::Access && renew {
                let stale = token.unwrap_or_default();
                if self.renew_access_token(&stale).await.is_ok() {
                    return self.request(method, path, bearer, body, false).await;
                }
            }
            if log::log_enabled!(log::Level::Debug) {
                log::debug!("requested URL: {}", url);
                log::debug!("Playout API error: {} {}", status, err);
            }
            return Err(err);
        }

        let bytes = resp.bytes().await?;

        // An empty body decodes as null so callers can discard it
        let value: serde_json::Value = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes)?
        };

        if log::log_enabled!(log::Level::Trace) {
            log::trace!("requested URL: {}", url);
            log::trace!("response {}", value);
        }

        match serde_json::from_value(value) {
            Ok(t) => Ok(t),
            Err(e) => {
                if log::log_enabled!(log::Level::Debug) {
                    log::debug!("requested URL: {}", url);
                    log::debug!("JSON deserialization error: {}", e);
                }
                Err(Error::SerdeJson(e))
            }
        }
    }

    // Renew the access token with the refresh token, coalescing concurrent
    // attempts into a single refresh. `stale` is the access token the failed
    // call used; if the store already holds a different one, another caller
    // renewed first and there is nothing to do.
    async fn renew_access_token(&self, stale: &str) -> Result<(), Error> {
        match self.renew_semaphore.try_acquire() {
            // We're the single refresher
            Ok(_permit) => {
                if self.tokens.access_token().as_deref() != Some(stale) {
                    return Ok(());
                }
                let tokens: TokenSet = self
                    .request(Method::GET, "/api/token", Bearer::Refresh, None, false)
                    .await?;
                self.tokens.update_access_token(&tokens.access_token);
                log::debug!("renewed access token");
                Ok(())
            }
            // Someone else is refreshing; await completion cooperatively
            Err(_) => {
                let _ = self.renew_semaphore.acquire().await;
                Ok(())
            }
        }
    }

    pub(crate) async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        bearer: Bearer,
    ) -> Result<T, Error> {
        self.request(Method::GET, path, bearer, None, true).await
    }

    pub(crate) async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        bearer: Bearer,
        body: serde_json::Value,
    ) -> Result<T, Error> {
        self.request(Method::POST, path, bearer, Some(body), true)
            .await
    }

    pub(crate) async fn patch<T: DeserializeOwned>(
        &self,
        path: &str,
        bearer: Bearer,
        body: serde_json::Value,
    ) -> Result<T, Error> {
        self.request(Method::PATCH, path, bearer, Some(body), true)
            .await
    }

    // Issue a GET with redirects disabled and return the Location header of
    // the raw response as a parsed URL.
    pub(crate) async fn get_location(&self, path: &str, bearer: Bearer) -> Result<Url, Error> {
        let url = format!("{}{}", self.tokens.endpoint(), path);
        let token = self.token_for(bearer)?;

        let resp = self
            .build_request(Method::GET, &url, token.as_deref(), None)
            .send()
            .await?;

        if let Some(err) = Self::classify(resp.status()) {
            return Err(err);
        }

        let location = resp
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(Error::NoRedirection)?;

        Ok(Url::parse(location)?)
    }

    /// Begin device pairing.
    ///
    /// Returns the pairing code for the user to enter on an authorized device
    /// together with the code-exchange token used to poll for completion.
    /// Store both with [`TokenStore::update_code`] before calling
    /// [`PlayoutClient::check_code`].
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use playoutrs::TokenStore;
    /// # async fn example(client: playoutrs::PlayoutClient) -> Result<(), playoutrs::Error> {
    /// let code = client.code().await?;
    /// println!("enter code {}", code.code);
    /// client.tokens().update_code(&code.code, &code.access_token);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn code(&self) -> Result<AccessCode, Error> {
        self.get("/api/code", Bearer::None).await
    }

    /// Complete device pairing.
    ///
    /// Polls the code exchange with the stored pairing code. Once the user
    /// has approved the device, the returned access/refresh/media tokens are
    /// stored atomically and the client is ready for regular API calls.
    pub async fn check_code(&self) -> Result<TokenSet, Error> {
        let code = self.tokens.code().ok_or(Error::NoCode)?;
        let body = serde_json::json!({ "Code": code });
        let tokens: TokenSet = self.post("/api/code", Bearer::Code, body).await?;
        self.tokens.store_tokens(&tokens);
        Ok(tokens)
    }

    /// Resolve a server-relative media location into a presigned URL.
    ///
    /// Issues a GET with the media token and redirects disabled, and returns
    /// the `Location` header of the 3xx response. Fails with
    /// [`Error::NoRedirection`] when the server does not redirect.
    pub async fn locate(&self, uri: &str) -> Result<Url, Error> {
        self.get_location(uri, Bearer::Media).await
    }
}
