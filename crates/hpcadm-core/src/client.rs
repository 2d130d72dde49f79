//! HTTP client utilities and retry logic.
//!
//! This module provides HTTP client configuration, retry policies, and a
//! shared service client used by the REST client crates (account manager,
//! Pulp).

use crate::error::{Error, Result};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

// Service-specific timeout configurations (in seconds)

/// Default timeout for account-management API requests
pub const ACTMGR_DEFAULT_TIMEOUT: u64 = 30;

/// Default timeout for Pulp API requests (searches can be large)
pub const PULP_DEFAULT_TIMEOUT: u64 = 60;

/// Default timeout for directory operations
pub const DIRECTORY_DEFAULT_TIMEOUT: u64 = 15;

// Connection pool settings

/// Default idle timeout for connection pools
pub const DEFAULT_POOL_IDLE_TIMEOUT: u64 = 90;

/// Default maximum idle connections per host
pub const DEFAULT_POOL_MAX_IDLE_PER_HOST: usize = 10;

// Retry settings

/// Default maximum number of retry attempts
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default initial retry delay in milliseconds
pub const DEFAULT_RETRY_DELAY_MS: u64 = 500;

/// Default maximum retry delay in milliseconds (for exponential backoff)
pub const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 5000;

/// Retry policy with exponential backoff.
///
/// Configures how HTTP requests should be retried on transient failure,
/// using exponential backoff to avoid overwhelming failing services.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts
    pub max_retries: u32,

    /// Initial delay before first retry
    pub initial_delay: Duration,

    /// Maximum delay between retries (cap for exponential backoff)
    pub max_delay: Duration,

    /// Backoff multiplier (typically 2 for exponential backoff)
    pub backoff_multiplier: u32,
}

impl RetryPolicy {
    /// Create a new retry policy with default values.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_RETRY_MAX_DELAY_MS),
            backoff_multiplier: 2,
        }
    }

    /// Create a retry policy with no retries.
    #[must_use]
    pub const fn no_retry() -> Self {
        Self {
            max_retries: 0,
            initial_delay: Duration::from_millis(0),
            max_delay: Duration::from_millis(0),
            backoff_multiplier: 1,
        }
    }

    /// Set the maximum number of retries.
    #[must_use]
    pub const fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set the initial delay.
    #[must_use]
    pub const fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the maximum delay.
    #[must_use]
    pub const fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Calculate delay for a given attempt number.
    ///
    /// Uses exponential backoff: delay = min(initial_delay * multiplier^attempt, max_delay)
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::from_secs(0);
        }

        let multiplier = self.backoff_multiplier.saturating_pow(attempt - 1);
        let delay_ms = self.initial_delay.as_millis() as u64 * u64::from(multiplier);
        let delay = Duration::from_millis(delay_ms);

        std::cmp::min(delay, self.max_delay)
    }

    /// Check if retries are enabled.
    #[must_use]
    pub const fn has_retries(&self) -> bool {
        self.max_retries > 0
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new()
    }
}

/// HTTP client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Request timeout
    pub timeout: Duration,

    /// Retry policy
    pub retry_policy: RetryPolicy,

    /// Connection pool idle timeout
    pub pool_idle_timeout: Duration,

    /// Maximum idle connections per host
    pub pool_max_idle_per_host: usize,
}

impl ClientConfig {
    /// Create a new client configuration with default values.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            retry_policy: RetryPolicy::new(),
            pool_idle_timeout: Duration::from_secs(DEFAULT_POOL_IDLE_TIMEOUT),
            pool_max_idle_per_host: DEFAULT_POOL_MAX_IDLE_PER_HOST,
        }
    }

    /// Set request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set retry policy.
    #[must_use]
    pub const fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Disable retries.
    #[must_use]
    pub const fn without_retries(mut self) -> Self {
        self.retry_policy = RetryPolicy::no_retry();
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Authentication applied to every request.
#[derive(Clone)]
enum ServiceAuth {
    None,
    /// `Authorization: Token token=<value>` (account-management API style)
    Token(SecretString),
    /// HTTP basic authentication
    Basic(String, SecretString),
}

/// Builder for [`ServiceClient`].
pub struct ServiceClientBuilder {
    service: &'static str,
    base_url: String,
    user_agent: String,
    config: ClientConfig,
    auth: ServiceAuth,
}

impl ServiceClientBuilder {
    /// Create a builder for a named service rooted at the given base URL.
    pub fn new(
        service: &'static str,
        base_url: impl AsRef<str>,
        timeout: Duration,
    ) -> Result<Self> {
        let mut base = base_url.as_ref().to_string();
        // Relative path joins drop the last segment unless the base ends
        // with a slash.
        if !base.ends_with('/') {
            base.push('/');
        }
        Url::parse(&base)?;

        Ok(Self {
            service,
            base_url: base,
            user_agent: format!("hpcadm/{}", env!("CARGO_PKG_VERSION")),
            config: ClientConfig::new().with_timeout(timeout),
            auth: ServiceAuth::None,
        })
    }

    /// Override the user agent string.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Override the retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.config.retry_policy = retry;
        self
    }

    /// Override the HTTP client configuration.
    #[must_use]
    pub fn with_http_config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Configure `Authorization: Token token=<...>` authentication.
    #[must_use]
    pub fn with_token_auth(mut self, token: SecretString) -> Self {
        self.auth = ServiceAuth::Token(token);
        self
    }

    /// Configure HTTP basic authentication credentials.
    #[must_use]
    pub fn with_basic_auth(mut self, username: impl Into<String>, password: SecretString) -> Self {
        self.auth = ServiceAuth::Basic(username.into(), password);
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<ServiceClient> {
        let base_url = Url::parse(&self.base_url)?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .user_agent(self.user_agent)
            .default_headers(headers)
            .timeout(self.config.timeout)
            .pool_idle_timeout(self.config.pool_idle_timeout)
            .pool_max_idle_per_host(self.config.pool_max_idle_per_host)
            .build()
            .map_err(|err| Error::ConfigError(format!("failed to build HTTP client: {err}")))?;

        Ok(ServiceClient {
            service: self.service,
            http,
            base_url,
            retry_policy: self.config.retry_policy,
            auth: self.auth,
        })
    }
}

/// Shared HTTP service client with retry support.
///
/// Wraps a `reqwest::Client` with a base URL, default JSON headers,
/// per-service authentication, and a retry loop for transient failures.
#[derive(Clone)]
pub struct ServiceClient {
    service: &'static str,
    http: reqwest::Client,
    base_url: Url,
    retry_policy: RetryPolicy,
    auth: ServiceAuth,
}

impl ServiceClient {
    /// Return the base URL.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Return the service name this client talks to.
    #[must_use]
    pub fn service(&self) -> &'static str {
        self.service
    }

    /// Execute a request with the configured retry policy.
    ///
    /// The `build` closure customizes the request (body, extra headers);
    /// `map_status` converts a non-success status and response body into a
    /// typed error. Only transport errors and 429/5xx responses are
    /// retried; anything else is mapped and returned immediately.
    pub async fn execute_with_retry<F, M>(
        &self,
        method: Method,
        path: &str,
        query: &[(&'static str, String)],
        build: F,
        map_status: M,
    ) -> Result<Response>
    where
        F: Fn(RequestBuilder) -> RequestBuilder,
        M: Fn(StatusCode, String) -> Error,
    {
        let url = self.base_url.join(path)?;
        let mut last_error = Error::InternalError(format!("{}: no request attempted", self.service));

        for attempt in 0..=self.retry_policy.max_retries {
            let delay = self.retry_policy.delay_for_attempt(attempt);
            if !delay.is_zero() {
                debug!(
                    service = self.service,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "retrying request"
                );
                tokio::time::sleep(delay).await;
            }

            let mut request = self.http.request(method.clone(), url.clone());
            if !query.is_empty() {
                request = request.query(query);
            }
            request = match &self.auth {
                ServiceAuth::None => request,
                ServiceAuth::Token(token) => request.header(
                    AUTHORIZATION,
                    format!("Token token={}", token.expose_secret()),
                ),
                ServiceAuth::Basic(user, password) => {
                    request.basic_auth(user, Some(password.expose_secret()))
                }
            };
            request = build(request);

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }

                    let text = response.text().await.unwrap_or_default();
                    let mapped = map_status(status, text);
                    if !is_retryable_status(status) || attempt == self.retry_policy.max_retries {
                        return Err(mapped);
                    }
                    warn!(
                        service = self.service,
                        %status,
                        attempt,
                        "transient HTTP failure"
                    );
                    last_error = mapped;
                }
                Err(err) => {
                    let retryable = err.is_timeout() || err.is_connect();
                    let mapped = Error::from(err);
                    if !retryable || attempt == self.retry_policy.max_retries {
                        return Err(mapped);
                    }
                    warn!(service = self.service, attempt, "transport error, will retry");
                    last_error = mapped;
                }
            }
        }

        Err(last_error)
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    status.is_server_error() || matches!(status, StatusCode::TOO_MANY_REQUESTS)
}
