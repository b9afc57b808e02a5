// src/checker/http.rs
// =============================================================================
// This module checks if a URL is alive by making HTTP requests.
//
// Key functionality:
// - HEAD request first (lightweight, no body download)
// - Falls back to GET when the server answers 405 to HEAD
// - Retries with exponential backoff on 429/5xx and connection/read failures
// - GET-with-body mode for the content classifier
// - Maps every outcome onto a Reachability value (never an Err)
//
// Each check builds its own reqwest Client (its own "session"). The client
// and the response are dropped when the check returns, on every path.
// =============================================================================

use crate::audit::Reachability;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use std::time::Duration;

/// Some servers reject default tool user-agents, so we look like a browser.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

// Status codes worth another attempt
const RETRY_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

/// Knobs for the HTTP layer.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Per-request timeout, enforced by reqwest
    pub timeout: Duration,
    /// Extra attempts after the first one
    pub max_retries: u32,
    /// First backoff delay; doubles after every retry
    pub backoff_base: Duration,
    pub max_redirects: usize,
    pub user_agent: String,
    /// Bodies are cut off after this many bytes in fetch mode
    pub max_body_bytes: usize,
}

impl HttpConfig {
    /// HEAD-only liveness checks: short timeout.
    pub fn liveness() -> Self {
        HttpConfig {
            timeout: Duration::from_secs(5),
            max_retries: 3,
            backoff_base: Duration::from_millis(500),
            max_redirects: 10,
            user_agent: BROWSER_USER_AGENT.to_string(),
            max_body_bytes: 25 * 1024 * 1024,
        }
    }

    /// Full-body downloads for classification: longer timeout.
    pub fn full_fetch() -> Self {
        HttpConfig {
            timeout: Duration::from_secs(15),
            ..HttpConfig::liveness()
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        HttpConfig::liveness()
    }
}

/// HTTP status plus its classification. http_status is 0 when no
/// response was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verification {
    pub http_status: u16,
    pub reachability: Reachability,
}

impl Verification {
    fn from_status(status: StatusCode) -> Self {
        Verification {
            http_status: status.as_u16(),
            reachability: Reachability::from_status(status.as_u16()),
        }
    }

    fn failure(reachability: Reachability) -> Self {
        Verification {
            http_status: 0,
            reachability,
        }
    }
}

/// A downloaded document, handed to the content classifier.
#[derive(Debug, Clone, Default)]
pub struct Document {
    /// Declared Content-Type header, if any
    pub content_type: Option<String>,
    pub body: Vec<u8>,
    /// True when the body was cut off at max_body_bytes
    pub truncated: bool,
}

/// Result of a GET-with-body fetch.
#[derive(Debug)]
pub struct Fetched {
    pub verification: Verification,
    /// Present only when the link was Reachable and the body was read
    pub document: Option<Document>,
    /// Why the body could not be read, when it could not
    pub body_error: Option<String>,
}

/// Performs the liveness check for single URLs.
#[derive(Debug, Clone, Default)]
pub struct VerificationClient {
    config: HttpConfig,
}

impl VerificationClient {
    pub fn new(config: HttpConfig) -> Self {
        VerificationClient { config }
    }

    /// Liveness-only check: HEAD, with a GET fallback on 405.
    /// The GET body is never read.
    pub async fn check(&self, url: &str) -> Verification {
        let client = match self.session() {
            Ok(client) => client,
            Err(e) => {
                tracing::error!("could not build HTTP client: {}", e);
                return Verification::failure(Reachability::UnknownFailure);
            }
        };

        let head = self.send_with_retry(|| client.head(url)).await;
        let response = match head {
            Ok(resp) if resp.status() == StatusCode::METHOD_NOT_ALLOWED => {
                tracing::debug!("HEAD not allowed for {}, retrying with GET", url);
                drop(resp);
                self.send_with_retry(|| client.get(url)).await
            }
            other => other,
        };

        match response {
            // Dropping the response discards the body unread
            Ok(resp) => Verification::from_status(resp.status()),
            Err(e) => categorize_error(url, &e),
        }
    }

    /// GET with body, for when the document itself has to be inspected.
    pub async fn fetch(&self, url: &str) -> Fetched {
        let client = match self.session() {
            Ok(client) => client,
            Err(e) => {
                tracing::error!("could not build HTTP client: {}", e);
                return Fetched {
                    verification: Verification::failure(Reachability::UnknownFailure),
                    document: None,
                    body_error: Some(e.to_string()),
                };
            }
        };

        let response = match self.send_with_retry(|| client.get(url)).await {
            Ok(resp) => resp,
            Err(e) => {
                return Fetched {
                    verification: categorize_error(url, &e),
                    document: None,
                    body_error: None,
                }
            }
        };

        let verification = Verification::from_status(response.status());
        if !verification.reachability.is_reachable() {
            return Fetched {
                verification,
                document: None,
                body_error: None,
            };
        }

        match self.read_body(response).await {
            Ok(document) => Fetched {
                verification,
                document: Some(document),
                body_error: None,
            },
            Err(e) => {
                tracing::warn!("failed to read body of {}: {}", url, e);
                Fetched {
                    verification,
                    document: None,
                    body_error: Some(e.to_string()),
                }
            }
        }
    }

    // A fresh client per check: sessions are never shared between tasks
    fn session(&self) -> reqwest::Result<Client> {
        Client::builder()
            .timeout(self.config.timeout)
            .redirect(reqwest::redirect::Policy::limited(self.config.max_redirects))
            .user_agent(self.config.user_agent.as_str())
            .build()
    }

    // Sends the request built by `make`, retrying on RETRY_STATUSES and on
    // connection/read/timeout failures. After the last attempt the final
    // response (or error) is returned as-is.
    async fn send_with_retry<F>(&self, make: F) -> reqwest::Result<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut delay = self.config.backoff_base;
        let mut attempt = 0;

        loop {
            let outcome = make().send().await;
            let retryable = match &outcome {
                Ok(resp) => RETRY_STATUSES.contains(&resp.status().as_u16()),
                Err(e) => e.is_connect() || e.is_timeout() || e.is_request() || e.is_body(),
            };

            if !retryable || attempt >= self.config.max_retries {
                return outcome;
            }

            attempt += 1;
            match &outcome {
                Ok(resp) => tracing::debug!(
                    "HTTP {} from {}, retry {}/{} in {:?}",
                    resp.status().as_u16(),
                    resp.url(),
                    attempt,
                    self.config.max_retries,
                    delay
                ),
                Err(e) => tracing::debug!(
                    "request failed ({}), retry {}/{} in {:?}",
                    e,
                    attempt,
                    self.config.max_retries,
                    delay
                ),
            }
            drop(outcome);
            tokio::time::sleep(delay).await;
            delay *= 2;
        }
    }

    // Reads the body chunk by chunk up to max_body_bytes
    async fn read_body(&self, mut response: Response) -> reqwest::Result<Document> {
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let limit = self.config.max_body_bytes;
        let mut body = Vec::new();
        let mut truncated = false;
        while let Some(chunk) = response.chunk().await? {
            let room = limit - body.len();
            if chunk.len() > room {
                body.extend_from_slice(&chunk[..room]);
                truncated = true;
                break;
            }
            body.extend_from_slice(&chunk);
        }

        Ok(Document {
            content_type,
            body,
            truncated,
        })
    }
}

// Maps a reqwest error onto Reachability.
//
// Order matters: a connect timeout is both is_connect() and is_timeout(),
// and we report it as a timeout.
fn categorize_error(url: &str, error: &reqwest::Error) -> Verification {
    let reachability = if error.is_timeout() {
        Reachability::Timeout
    } else if error.is_connect() || error.is_request() {
        Reachability::NetworkFailure
    } else {
        Reachability::UnknownFailure
    };

    tracing::debug!("{} failed: {} ({})", url, reachability, error);
    Verification::failure(reachability)
}

// -----------------------------------------------------------------------------
// NOTES:
//
// 1. Why HEAD first?
//    - HEAD returns the status line and headers only, no body
//    - Some servers don't implement HEAD and answer 405; GET is the fallback
//    - In the fallback we never call .chunk()/.bytes(), so the body is never
//      transferred beyond what the socket already buffered
//
// 2. Why does fetch() skip HEAD?
//    - The classifier needs the body anyway; HEAD + GET would be two round trips
//
// 3. Why is the last 503 reported instead of an error?
//    - After the retry budget is spent, the final response is still a real
//      HTTP answer, so it is classified like any other: ServerError(503)
//
// 4. Redirects
//    - reqwest follows them (up to max_redirects); resp.status() is the
//      status of the final response in the chain
// -----------------------------------------------------------------------------
