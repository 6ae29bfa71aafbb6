//! Outbound HTTP for the exchange
//!
//! The module is organized into specialized components:
//! - `config`: reqwest client configuration and building
//! - `http`: the process-wide rate-limited client
//! - `search`: month-chunked, paginated title search
//!
//! Everything that issues requests goes through the [`Fetcher`] trait so the
//! search client and the download engine share one request budget and can be
//! driven by scripted fetchers in tests.

use async_trait::async_trait;

use crate::errors::FetchResult;

pub mod config;
pub mod http;
pub mod search;

pub use config::ClientConfig;
pub use http::RateLimitedClient;
pub use search::{month_chunks, DateChunk, SearchClient, SearchConfig};

/// Raw response: any status code, full body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Single-request HTTP GET
///
/// Implementations return every HTTP status as a [`FetchResponse`]; only
/// transport problems (connect, body read, timeout) are errors.
///
/// Waiting for a request slot and sending the request are separate steps so
/// callers can put a deadline on the request alone. [`Fetcher::fetch`] does
/// both.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Wait until a request may start; unlimited fetchers return at once
    async fn wait_turn(&self) {}

    /// Send a request whose turn has already been granted
    async fn send(&self, url: &str) -> FetchResult<FetchResponse>;

    async fn fetch(&self, url: &str) -> FetchResult<FetchResponse> {
        self.wait_turn().await;
        self.send(url).await
    }
}
