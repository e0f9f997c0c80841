//! HTTP client with rate limiting for the catalog API.
//!
//! Wraps `reqwest::Client` to add request throttling and consistent
//! timeouts. The catalog is a public third-party service; throttling our
//! own requests keeps bulk operations (seeding several browse rows at
//! startup, batch downloads) from tripping its quota.
//!
//! Bursts up to the per-interval maximum are allowed; requests beyond that
//! are delayed, not rejected.

use std::{future::Future, num::NonZeroU32, time::Duration};

use futures_util::{FutureExt, TryFutureExt};
use governor::{DefaultDirectRateLimiter, Quota};
use reqwest::{self, Body, Method, Url};

use crate::{config::Config, error::Result};

/// HTTP client with built-in rate limiting.
pub struct Client {
    /// Unlimited request client for special cases.
    ///
    /// Direct access to the underlying client without rate limiting; used
    /// for media streaming, which is long-lived and self-paced.
    pub unlimited: reqwest::Client,

    /// Rate limiter applied by [`execute`](Self::execute).
    rate_limiter: DefaultDirectRateLimiter,
}

impl Client {
    /// Rolling window over which catalog calls are counted.
    const RATE_LIMIT_INTERVAL: Duration = Duration::from_secs(10);

    /// Maximum catalog calls per interval.
    const RATE_LIMIT_CALLS_PER_INTERVAL: u8 = 40;

    /// Duration to keep idle connections alive.
    const KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(60);

    /// Duration to wait for individual network reads.
    ///
    /// Short enough to recover quickly from a stalled connection without
    /// interrupting healthy streaming reads.
    const READ_TIMEOUT: Duration = Duration::from_secs(5);

    /// Creates a new client configured from `config`.
    ///
    /// # Errors
    ///
    /// Returns error if the underlying HTTP client cannot be built.
    ///
    /// # Panics
    ///
    /// Panics if the rate limit constants are zero.
    pub fn new(config: &Config) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .tcp_keepalive(Self::KEEPALIVE_TIMEOUT)
            .read_timeout(Self::READ_TIMEOUT)
            .user_agent(&config.user_agent);

        let replenish_interval =
            Self::RATE_LIMIT_INTERVAL / u32::from(Self::RATE_LIMIT_CALLS_PER_INTERVAL);
        let quota = Quota::with_period(replenish_interval)
            .expect("quota time interval is zero")
            .allow_burst(
                NonZeroU32::new(Self::RATE_LIMIT_CALLS_PER_INTERVAL.into())
                    .expect("calls per interval is zero"),
            );

        Ok(Self {
            unlimited: http_client.build()?,
            rate_limiter: governor::RateLimiter::direct(quota),
        })
    }

    /// Builds a request with the specified method, URL and body.
    pub fn request<U, T>(&self, method: Method, url: U, body: T) -> reqwest::Request
    where
        U: Into<Url>,
        T: Into<Body>,
    {
        let mut request = reqwest::Request::new(method, url.into());
        let body_mut = request.body_mut();
        *body_mut = Some(body.into());

        request
    }

    /// Builds a GET request.
    pub fn get<U>(&self, url: U) -> reqwest::Request
    where
        U: Into<Url>,
    {
        self.request(Method::GET, url, "")
    }

    /// Executes a request, delaying it if the rate limit would be exceeded.
    ///
    /// # Errors
    ///
    /// Returns error if request execution fails or a network error occurs.
    pub fn execute(
        &self,
        request: reqwest::Request,
    ) -> impl Future<Output = Result<reqwest::Response>> + '_ {
        // No jitter: the level of concurrency is low.
        let throttle = self.rate_limiter.until_ready();
        throttle.then(|()| self.unlimited.execute(request).map_err(Into::into))
    }
}
