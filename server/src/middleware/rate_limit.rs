//! Per-client-IP request limiting.
//!
//! Best effort and per process: each server instance keeps its own buckets.
//! Requests without a peer address (in-process tests) are not limited.

use std::net::{IpAddr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use governor::clock::{Clock, DefaultClock};
use governor::{DefaultKeyedRateLimiter, Quota};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::RateLimitSettings;
use crate::utils::error::AppError;

pub struct RateLimiter {
    buckets: Option<DefaultKeyedRateLimiter<IpAddr>>,
    clock: DefaultClock,
}

impl RateLimiter {
    /// `per_second == 0` builds a limiter that admits everything.
    pub fn new(settings: RateLimitSettings) -> Self {
        let buckets = NonZeroU32::new(settings.per_second).map(|rate| {
            let burst = NonZeroU32::new(settings.burst).unwrap_or(rate);
            governor::RateLimiter::keyed(Quota::per_second(rate).allow_burst(burst))
        });
        if buckets.is_none() {
            warn!("Rate limiting disabled");
        }
        Self {
            buckets,
            clock: DefaultClock::default(),
        }
    }

    /// `Err` carries how long the client should wait.
    pub fn check(&self, ip: IpAddr) -> Result<(), Duration> {
        match &self.buckets {
            None => Ok(()),
            Some(buckets) => buckets
                .check_key(&ip)
                .map_err(|not_until| not_until.wait_time_from(self.clock.now())),
        }
    }

    pub fn tracked_clients(&self) -> usize {
        self.buckets.as_ref().map_or(0, |b| b.len())
    }

    /// Drops buckets of clients that have been quiet long enough to be full
    /// again.
    pub fn spawn_cleanup(self: Arc<Self>, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                if let Some(buckets) = &self.buckets {
                    buckets.retain_recent();
                    buckets.shrink_to_fit();
                    debug!(clients = buckets.len(), "Rate limit buckets pruned");
                }
            }
        })
    }
}

pub async fn rate_limit(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());

    if let Some(ip) = peer {
        if let Err(wait) = limiter.check(ip) {
            return too_many_requests(ip, wait);
        }
    }

    next.run(request).await
}

fn too_many_requests(ip: IpAddr, wait: Duration) -> Response {
    let retry_after = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
    let retry_after = retry_after.max(1);
    debug!(%ip, retry_after, "Rate limit exceeded");

    let mut response =
        AppError::RateLimited("too many requests, slow down".to_string()).into_response();
    response
        .headers_mut()
        .insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    fn settings(per_second: u32, burst: u32) -> RateLimitSettings {
        RateLimitSettings { per_second, burst }
    }

    #[test]
    fn test_burst_then_reject() {
        let limiter = RateLimiter::new(settings(1, 2));
        let ip: IpAddr = "10.0.0.1".parse().unwrap();
        let other: IpAddr = "10.0.0.2".parse().unwrap();

        assert!(limiter.check(ip).is_ok());
        assert!(limiter.check(ip).is_ok());
        assert!(limiter.check(ip).is_err());
        assert!(limiter.check(other).is_ok());
        assert_eq!(limiter.tracked_clients(), 2);
    }

    #[test]
    fn test_zero_rate_disables() {
        let limiter = RateLimiter::new(settings(0, 0));
        let ip: IpAddr = "10.0.0.1".parse().unwrap();
        for _ in 0..100 {
            assert!(limiter.check(ip).is_ok());
        }
    }

    fn app(limiter: Arc<RateLimiter>) -> Router {
        Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(axum::middleware::from_fn_with_state(limiter, rate_limit))
    }

    fn request_from(addr: &str) -> Request<Body> {
        let mut request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let addr: SocketAddr = addr.parse().unwrap();
        request.extensions_mut().insert(ConnectInfo(addr));
        request
    }

    #[tokio::test]
    async fn test_middleware_answers_429_with_retry_after() {
        let app = app(Arc::new(RateLimiter::new(settings(1, 1))));

        let first = app.clone().oneshot(request_from("10.0.0.9:4000")).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = app.oneshot(request_from("10.0.0.9:4001")).await.unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(second.headers().contains_key(header::RETRY_AFTER));
    }

    #[tokio::test]
    async fn test_requests_without_peer_pass() {
        let app = app(Arc::new(RateLimiter::new(settings(1, 1))));
        for _ in 0..3 {
            let response = app
                .clone()
                .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
    }
}
