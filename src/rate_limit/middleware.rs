use crate::rate_limit::{Decision, DenyReason, RateLimiter, VaryBy};
use futures::future::BoxFuture;
use http::header::{HeaderMap, HeaderName, HeaderValue, RETRY_AFTER};
use http::{Request, Response, StatusCode};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tower_layer::Layer;
use tower_service::Service;

/// `X-RateLimit-Limit` response header.
pub static X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
/// `X-RateLimit-Remaining` response header.
pub static X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
/// `X-RateLimit-Reset` response header (seconds).
pub static X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// A layer that enforces rate limits using a [`RateLimiter`].
#[derive(Debug)]
pub struct RateLimitLayer<L> {
    limiter: Arc<L>,
    vary_by: Arc<VaryBy>,
}

impl<L> Clone for RateLimitLayer<L> {
    fn clone(&self) -> Self {
        Self {
            limiter: self.limiter.clone(),
            vary_by: self.vary_by.clone(),
        }
    }
}

impl<L> RateLimitLayer<L> {
    /// Create a new rate limit layer keyed by request path.
    pub fn new(limiter: L) -> Self {
        Self::shared(Arc::new(limiter))
    }

    /// Create a layer around a limiter that is shared with other code.
    pub fn shared(limiter: Arc<L>) -> Self {
        Self {
            limiter,
            vary_by: Arc::new(VaryBy::default()),
        }
    }

    /// Derive keys with `vary_by` instead of the path alone.
    pub fn vary_by(mut self, vary_by: VaryBy) -> Self {
        self.vary_by = Arc::new(vary_by);
        self
    }
}

impl<S, L> Layer<S> for RateLimitLayer<L>
where
    L: RateLimiter + 'static,
{
    type Service = RateLimitService<S, L>;

    fn layer(&self, service: S) -> Self::Service {
        RateLimitService {
            inner: service,
            limiter: self.limiter.clone(),
            vary_by: self.vary_by.clone(),
        }
    }
}

/// Middleware service that enforces rate limits.
///
/// Denied requests never reach the inner service: they get `429 Too Many Requests`
/// (or `503 Service Unavailable` when the store is down and the limiter fails closed).
/// Admitted requests are forwarded unchanged; `X-RateLimit-*` headers are added to
/// the response.
#[derive(Debug)]
pub struct RateLimitService<S, L> {
    inner: S,
    limiter: Arc<L>,
    vary_by: Arc<VaryBy>,
}

impl<S: Clone, L> Clone for RateLimitService<S, L> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            limiter: self.limiter.clone(),
            vary_by: self.vary_by.clone(),
        }
    }
}

fn whole_seconds(d: Duration) -> u64 {
    let secs = d.as_secs();
    if d.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}

fn put(headers: &mut HeaderMap, name: &HeaderName, value: u64) {
    headers.insert(name.clone(), HeaderValue::from(value));
}

fn stamp(headers: &mut HeaderMap, decision: &Decision) {
    match decision {
        Decision::Allowed { limit, remaining, reset_after } => {
            put(headers, &X_RATELIMIT_LIMIT, *limit);
            put(headers, &X_RATELIMIT_REMAINING, *remaining);
            put(headers, &X_RATELIMIT_RESET, whole_seconds(*reset_after));
        }
        Decision::Denied { limit, retry_after, reset_after, .. } => {
            put(headers, &X_RATELIMIT_LIMIT, *limit);
            put(headers, &X_RATELIMIT_REMAINING, 0);
            put(headers, &X_RATELIMIT_RESET, whole_seconds(*reset_after));
            put(headers, &RETRY_AFTER, whole_seconds(*retry_after).max(1));
        }
    }
}

fn refuse<B: Default>(status: StatusCode, decision: Option<&Decision>) -> Response<B> {
    let mut res = Response::new(B::default());
    *res.status_mut() = status;
    if let Some(d) = decision {
        stamp(res.headers_mut(), d);
    }
    res
}

impl<S, L, ReqB, ResB> Service<Request<ReqB>> for RateLimitService<S, L>
where
    S: Service<Request<ReqB>, Response = Response<ResB>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    L: RateLimiter + 'static,
    ReqB: Send + 'static,
    ResB: Default + Send + 'static,
{
    type Response = Response<ResB>;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqB>) -> Self::Future {
        let limiter = self.limiter.clone();
        let key = self.vary_by.key(&req);
        // Keep the service that was polled ready; leave a fresh clone behind.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            match limiter.check(&key).await {
                Ok(decision @ Decision::Allowed { .. }) => {
                    let mut res = inner.call(req).await?;
                    stamp(res.headers_mut(), &decision);
                    Ok(res)
                }
                Ok(decision) => {
                    let status = match decision.deny_reason() {
                        Some(DenyReason::StoreUnavailable) => StatusCode::SERVICE_UNAVAILABLE,
                        _ => StatusCode::TOO_MANY_REQUESTS,
                    };
                    Ok(refuse(status, Some(&decision)))
                }
                Err(e) => {
                    // Limiter failed outright (e.g., misconfigured quota).
                    tracing::warn!(key = %key, error = %e, "rate limiter error");
                    Ok(refuse(StatusCode::SERVICE_UNAVAILABLE, None))
                }
            }
        })
    }
}
