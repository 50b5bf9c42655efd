use super::AuthGate;
use futures::future::BoxFuture;
use http::header::{HeaderValue, WWW_AUTHENTICATE};
use http::{Request, Response, StatusCode};
use std::sync::Arc;
use std::task::{Context, Poll};
use tower_layer::Layer;
use tower_service::Service;

/// Authentication layer wraps an inner service and runs the [`AuthGate`] before it.
#[derive(Clone, Debug)]
pub struct AuthLayer {
    gate: Arc<AuthGate>,
}

impl AuthLayer {
    /// Create a new authentication layer around `gate`.
    pub fn new(gate: AuthGate) -> Self {
        Self {
            gate: Arc::new(gate),
        }
    }
}

impl<S> Layer<S> for AuthLayer {
    type Service = AuthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthService {
            inner,
            gate: self.gate.clone(),
        }
    }
}

/// Service that authenticates requests before forwarding them.
///
/// On success the request gains an [`Identity`](super::Identity) extension. On any
/// rejection the inner service is not called and the response is a bare
/// `401 Unauthorized`, identical for every rejection reason.
#[derive(Clone, Debug)]
pub struct AuthService<S> {
    inner: S,
    gate: Arc<AuthGate>,
}

fn unauthorized<B: Default>() -> Response<B> {
    let mut res = Response::new(B::default());
    *res.status_mut() = StatusCode::UNAUTHORIZED;
    res.headers_mut().insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
    res
}

impl<S, ReqB, ResB> Service<Request<ReqB>> for AuthService<S>
where
    S: Service<Request<ReqB>, Response = Response<ResB>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    ReqB: Send + 'static,
    ResB: Default + Send + 'static,
{
    type Response = Response<ResB>;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<ReqB>) -> Self::Future {
        let gate = self.gate.clone();
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        Box::pin(async move {
            match gate.authenticate(req.headers()).await {
                Ok(identity) => {
                    req.extensions_mut().insert(identity);
                    inner.call(req).await
                }
                Err(_) => Ok(unauthorized()),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{InMemorySessionRegistry, StaticUsers};
    use std::convert::Infallible;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tower::ServiceExt;

    #[tokio::test]
    async fn missing_headers_short_circuit_with_401() {
        let registry = InMemorySessionRegistry::new(Arc::new(StaticUsers::default()));
        let layer = AuthLayer::new(AuthGate::new(Arc::new(registry)));
        let called = Arc::new(AtomicBool::new(false));
        let flag = called.clone();
        let svc = layer.layer(tower::service_fn(move |_req: Request<()>| {
            flag.store(true, Ordering::SeqCst);
            async { Ok::<Response<()>, Infallible>(Response::new(())) }
        }));
        let res = svc.oneshot(Request::new(())).await.unwrap();
        assert!(!called.load(Ordering::SeqCst));
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(res.headers()[WWW_AUTHENTICATE], "Bearer");
    }
}
