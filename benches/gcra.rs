use criterion::{black_box, criterion_group, criterion_main, Criterion};
use sessiongate::rate_limit::{GcraLimiter, InMemoryCounterStore, Quota, Rate, RateLimitLayer};

use std::convert::Infallible;
use std::sync::Arc;
use tower::{Service, ServiceBuilder};
use futures::future::Ready;

// A service that answers every request with an empty 200.
#[derive(Clone)]
struct OkService;

impl Service<http::Request<()>> for OkService {
    type Response = http::Response<()>;
    type Error = Infallible;
    type Future = Ready<Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, _req: http::Request<()>) -> Self::Future {
        futures::future::ready(Ok(http::Response::new(())))
    }
}

fn gcra_check_hot_key(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    // One event per nanosecond: the key never runs dry during the run.
    let quota = Quota::new(Rate::per_second(1_000_000_000), 0);
    let limiter = GcraLimiter::new(InMemoryCounterStore::new(), quota).unwrap();

    c.bench_function("gcra_check_hot_key", |b| {
        b.to_async(&rt).iter(|| async {
            let _ = black_box(limiter.check_n(black_box("hot"), 1).await);
        });
    });
}

fn gcra_check_denied(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let quota = Quota::new(Rate::per_day(1), 0);
    let limiter = GcraLimiter::new(InMemoryCounterStore::new(), quota).unwrap();

    c.bench_function("gcra_check_denied", |b| {
        b.to_async(&rt).iter(|| async {
            let _ = black_box(limiter.check_n(black_box("drained"), 1).await);
        });
    });
}

fn gcra_layer_spread_keys(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let quota = Quota::new(Rate::per_second(1_000), 100);
    let limiter = GcraLimiter::new(InMemoryCounterStore::new(), quota).unwrap();
    let svc = ServiceBuilder::new()
        .layer(RateLimitLayer::shared(Arc::new(limiter)))
        .service(OkService);
    let paths: Vec<String> = (0..1024).map(|i| format!("/users/{i}")).collect();
    let mut next = 0usize;

    c.bench_function("gcra_layer_1024_keys", |b| {
        b.to_async(&rt).iter(|| {
            next = (next + 1) % paths.len();
            let req = http::Request::builder().uri(paths[next].as_str()).body(()).unwrap();
            let mut local_svc = svc.clone();
            async move {
                let _ = black_box(local_svc.call(req)).await;
            }
        });
    });
}

criterion_group!(benches, gcra_check_hot_key, gcra_check_denied, gcra_layer_spread_keys);
criterion_main!(benches);
