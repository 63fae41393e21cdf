use std::sync::Arc;

use gatehouse::middleware::Cors;
use gatehouse::{Gateway, Method, MetricsMiddleware, MetricsRegistry, Request, Router};

const ROUTES: usize = 10;
const REQUESTS: usize = 1000;

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_requests_are_all_counted() {
    let registry = Arc::new(MetricsRegistry::new());
    let mut router = Router::new();
    {
        let mut group = router.group("/load");
        for i in 0..ROUTES {
            group
                .register(Method::Get, &format!("/r{i}"), |_req: Request| async {
                    tokio::task::yield_now().await;
                    "ok"
                })
                .unwrap();
        }
    }
    let gateway = Gateway::builder(router)
        .layer(Cors::permissive())
        .layer(MetricsMiddleware::new(Arc::clone(&registry)))
        .build();

    let mut tasks = tokio::task::JoinSet::new();
    for n in 0..REQUESTS {
        let gateway = gateway.clone();
        tasks.spawn(async move {
            let req = Request::builder(Method::Get, &format!("/load/r{}", n % ROUTES)).build();
            gateway.handle(req).await.status()
        });
    }
    while let Some(status) = tasks.join_next().await {
        assert_eq!(status.unwrap(), http::StatusCode::OK);
    }

    let snap = registry.snapshot();
    assert_eq!(snap.total_requests(), REQUESTS as u64);
    assert_eq!(snap.total_observations(), REQUESTS as u64);
    for i in 0..ROUTES {
        let route = format!("/load/r{i}");
        assert_eq!(snap.request_count(Method::Get, &route, 200), (REQUESTS / ROUTES) as u64);
        assert_eq!(snap.histogram(Method::Get, &route).unwrap().count, (REQUESTS / ROUTES) as u64);
    }
}

#[test]
fn registry_updates_from_plain_threads() {
    let registry = Arc::new(MetricsRegistry::new());
    let handles: Vec<_> = (0..8)
        .map(|t| {
            let registry = Arc::clone(&registry);
            std::thread::spawn(move || {
                for i in 0..250 {
                    let route = if (t + i) % 2 == 0 { "/even" } else { "/odd" };
                    registry.increment_request_count(Method::Post, route, http::StatusCode::ACCEPTED);
                    registry.observe_duration(Method::Post, route, std::time::Duration::from_micros(i as u64));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let snap = registry.snapshot();
    assert_eq!(snap.total_requests(), 2000);
    assert_eq!(snap.total_observations(), 2000);
    assert_eq!(
        snap.request_count(Method::Post, "/even", 202) + snap.request_count(Method::Post, "/odd", 202),
        2000
    );
}
