//! Cost-aware rate limiting using GCRA (Generic Cell Rate Algorithm).
//!
//! Each operation has a token cost; the limiter grants a per-IP budget per
//! minute. Reads are cheap, delegation and process control are expensive.

use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use axum::middleware::Next;
use governor::{clock::DefaultClock, state::keyed::DashMapStateStore, Quota, RateLimiter};
use std::net::{IpAddr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::Arc;

pub fn operation_cost(method: &str, path: &str) -> NonZeroU32 {
    match (method, path) {
        (_, "/api/health") => NonZeroU32::new(1).unwrap(),
        ("GET", "/api/status") => NonZeroU32::new(1).unwrap(),
        ("GET", "/memory/get") => NonZeroU32::new(2).unwrap(),
        ("POST", "/memory/store") => NonZeroU32::new(3).unwrap(),
        ("DELETE", "/memory/delete") => NonZeroU32::new(3).unwrap(),
        ("POST", "/memory/query") => NonZeroU32::new(10).unwrap(),
        ("GET", "/orchestrate/directory") => NonZeroU32::new(2).unwrap(),
        ("GET", "/orchestrate/current_task") => NonZeroU32::new(2).unwrap(),
        ("POST", "/orchestrate/delegate") => NonZeroU32::new(25).unwrap(),
        ("POST", "/orchestrate/complete") => NonZeroU32::new(5).unwrap(),
        ("POST", "/approvals/request") => NonZeroU32::new(15).unwrap(),
        ("GET", p) if p.starts_with("/api/audit") => NonZeroU32::new(5).unwrap(),
        ("POST", p) if p.ends_with("/start") || p.ends_with("/stop") => {
            NonZeroU32::new(25).unwrap()
        }
        ("POST", "/api/halt") => NonZeroU32::new(1).unwrap(),
        _ => NonZeroU32::new(5).unwrap(),
    }
}

pub type KeyedRateLimiter = RateLimiter<IpAddr, DashMapStateStore<IpAddr>, DefaultClock>;

pub fn create_rate_limiter(units_per_minute: u32) -> Arc<KeyedRateLimiter> {
    let quota = NonZeroU32::new(units_per_minute.max(1)).unwrap_or(NonZeroU32::MIN);
    Arc::new(RateLimiter::keyed(Quota::per_minute(quota)))
}

/// GCRA rate limiting middleware. Returns 429 with `retry-after` once the
/// client's budget is spent.
pub async fn gcra_rate_limit(
    axum::extract::State(limiter): axum::extract::State<Arc<KeyedRateLimiter>>,
    request: Request<Body>,
    next: Next,
) -> Response<Body> {
    let ip = request
        .extensions()
        .get::<axum::extract::ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip())
        .unwrap_or(IpAddr::from([127, 0, 0, 1]));

    let method = request.method().as_str().to_string();
    let path = request.uri().path().to_string();
    let cost = operation_cost(&method, &path);

    // Outer Err means the cost exceeds the whole budget; inner Err means
    // the budget is currently spent. Both are a denial.
    if !matches!(limiter.check_key_n(&ip, cost), Ok(Ok(()))) {
        tracing::warn!(ip = %ip, cost = cost.get(), path = %path, "Rate limit exceeded");
        return Response::builder()
            .status(StatusCode::TOO_MANY_REQUESTS)
            .header("content-type", "application/json")
            .header("retry-after", "60")
            .body(Body::from(
                serde_json::json!({"error": "rate limit exceeded"}).to_string(),
            ))
            .unwrap_or_default();
    }

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn costs() {
        assert_eq!(operation_cost("GET", "/api/health").get(), 1);
        assert_eq!(operation_cost("POST", "/memory/store").get(), 3);
        assert_eq!(operation_cost("POST", "/memory/query").get(), 10);
        assert_eq!(operation_cost("POST", "/orchestrate/delegate").get(), 25);
        assert_eq!(operation_cost("POST", "/api/agents/writer/start").get(), 25);
        assert_eq!(operation_cost("GET", "/api/audit/recent").get(), 5);
        assert_eq!(operation_cost("GET", "/approvals/pending").get(), 5);
    }

    #[test]
    fn budget_exhausts() {
        let limiter = create_rate_limiter(10);
        let ip = IpAddr::from([127, 0, 0, 1]);
        assert!(matches!(
            limiter.check_key_n(&ip, NonZeroU32::new(10).unwrap()),
            Ok(Ok(()))
        ));
        assert!(!matches!(
            limiter.check_key_n(&ip, NonZeroU32::new(1).unwrap()),
            Ok(Ok(()))
        ));
    }
}
