// SPDX-License-Identifier: MIT

use super::*;
use quarry_core::{ProxyProtocol, StickyConfig};

fn endpoint(host: &str) -> ProxyEndpoint {
    ProxyEndpoint {
        protocol: ProxyProtocol::Http,
        host: host.to_string(),
        port: 8080,
        username: None,
        password: None,
    }
}

fn pool(name: &str, strategy: ProxyStrategy, hosts: &[&str]) -> ProxyPool {
    ProxyPool {
        name: name.to_string(),
        strategy,
        endpoints: hosts.iter().map(|h| endpoint(h)).collect(),
        sticky: None,
        recency_window: None,
    }
}

fn selector_with(pool: ProxyPool) -> ProxySelector {
    let selector = ProxySelector::new();
    selector.add_pool(pool);
    selector
}

#[test]
fn unknown_pool_errors() {
    let selector = ProxySelector::new();
    let err = selector.select("nope", &SelectionCtx::default()).unwrap_err();
    assert_eq!(err, SelectError::UnknownPool("nope".into()));
}

#[test]
fn round_robin_wraps() {
    let selector = selector_with(pool("p", ProxyStrategy::RoundRobin, &["a", "b", "c"]));
    let ctx = SelectionCtx::default();

    let hosts: Vec<String> =
        (0..5).map(|_| selector.select("p", &ctx).unwrap().host).collect();
    assert_eq!(hosts, vec!["a", "b", "c", "a", "b"]);
}

#[test]
fn peek_does_not_advance_round_robin() {
    let selector = selector_with(pool("p", ProxyStrategy::RoundRobin, &["a", "b"]));
    let ctx = SelectionCtx::default();

    assert_eq!(selector.peek("p", &ctx).unwrap().host, "a");
    assert_eq!(selector.peek("p", &ctx).unwrap().host, "a");
    assert_eq!(selector.select("p", &ctx).unwrap().host, "a");
    assert_eq!(selector.peek("p", &ctx).unwrap().host, "b");
}

#[test]
fn random_selects_valid_endpoints() {
    let selector = selector_with(pool("p", ProxyStrategy::Random, &["a", "b", "c"]));
    let ctx = SelectionCtx::default();
    for _ in 0..50 {
        let host = selector.select("p", &ctx).unwrap().host;
        assert!(["a", "b", "c"].contains(&host.as_str()));
    }
}

#[test]
fn recency_window_excludes_recent_picks() {
    let mut p = pool("p", ProxyStrategy::Random, &["a", "b", "c"]);
    p.recency_window = Some(2);
    let selector = selector_with(p);
    let ctx = SelectionCtx::default();

    // With window 2 over 3 endpoints, consecutive picks never repeat
    // within a window of two.
    let mut last_two: VecDeque<String> = VecDeque::new();
    for _ in 0..30 {
        let host = selector.select("p", &ctx).unwrap().host;
        assert!(!last_two.contains(&host), "recent endpoint reselected: {host}");
        last_two.push_back(host);
        if last_two.len() > 2 {
            last_two.pop_front();
        }
    }
}

#[test]
fn recency_window_larger_than_pool_falls_back_to_lru() {
    let mut p = pool("p", ProxyStrategy::Random, &["a", "b"]);
    // Window is clamped to pool size - 1, so selection keeps alternating
    p.recency_window = Some(10);
    let selector = selector_with(p);
    let ctx = SelectionCtx::default();

    let first = selector.select("p", &ctx).unwrap().host;
    let second = selector.select("p", &ctx).unwrap().host;
    let third = selector.select("p", &ctx).unwrap().host;
    assert_ne!(first, second);
    assert_eq!(first, third, "LRU fallback cycles");
}

#[test]
fn peek_does_not_advance_recency_ring() {
    let mut p = pool("p", ProxyStrategy::Random, &["a", "b"]);
    p.recency_window = Some(1);
    let selector = selector_with(p);
    let ctx = SelectionCtx::default();

    let committed = selector.select("p", &ctx).unwrap().host;
    // Peeks exclude the committed endpoint but never extend the ring
    for _ in 0..10 {
        let peeked = selector.peek("p", &ctx).unwrap().host;
        assert_ne!(peeked, committed);
    }
}

#[test]
fn sticky_job_scope_maps_job_to_one_endpoint() {
    let mut p = pool("p", ProxyStrategy::Sticky, &["a", "b", "c"]);
    p.sticky = Some(StickyConfig { scope: StickyScope::Job, ttl_ms: None });
    let selector = selector_with(p);

    let job_1 = JobId::from_string("job-1");
    let job_2 = JobId::from_string("job-2");
    let ctx_1 = SelectionCtx { job_id: Some(&job_1), ..Default::default() };
    let ctx_2 = SelectionCtx { job_id: Some(&job_2), ..Default::default() };

    let first = selector.select("p", &ctx_1).unwrap().host;
    assert_eq!(selector.select("p", &ctx_1).unwrap().host, first);
    assert_ne!(selector.select("p", &ctx_2).unwrap().host, first);
}

#[test]
fn explicit_sticky_key_wins_over_scope() {
    let mut p = pool("p", ProxyStrategy::Sticky, &["a", "b"]);
    p.sticky = Some(StickyConfig { scope: StickyScope::Job, ttl_ms: None });
    let selector = selector_with(p);

    let job_1 = JobId::from_string("job-1");
    let ctx_a =
        SelectionCtx { sticky_key: Some("shared"), job_id: Some(&job_1), ..Default::default() };
    let job_2 = JobId::from_string("job-2");
    let ctx_b =
        SelectionCtx { sticky_key: Some("shared"), job_id: Some(&job_2), ..Default::default() };

    assert_eq!(
        selector.select("p", &ctx_a).unwrap().host,
        selector.select("p", &ctx_b).unwrap().host
    );
}

#[test]
fn sticky_domain_scope_uses_host() {
    let mut p = pool("p", ProxyStrategy::Sticky, &["a", "b"]);
    p.sticky = Some(StickyConfig { scope: StickyScope::Domain, ttl_ms: None });
    let selector = selector_with(p);

    let ctx = SelectionCtx { host: Some("shop.example.com"), ..Default::default() };
    let first = selector.select("p", &ctx).unwrap().host;
    assert_eq!(selector.select("p", &ctx).unwrap().host, first);

    // No derivable key is an error
    let err = selector.select("p", &SelectionCtx::default()).unwrap_err();
    assert!(matches!(err, SelectError::NoStickyKey(_)));
}

#[test]
fn sticky_origin_scope_needs_all_parts() {
    let mut p = pool("p", ProxyStrategy::Sticky, &["a", "b"]);
    p.sticky = Some(StickyConfig { scope: StickyScope::Origin, ttl_ms: None });
    let selector = selector_with(p);

    let ctx = SelectionCtx {
        scheme: Some("https"),
        host: Some("shop.example.com"),
        port: Some(443),
        ..Default::default()
    };
    let first = selector.select("p", &ctx).unwrap().host;
    assert_eq!(selector.select("p", &ctx).unwrap().host, first);

    let partial = SelectionCtx { scheme: Some("https"), ..Default::default() };
    assert!(selector.select("p", &partial).is_err());
}

#[test]
fn sticky_ttl_expiry_reselects() {
    let mut p = pool("p", ProxyStrategy::Sticky, &["a", "b"]);
    p.sticky = Some(StickyConfig { scope: StickyScope::Job, ttl_ms: Some(0) });
    let selector = selector_with(p);

    let job = JobId::from_string("job-1");
    let ctx = SelectionCtx { job_id: Some(&job), ..Default::default() };
    let first = selector.select("p", &ctx).unwrap().host;
    // TTL of zero expires immediately; rotation moves to the next endpoint
    let second = selector.select("p", &ctx).unwrap().host;
    assert_ne!(first, second);
}
