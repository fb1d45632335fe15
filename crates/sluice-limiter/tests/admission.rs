use std::sync::Arc;
use std::time::Duration;

use sluice_limiter::{
    AdmissionController, Clock, KeyScope, ManualClock, MemoryCounterStore, RateRule, RateRuleSet,
};

fn controller(rules: RateRuleSet) -> (AdmissionController, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(1_700_000_000_000));
    let controller = AdmissionController::new(rules, Arc::new(MemoryCounterStore::new()))
        .with_clock(clock.clone());
    (controller, clock)
}

async fn allowed(controller: &AdmissionController, route: &str) -> bool {
    controller
        .check(route, "GET", "192.168.1.7", None)
        .await
        .is_allowed()
}

#[tokio::test]
async fn token_bucket_burst_then_refill() {
    let (controller, clock) = controller(RateRuleSet::new(RateRule::token_bucket("", 5.0, 10)));

    for i in 0..10 {
        assert!(allowed(&controller, "/api").await, "check {} should pass", i);
    }
    assert!(!allowed(&controller, "/api").await, "11th immediate check must be denied");

    clock.advance(Duration::from_secs(1));
    let mut admitted = 0;
    for _ in 0..10 {
        if allowed(&controller, "/api").await {
            admitted += 1;
        }
    }
    assert!(admitted >= 5, "only {} admitted after refill", admitted);
}

#[tokio::test]
async fn sliding_window_limit_then_expiry() {
    let (controller, clock) =
        controller(RateRuleSet::new(RateRule::sliding_window("", 3, "1s")));

    for _ in 0..3 {
        assert!(allowed(&controller, "/login").await);
        clock.advance(Duration::from_millis(100));
    }
    assert!(!allowed(&controller, "/login").await);

    clock.advance(Duration::from_secs(1));
    assert!(allowed(&controller, "/login").await);
}

#[tokio::test]
async fn slow_refill_bucket_admits_once_then_denies() {
    let (controller, clock) = controller(RateRuleSet::new(RateRule::token_bucket("", 1e-16, 1)));

    assert!(allowed(&controller, "/slow").await);
    assert!(!allowed(&controller, "/slow").await);

    clock.advance(Duration::from_secs(3600));
    assert!(!allowed(&controller, "/slow").await);
}

#[tokio::test]
async fn sub_millisecond_window_still_limits() {
    let (controller, _clock) =
        controller(RateRuleSet::new(RateRule::sliding_window("", 1, "500us")));

    let mut admitted = 0;
    for _ in 0..5 {
        if allowed(&controller, "/tiny").await {
            admitted += 1;
        }
    }
    assert_eq!(admitted, 1);
}

#[tokio::test]
async fn unmatched_route_falls_back_to_default_rule() {
    let rules = RateRuleSet::new(RateRule::token_bucket("", 1.0, 2))
        .with_rule(RateRule::token_bucket("/chat", 100.0, 100));
    let (controller, _clock) = controller(rules);

    assert!(allowed(&controller, "/somewhere").await);
    assert!(allowed(&controller, "/somewhere").await);
    assert!(!allowed(&controller, "/somewhere").await);

    // The default quota is keyed per route
    assert!(allowed(&controller, "/elsewhere").await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_checks_on_last_unit_admit_exactly_one() {
    for algorithm in ["token_bucket", "sliding_window"] {
        let rule = match algorithm {
            "token_bucket" => RateRule::token_bucket("", 0.001, 1),
            _ => RateRule::sliding_window("", 1, "1m"),
        }
        .with_scope(KeyScope::Global);
        let (controller, _clock) = controller(RateRuleSet::new(rule));

        let handles: Vec<_> = (0..2)
            .map(|i| {
                let controller = controller.clone();
                tokio::spawn(async move {
                    controller
                        .check("/race", "POST", &format!("10.0.0.{}", i), None)
                        .await
                        .is_allowed()
                })
            })
            .collect();

        let results = futures::future::join_all(handles).await;
        let admitted = results.into_iter().filter(|r| *r.as_ref().unwrap()).count();
        assert_eq!(admitted, 1, "{} admitted twice", algorithm);
    }
}

#[tokio::test]
async fn many_concurrent_callers_never_exceed_capacity() {
    let rule = RateRule::sliding_window("", 25, "1m").with_scope(KeyScope::Global);
    let (controller, clock) = controller(RateRuleSet::new(rule));
    assert!(clock.now_millis() > 0);

    let handles: Vec<_> = (0..200)
        .map(|_| {
            let controller = controller.clone();
            tokio::spawn(async move { allowed(&controller, "/burst").await })
        })
        .collect();

    let admitted = futures::future::join_all(handles)
        .await
        .into_iter()
        .filter(|r| *r.as_ref().unwrap())
        .count();
    assert_eq!(admitted, 25);
}
