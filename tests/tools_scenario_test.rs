//! 模拟订单后端的统计与负载形态测试

use std::sync::Arc;

use order_desk::tools::{
    order_desk_registry, Chaos, ToolExecutor, ToolOutcome, CANCEL_ORDER, ESCALATE_TO_HUMAN,
    GET_ORDER_STATUS, ORDER_STATUSES,
};
use serde_json::json;

fn executor(seed: u64) -> ToolExecutor {
    ToolExecutor::new(order_desk_registry(Arc::new(Chaos::new(Some(seed))), 0..=0), 30)
}

#[tokio::test]
async fn test_order_status_transient_rate_converges_to_twenty_percent() {
    let exec = executor(42);
    let trials = 2000;
    let mut transient = 0;
    for _ in 0..trials {
        let outcome = exec
            .invoke(GET_ORDER_STATUS, json!({"orderId": "A1"}))
            .await
            .unwrap();
        if outcome.is_retryable() {
            transient += 1;
        }
    }
    let rate = transient as f64 / trials as f64;
    assert!((0.15..=0.25).contains(&rate), "transient rate {}", rate);
}

#[tokio::test]
async fn test_order_status_success_shape() {
    let exec = executor(7);
    let mut successes = 0;
    for _ in 0..60 {
        match exec
            .invoke(GET_ORDER_STATUS, json!({"orderId": "A1"}))
            .await
            .unwrap()
        {
            ToolOutcome::Success(p) => {
                successes += 1;
                assert_eq!(p["success"], true);
                assert_eq!(p["orderId"], "A1");
                let status = p["status"].as_str().unwrap();
                assert!(ORDER_STATUSES.contains(&status));
                assert_eq!(p.get("trackingNumber").is_some(), status == "shipped");
            }
            ToolOutcome::TransientError(msg) => {
                let outcome = ToolOutcome::TransientError(msg);
                assert!(outcome.to_content().starts_with("Error: "));
                assert!(outcome.payload().is_none());
            }
            other => panic!("get_order_status has no domain failures: {:?}", other),
        }
    }
    assert!(successes > 0);
}

#[tokio::test]
async fn test_cancel_order_outcome_shapes() {
    let exec = executor(2024);
    let (mut ok, mut domain, mut transient) = (0, 0, 0);
    for _ in 0..400 {
        let outcome = exec
            .invoke(CANCEL_ORDER, json!({"orderId": "B2"}))
            .await
            .unwrap();
        match &outcome {
            ToolOutcome::Success(p) => {
                ok += 1;
                assert_eq!(p["orderId"], "B2");
                assert_eq!(p["status"], "cancelled");
                assert!(p["cancellationId"].as_str().unwrap().starts_with("CX-"));
            }
            ToolOutcome::DomainFailure {
                reason, payload, ..
            } => {
                domain += 1;
                assert_eq!(reason, "pending_verification");
                assert_eq!(payload["success"], false);
                assert_eq!(payload["orderId"], "B2");
                assert!(!outcome.is_retryable());
            }
            ToolOutcome::TransientError(_) => {
                transient += 1;
                assert!(outcome.payload().is_none());
                assert!(outcome.is_retryable());
            }
        }
    }
    assert!(ok > 0 && domain > 0 && transient > 0);
}

#[tokio::test]
async fn test_missing_order_id_is_domain_failure() {
    let exec = executor(1);
    let outcome = exec.invoke(GET_ORDER_STATUS, json!({})).await.unwrap();
    match outcome {
        ToolOutcome::DomainFailure { reason, .. } => assert_eq!(reason, "invalid_arguments"),
        other => panic!("expected domain failure, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_escalation_waits_within_configured_range() {
    let exec = ToolExecutor::new(
        order_desk_registry(Arc::new(Chaos::new(Some(5))), 2000..=5000),
        30,
    );
    let start = tokio::time::Instant::now();
    exec.invoke(ESCALATE_TO_HUMAN, json!({"summary": "broken blender"}))
        .await
        .unwrap();
    let elapsed = start.elapsed();
    assert!(elapsed >= std::time::Duration::from_millis(2000));
    assert!(elapsed <= std::time::Duration::from_millis(5000));
}
