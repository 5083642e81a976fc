//! Provider pool failover and health monitoring.

use std::sync::Arc;

use alloy::primitives::Address;
use alloy::rpc::types::TransactionRequest;

use wallet_relay::config::HealthCheckConfig;
use wallet_relay::provider::{
    ChainAdapter, HealthMonitor, PoolEvent, PoolSettings, ProviderError, ProviderPool, SwitchReason,
};

mod common;
use common::MockAdapter;

fn pool(adapters: &[Arc<MockAdapter>]) -> Arc<ProviderPool> {
    let adapters = adapters.iter().map(|a| a.clone() as Arc<dyn ChainAdapter>).collect();
    Arc::new(ProviderPool::new(PoolSettings::default(), adapters))
}

async fn block_number(pool: &ProviderPool) -> Result<u64, ProviderError> {
    pool.execute(1, |a| async move { a.block_number().await }).await
}

#[tokio::test]
async fn consecutive_failures_fail_over_to_the_next_adapter() {
    let primary = MockAdapter::new("primary", &[1]);
    let backup = MockAdapter::new("backup", &[1]);
    let pool = pool(&[primary.clone(), backup.clone()]);
    let mut events = pool.subscribe();
    primary.set_failing(true);

    for _ in 0..3 {
        let err = block_number(&pool).await.unwrap_err();
        assert!(err.is_upstream());
    }
    assert_eq!(pool.active_name(1).as_deref(), Some("backup"));

    assert_eq!(block_number(&pool).await.unwrap(), 100);
    assert_eq!(primary.calls(), 3);
    assert_eq!(backup.calls(), 1);

    match events.try_recv().unwrap() {
        PoolEvent::ProviderSwitched { chain_id, from, to, reason } => {
            assert_eq!(chain_id, 1);
            assert_eq!(from.as_deref(), Some("primary"));
            assert_eq!(to, "backup");
            assert_eq!(reason, SwitchReason::Failover);
        }
    }
}

#[tokio::test]
async fn a_success_resets_the_failure_streak() {
    let primary = MockAdapter::new("primary", &[1]);
    let backup = MockAdapter::new("backup", &[1]);
    let pool = pool(&[primary.clone(), backup]);

    primary.set_failing(true);
    block_number(&pool).await.unwrap_err();
    block_number(&pool).await.unwrap_err();
    primary.set_failing(false);
    block_number(&pool).await.unwrap();
    primary.set_failing(true);
    block_number(&pool).await.unwrap_err();

    assert_eq!(pool.active_name(1).as_deref(), Some("primary"));
}

#[tokio::test]
async fn failover_without_a_replacement_keeps_the_active_adapter() {
    let only = MockAdapter::new("only", &[1]);
    let pool = pool(&[only.clone()]);
    only.set_failing(true);

    for _ in 0..5 {
        block_number(&pool).await.unwrap_err();
    }
    assert_eq!(pool.active_name(1).as_deref(), Some("only"));
}

#[tokio::test]
async fn health_probes_replace_an_unhealthy_active_adapter() {
    let primary = MockAdapter::new("primary", &[1, 10]);
    let backup = MockAdapter::new("backup", &[1]);
    let pool = pool(&[primary.clone(), backup.clone()]);
    let monitor = HealthMonitor::new(pool.clone(), HealthCheckConfig::default());

    primary.set_failing(true);
    monitor.check_all().await;
    monitor.check_all().await;
    assert_eq!(pool.active_name(1).as_deref(), Some("primary"));

    monitor.check_all().await;
    assert_eq!(pool.active_name(1).as_deref(), Some("backup"));
    // Nobody else serves chain 10.
    assert_eq!(pool.active_name(10).as_deref(), Some("primary"));
}

#[tokio::test]
async fn reload_events_see_the_new_provider_set() {
    let primary = MockAdapter::new("primary", &[1]);
    let backup = MockAdapter::new("backup", &[1]);
    let pool = pool(&[primary, backup]);
    let mut events = pool.subscribe();

    let observer = {
        let pool = pool.clone();
        std::thread::spawn(move || {
            let event = events.blocking_recv().unwrap();
            (event, pool.active_name(1))
        })
    };

    let replacement = MockAdapter::new("backup", &[1]);
    pool.replace_adapters(vec![replacement as Arc<dyn ChainAdapter>]);

    let (event, seen) = observer.join().unwrap();
    match event {
        PoolEvent::ProviderSwitched { chain_id, from, to, reason } => {
            assert_eq!(chain_id, 1);
            assert_eq!(from.as_deref(), Some("primary"));
            assert_eq!(to, "backup");
            assert_eq!(reason, SwitchReason::Reload);
        }
    }
    assert_eq!(seen.as_deref(), Some("backup"));
}

#[tokio::test]
async fn named_switch_and_unknown_provider() {
    let primary = MockAdapter::new("primary", &[1]);
    let backup = MockAdapter::new("backup", &[1]);
    let pool = pool(&[primary, backup]);

    assert_eq!(pool.switch_provider(1, Some("backup")).unwrap(), "backup");
    assert_eq!(pool.switch_provider(1, Some("backup")).unwrap(), "backup");
    assert!(matches!(
        pool.switch_provider(1, Some("missing")),
        Err(ProviderError::UnknownProvider(_))
    ));
    assert!(matches!(pool.switch_provider(5, None), Err(ProviderError::UnsupportedChain(5))));
}

#[tokio::test]
async fn switching_rebinds_the_signer_to_the_new_provider() {
    let primary = MockAdapter::new("primary", &[1]);
    let backup = MockAdapter::new("backup", &[1]);
    let pool = pool(&[primary, backup]);
    let vault = common::unlocked_vault();

    let bound = pool.signer_for(1, vault.as_ref()).unwrap();
    assert_eq!(bound.provider(), "primary");

    pool.switch_provider(1, Some("backup")).unwrap();
    let rebound = pool.bound_signer().unwrap();
    assert_eq!(rebound.provider(), "backup");
    assert_eq!(rebound.address(), bound.address());
}

#[tokio::test]
async fn locked_vault_fails_before_any_network_call() {
    let adapter = MockAdapter::new("primary", &[1]);
    let pool = pool(&[adapter.clone()]);
    let vault = common::unlocked_vault();
    vault.lock();

    let tx = TransactionRequest::default().to(Address::repeat_byte(0x11));
    let err = pool.send_transaction(1, vault.as_ref(), tx).await.unwrap_err();

    assert!(matches!(err, ProviderError::KeyUnavailable(_)));
    assert_eq!(adapter.calls(), 0);
}

#[tokio::test]
async fn fee_ceiling_rejects_expensive_transactions() {
    let adapter = MockAdapter::new("primary", &[1]);
    let pool = pool(&[adapter.clone()]);
    let vault = common::unlocked_vault();

    let tx = TransactionRequest::default()
        .to(Address::repeat_byte(0x11))
        .max_fee_per_gas(10_000 * common::GWEI)
        .max_priority_fee_per_gas(common::GWEI);
    let err = pool.send_transaction(1, vault.as_ref(), tx).await.unwrap_err();

    assert!(matches!(err, ProviderError::FeeTooHigh { .. }));
    assert!(adapter.sent().is_empty());
}
