// SPDX-License-Identifier: BUSL-1.1
// Copyright 2025 Alfred Jean LLC

//! The six end-to-end scenarios and two concurrency properties from §8,
//! exercised against the real `Broker` façade with the in-memory stub
//! adapter standing in for hardware.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use broker_specs::{
    broker_with_adapter, broker_with_stub_adapters, faulting_adapter, slow_adapter,
    FixedAdapterFactory,
};
use resource_broker::{Broker, BrokerOptions, CameraState, ErrorCode, FacadeError, TimeoutProfile};

const TIMEOUT: Duration = Duration::from_secs(2);

#[tokio::test]
async fn happy_path() -> anyhow::Result<()> {
    let broker = broker_with_stub_adapters(1).await;
    let session = broker.create_session().await?;

    let started = Arc::new(AtomicUsize::new(0));
    let s = Arc::clone(&started);
    session.on_started(move |event| {
        assert!(event.success);
        assert_eq!(event.state_after, CameraState::Streaming);
        s.fetch_add(1, Ordering::SeqCst);
    });

    let ticket = session.start_streaming(None).await;
    assert!(ticket.is_accepted());
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(started.load(Ordering::SeqCst), 1);
    assert_eq!(session.current_state().await, CameraState::Streaming);

    session.pause(None).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(session.current_state().await, CameraState::Paused);

    session.resume(None).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(session.current_state().await, CameraState::Streaming);

    session.stop(None).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(session.current_state().await, CameraState::Stopped);

    broker.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn illegal_transition() -> anyhow::Result<()> {
    let broker = broker_with_stub_adapters(1).await;
    let session = broker.create_session().await?;

    // Drive the resource into Streaming first.
    session.start_streaming(None).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(session.current_state().await, CameraState::Streaming);

    let ticket = session.start_streaming(None).await;
    assert!(!ticket.is_accepted());
    assert_eq!(ticket.error, Some(ErrorCode::IllegalTransition));

    // No completion event follows the rejected request: register a fresh
    // `on_started` after the fact and confirm nothing arrives within 300ms.
    let count = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&count);
    session.on_started(move |_| {
        c.fetch_add(1, Ordering::SeqCst);
    });
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(count.load(Ordering::SeqCst), 0);

    broker.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn ownership_conflict_surfaces_as_no_resource_available() -> anyhow::Result<()> {
    let broker = broker_with_stub_adapters(1).await;
    let _u1 = broker.create_session().await?;

    let u2 = broker.create_session().await;
    assert!(matches!(u2, Err(FacadeError::NoResourceAvailable)));

    broker.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn pre_cancelled_request_fails_immediately() -> anyhow::Result<()> {
    let broker = broker_with_stub_adapters(1).await;
    let session = broker.create_session().await?;

    let cancel = CancellationToken::new();
    cancel.cancel();
    let ticket = session.start_streaming(Some(cancel)).await;
    assert!(!ticket.is_accepted());
    assert_eq!(ticket.error, Some(ErrorCode::Cancelled));

    broker.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn timeout_produces_failure_completion() -> anyhow::Result<()> {
    let mut options = BrokerOptions::new(Arc::new(FixedAdapterFactory::new(slow_adapter(
        Duration::from_millis(200),
    ))));
    options.preregister_count = 1;
    options.metrics_enabled = false;
    options.timeouts = TimeoutProfile { start: Duration::from_millis(40), ..options.timeouts };

    let broker = Broker::initialize(options).await;
    let session = broker.create_session().await?;

    let completion: Arc<std::sync::Mutex<Option<resource_broker::CompletionEvent>>> =
        Arc::new(std::sync::Mutex::new(None));
    let c = Arc::clone(&completion);
    session.on_started(move |event| {
        if let Ok(mut slot) = c.lock() {
            *slot = Some(event);
        }
    });

    let ticket = session.start_streaming(None).await;
    assert!(ticket.is_accepted());

    tokio::time::sleep(TIMEOUT).await;
    let event = completion
        .lock()
        .map_err(|_| anyhow::anyhow!("completion mutex poisoned"))?
        .clone()
        .ok_or_else(|| anyhow::anyhow!("no completion event delivered"))?;
    assert!(!event.success);
    assert_eq!(event.error, Some(ErrorCode::TimedOut));

    broker.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn hardware_fault_produces_failure_completion_with_hw_code() -> anyhow::Result<()> {
    let broker = broker_with_adapter(faulting_adapter()).await;
    let session = broker.create_session().await?;

    let failure: Arc<std::sync::Mutex<Option<resource_broker::CompletionEvent>>> =
        Arc::new(std::sync::Mutex::new(None));
    let f = Arc::clone(&failure);
    session.on_started(move |event| {
        if let Ok(mut slot) = f.lock() {
            *slot = Some(event);
        }
    });

    session.start_streaming(None).await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    let event = failure
        .lock()
        .map_err(|_| anyhow::anyhow!("failure mutex poisoned"))?
        .clone()
        .ok_or_else(|| anyhow::anyhow!("no completion event delivered"))?;
    assert!(!event.success);
    assert_eq!(event.error, Some(ErrorCode::HardwareFault));
    // State remains as set by the state machine at begin time.
    assert_eq!(session.current_state().await, CameraState::Streaming);

    broker.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn concurrent_create_session_exactly_one_wins() -> anyhow::Result<()> {
    let broker = broker_with_stub_adapters(1).await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let broker = Arc::clone(&broker);
        handles.push(tokio::spawn(async move { broker.create_session().await }));
    }

    let mut ok = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await? {
            Ok(_) => ok += 1,
            Err(FacadeError::NoResourceAvailable) => rejected += 1,
            Err(other) => anyhow::bail!("unexpected error: {other}"),
        }
    }
    assert_eq!(ok, 1);
    assert_eq!(rejected, 7);

    broker.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn panicking_handler_does_not_block_other_handlers_or_the_scheduler() -> anyhow::Result<()> {
    let broker = broker_with_stub_adapters(1).await;
    let session = broker.create_session().await?;

    let survived = Arc::new(AtomicUsize::new(0));
    let s = Arc::clone(&survived);
    session.on_started(|_| panic!("a misbehaving handler"));
    session.on_stopped(move |_| {
        s.fetch_add(1, Ordering::SeqCst);
    });

    session.start_streaming(None).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    // The scheduler kept draining after the panicking `on_started` handler:
    // a subsequent operation still completes and its own handler still
    // fires.
    session.pause(None).await;
    session.resume(None).await;
    session.stop(None).await;
    tokio::time::sleep(Duration::from_millis(150)).await;

    assert_eq!(survived.load(Ordering::SeqCst), 1);
    assert_eq!(session.current_state().await, CameraState::Stopped);

    broker.shutdown().await;
    Ok(())
}
