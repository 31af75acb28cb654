// SPDX-License-Identifier: BUSL-1.1
// Copyright 2025 Alfred Jean LLC

//! The scheduler: synchronous acceptance, asynchronous execution. A single
//! worker drains an unbounded `tokio::sync::mpsc` queue (multi-producer,
//! single-consumer) and runs each accepted request's adapter call under a
//! cancellation scope composed from scheduler shutdown, an optional
//! caller-supplied handle, and a per-operation timeout.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::adapter::HardwareAdapter;
use crate::config::TimeoutProfile;
use crate::error::ErrorCode;
use crate::events::EventHub;
use crate::metrics;
use crate::state_machine::begin_operation;
use crate::table::ResourceTable;
use crate::types::{CameraConfiguration, CameraState, CompletionEvent, OperationId, OperationType, OwnerToken, ResourceId};

/// A queued unit of work. Built by [`Scheduler::enqueue`] and drained
/// FIFO by the single worker task.
pub struct OperationRequest {
    pub operation_id: OperationId,
    pub resource_id: ResourceId,
    pub owner: OwnerToken,
    pub op: OperationType,
    pub configuration: Option<CameraConfiguration>,
    pub caller_cancel: Option<CancellationToken>,
}

/// Accepts requests synchronously and executes them asynchronously.
pub struct Scheduler {
    table: Arc<ResourceTable>,
    hub: Arc<EventHub>,
    tx: mpsc::UnboundedSender<OperationRequest>,
    shutdown: CancellationToken,
    worker: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    /// Construct the scheduler and spawn its single worker task.
    pub fn spawn(
        table: Arc<ResourceTable>,
        hub: Arc<EventHub>,
        shutdown: CancellationToken,
        timeouts: TimeoutProfile,
        default_configuration: CameraConfiguration,
        metrics_enabled: bool,
    ) -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(worker_loop(
            rx,
            Arc::clone(&table),
            Arc::clone(&hub),
            shutdown.clone(),
            timeouts,
            default_configuration,
            metrics_enabled,
        ));
        Arc::new(Self { table, hub, tx, shutdown, worker: std::sync::Mutex::new(Some(worker)) })
    }

    /// Intake. Never blocks: admission only touches the queue (and, for the
    /// pre-cancelled check, nothing shared at all).
    ///
    /// The two-argument `operation_id` form lets a session publish a
    /// correlation key before handing control to the scheduler, closing the
    /// race between enqueue and completion observation.
    pub fn enqueue(
        &self,
        operation_id: OperationId,
        resource_id: ResourceId,
        owner: OwnerToken,
        op: OperationType,
        configuration: Option<CameraConfiguration>,
        caller_cancel: Option<CancellationToken>,
    ) -> crate::types::OperationTicket {
        if caller_cancel.as_ref().is_some_and(|c| c.is_cancelled()) {
            return crate::types::OperationTicket::failed(operation_id, ErrorCode::Cancelled);
        }

        let request =
            OperationRequest { operation_id, resource_id, owner, op, configuration, caller_cancel };

        // An unbounded queue absorbs any back-pressure; a send error only
        // happens if the worker has already shut down, which we treat the
        // same as a pre-cancelled request.
        if self.tx.send(request).is_err() {
            return crate::types::OperationTicket::failed(operation_id, ErrorCode::Cancelled);
        }

        tracing::info!(operation_id = %operation_id, resource_id = %resource_id, op = %op, "operation accepted");
        crate::types::OperationTicket::accepted(operation_id)
    }

    /// Signal shutdown and wait (bounded) for the worker to drain.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let handle = self.worker.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = handle {
            let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
        }
    }
}

async fn worker_loop(
    mut rx: mpsc::UnboundedReceiver<OperationRequest>,
    table: Arc<ResourceTable>,
    hub: Arc<EventHub>,
    shutdown: CancellationToken,
    timeouts: TimeoutProfile,
    default_configuration: CameraConfiguration,
    metrics_enabled: bool,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            received = rx.recv() => {
                match received {
                    Some(request) => {
                        process_request(
                            request,
                            &table,
                            &hub,
                            &shutdown,
                            timeouts,
                            default_configuration,
                            metrics_enabled,
                        )
                        .await;
                    }
                    None => break,
                }
            }
        }
    }
}

async fn process_request(
    request: OperationRequest,
    table: &ResourceTable,
    hub: &EventHub,
    shutdown: &CancellationToken,
    timeouts: TimeoutProfile,
    default_configuration: CameraConfiguration,
    metrics_enabled: bool,
) {
    let start = Instant::now();
    let OperationRequest { operation_id, resource_id, owner, op, configuration, caller_cancel } =
        request;

    if metrics_enabled {
        metrics::record_accepted(op);
    }

    let state_after_begin = match begin_operation(table, resource_id, &owner, op).await {
        Ok(state) => state,
        Err(code) => {
            tracing::error!(operation_id = %operation_id, resource_id = %resource_id, op = %op, error = %code, "state machine rejected request at worker time");
            if metrics_enabled {
                metrics::record_failure(op, &code.as_code_str());
            }
            // By policy, no completion event is emitted for a worker-time
            // state-machine rejection: the session was expected to have
            // already pre-checked synchronously.
            return;
        }
    };

    let scope = ComposedCancellation::compose(shutdown, caller_cancel, timeouts.for_operation(op));
    let adapter = table.get_adapter(resource_id).await;
    let config = configuration.unwrap_or(default_configuration);

    let outcome = run_adapter_call(adapter, op, config, &scope.token).await;

    match outcome {
        AdapterOutcome::Success => {
            let final_state = table.get_state(resource_id).await;
            hub.publish(CompletionEvent::success(resource_id, operation_id, op, final_state, None));
            if metrics_enabled {
                metrics::record_latency_ms(op, start.elapsed().as_secs_f64() * 1000.0);
            }
        }
        AdapterOutcome::Cancelled => {
            let code = if scope.is_timeout() { ErrorCode::TimedOut } else { ErrorCode::Cancelled };
            if scope.is_timeout() {
                tracing::error!(operation_id = %operation_id, resource_id = %resource_id, op = %op, error = %code, "operation timed out");
            } else {
                tracing::warn!(operation_id = %operation_id, resource_id = %resource_id, op = %op, error = %code, "operation cancelled");
            }
            if metrics_enabled {
                metrics::record_failure(op, &code.as_code_str());
            }
            hub.publish(CompletionEvent::failure(
                resource_id,
                operation_id,
                op,
                state_after_begin,
                code,
            ));
        }
        AdapterOutcome::Fault(err) => {
            tracing::error!(operation_id = %operation_id, resource_id = %resource_id, op = %op, error = %err, "hardware adapter fault");
            if metrics_enabled {
                metrics::record_failure(op, &ErrorCode::HardwareFault.as_code_str());
            }
            hub.publish(CompletionEvent::failure(
                resource_id,
                operation_id,
                op,
                state_after_begin,
                ErrorCode::HardwareFault,
            ));
        }
    }
}

enum AdapterOutcome {
    Success,
    Cancelled,
    Fault(crate::adapter::AdapterError),
}

async fn run_adapter_call(
    adapter: Option<Arc<dyn HardwareAdapter>>,
    op: OperationType,
    config: CameraConfiguration,
    cancel: &CancellationToken,
) -> AdapterOutcome {
    let Some(adapter) = adapter else {
        // No adapter bound: treated as a no-op step, success path taken.
        return AdapterOutcome::Success;
    };

    let call = async move {
        match op {
            OperationType::StartStreaming => adapter.start(cancel).await,
            OperationType::Stop => adapter.stop(cancel).await,
            OperationType::Pause => adapter.pause(cancel).await,
            OperationType::Resume => adapter.resume(cancel).await,
            OperationType::UpdateConfiguration => {
                adapter.update_configuration(config, cancel).await
            }
            // Prepare/Reset are logical-only transitions; §6.1 defines no
            // corresponding hardware operation for either.
            OperationType::Prepare | OperationType::Reset => Ok(()),
        }
    };

    // Biased so that a cancellation ready in the same poll as the adapter's
    // own completion always wins: a cooperative adapter observes the token
    // and returns `Ok(())` once cancelled, and an unbiased `select!` would
    // pick that arm at random instead of reporting the timeout/cancellation.
    tokio::select! {
        biased;
        _ = cancel.cancelled() => AdapterOutcome::Cancelled,
        result = call => {
            match result {
                Ok(()) => AdapterOutcome::Success,
                Err(err) => AdapterOutcome::Fault(err),
            }
        }
    }
}

/// The composition of scheduler shutdown, an optional caller handle, and a
/// per-operation timeout into a single token, plus a "was it the timeout?"
/// predicate so completions can distinguish `CT0001` from `CT0002`.
struct ComposedCancellation {
    token: CancellationToken,
    timed_out: Arc<AtomicBool>,
    watcher: JoinHandle<()>,
}

impl ComposedCancellation {
    fn compose(
        shutdown: &CancellationToken,
        caller: Option<CancellationToken>,
        timeout: Duration,
    ) -> Self {
        let token = CancellationToken::new();
        let timed_out = Arc::new(AtomicBool::new(false));

        let watcher_token = token.clone();
        let watcher_timed_out = Arc::clone(&timed_out);
        let shutdown = shutdown.clone();
        let finite_timeout = !timeout.is_zero();

        let watcher = tokio::spawn(async move {
            let caller_cancelled = async {
                match &caller {
                    Some(handle) => handle.cancelled().await,
                    None => std::future::pending::<()>().await,
                }
            };

            if finite_timeout {
                tokio::select! {
                    _ = shutdown.cancelled() => {}
                    _ = caller_cancelled => {}
                    _ = tokio::time::sleep(timeout) => {
                        watcher_timed_out.store(true, Ordering::SeqCst);
                    }
                }
            } else {
                tokio::select! {
                    _ = shutdown.cancelled() => {}
                    _ = caller_cancelled => {}
                }
            }
            watcher_token.cancel();
        });

        Self { token, timed_out, watcher }
    }

    fn is_timeout(&self) -> bool {
        self.timed_out.load(Ordering::SeqCst)
    }
}

impl Drop for ComposedCancellation {
    fn drop(&mut self) {
        self.watcher.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StubAdapter;
    use std::time::Duration as StdDuration;

    fn fast_timeouts() -> TimeoutProfile {
        TimeoutProfile {
            start: StdDuration::from_millis(40),
            stop: StdDuration::from_secs(5),
            pause: StdDuration::from_secs(3),
            resume: StdDuration::from_secs(3),
            update_configuration: StdDuration::from_secs(4),
            reset: StdDuration::from_secs(10),
            fallback: StdDuration::from_secs(5),
        }
    }

    fn default_config() -> CameraConfiguration {
        CameraConfiguration::new(640, 480, crate::types::PixelFormat::Rgb24, 30).unwrap()
    }

    #[tokio::test]
    async fn happy_path_emits_success_completion() {
        let table = Arc::new(ResourceTable::new());
        let hub = Arc::new(EventHub::new());
        let id = ResourceId::camera(0);
        let owner = OwnerToken::new();
        table.acquire(id, owner.clone()).await.unwrap();
        table.set_state(id, CameraState::Ready).await;
        table.register_adapter(id, Arc::new(StubAdapter::new())).await;

        let scheduler = Scheduler::spawn(
            Arc::clone(&table),
            Arc::clone(&hub),
            CancellationToken::new(),
            TimeoutProfile::default(),
            default_config(),
            false,
        );

        let mut rx = hub.subscribe();
        let op_id = OperationId::new();
        let ticket = scheduler.enqueue(
            op_id,
            id,
            owner,
            OperationType::StartStreaming,
            None,
            None,
        );
        assert!(ticket.is_accepted());

        let event = tokio::time::timeout(StdDuration::from_secs(2), rx.recv()).await.unwrap().unwrap();
        assert!(event.success);
        assert_eq!(event.operation_id, op_id);
        assert_eq!(event.state_after, CameraState::Streaming);
    }

    #[tokio::test]
    async fn illegal_transition_emits_no_completion_event() {
        let table = Arc::new(ResourceTable::new());
        let hub = Arc::new(EventHub::new());
        let id = ResourceId::camera(0);
        let owner = OwnerToken::new();
        table.acquire(id, owner.clone()).await.unwrap();
        table.set_state(id, CameraState::Streaming).await;

        let scheduler = Scheduler::spawn(
            Arc::clone(&table),
            Arc::clone(&hub),
            CancellationToken::new(),
            TimeoutProfile::default(),
            default_config(),
            false,
        );

        let mut rx = hub.subscribe();
        scheduler.enqueue(OperationId::new(), id, owner, OperationType::StartStreaming, None, None);

        let result = tokio::time::timeout(StdDuration::from_millis(300), rx.recv()).await;
        assert!(result.is_err(), "expected no completion event within 300ms");
    }

    #[tokio::test]
    async fn pre_cancelled_request_fails_immediately() {
        let table = Arc::new(ResourceTable::new());
        let hub = Arc::new(EventHub::new());
        let id = ResourceId::camera(0);
        let owner = OwnerToken::new();

        let scheduler = Scheduler::spawn(
            table,
            hub,
            CancellationToken::new(),
            TimeoutProfile::default(),
            default_config(),
            false,
        );

        let cancel = CancellationToken::new();
        cancel.cancel();
        let ticket = scheduler.enqueue(
            OperationId::new(),
            id,
            owner,
            OperationType::StartStreaming,
            None,
            Some(cancel),
        );
        assert!(!ticket.is_accepted());
        assert_eq!(ticket.error, Some(ErrorCode::Cancelled));
    }

    #[tokio::test]
    async fn timeout_emits_failure_completion_with_timeout_code() {
        let table = Arc::new(ResourceTable::new());
        let hub = Arc::new(EventHub::new());
        let id = ResourceId::camera(0);
        let owner = OwnerToken::new();
        table.acquire(id, owner.clone()).await.unwrap();
        table.set_state(id, CameraState::Ready).await;
        table.register_adapter(id, Arc::new(StubAdapter::slow(StdDuration::from_millis(200)))).await;

        let scheduler = Scheduler::spawn(
            Arc::clone(&table),
            Arc::clone(&hub),
            CancellationToken::new(),
            fast_timeouts(),
            default_config(),
            false,
        );

        let mut rx = hub.subscribe();
        scheduler.enqueue(OperationId::new(), id, owner, OperationType::StartStreaming, None, None);
        let event =
            tokio::time::timeout(StdDuration::from_secs(2), rx.recv()).await.unwrap().unwrap();
        assert!(!event.success);
        assert_eq!(event.error, Some(ErrorCode::TimedOut));
    }

    #[tokio::test]
    async fn hardware_fault_emits_failure_completion_with_hw_code() {
        let table = Arc::new(ResourceTable::new());
        let hub = Arc::new(EventHub::new());
        let id = ResourceId::camera(0);
        let owner = OwnerToken::new();
        table.acquire(id, owner.clone()).await.unwrap();
        table.set_state(id, CameraState::Ready).await;
        table.register_adapter(id, Arc::new(StubAdapter::faulting())).await;

        let scheduler = Scheduler::spawn(
            Arc::clone(&table),
            Arc::clone(&hub),
            CancellationToken::new(),
            TimeoutProfile::default(),
            default_config(),
            false,
        );

        let mut rx = hub.subscribe();
        scheduler.enqueue(OperationId::new(), id, owner, OperationType::StartStreaming, None, None);
        let event =
            tokio::time::timeout(StdDuration::from_secs(2), rx.recv()).await.unwrap().unwrap();
        assert!(!event.success);
        assert_eq!(event.error, Some(ErrorCode::HardwareFault));
        // State remains as set by the state machine at begin time.
        assert_eq!(table.get_state(id).await, CameraState::Streaming);
    }
}
