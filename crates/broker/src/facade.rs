// SPDX-License-Identifier: BUSL-1.1
// Copyright 2025 Alfred Jean LLC

//! The broker: the crate's single entry point (§6.4). One [`Broker`] owns
//! the resource table, the event hub, and the scheduler; every [`Session`]
//! it hands out shares those three. There is no process-wide singleton
//! (Design Notes §9a) — construct one per host and pass it around.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio_util::sync::CancellationToken;

use crate::config::BrokerOptions;
use crate::error::FacadeError;
use crate::events::EventHub;
use crate::scheduler::Scheduler;
use crate::session::Session;
use crate::table::ResourceTable;
use crate::types::{CameraState, OwnerToken, ResourceId};

/// Owns the shared resource table, event hub, and scheduler, and mints
/// sessions against pre-registered camera resources.
pub struct Broker {
    table: Arc<ResourceTable>,
    hub: Arc<EventHub>,
    scheduler: Arc<Scheduler>,
    options: BrokerOptions,
    shutdown: CancellationToken,
    is_shut_down: AtomicBool,
}

impl Broker {
    /// Pre-registers `options.preregister_count` camera resources, binds
    /// each to an adapter from `options.adapter_factory`, and spawns the
    /// scheduler's worker task.
    pub async fn initialize(options: BrokerOptions) -> Arc<Self> {
        let table = Arc::new(ResourceTable::new());
        let hub = Arc::new(EventHub::new());
        let shutdown = CancellationToken::new();

        for index in 0..options.preregister_count {
            let id = ResourceId::camera(index);
            table.ensure(id).await;
            let adapter = options.adapter_factory.create(id);
            table.register_adapter(id, adapter).await;
            // Pre-registered resources boot straight to Ready: the
            // transition table defines no hardware-backed path out of
            // Uninitialized, so initialize is the one place that promotes
            // a freshly registered descriptor past it.
            table.set_state(id, CameraState::Ready).await;
        }

        let scheduler = Scheduler::spawn(
            Arc::clone(&table),
            Arc::clone(&hub),
            shutdown.clone(),
            options.timeouts,
            options.default_configuration,
            options.metrics_enabled,
        );

        tracing::info!(
            preregister_count = options.preregister_count,
            "broker initialized"
        );

        Arc::new(Self { table, hub, scheduler, options, shutdown, is_shut_down: AtomicBool::new(false) })
    }

    /// Bind a brand-new session to the first free pre-registered resource.
    /// Returns [`FacadeError::NoResourceAvailable`] (`OWN2001`) when every
    /// pre-registered resource is already owned, and
    /// [`FacadeError::NotInitialized`] (`ARG3002`) once `shutdown` has run.
    pub async fn create_session(&self) -> Result<Arc<Session>, FacadeError> {
        if self.is_shut_down.load(Ordering::SeqCst) {
            return Err(FacadeError::NotInitialized);
        }

        let candidates: Vec<ResourceId> =
            (0..self.options.preregister_count).map(ResourceId::camera).collect();
        let owner = OwnerToken::new();

        // first_free and acquire aren't one atomic step, so another
        // concurrent create_session can win the resource first_free just
        // named. Retry against the remaining candidates rather than failing
        // a caller while other cameras are still free.
        let mut remaining = candidates.as_slice();
        let resource_id = loop {
            let Some(candidate) = self.table.first_free(remaining).await else {
                return Err(FacadeError::NoResourceAvailable);
            };
            match self.table.acquire(candidate, owner.clone()).await {
                Ok(()) => break candidate,
                Err(_) => {
                    let pos = remaining.iter().position(|id| *id == candidate).unwrap_or(0);
                    remaining = &remaining[pos + 1..];
                }
            }
        };

        let session = Session::new(
            owner,
            resource_id,
            Arc::clone(&self.table),
            Arc::clone(&self.scheduler),
            Arc::clone(&self.hub),
        )
        .await;

        tracing::info!(resource_id = %resource_id, session_id = %session.id(), "session created");
        Ok(session)
    }

    /// Idempotent. Stops the scheduler's worker (bounded wait) and
    /// prevents any further `create_session` calls.
    pub async fn shutdown(&self) {
        if self.is_shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shutdown.cancel();
        self.scheduler.shutdown().await;
        tracing::info!("broker shut down");
    }
}
