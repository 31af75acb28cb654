// SPDX-License-Identifier: BUSL-1.1
// Copyright 2025 Alfred Jean LLC

//! Stub hardware adapter (§1's "stub adapter" collaborator). Used by this
//! crate's own unit tests and by `tests/specs`; gated behind
//! `test-support` so it never ships as part of a production build.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::adapter::{AdapterError, AdapterFactory, HardwareAdapter};
use crate::types::{CameraConfiguration, ResourceId};

/// In-memory adapter whose behavior is configurable per test: an optional
/// artificial delay (to exercise timeouts) and an optional forced fault (to
/// exercise the hardware-failure path).
pub struct StubAdapter {
    delay: Option<Duration>,
    fault: bool,
    calls: AtomicU32,
    last_configuration: Mutex<Option<CameraConfiguration>>,
    stopped: AtomicBool,
}

impl StubAdapter {
    pub fn new() -> Self {
        Self {
            delay: None,
            fault: false,
            calls: AtomicU32::new(0),
            last_configuration: Mutex::new(None),
            stopped: AtomicBool::new(false),
        }
    }

    /// An adapter whose every call sleeps for `delay` before returning
    /// success — used to exercise the scheduler's timeout path.
    pub fn slow(delay: Duration) -> Self {
        Self { delay: Some(delay), ..Self::new() }
    }

    /// An adapter whose every call fails immediately — used to exercise
    /// the hardware-fault path.
    pub fn faulting() -> Self {
        Self { fault: true, ..Self::new() }
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn last_configuration(&self) -> Option<CameraConfiguration> {
        *self.last_configuration.lock().await
    }

    async fn run(&self, cancel: &CancellationToken) -> Result<(), AdapterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => {}
            }
        }
        if self.fault {
            return Err(AdapterError::new("stub adapter forced fault"));
        }
        Ok(())
    }
}

impl Default for StubAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HardwareAdapter for StubAdapter {
    async fn start(&self, cancel: &CancellationToken) -> Result<(), AdapterError> {
        self.run(cancel).await
    }

    async fn stop(&self, cancel: &CancellationToken) -> Result<(), AdapterError> {
        let result = self.run(cancel).await;
        if result.is_ok() {
            self.stopped.store(true, Ordering::SeqCst);
        }
        result
    }

    async fn pause(&self, cancel: &CancellationToken) -> Result<(), AdapterError> {
        self.run(cancel).await
    }

    async fn resume(&self, cancel: &CancellationToken) -> Result<(), AdapterError> {
        self.run(cancel).await
    }

    async fn update_configuration(
        &self,
        config: CameraConfiguration,
        cancel: &CancellationToken,
    ) -> Result<(), AdapterError> {
        let result = self.run(cancel).await;
        if result.is_ok() {
            *self.last_configuration.lock().await = Some(config);
        }
        result
    }
}

/// Factory that hands out a fresh, well-behaved [`StubAdapter`] per
/// resource id.
pub struct StubAdapterFactory;

impl AdapterFactory for StubAdapterFactory {
    fn create(&self, _id: ResourceId) -> Arc<dyn HardwareAdapter> {
        Arc::new(StubAdapter::new())
    }
}
