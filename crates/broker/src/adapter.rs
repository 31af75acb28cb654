// SPDX-License-Identifier: BUSL-1.1
// Copyright 2025 Alfred Jean LLC

//! The hardware adapter is the one collaborator this crate defines as a
//! trait rather than a concrete implementation (§6.1): callers plug in
//! whatever talks to real cameras. `async-trait` buys object safety so the
//! scheduler can hold `Arc<dyn HardwareAdapter>` per resource.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::types::{CameraConfiguration, ResourceId};

/// An adapter-reported fault, distinct from cancellation/timeout (which the
/// scheduler detects itself by racing the call against a cancellation
/// scope).
#[derive(Debug, thiserror::Error)]
#[error("hardware adapter fault: {0}")]
pub struct AdapterError(pub String);

impl AdapterError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// The five asynchronous operations a hardware adapter exposes. Every
/// method accepts a composed cancellation handle and is expected to honour
/// it cooperatively; the scheduler additionally races the call against the
/// same token so a misbehaving adapter cannot block a worker forever.
#[async_trait]
pub trait HardwareAdapter: Send + Sync {
    async fn start(&self, cancel: &CancellationToken) -> Result<(), AdapterError>;
    async fn stop(&self, cancel: &CancellationToken) -> Result<(), AdapterError>;
    async fn pause(&self, cancel: &CancellationToken) -> Result<(), AdapterError>;
    async fn resume(&self, cancel: &CancellationToken) -> Result<(), AdapterError>;
    async fn update_configuration(
        &self,
        config: CameraConfiguration,
        cancel: &CancellationToken,
    ) -> Result<(), AdapterError>;
}

/// Produces one adapter per [`ResourceId`]. Implementations typically open
/// a device handle lazily on first call.
pub trait AdapterFactory: Send + Sync {
    fn create(&self, id: ResourceId) -> std::sync::Arc<dyn HardwareAdapter>;
}
