// SPDX-License-Identifier: BUSL-1.1
// Copyright 2025 Alfred Jean LLC

//! Shared harness for the end-to-end scenario tests: small helpers to stand
//! up a [`Broker`] against a chosen adapter without repeating
//! `BrokerOptions` wiring in every test.

use std::sync::Arc;
use std::time::Duration;

use resource_broker::testing::{StubAdapter, StubAdapterFactory};
use resource_broker::{AdapterFactory, Broker, BrokerOptions, HardwareAdapter, ResourceId};

/// Hands out clones of one pre-built adapter to every resource id, so a
/// single test can control exactly how that adapter behaves.
pub struct FixedAdapterFactory(Arc<dyn HardwareAdapter>);

impl FixedAdapterFactory {
    pub fn new(adapter: Arc<dyn HardwareAdapter>) -> Self {
        Self(adapter)
    }
}

impl AdapterFactory for FixedAdapterFactory {
    fn create(&self, _id: ResourceId) -> Arc<dyn HardwareAdapter> {
        Arc::clone(&self.0)
    }
}

/// A broker with `count` cameras pre-registered against the well-behaved
/// stub adapter.
pub async fn broker_with_stub_adapters(count: u32) -> Arc<Broker> {
    let mut options = BrokerOptions::new(Arc::new(StubAdapterFactory));
    options.preregister_count = count;
    options.metrics_enabled = false;
    Broker::initialize(options).await
}

/// A broker with exactly one camera pre-registered against `adapter`.
pub async fn broker_with_adapter(adapter: Arc<dyn HardwareAdapter>) -> Arc<Broker> {
    let mut options = BrokerOptions::new(Arc::new(FixedAdapterFactory::new(adapter)));
    options.preregister_count = 1;
    options.metrics_enabled = false;
    Broker::initialize(options).await
}

pub fn slow_adapter(delay: Duration) -> Arc<dyn HardwareAdapter> {
    Arc::new(StubAdapter::slow(delay))
}

pub fn faulting_adapter() -> Arc<dyn HardwareAdapter> {
    Arc::new(StubAdapter::faulting())
}
