// SPDX-License-Identifier: BUSL-1.1
// Copyright 2025 Alfred Jean LLC

//! Timeout and façade configuration. `TimeoutProfile` and `BrokerOptions`
//! are plain structs (the library itself doesn't parse argv — only the
//! demo binary's `DemoArgs`, in `main.rs`, derives `clap::Args` the way
//! the teacher's `MuxConfig` does).

use std::sync::Arc;
use std::time::Duration;

use crate::adapter::AdapterFactory;
use crate::types::{CameraConfiguration, OperationType};

/// Per-operation timeout defaults from §4.3. A duration of zero or less
/// disables the timeout branch for that operation (treated as "infinite").
#[derive(Debug, Clone, Copy)]
pub struct TimeoutProfile {
    pub start: Duration,
    pub stop: Duration,
    pub pause: Duration,
    pub resume: Duration,
    pub update_configuration: Duration,
    pub reset: Duration,
    pub fallback: Duration,
}

impl TimeoutProfile {
    pub fn for_operation(&self, op: OperationType) -> Duration {
        match op {
            OperationType::StartStreaming => self.start,
            OperationType::Stop => self.stop,
            OperationType::Pause => self.pause,
            OperationType::Resume => self.resume,
            OperationType::UpdateConfiguration => self.update_configuration,
            OperationType::Reset => self.reset,
            OperationType::Prepare => self.fallback,
        }
    }
}

impl Default for TimeoutProfile {
    fn default() -> Self {
        Self {
            start: Duration::from_secs(5),
            stop: Duration::from_secs(5),
            pause: Duration::from_secs(3),
            resume: Duration::from_secs(3),
            update_configuration: Duration::from_secs(4),
            reset: Duration::from_secs(10),
            fallback: Duration::from_secs(5),
        }
    }
}

/// Options consumed by `Broker::initialize` (§6.4).
#[derive(Clone)]
pub struct BrokerOptions {
    /// How many camera resources to pre-register on initialize, numbered
    /// `0..count`.
    pub preregister_count: u32,
    /// Configuration applied to `UpdateConfiguration` requests that don't
    /// supply their own.
    pub default_configuration: CameraConfiguration,
    pub timeouts: TimeoutProfile,
    /// Whether the scheduler emits `metrics` instruments. Disabling this is
    /// a hint, not a correctness requirement — the facade macros are
    /// no-ops without an installed recorder regardless.
    pub metrics_enabled: bool,
    /// Hint consumed by the logger/metrics sinks only (Design Notes §9b);
    /// not observably consumed by the core itself.
    pub debug: bool,
    pub adapter_factory: Arc<dyn AdapterFactory>,
}

impl BrokerOptions {
    pub fn new(adapter_factory: Arc<dyn AdapterFactory>) -> Self {
        Self {
            preregister_count: 1,
            default_configuration: CameraConfiguration::vga_default(),
            timeouts: TimeoutProfile::default(),
            metrics_enabled: true,
            debug: false,
            adapter_factory,
        }
    }
}
