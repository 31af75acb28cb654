// SPDX-License-Identifier: BUSL-1.1
// Copyright 2025 Alfred Jean LLC

//! A resource broker: embeddable arbitration of exclusive ownership over
//! hardware-like resources (cameras, canonically), built from a resource
//! table, a pure state machine, an async scheduler, an event hub, and a
//! per-owner session façade. [`Broker`] is the entry point.

pub mod adapter;
pub mod config;
pub mod error;
pub mod events;
pub mod facade;
pub mod metrics;
pub mod scheduler;
pub mod session;
pub mod state_machine;
pub mod table;
pub mod types;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use adapter::{AdapterError, AdapterFactory, HardwareAdapter};
pub use config::{BrokerOptions, TimeoutProfile};
pub use error::{ErrorCode, FacadeError};
pub use events::{EventHub, Subscription};
pub use facade::Broker;
pub use session::Session;
pub use types::{
    CameraConfiguration, CameraState, CompletionEvent, OperationId, OperationTicket,
    OperationType, OwnerToken, PixelFormat, ResourceId, ResourceKind, TicketStatus,
};
