// SPDX-License-Identifier: BUSL-1.1
// Copyright 2025 Alfred Jean LLC

//! Shared value types: identifiers, state, operations, configuration, and
//! the receipt/event pair every synchronous entry point and async completion
//! is built from.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ErrorCode;

/// What kind of hardware a [`ResourceId`] names. Only `Camera` exists today;
/// the tag exists so the table can host other resource kinds later without
/// a breaking change to the id type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    Camera,
}

/// Composite identifier for a resource: a small integer plus a kind tag.
/// Equality and hashing are structural, and the id is stable for the life
/// of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceId {
    pub kind: ResourceKind,
    pub index: u32,
}

impl ResourceId {
    pub fn camera(index: u32) -> Self {
        Self { kind: ResourceKind::Camera, index }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ResourceKind::Camera => write!(f, "camera:{}", self.index),
        }
    }
}

/// Lifecycle state of a single resource. Transitions between these are
/// defined exhaustively by the state machine's transition table; any pair
/// not in that table is a rejection, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CameraState {
    #[default]
    Uninitialized,
    Initializing,
    Ready,
    Streaming,
    Paused,
    Stopped,
    Error,
}

/// The operations a session may request against a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationType {
    StartStreaming,
    Stop,
    Pause,
    Resume,
    UpdateConfiguration,
    Prepare,
    Reset,
}

impl OperationType {
    /// Only `Prepare` may be issued by a caller that does not currently own
    /// the resource — every other operation requires ownership.
    pub fn is_ownership_exempt(self) -> bool {
        matches!(self, OperationType::Prepare)
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OperationType::StartStreaming => "start_streaming",
            OperationType::Stop => "stop",
            OperationType::Pause => "pause",
            OperationType::Resume => "resume",
            OperationType::UpdateConfiguration => "update_configuration",
            OperationType::Prepare => "prepare",
            OperationType::Reset => "reset",
        };
        f.write_str(s)
    }
}

/// Opaque session identifier. Two tokens are equal iff their underlying
/// identifiers are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerToken(pub String);

impl OwnerToken {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for OwnerToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OwnerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Process-unique identifier for a single issued operation, used to
/// correlate an [`OperationTicket`] with the [`CompletionEvent`] that
/// eventually resolves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationId(pub Uuid);

impl OperationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for OperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Pixel layout of a captured frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    Rgb24,
    Yuv420,
}

/// A validated camera configuration. Constructed once, immutable after
/// that — `new` is the only way to build one and it enforces the
/// strictly-positive invariant on every field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraConfiguration {
    width: u32,
    height: u32,
    pixel_format: PixelFormat,
    fps: u32,
}

impl CameraConfiguration {
    pub fn new(
        width: u32,
        height: u32,
        pixel_format: PixelFormat,
        fps: u32,
    ) -> Result<Self, ErrorCode> {
        if width == 0 || height == 0 || fps == 0 {
            return Err(ErrorCode::InvalidConfiguration);
        }
        Ok(Self { width, height, pixel_format, fps })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixel_format(&self) -> PixelFormat {
        self.pixel_format
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }

    /// 640x480 RGB24 at 30fps — the fallback applied when a caller doesn't
    /// supply a configuration of their own. All four fields are fixed
    /// positive literals, so unlike [`Self::new`] this cannot fail.
    pub fn vga_default() -> Self {
        Self { width: 640, height: 480, pixel_format: PixelFormat::Rgb24, fps: 30 }
    }
}

/// Status of a synchronous receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TicketStatus {
    Accepted,
    FailedImmediately,
}

/// The value returned synchronously from every operation entry point.
///
/// Invariant: `status == Accepted` implies `error` is `None`;
/// `status == FailedImmediately` implies `error` is `Some`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationTicket {
    pub operation_id: OperationId,
    pub status: TicketStatus,
    pub error: Option<ErrorCode>,
    pub created_at_unix_ms: u64,
}

impl OperationTicket {
    pub fn accepted(operation_id: OperationId) -> Self {
        Self {
            operation_id,
            status: TicketStatus::Accepted,
            error: None,
            created_at_unix_ms: epoch_ms(),
        }
    }

    pub fn failed(operation_id: OperationId, error: ErrorCode) -> Self {
        Self {
            operation_id,
            status: TicketStatus::FailedImmediately,
            error: Some(error),
            created_at_unix_ms: epoch_ms(),
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self.status, TicketStatus::Accepted)
    }
}

/// The asynchronous notification emitted when (and only when) an accepted
/// request has succeeded, been cancelled, timed out, or faulted.
///
/// Invariant: `success` iff `error` is absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionEvent {
    pub resource_id: ResourceId,
    pub operation_id: OperationId,
    pub success: bool,
    pub operation_type: OperationType,
    pub state_after: CameraState,
    pub metadata: Option<serde_json::Value>,
    pub error: Option<ErrorCode>,
    pub timestamp_unix_ms: u64,
}

impl CompletionEvent {
    pub fn success(
        resource_id: ResourceId,
        operation_id: OperationId,
        operation_type: OperationType,
        state_after: CameraState,
        metadata: Option<serde_json::Value>,
    ) -> Self {
        Self {
            resource_id,
            operation_id,
            success: true,
            operation_type,
            state_after,
            metadata,
            error: None,
            timestamp_unix_ms: epoch_ms(),
        }
    }

    pub fn failure(
        resource_id: ResourceId,
        operation_id: OperationId,
        operation_type: OperationType,
        state_after: CameraState,
        error: ErrorCode,
    ) -> Self {
        Self {
            resource_id,
            operation_id,
            success: false,
            operation_type,
            state_after,
            metadata: None,
            error: Some(error),
            timestamp_unix_ms: epoch_ms(),
        }
    }
}

/// Current epoch milliseconds, used to timestamp tickets and events.
pub fn epoch_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}
