// SPDX-License-Identifier: BUSL-1.1
// Copyright 2025 Alfred Jean LLC

//! The transition table (ST-1) and the `BeginOperation` contract: the
//! state machine is pure in the transition relation and side-effectful
//! only via a single `ResourceTable::set_state` call on success.

use crate::error::ErrorCode;
use crate::table::ResourceTable;
use crate::types::{CameraState, OperationType, OwnerToken, ResourceId};

/// Pure lookup: the next state for `(state, op)`, or `None` if the pair is
/// not a legal transition. Used both by the scheduler's worker-time check
/// and by the session's synchronous pre-check (on the session's last
/// observed state).
pub fn next_state(state: CameraState, op: OperationType) -> Option<CameraState> {
    use CameraState::*;
    use OperationType::*;
    match (state, op) {
        (Ready, StartStreaming) => Some(Streaming),
        (Ready, UpdateConfiguration) => Some(Ready),
        (Streaming, Pause) => Some(Paused),
        (Streaming, Stop) => Some(Stopped),
        (Streaming, UpdateConfiguration) => Some(Streaming),
        (Paused, Resume) => Some(Streaming),
        (Paused, Stop) => Some(Stopped),
        (Stopped, Prepare) => Some(Ready),
        (Error, Reset) => Some(Ready),
        _ => None,
    }
}

/// Run the `BeginOperation` contract against the table: ensure the
/// descriptor exists, check ownership if required, look up the transition,
/// and — only on success — write the next state. Steps after the ownership
/// check execute as one critical section under the table's write lock, so
/// no observer can witness an intermediate state.
pub async fn begin_operation(
    table: &ResourceTable,
    id: ResourceId,
    token: &OwnerToken,
    op: OperationType,
) -> Result<CameraState, ErrorCode> {
    table.ensure(id).await;

    if !op.is_ownership_exempt() && table.get_owner(id).await.as_ref() != Some(token) {
        return Err(ErrorCode::OwnershipConflict);
    }

    let current = table.get_state(id).await;
    let Some(next) = next_state(current, op) else {
        return Err(ErrorCode::IllegalTransition);
    };

    table.set_state(id, next).await;
    Ok(next)
}
