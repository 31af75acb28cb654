// SPDX-License-Identifier: BUSL-1.1
// Copyright 2025 Alfred Jean LLC

//! The resource table: a registry of descriptors keyed by [`ResourceId`]
//! providing atomic single-owner admission control and coherent state
//! reads. A process-wide read/write exclusion (`tokio::sync::RwLock`)
//! guards the owner and state fields; adapter invocations never execute
//! under this lock.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::adapter::HardwareAdapter;
use crate::error::ErrorCode;
use crate::types::{CameraState, OperationType, OwnerToken, ResourceId};

/// Per-resource record. Mutated only under the table's write lock, except
/// for adapter invocations which always happen outside any lock.
pub struct ResourceDescriptor {
    pub id: ResourceId,
    pub state: CameraState,
    pub owner: Option<OwnerToken>,
    pub adapter: Option<Arc<dyn HardwareAdapter>>,
    /// Immediate-acquire exclusion primitive. `try_lock_owned` never blocks;
    /// the held guard is ownership's physical backing and is dropped on
    /// release.
    exclusion: Arc<Mutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl ResourceDescriptor {
    fn new(id: ResourceId) -> Self {
        Self {
            id,
            state: CameraState::Uninitialized,
            owner: None,
            adapter: None,
            exclusion: Arc::new(Mutex::new(())),
            guard: None,
        }
    }
}

/// Registry of resources with state, current owner, and bound adapter.
#[derive(Default)]
pub struct ResourceTable {
    descriptors: RwLock<HashMap<ResourceId, ResourceDescriptor>>,
}

impl ResourceTable {
    pub fn new() -> Self {
        Self { descriptors: RwLock::new(HashMap::new()) }
    }

    /// Idempotent insert-or-get of a descriptor at state `Uninitialized`
    /// with no owner.
    pub async fn ensure(&self, id: ResourceId) {
        let mut map = self.descriptors.write().await;
        map.entry(id).or_insert_with(|| ResourceDescriptor::new(id));
    }

    /// Bind an adapter handle to a descriptor. Exactly-once in production;
    /// re-binding is permitted (tests rebind against stub adapters freely).
    pub async fn register_adapter(&self, id: ResourceId, adapter: Arc<dyn HardwareAdapter>) {
        let mut map = self.descriptors.write().await;
        let descriptor = map.entry(id).or_insert_with(|| ResourceDescriptor::new(id));
        descriptor.adapter = Some(adapter);
    }

    /// Attempt to become the single owner of `id`.
    ///
    /// Two-phase: first try-acquire the exclusion primitive (never blocks);
    /// only if that succeeds do we check, under the write lock, whether an
    /// owner is already recorded. This closes the race where the primitive
    /// is free but a concurrent writer already recorded an owner.
    pub async fn acquire(&self, id: ResourceId, token: OwnerToken) -> Result<(), ErrorCode> {
        let exclusion = {
            let mut map = self.descriptors.write().await;
            let descriptor = map.entry(id).or_insert_with(|| ResourceDescriptor::new(id));
            Arc::clone(&descriptor.exclusion)
        };

        let guard = match Arc::clone(&exclusion).try_lock_owned() {
            Ok(guard) => guard,
            Err(_) => return Err(ErrorCode::OwnershipConflict),
        };

        let mut map = self.descriptors.write().await;
        // The entry was inserted above and nothing ever removes entries, so
        // this is always present; a missing entry is treated as a conflict
        // rather than panicking.
        let Some(descriptor) = map.get_mut(&id) else {
            return Err(ErrorCode::OwnershipConflict);
        };
        if descriptor.owner.is_some() {
            // Lost the race: someone else recorded ownership between our
            // try-lock and taking the write lock. Release what we took.
            drop(guard);
            return Err(ErrorCode::OwnershipConflict);
        }
        descriptor.owner = Some(token);
        descriptor.guard = Some(guard);
        Ok(())
    }

    /// Release ownership. Returns `false` (and leaves the owner untouched)
    /// if `token` is not the current owner — non-owners cannot unlock.
    pub async fn release(&self, id: ResourceId, token: &OwnerToken) -> bool {
        let mut map = self.descriptors.write().await;
        let Some(descriptor) = map.get_mut(&id) else {
            return false;
        };
        if descriptor.owner.as_ref() != Some(token) {
            return false;
        }
        descriptor.owner = None;
        descriptor.guard = None;
        true
    }

    /// Unconditional state write. The state machine is the gatekeeper for
    /// legality; this primitive is intentionally unchecked.
    pub async fn set_state(&self, id: ResourceId, next: CameraState) {
        let mut map = self.descriptors.write().await;
        if let Some(descriptor) = map.get_mut(&id) {
            descriptor.state = next;
        }
    }

    /// Shared-mode read. Returns `Uninitialized` for unknown ids.
    pub async fn get_state(&self, id: ResourceId) -> CameraState {
        let map = self.descriptors.read().await;
        map.get(&id).map(|d| d.state).unwrap_or_default()
    }

    /// Shared-mode read of the current owner, if any.
    pub async fn get_owner(&self, id: ResourceId) -> Option<OwnerToken> {
        let map = self.descriptors.read().await;
        map.get(&id).and_then(|d| d.owner.clone())
    }

    /// Shared-mode read of the bound adapter, if any.
    pub async fn get_adapter(&self, id: ResourceId) -> Option<Arc<dyn HardwareAdapter>> {
        let map = self.descriptors.read().await;
        map.get(&id).and_then(|d| d.adapter.clone())
    }

    /// The first resource id with no current owner, registering it with
    /// `Uninitialized` state if it doesn't exist yet. Used by the façade's
    /// `create_session` to find a free resource among a pre-registered
    /// range.
    pub async fn first_free(&self, candidates: &[ResourceId]) -> Option<ResourceId> {
        let map = self.descriptors.read().await;
        for id in candidates {
            match map.get(id) {
                Some(descriptor) if descriptor.owner.is_none() => return Some(*id),
                None => return Some(*id),
                _ => continue,
            }
        }
        None
    }

    /// Whether ownership is required for `op` and, if so, whether `token`
    /// currently holds it. Used by both the state machine's `begin` and the
    /// session's synchronous pre-check.
    pub async fn owns(&self, id: ResourceId, op: OperationType, token: &OwnerToken) -> bool {
        if op.is_ownership_exempt() {
            return true;
        }
        self.get_owner(id).await.as_ref() == Some(token)
    }
}
