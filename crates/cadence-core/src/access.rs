// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Typed data-access handles scoped to a frame.
//!
//! An [`AccessMap`] is a type-keyed set of shared data columns, each registered
//! either read-only or read-write. Units pull typed handles out of it and move
//! them into the jobs they submit. The [`AccessLedger`] enforces that no two
//! units are granted write access to the same data within one phase.

use crate::error::{SchedulerError, SchedulerResult};
use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// The scheduling stage a unit is being called for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Phase 1: per-partition metadata calculation.
    Calculation,
    /// Phase 2: allocation decisions and data sync.
    Sync,
    /// Both phases fused into one scheduling step.
    Update,
    /// Terminal, single-threaded consumption.
    Consume,
}

/// How a data column was registered in an [`AccessMap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// Shared freely between units.
    ReadOnly,
    /// Exclusive to one unit per phase.
    ReadWrite,
}

/// Shared, read-only view of a data column.
pub struct ReadAccess<T> {
    inner: Arc<RwLock<T>>,
}

impl<T> ReadAccess<T> {
    /// Locks the column for reading.
    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> Clone for ReadAccess<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Read-write view of a data column.
pub struct WriteAccess<T> {
    inner: Arc<RwLock<T>>,
}

impl<T> WriteAccess<T> {
    /// Locks the column for reading.
    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Locks the column for writing.
    pub fn write(&self) -> RwLockWriteGuard<'_, T> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> Clone for WriteAccess<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[derive(Clone)]
struct AccessEntry {
    mode: AccessMode,
    type_name: &'static str,
    data: Arc<dyn Any + Send + Sync>,
}

/// A type-keyed collection of data columns with their access modes.
///
/// ```rust
/// use cadence_core::access::AccessMap;
/// use std::sync::{Arc, RwLock};
///
/// let mut access = AccessMap::new();
/// access.insert_write(Arc::new(RwLock::new(vec![0u32; 4])));
///
/// let column = access.write::<Vec<u32>>().unwrap();
/// column.write()[0] = 7;
/// assert_eq!(access.read::<Vec<u32>>().unwrap().read()[0], 7);
/// ```
#[derive(Clone, Default)]
pub struct AccessMap {
    entries: HashMap<TypeId, AccessEntry>,
}

impl AccessMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    fn insert<T: Send + Sync + 'static>(&mut self, data: Arc<RwLock<T>>, mode: AccessMode) {
        self.entries.insert(
            TypeId::of::<T>(),
            AccessEntry {
                mode,
                type_name: type_name::<T>(),
                data,
            },
        );
    }

    /// Registers a column that units may only read.
    pub fn insert_read<T: Send + Sync + 'static>(&mut self, data: Arc<RwLock<T>>) {
        self.insert(data, AccessMode::ReadOnly);
    }

    /// Registers a column that one unit per phase may write.
    pub fn insert_write<T: Send + Sync + 'static>(&mut self, data: Arc<RwLock<T>>) {
        self.insert(data, AccessMode::ReadWrite);
    }

    /// Copies every entry of `other` over this map; `other` wins on collisions.
    pub fn merge(&mut self, other: &AccessMap) {
        for (id, entry) in &other.entries {
            self.entries.insert(*id, entry.clone());
        }
    }

    fn column<T: Send + Sync + 'static>(&self) -> Option<(AccessMode, Arc<RwLock<T>>)> {
        let entry = self.entries.get(&TypeId::of::<T>())?;
        let data = Arc::clone(&entry.data).downcast::<RwLock<T>>().ok()?;
        Some((entry.mode, data))
    }

    /// Returns a read handle for `T`, whatever mode it was registered with.
    pub fn read<T: Send + Sync + 'static>(&self) -> Option<ReadAccess<T>> {
        self.column::<T>().map(|(_, inner)| ReadAccess { inner })
    }

    /// Returns a write handle for `T` if it was registered read-write.
    pub fn write<T: Send + Sync + 'static>(&self) -> Option<WriteAccess<T>> {
        match self.column::<T>()? {
            (AccessMode::ReadWrite, inner) => Some(WriteAccess { inner }),
            (AccessMode::ReadOnly, _) => None,
        }
    }

    /// The mode `T` was registered with, if any.
    pub fn mode_of<T: 'static>(&self) -> Option<AccessMode> {
        self.entries.get(&TypeId::of::<T>()).map(|e| e.mode)
    }

    /// Number of registered columns.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for AccessMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self
            .entries
            .values()
            .map(|e| (e.type_name, e.mode))
            .collect();
        names.sort_by_key(|(name, _)| *name);
        f.debug_struct("AccessMap").field("entries", &names).finish()
    }
}

/// Per-pass record of write claims.
///
/// Reset by the scheduler at the start of every pass.
#[derive(Debug, Default)]
pub struct AccessLedger {
    claims: Mutex<HashMap<(TypeId, Phase), usize>>,
}

impl AccessLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `unit` writes `T` during `phase`.
    ///
    /// Claiming the same data twice from the same unit is allowed.
    pub fn claim_write<T: 'static>(&self, phase: Phase, unit: usize) -> SchedulerResult<()> {
        let mut claims = self.claims.lock().unwrap_or_else(PoisonError::into_inner);
        match claims.get(&(TypeId::of::<T>(), phase)) {
            Some(&holder) if holder != unit => Err(SchedulerError::AccessConflict {
                type_name: type_name::<T>(),
                phase,
                first: holder,
                second: unit,
            }),
            Some(_) => Ok(()),
            None => {
                claims.insert((TypeId::of::<T>(), phase), unit);
                Ok(())
            }
        }
    }

    /// Forgets every claim.
    pub fn reset(&self) {
        self.claims
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Number of live claims.
    pub fn claim_count(&self) -> usize {
        self.claims
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
