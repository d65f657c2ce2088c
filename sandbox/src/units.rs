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

//! Simulated per-archetype render units.

use anyhow::Context as _;
use cadence_core::jobs::JobHandle;
use cadence_core::unit::{UnitInit, UnitScope, WorkUnit};
use cadence_core::SchedulerResult;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Entities per draw batch.
const BATCH_SIZE: usize = 64;

/// Persistent camera state shared read-only by every unit.
#[derive(Debug, Clone, Copy)]
pub struct Camera {
    /// Every `cull_stride`-th entity (offset by frame) is outside the frustum.
    pub cull_stride: usize,
}

/// Per-frame timing handed to every unit.
#[derive(Debug, Clone, Copy)]
pub struct FrameClock {
    pub frame: u64,
}

/// Culls one archetype, then packs the survivors into draw batches.
pub struct ArchetypeUnit {
    name: String,
    archetype: String,
    entities: usize,
    visible: Arc<AtomicUsize>,
    batches: Arc<Mutex<Vec<usize>>>,
    draws: u64,
    drawn_entities: u64,
}

impl ArchetypeUnit {
    pub fn new(archetype: &str) -> Self {
        Self {
            name: format!("unit:{archetype}"),
            archetype: archetype.to_owned(),
            entities: 0,
            visible: Arc::default(),
            batches: Arc::default(),
            draws: 0,
            drawn_entities: 0,
        }
    }
}

impl WorkUnit for ArchetypeUnit {
    fn name(&self) -> &str {
        &self.name
    }

    fn initialize(&mut self, init: &UnitInit<'_>) -> anyhow::Result<()> {
        let desc = init
            .query
            .archetypes
            .iter()
            .find(|a| a.name == self.archetype)
            .with_context(|| format!("archetype '{}' not matched by the unit query", self.archetype))?;
        self.entities = desc.entity_count;
        log::info!(
            "{}: {} entities, editor geometry: {}",
            self.name,
            self.entities,
            init.editor_geometry.is_some()
        );
        Ok(())
    }

    fn begin_calculation(
        &mut self,
        scope: &UnitScope<'_>,
        dependency: &JobHandle,
    ) -> SchedulerResult<JobHandle> {
        let camera = *scope.read::<Camera>()?.read();
        let clock = *scope.read::<FrameClock>()?.read();
        let entities = self.entities;
        let visible = self.visible.clone();
        scope.submit(
            move || {
                let stride = camera.cull_stride.max(1);
                let offset = clock.frame as usize % stride;
                let count = (0..entities).filter(|i| i % stride != offset).count();
                visible.store(count, Ordering::Release);
            },
            dependency,
        )
    }

    fn complete_calculation_and_begin_sync(
        &mut self,
        scope: &UnitScope<'_>,
        calculation: &JobHandle,
    ) -> SchedulerResult<JobHandle> {
        let visible = self.visible.clone();
        let batches = self.batches.clone();
        scope.submit(
            move || {
                let mut remaining = visible.load(Ordering::Acquire);
                let mut packed = batches.lock().unwrap_or_else(|e| e.into_inner());
                packed.clear();
                while remaining > 0 {
                    let batch = remaining.min(BATCH_SIZE);
                    packed.push(batch);
                    remaining -= batch;
                }
            },
            calculation,
        )
    }

    fn consume(&mut self) -> anyhow::Result<()> {
        let batches = self.batches.lock().unwrap_or_else(|e| e.into_inner());
        let entities: usize = batches.iter().sum();
        log::trace!(
            "{}: {} draw call(s), {} entities",
            self.name,
            batches.len(),
            entities
        );
        self.draws += batches.len() as u64;
        self.drawn_entities += entities as u64;
        Ok(())
    }

    fn teardown(&mut self) {
        log::info!(
            "{}: released after {} draw call(s) covering {} entities",
            self.name,
            self.draws,
            self.drawn_entities
        );
    }
}
