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

//! The batched two-phase scheduling protocol.
//!
//! ```text
//!  fan_out:           begin_calculation ×N → flush → wait(combine H1)      (join 1)
//!                     complete_calculation_and_begin_sync ×N → flush → H2
//!  join_and_consume:  wait(H2)                                             (join 2)
//!                     consume ×N in registration order
//! ```
//!
//! With `defer_join` the two halves run in different passes and unrelated
//! work can be scheduled between them; otherwise [`TwoPhaseScheduler::run_pass`]
//! runs them back to back. Either way a frame costs at most two blocking
//! waits, independent of the number of units.

use crate::metrics::SchedulerStats;
use crate::registry::{RegistryState, UnitRegistry};
use cadence_core::access::{AccessLedger, Phase};
use cadence_core::config::{PipelineMode, SchedulerConfig};
use cadence_core::frame::FrameSnapshot;
use cadence_core::jobs::{JobHandle, JobSystem};
use cadence_core::unit::UnitScope;
use cadence_core::{SchedulerError, SchedulerResult};
use std::time::Instant;

/// What a call to [`TwoPhaseScheduler::run_pass`] ended with.
#[derive(Debug, Clone)]
pub enum PassOutcome {
    /// The pass joined and consumed every unit.
    Consumed {
        /// Units consumed.
        units: usize,
    },
    /// The final join was deferred; the handle covers every unit's sync work.
    Deferred(JobHandle),
}

/// Drives every registered unit through calculation, sync and consumption.
pub struct TwoPhaseScheduler {
    pipeline: PipelineMode,
    defer_join: bool,
    ledger: AccessLedger,
    outstanding: Option<JobHandle>,
    pass_started: Option<Instant>,
    stats: SchedulerStats,
}

impl TwoPhaseScheduler {
    /// Creates a scheduler for the configured pipeline and join shape.
    pub fn new(config: &SchedulerConfig) -> Self {
        Self {
            pipeline: config.pipeline,
            defer_join: config.defer_join,
            ledger: AccessLedger::new(),
            outstanding: None,
            pass_started: None,
            stats: SchedulerStats::default(),
        }
    }

    /// `true` when [`run_pass`](Self::run_pass) leaves the final join to a later pass.
    pub fn defer_join(&self) -> bool {
        self.defer_join
    }

    /// The configured pipeline.
    pub fn pipeline(&self) -> PipelineMode {
        self.pipeline
    }

    /// `true` between a fan-out and its consumption.
    pub fn has_outstanding(&self) -> bool {
        self.outstanding.is_some()
    }

    /// Accumulated pass statistics.
    pub fn stats(&self) -> &SchedulerStats {
        &self.stats
    }

    /// Fails fast if a pass cannot start: work is still outstanding, a pass is
    /// in flight, or the registry is poisoned.
    ///
    /// Lets callers reject a frame before assembling its snapshot.
    pub fn check_ready(&self, registry: &UnitRegistry) -> SchedulerResult<()> {
        if registry.state() == RegistryState::Poisoned {
            return Err(SchedulerError::Poisoned);
        }
        if self.outstanding.is_some() || registry.is_in_flight() {
            return Err(SchedulerError::PassInFlight);
        }
        Ok(())
    }

    /// Fans out every unit and returns the combined sync handle without waiting on it.
    ///
    /// Blocks once, on the batched calculation join (two-phase pipeline only).
    /// Any failure aborts the pass and poisons the registry; jobs the earlier
    /// units already submitted are flushed and joined first.
    pub fn fan_out(
        &mut self,
        registry: &mut UnitRegistry,
        snapshot: &FrameSnapshot,
        jobs: &dyn JobSystem,
    ) -> SchedulerResult<JobHandle> {
        self.check_ready(registry)?;
        registry.begin_pass()?;
        self.ledger.reset();
        self.pass_started = Some(Instant::now());

        log::debug!(
            "TwoPhaseScheduler: frame {} fan-out over {} unit(s) ({:?})",
            snapshot.frame_index(),
            registry.len(),
            self.pipeline
        );

        let mut submitted = Vec::with_capacity(registry.len() * 2);
        let result = match self.pipeline {
            PipelineMode::TwoPhase => {
                self.fan_out_two_phase(registry, snapshot, jobs, &mut submitted)
            }
            PipelineMode::Combined => {
                self.fan_out_combined(registry, snapshot, jobs, &mut submitted)
            }
        };

        match result {
            Ok(outgoing) => {
                self.outstanding = Some(outgoing.clone());
                Ok(outgoing)
            }
            Err(e) => {
                Self::drain(jobs, &submitted);
                Err(self.abort(registry, e))
            }
        }
    }

    /// Runs and joins whatever a failed fan-out already submitted, so no unit
    /// is released while its jobs can still touch it.
    fn drain(jobs: &dyn JobSystem, submitted: &[JobHandle]) {
        jobs.flush_batch();
        let partial = jobs.combine(submitted);
        if partial.is_complete() {
            return;
        }
        log::warn!(
            "TwoPhaseScheduler: joining {} job(s) submitted before the failure",
            partial.fence_count()
        );
        if let Err(e) = jobs.wait(&partial) {
            log::warn!("TwoPhaseScheduler: partial work also failed: {e}");
        }
    }

    fn fan_out_two_phase(
        &mut self,
        registry: &mut UnitRegistry,
        snapshot: &FrameSnapshot,
        jobs: &dyn JobSystem,
        submitted: &mut Vec<JobHandle>,
    ) -> SchedulerResult<JobHandle> {
        let incoming = snapshot.dependency();

        let mut calculations = Vec::with_capacity(registry.len());
        for (index, unit) in registry.units_mut().enumerate() {
            let scope = UnitScope::new(snapshot, jobs, &self.ledger, index, Phase::Calculation);
            log::trace!("TwoPhaseScheduler: begin_calculation '{}'", unit.name());
            let calculation = unit.begin_calculation(&scope, incoming)?;
            submitted.push(calculation.clone());
            calculations.push(calculation);
            self.stats.units_scheduled += 1;
        }
        jobs.flush_batch();

        // Every unit's calculation must be complete before any unit decides.
        jobs.wait(&jobs.combine(&calculations))?;
        self.stats.phase1_joins += 1;

        let mut syncs = Vec::with_capacity(calculations.len());
        for ((index, unit), calculation) in registry.units_mut().enumerate().zip(&calculations) {
            let scope = UnitScope::new(snapshot, jobs, &self.ledger, index, Phase::Sync);
            log::trace!(
                "TwoPhaseScheduler: complete_calculation_and_begin_sync '{}'",
                unit.name()
            );
            let sync = unit.complete_calculation_and_begin_sync(&scope, calculation)?;
            submitted.push(sync.clone());
            syncs.push(sync);
        }
        jobs.flush_batch();

        Ok(jobs.combine(&syncs))
    }

    fn fan_out_combined(
        &mut self,
        registry: &mut UnitRegistry,
        snapshot: &FrameSnapshot,
        jobs: &dyn JobSystem,
        submitted: &mut Vec<JobHandle>,
    ) -> SchedulerResult<JobHandle> {
        let incoming = snapshot.dependency();
        for (index, unit) in registry.units_mut().enumerate() {
            let scope = UnitScope::new(snapshot, jobs, &self.ledger, index, Phase::Update);
            log::trace!("TwoPhaseScheduler: schedule_update '{}'", unit.name());
            submitted.push(unit.schedule_update(&scope, incoming)?);
            self.stats.units_scheduled += 1;
        }
        jobs.flush_batch();
        Ok(jobs.combine(submitted.as_slice()))
    }

    /// Blocks once on the outstanding sync handle, then consumes every unit in
    /// registration order.
    ///
    /// Returns the number of units consumed; `0` if nothing was outstanding.
    pub fn join_and_consume(
        &mut self,
        registry: &mut UnitRegistry,
        jobs: &dyn JobSystem,
    ) -> SchedulerResult<usize> {
        let Some(outstanding) = self.outstanding.take() else {
            log::debug!("TwoPhaseScheduler: nothing outstanding to consume");
            return Ok(0);
        };

        if let Err(e) = jobs.wait(&outstanding) {
            return Err(self.abort(registry, e));
        }
        self.stats.phase2_joins += 1;

        let mut consumed = 0;
        let mut failure = None;
        for unit in registry.units_mut() {
            log::trace!("TwoPhaseScheduler: consume '{}'", unit.name());
            if let Err(e) = unit.consume() {
                failure = Some(SchedulerError::unit(unit.name(), e));
                break;
            }
            consumed += 1;
        }
        if let Some(e) = failure {
            return Err(self.abort(registry, e));
        }

        registry.end_pass();
        self.stats.units_consumed += consumed as u64;
        self.stats.frames += 1;
        if let Some(started) = self.pass_started.take() {
            self.stats
                .record_pass(started.elapsed().as_secs_f32() * 1000.0);
        }
        Ok(consumed)
    }

    /// Runs one pass in the configured shape.
    ///
    /// Fused: fan-out, join and consumption back to back. Deferred: fan-out
    /// only; call [`join_and_consume`](Self::join_and_consume) in a later pass.
    pub fn run_pass(
        &mut self,
        registry: &mut UnitRegistry,
        snapshot: &FrameSnapshot,
        jobs: &dyn JobSystem,
    ) -> SchedulerResult<PassOutcome> {
        let outgoing = self.fan_out(registry, snapshot, jobs)?;
        if self.defer_join {
            return Ok(PassOutcome::Deferred(outgoing));
        }
        let units = self.join_and_consume(registry, jobs)?;
        Ok(PassOutcome::Consumed { units })
    }

    /// Waits for outstanding work without consuming it. Used before teardown.
    pub fn join_outstanding(
        &mut self,
        registry: &mut UnitRegistry,
        jobs: &dyn JobSystem,
    ) -> SchedulerResult<()> {
        if let Some(outstanding) = self.outstanding.take() {
            log::debug!("TwoPhaseScheduler: joining outstanding work without consuming it");
            registry.end_pass();
            jobs.wait(&outstanding)?;
        }
        Ok(())
    }

    fn abort(&mut self, registry: &mut UnitRegistry, error: SchedulerError) -> SchedulerError {
        log::error!("TwoPhaseScheduler: pass aborted: {error}");
        registry.poison();
        self.outstanding = None;
        self.pass_started = None;
        self.stats.aborted_passes += 1;
        error
    }
}
