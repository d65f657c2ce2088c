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

//! # Cadence Control
//!
//! The hot path of frame scheduling. [`UnitRegistry`] owns the work units and
//! their lifecycle, [`TwoPhaseScheduler`] drives them through the batched
//! protocol, and [`RenderSubsystem`] ties both to a job system and a
//! per-frame [`SnapshotSource`].

#![warn(missing_docs)]

pub mod metrics;
pub mod registry;
pub mod scheduler;
pub mod service;
pub mod snapshot;

pub use metrics::{RingBuffer, SchedulerStats};
pub use registry::{RegistryState, UnitRegistry};
pub use scheduler::{PassOutcome, TwoPhaseScheduler};
pub use service::RenderSubsystem;
pub use snapshot::SnapshotSource;
