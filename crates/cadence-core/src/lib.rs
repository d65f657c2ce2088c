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

//! # Cadence Core
//!
//! Contracts for frame-synchronous, two-phase render scheduling: completion
//! handles and the job-system interface, the work-unit trait, the per-frame
//! snapshot, typed data access, the entity-store query boundary, static
//! configuration and the shared error taxonomy.

#![warn(missing_docs)]

pub mod access;
pub mod config;
pub mod error;
pub mod frame;
pub mod jobs;
pub mod store;
pub mod unit;

pub use access::{AccessLedger, AccessMap, Phase};
pub use config::{PipelineMode, PlaybackMode, SchedulerConfig, UpdateModes};
pub use error::{SchedulerError, SchedulerResult};
pub use frame::{FrameSnapshot, Version};
pub use jobs::{Fence, Job, JobHandle, JobSystem, JobSystemStats};
pub use store::{EntityStore, UnitQuery};
pub use unit::{SharedGeometry, UnitInit, UnitScope, WorkUnit};
