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

//! Error taxonomy shared by every scheduling crate.

use crate::access::Phase;
use thiserror::Error;

/// Convenience alias used throughout the scheduling crates.
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Every way a scheduling operation can fail.
///
/// None of these are retried. Configuration errors stop the subsystem from
/// ever starting; environment errors abort the pass in flight and leave the
/// registry unusable until it is torn down and recreated.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// All three property update modes are disabled.
    #[error("configuration error: at least one property update mode must be enabled")]
    NoUpdateModes,

    /// The configuration could not be parsed or is otherwise invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// The entity store could not build the unit query.
    #[error("environment error: failed to construct unit query: {0}")]
    QueryConstruction(#[source] anyhow::Error),

    /// The job system refused a submission.
    #[error("environment error: job submission failed: {0}")]
    Submission(String),

    /// At least one job covered by a waited handle panicked.
    #[error("environment error: {count} job(s) failed while running")]
    JobFailed {
        /// Number of failed jobs covered by the handle.
        count: usize,
    },

    /// A unit reported a failure from one of its stage entry points.
    #[error("unit '{unit}' failed: {source}")]
    Unit {
        /// Name of the failing unit.
        unit: String,
        /// The unit's own error.
        #[source]
        source: anyhow::Error,
    },

    /// Two units claimed write access to the same data in one phase.
    #[error("access conflict on '{type_name}' during {phase:?}: units {first} and {second}")]
    AccessConflict {
        /// Type name of the contested data.
        type_name: &'static str,
        /// Phase in which both claims happened.
        phase: Phase,
        /// Index of the unit holding the claim.
        first: usize,
        /// Index of the unit that tried to claim it again.
        second: usize,
    },

    /// A requested access handle is not part of the frame snapshot.
    #[error("no {mode} access registered for '{type_name}'")]
    MissingAccess {
        /// Type name of the requested data.
        type_name: &'static str,
        /// Either `"read"` or `"write"`.
        mode: &'static str,
    },

    /// The registry was mutated while a split pass still has work outstanding.
    #[error("registry cannot change while a scheduling pass is in flight")]
    PassInFlight,

    /// `initialize` was called after the first scheduling pass.
    #[error("registry is already scheduling; initialize must run before the first pass")]
    AlreadyScheduling,

    /// A previous pass aborted and left the registry in an indeterminate state.
    #[error("registry is poisoned by an aborted pass; tear down and recreate the subsystem")]
    Poisoned,
}

impl SchedulerError {
    /// Wraps a unit failure with the unit's name.
    pub fn unit(unit: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self::Unit {
            unit: unit.into(),
            source: source.into(),
        }
    }

    /// Returns `true` for errors that leave the registry unusable.
    pub fn is_fatal_environment(&self) -> bool {
        matches!(
            self,
            Self::QueryConstruction(_)
                | Self::Submission(_)
                | Self::JobFailed { .. }
                | Self::Unit { .. }
                | Self::AccessConflict { .. }
                | Self::MissingAccess { .. }
        )
    }
}
