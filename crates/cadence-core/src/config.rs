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

//! Static configuration of the scheduling subsystem.

use crate::error::{SchedulerError, SchedulerResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// The three independent property-update capabilities.
///
/// At least one must be enabled or the subsystem refuses to start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateModes {
    /// Properties re-uploaded when their source data changes.
    pub reactive: bool,
    /// Properties uploaded once and left alone afterwards.
    #[serde(rename = "static")]
    pub static_data: bool,
    /// Properties uploaded unconditionally every frame.
    pub per_frame: bool,
}

impl Default for UpdateModes {
    fn default() -> Self {
        Self {
            reactive: true,
            static_data: true,
            per_frame: true,
        }
    }
}

impl UpdateModes {
    /// All three capabilities off. Never valid; useful for building up a set.
    pub const NONE: UpdateModes = UpdateModes {
        reactive: false,
        static_data: false,
        per_frame: false,
    };

    /// Returns `true` if at least one mode is on.
    pub fn any(&self) -> bool {
        self.reactive || self.static_data || self.per_frame
    }

    /// Fails with [`SchedulerError::NoUpdateModes`] when every mode is off.
    pub fn validate(&self) -> SchedulerResult<()> {
        if self.any() {
            Ok(())
        } else {
            Err(SchedulerError::NoUpdateModes)
        }
    }
}

/// Whether the subsystem runs inside normal playback or an editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PlaybackMode {
    /// Normal playback.
    #[default]
    Playing,
    /// Outside playback (editor tooling); enables the shared geometry hook.
    Editor,
}

/// How per-unit work is split into scheduling stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PipelineMode {
    /// Calculation and sync are separate fan-outs with a batched join between.
    #[default]
    TwoPhase,
    /// Each unit schedules calculation and sync as one step; one batched join.
    Combined,
}

/// Configuration for the render scheduling subsystem.
///
/// Loaded from RON:
///
/// ```rust
/// use cadence_core::config::{PipelineMode, SchedulerConfig};
///
/// let config = SchedulerConfig::from_ron_str(
///     "(update_modes: (reactive: true, static: false, per_frame: false), defer_join: true)",
/// )
/// .unwrap();
/// assert!(config.defer_join);
/// assert_eq!(config.pipeline, PipelineMode::TwoPhase);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Enabled property update categories.
    pub update_modes: UpdateModes,
    /// Playback or editor environment.
    pub playback: PlaybackMode,
    /// Two-phase or combined scheduling.
    pub pipeline: PipelineMode,
    /// Defer the final join and consumption to a later pass (split-pass shape).
    pub defer_join: bool,
    /// Worker thread count. `0` picks one less than the available parallelism.
    pub worker_threads: usize,
    /// Default `env_logger` filter used by binaries.
    pub log_filter: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            update_modes: UpdateModes::default(),
            playback: PlaybackMode::default(),
            pipeline: PipelineMode::default(),
            defer_join: false,
            worker_threads: 0,
            log_filter: "info".to_string(),
        }
    }
}

impl SchedulerConfig {
    /// Parses a RON document.
    ///
    /// Only syntax is checked here; call [`validate`](Self::validate) before use.
    pub fn from_ron_str(source: &str) -> SchedulerResult<Self> {
        ron::from_str(source).map_err(|e| SchedulerError::Config(e.to_string()))
    }

    /// Reads and parses a RON file.
    pub fn from_ron_file(path: impl AsRef<Path>) -> SchedulerResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| SchedulerError::Config(format!("{}: {e}", path.display())))?;
        let config: Self = ron::from_str(&source)
            .map_err(|e| SchedulerError::Config(format!("{}: {e}", path.display())))?;
        log::info!("SchedulerConfig: loaded {}", path.display());
        Ok(config)
    }

    /// Renders the configuration as pretty-printed RON, the format
    /// [`from_ron_str`](Self::from_ron_str) reads back.
    pub fn to_ron_string(&self) -> SchedulerResult<String> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| SchedulerError::Config(e.to_string()))
    }

    /// Checks the static configuration contract.
    pub fn validate(&self) -> SchedulerResult<()> {
        self.update_modes.validate().inspect_err(|e| {
            log::error!("SchedulerConfig: rejected: {e}");
        })
    }

    /// Resolves `worker_threads` to a concrete count.
    pub fn resolved_worker_threads(&self) -> usize {
        if self.worker_threads > 0 {
            return self.worker_threads;
        }
        std::thread::available_parallelism()
            .map(|n| n.get().saturating_sub(1))
            .unwrap_or(1)
            .max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid_and_fused() {
        let config = SchedulerConfig::default();
        assert!(config.validate().is_ok());
        assert!(!config.defer_join);
        assert_eq!(config.playback, PlaybackMode::Playing);
    }

    #[test]
    fn test_all_modes_disabled_is_fatal() {
        let config = SchedulerConfig {
            update_modes: UpdateModes::NONE,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(SchedulerError::NoUpdateModes)
        ));
    }

    #[test]
    fn test_any_single_mode_is_enough() {
        for modes in [
            UpdateModes { reactive: true, ..UpdateModes::NONE },
            UpdateModes { static_data: true, ..UpdateModes::NONE },
            UpdateModes { per_frame: true, ..UpdateModes::NONE },
        ] {
            assert!(modes.validate().is_ok());
        }
    }

    #[test]
    fn test_ron_parsing_fills_defaults() {
        let config = SchedulerConfig::from_ron_str(
            "(playback: Editor, pipeline: Combined, worker_threads: 3)",
        )
        .unwrap();
        assert_eq!(config.playback, PlaybackMode::Editor);
        assert_eq!(config.pipeline, PipelineMode::Combined);
        assert_eq!(config.resolved_worker_threads(), 3);
        assert_eq!(config.update_modes, UpdateModes::default());
    }

    #[test]
    fn test_ron_static_field_name() {
        let config = SchedulerConfig::from_ron_str(
            "(update_modes: (reactive: false, static: false, per_frame: false))",
        )
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_ron_is_config_error() {
        let err = SchedulerConfig::from_ron_str("(defer_join: maybe)").unwrap_err();
        assert!(matches!(err, SchedulerError::Config(_)));
    }

    #[test]
    fn test_written_ron_reads_back_unchanged() {
        let config = SchedulerConfig {
            update_modes: UpdateModes { reactive: false, ..UpdateModes::default() },
            playback: PlaybackMode::Editor,
            pipeline: PipelineMode::Combined,
            defer_join: true,
            worker_threads: 2,
            log_filter: "cadence_control=debug".to_string(),
        };
        let text = config.to_ron_string().unwrap();
        assert!(text.contains("static: true"));
        assert_eq!(SchedulerConfig::from_ron_str(&text).unwrap(), config);
    }

    #[test]
    fn test_missing_file_names_the_path() {
        let err = SchedulerConfig::from_ron_file("/nonexistent/cadence.ron").unwrap_err();
        match err {
            SchedulerError::Config(message) => assert!(message.contains("cadence.ron")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_auto_worker_threads_is_at_least_one() {
        assert!(SchedulerConfig::default().resolved_worker_threads() >= 1);
    }
}
