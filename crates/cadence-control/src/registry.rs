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

//! Ordered ownership of the work units for one rendering subsystem.

use cadence_core::config::{PlaybackMode, SchedulerConfig};
use cadence_core::store::{EntityStore, UnitQuery, REQUIRED_COMPONENTS};
use cadence_core::unit::{SharedGeometry, UnitInit, WorkUnit};
use cadence_core::{SchedulerError, SchedulerResult};

/// Lifecycle state of a [`UnitRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryState {
    /// Created; units not yet initialized.
    Created,
    /// `initialize` has run; no pass yet.
    Initialized,
    /// At least one scheduling pass has started.
    Active,
    /// A pass aborted; only teardown is allowed.
    Poisoned,
}

struct UnitEntry {
    unit: Box<dyn WorkUnit>,
    initialized: bool,
}

/// Owns the work units in registration order.
///
/// Registration order is consumption order, which makes draw order
/// deterministic. The list never changes while a pass has work in flight.
pub struct UnitRegistry {
    entries: Vec<UnitEntry>,
    query: UnitQuery,
    config: SchedulerConfig,
    editor_geometry: Option<SharedGeometry>,
    state: RegistryState,
    in_flight: bool,
    released: bool,
}

impl UnitRegistry {
    /// Builds the registry and its unit query.
    ///
    /// Fails with [`SchedulerError::NoUpdateModes`] on an invalid configuration
    /// and with [`SchedulerError::QueryConstruction`] if the store cannot
    /// answer the query.
    pub fn create(config: &SchedulerConfig, store: &dyn EntityStore) -> SchedulerResult<Self> {
        config.validate()?;
        let query = store
            .query(&REQUIRED_COMPONENTS)
            .map_err(SchedulerError::QueryConstruction)?;
        log::info!(
            "UnitRegistry: created ({} archetype(s), {} entities matched)",
            query.archetypes.len(),
            query.entity_count()
        );
        Ok(Self {
            entries: Vec::new(),
            query,
            config: config.clone(),
            editor_geometry: None,
            state: RegistryState::Created,
            in_flight: false,
            released: false,
        })
    }

    fn init_entry(
        entry: &mut UnitEntry,
        query: &UnitQuery,
        config: &SchedulerConfig,
        editor_geometry: Option<&SharedGeometry>,
    ) -> SchedulerResult<()> {
        if entry.initialized {
            return Ok(());
        }
        let init = UnitInit {
            query,
            config,
            editor_geometry,
        };
        entry
            .unit
            .initialize(&init)
            .map_err(|e| SchedulerError::unit(entry.unit.name(), e))?;
        entry.initialized = true;
        log::debug!("UnitRegistry: initialized '{}'", entry.unit.name());
        Ok(())
    }

    fn ensure_mutable(&self) -> SchedulerResult<()> {
        if self.state == RegistryState::Poisoned {
            return Err(SchedulerError::Poisoned);
        }
        if self.in_flight {
            return Err(SchedulerError::PassInFlight);
        }
        Ok(())
    }

    /// Appends a unit and returns its index.
    ///
    /// Units added after [`initialize`](Self::initialize) are initialized here.
    pub fn register(&mut self, unit: Box<dyn WorkUnit>) -> SchedulerResult<usize> {
        self.ensure_mutable()?;
        let mut entry = UnitEntry {
            unit,
            initialized: false,
        };
        if self.state != RegistryState::Created {
            Self::init_entry(
                &mut entry,
                &self.query,
                &self.config,
                self.editor_geometry.as_ref(),
            )?;
        }
        log::info!(
            "UnitRegistry: registered '{}' at index {}",
            entry.unit.name(),
            self.entries.len()
        );
        self.entries.push(entry);
        Ok(self.entries.len() - 1)
    }

    /// Removes the first unit called `name`, tearing it down if it was
    /// initialized.
    ///
    /// Returns `false` if no such unit exists.
    pub fn remove(&mut self, name: &str) -> SchedulerResult<bool> {
        self.ensure_mutable()?;
        let Some(position) = self.entries.iter().position(|e| e.unit.name() == name) else {
            return Ok(false);
        };
        let mut entry = self.entries.remove(position);
        if entry.initialized {
            entry.unit.teardown();
        }
        log::info!("UnitRegistry: removed '{name}'");
        Ok(true)
    }

    /// One-time setup of every known unit.
    ///
    /// Safe to call again until the first pass starts; units already set up are
    /// skipped. In editor playback this also builds the shared geometry once.
    pub fn initialize(&mut self) -> SchedulerResult<()> {
        match self.state {
            RegistryState::Active => return Err(SchedulerError::AlreadyScheduling),
            RegistryState::Poisoned => return Err(SchedulerError::Poisoned),
            RegistryState::Created | RegistryState::Initialized => {}
        }

        if self.config.playback == PlaybackMode::Editor && self.editor_geometry.is_none() {
            log::debug!("UnitRegistry: building shared editor geometry");
            self.editor_geometry = Some(SharedGeometry::unit_quad());
        }

        for entry in &mut self.entries {
            Self::init_entry(
                entry,
                &self.query,
                &self.config,
                self.editor_geometry.as_ref(),
            )?;
        }
        self.state = RegistryState::Initialized;
        Ok(())
    }

    /// Current lifecycle state.
    pub fn state(&self) -> RegistryState {
        self.state
    }

    /// `true` while a pass has fanned out but not yet been consumed.
    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    /// The query built at creation.
    pub fn query(&self) -> &UnitQuery {
        &self.query
    }

    /// The shared geometry, present only in editor playback after initialize.
    pub fn editor_geometry(&self) -> Option<&SharedGeometry> {
        self.editor_geometry.as_ref()
    }

    /// Number of registered units.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no units are registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Unit names in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.unit.name()).collect()
    }

    pub(crate) fn units_mut(&mut self) -> impl Iterator<Item = &mut Box<dyn WorkUnit>> {
        self.entries.iter_mut().map(|e| &mut e.unit)
    }

    /// Marks the start of a pass. Initializes lazily if nobody called `initialize`.
    pub(crate) fn begin_pass(&mut self) -> SchedulerResult<()> {
        match self.state {
            RegistryState::Poisoned => return Err(SchedulerError::Poisoned),
            RegistryState::Created => {
                log::warn!("UnitRegistry: first pass before initialize; initializing now");
                self.initialize()?;
            }
            RegistryState::Initialized | RegistryState::Active => {}
        }
        if self.in_flight {
            return Err(SchedulerError::PassInFlight);
        }
        self.state = RegistryState::Active;
        self.in_flight = true;
        Ok(())
    }

    pub(crate) fn end_pass(&mut self) {
        self.in_flight = false;
    }

    pub(crate) fn poison(&mut self) {
        self.state = RegistryState::Poisoned;
        self.in_flight = false;
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        for entry in self.entries.iter_mut().rev() {
            if entry.initialized {
                entry.unit.teardown();
            } else {
                log::debug!(
                    "UnitRegistry: '{}' was never initialized; skipping teardown",
                    entry.unit.name()
                );
            }
        }
        log::info!(
            "UnitRegistry: released {} unit(s)",
            self.entries.len()
        );
        self.entries.clear();
        self.editor_geometry = None;
        self.released = true;
    }

    /// Releases every unit, in reverse registration order, then the registry.
    ///
    /// No pass may be in flight. Consuming `self` makes a second teardown
    /// impossible.
    pub fn teardown(mut self) {
        self.shutdown();
    }

    /// In-place teardown for owners that cannot give the registry up by value.
    pub(crate) fn shutdown(&mut self) {
        if self.in_flight {
            log::warn!("UnitRegistry: teardown with a pass still in flight");
        }
        self.release();
    }

    pub(crate) fn is_released(&self) -> bool {
        self.released
    }
}

impl Drop for UnitRegistry {
    fn drop(&mut self) {
        self.release();
    }
}
