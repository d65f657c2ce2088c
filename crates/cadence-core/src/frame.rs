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

//! The immutable per-frame input handed to every unit.

use crate::access::AccessMap;
use crate::config::UpdateModes;
use crate::jobs::JobHandle;
use std::sync::Arc;

/// A change-detection version stamp.
///
/// Versions wrap around and are never zero; zero means "never observed".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Version(pub u32);

impl Version {
    /// The "never observed" sentinel.
    pub const NEVER: Version = Version(0);

    /// The next version, skipping zero on wrap-around.
    pub fn next(self) -> Version {
        match self.0.wrapping_add(1) {
            0 => Version(1),
            v => Version(v),
        }
    }

    /// Wrap-aware "is `self` newer than `other`".
    pub fn is_newer_than(self, other: Version) -> bool {
        if other == Version::NEVER {
            return self != Version::NEVER;
        }
        (self.0.wrapping_sub(other.0) as i32) > 0
    }
}

/// Immutable inputs for one scheduling pass.
///
/// A fresh snapshot is built every frame. Units may clone the parts they need
/// into their jobs but must not keep the snapshot itself across frames.
#[derive(Debug, Clone)]
pub struct FrameSnapshot {
    frame_index: u64,
    global_version: Version,
    last_version: Version,
    update_modes: UpdateModes,
    access: Arc<AccessMap>,
    dependency: JobHandle,
}

impl FrameSnapshot {
    /// Assembles a snapshot. Normally called by the subsystem's snapshot source.
    pub fn new(
        frame_index: u64,
        global_version: Version,
        last_version: Version,
        update_modes: UpdateModes,
        access: AccessMap,
        dependency: JobHandle,
    ) -> Self {
        Self {
            frame_index,
            global_version,
            last_version,
            update_modes,
            access: Arc::new(access),
            dependency,
        }
    }

    /// Zero-based index of the frame this snapshot belongs to.
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// The version stamped on everything written this frame.
    pub fn global_version(&self) -> Version {
        self.global_version
    }

    /// The version observed by the previous frame.
    pub fn last_version(&self) -> Version {
        self.last_version
    }

    /// `true` if data stamped with `version` changed after the previous frame observed it.
    pub fn changed_since_last_frame(&self, version: Version) -> bool {
        version.is_newer_than(self.last_version)
    }

    /// Which categories of property update are enabled.
    pub fn update_modes(&self) -> UpdateModes {
        self.update_modes
    }

    /// The data-access handles valid for this frame.
    pub fn access(&self) -> &AccessMap {
        &self.access
    }

    /// Shared pointer to the access map, for moving into jobs.
    pub fn access_arc(&self) -> Arc<AccessMap> {
        Arc::clone(&self.access)
    }

    /// All outstanding work this pass must treat as a prerequisite.
    pub fn dependency(&self) -> &JobHandle {
        &self.dependency
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_skips_zero_on_wrap() {
        assert_eq!(Version(u32::MAX).next(), Version(1));
        assert_eq!(Version::NEVER.next(), Version(1));
    }

    #[test]
    fn test_version_ordering_is_wrap_aware() {
        assert!(Version(5).is_newer_than(Version(4)));
        assert!(!Version(4).is_newer_than(Version(5)));
        assert!(Version(2).is_newer_than(Version(u32::MAX - 1)));
        assert!(Version(1).is_newer_than(Version::NEVER));
        assert!(!Version::NEVER.is_newer_than(Version::NEVER));
    }

    #[test]
    fn test_snapshot_change_detection() {
        let snapshot = FrameSnapshot::new(
            3,
            Version(10),
            Version(9),
            UpdateModes::default(),
            AccessMap::new(),
            JobHandle::completed(),
        );
        assert!(snapshot.changed_since_last_frame(Version(10)));
        assert!(!snapshot.changed_since_last_frame(Version(9)));
        assert!(!snapshot.changed_since_last_frame(Version(2)));
        assert_eq!(snapshot.frame_index(), 3);
        assert!(snapshot.dependency().is_complete());
    }
}
