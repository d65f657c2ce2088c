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

//! Per-frame snapshot assembly.

use cadence_core::access::AccessMap;
use cadence_core::frame::{FrameSnapshot, Version};
use cadence_core::jobs::JobHandle;
use cadence_core::UpdateModes;

/// Owns the state that persists across frames and stamps out one
/// [`FrameSnapshot`] per pass.
///
/// The persistent access map carries the static and reactive property
/// handles; per-frame handles are layered over it at assembly time.
#[derive(Debug)]
pub struct SnapshotSource {
    persistent: AccessMap,
    update_modes: UpdateModes,
    last_version: Version,
    frame_index: u64,
}

impl SnapshotSource {
    /// Creates a source with no persistent handles.
    pub fn new(update_modes: UpdateModes) -> Self {
        Self {
            persistent: AccessMap::new(),
            update_modes,
            last_version: Version::NEVER,
            frame_index: 0,
        }
    }

    /// Handles that persist across frames.
    pub fn persistent(&self) -> &AccessMap {
        &self.persistent
    }

    /// Mutable access to the persistent handles. Only valid between passes.
    pub fn persistent_mut(&mut self) -> &mut AccessMap {
        &mut self.persistent
    }

    /// The version handed out by the most recent assembly.
    pub fn last_version(&self) -> Version {
        self.last_version
    }

    /// Number of snapshots assembled so far.
    pub fn frames_assembled(&self) -> u64 {
        self.frame_index
    }

    /// Builds this frame's snapshot and advances the version counter.
    pub fn assemble(&mut self, per_frame: &AccessMap, dependency: JobHandle) -> FrameSnapshot {
        let last = self.last_version;
        let current = last.next();

        let mut access = self.persistent.clone();
        access.merge(per_frame);

        let snapshot = FrameSnapshot::new(
            self.frame_index,
            current,
            last,
            self.update_modes,
            access,
            dependency,
        );
        log::trace!(
            "SnapshotSource: frame {} at version {:?} ({} access handle(s))",
            self.frame_index,
            current,
            snapshot.access().len()
        );

        self.last_version = current;
        self.frame_index += 1;
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::access::AccessMode;
    use std::sync::{Arc, RwLock};

    struct StaticProps(u32);
    struct FrameProps(u32);

    #[test]
    fn test_versions_advance_every_frame() {
        let mut source = SnapshotSource::new(UpdateModes::default());
        let first = source.assemble(&AccessMap::new(), JobHandle::completed());
        let second = source.assemble(&AccessMap::new(), JobHandle::completed());

        assert_eq!(first.last_version(), Version::NEVER);
        assert_eq!(first.global_version(), Version(1));
        assert_eq!(second.last_version(), first.global_version());
        assert_eq!(second.frame_index(), 1);
        assert_eq!(source.frames_assembled(), 2);
    }

    #[test]
    fn test_per_frame_handles_layer_over_persistent_ones() {
        let mut source = SnapshotSource::new(UpdateModes::default());
        source
            .persistent_mut()
            .insert_read(Arc::new(RwLock::new(StaticProps(1))));

        let mut per_frame = AccessMap::new();
        per_frame.insert_write(Arc::new(RwLock::new(FrameProps(2))));
        let snapshot = source.assemble(&per_frame, JobHandle::completed());

        assert_eq!(snapshot.access().len(), 2);
        assert_eq!(
            snapshot.access().mode_of::<FrameProps>(),
            Some(AccessMode::ReadWrite)
        );
        // The per-frame handle does not leak into the next frame.
        let next = source.assemble(&AccessMap::new(), JobHandle::completed());
        assert!(next.access().read::<FrameProps>().is_none());
        assert_eq!(next.access().read::<StaticProps>().unwrap().read().0, 1);
    }
}
