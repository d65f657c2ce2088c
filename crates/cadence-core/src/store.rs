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

//! Boundary contract with the entity/component store.
//!
//! The subsystem builds exactly one [`UnitQuery`] when it is created and never
//! re-derives it per frame.

use std::fmt;

/// Names one category of per-entity data a query requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentKind(pub &'static str);

impl ComponentKind {
    /// Object-to-world transform.
    pub const LOCAL_TO_WORLD: ComponentKind = ComponentKind("LocalToWorld");
    /// Mesh and material binding.
    pub const RENDER_MESH: ComponentKind = ComponentKind("RenderMesh");
    /// Per-entity bounds in object space.
    pub const RENDER_BOUNDS: ComponentKind = ComponentKind("RenderBounds");
    /// Per-chunk aggregated world bounds.
    pub const CHUNK_WORLD_RENDER_BOUNDS: ComponentKind = ComponentKind("ChunkWorldRenderBounds");
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// The fixed set of categories the unit query asks for.
pub const REQUIRED_COMPONENTS: [ComponentKind; 4] = [
    ComponentKind::LOCAL_TO_WORLD,
    ComponentKind::RENDER_MESH,
    ComponentKind::RENDER_BOUNDS,
    ComponentKind::CHUNK_WORLD_RENDER_BOUNDS,
];

/// One storage archetype matched by the query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchetypeDesc {
    /// Human-readable archetype name.
    pub name: String,
    /// Entities currently stored in it.
    pub entity_count: usize,
}

/// The result of querying the store once at creation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitQuery {
    /// Categories the query was built for.
    pub required: Vec<ComponentKind>,
    /// Archetypes that carry every required category.
    pub archetypes: Vec<ArchetypeDesc>,
}

impl UnitQuery {
    /// Total number of entities across matched archetypes.
    pub fn entity_count(&self) -> usize {
        self.archetypes.iter().map(|a| a.entity_count).sum()
    }
}

/// An entity/component store able to answer the unit query.
pub trait EntityStore: Send + Sync {
    /// Builds a query matching every archetype that has all `required` categories.
    fn query(&self, required: &[ComponentKind]) -> anyhow::Result<UnitQuery>;
}

/// A store backed by a static list of archetypes and their categories.
///
/// Used by the sandbox and by tests in place of a real ECS.
#[derive(Debug, Clone, Default)]
pub struct StaticStore {
    archetypes: Vec<(ArchetypeDesc, Vec<ComponentKind>)>,
}

impl StaticStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an archetype carrying `components`.
    pub fn with_archetype(
        mut self,
        name: impl Into<String>,
        entity_count: usize,
        components: &[ComponentKind],
    ) -> Self {
        self.archetypes.push((
            ArchetypeDesc {
                name: name.into(),
                entity_count,
            },
            components.to_vec(),
        ));
        self
    }
}

impl EntityStore for StaticStore {
    fn query(&self, required: &[ComponentKind]) -> anyhow::Result<UnitQuery> {
        anyhow::ensure!(!required.is_empty(), "query must require at least one component");
        let archetypes = self
            .archetypes
            .iter()
            .filter(|(_, components)| required.iter().all(|r| components.contains(r)))
            .map(|(desc, _)| desc.clone())
            .collect();
        Ok(UnitQuery {
            required: required.to_vec(),
            archetypes,
        })
    }
}
