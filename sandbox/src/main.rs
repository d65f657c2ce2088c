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

mod units;

use anyhow::Result;
use cadence_control::{PassOutcome, RenderSubsystem};
use cadence_core::access::AccessMap;
use cadence_core::jobs::{JobHandle, JobSystem};
use cadence_core::store::{ComponentKind, StaticStore, REQUIRED_COMPONENTS};
use cadence_core::{PipelineMode, PlaybackMode, SchedulerConfig};
use cadence_infra::WorkerPool;
use clap::Parser;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::Instant;
use units::{ArchetypeUnit, Camera, FrameClock};

#[derive(Parser, Debug)]
#[command(name = "cadence-sandbox", version)]
struct Cli {
    /// RON scheduler configuration. Flags below override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Frames to simulate.
    #[arg(long, default_value_t = 120)]
    frames: u64,

    /// Number of archetype units to register.
    #[arg(long, default_value_t = 4)]
    units: usize,

    /// Split each frame into an update pass and a later draw pass.
    #[arg(long, default_value_t = false)]
    defer_join: bool,

    /// Schedule calculation and sync as one step.
    #[arg(long, default_value_t = false)]
    combined: bool,

    /// Run in editor playback (builds the shared editor geometry).
    #[arg(long, default_value_t = false)]
    editor: bool,

    /// Worker threads; 0 picks one less than the available cores.
    #[arg(long)]
    threads: Option<usize>,
}

impl Cli {
    fn scheduler_config(&self) -> Result<SchedulerConfig> {
        let mut config = match &self.config {
            Some(path) => SchedulerConfig::from_ron_file(path)?,
            None => SchedulerConfig::default(),
        };
        if self.defer_join {
            config.defer_join = true;
        }
        if self.combined {
            config.pipeline = PipelineMode::Combined;
        }
        if self.editor {
            config.playback = PlaybackMode::Editor;
        }
        if let Some(threads) = self.threads {
            config.worker_threads = threads;
        }
        Ok(config)
    }
}

fn build_store(units: usize) -> StaticStore {
    let mut store = StaticStore::new();
    for i in 0..units {
        store = store.with_archetype(format!("archetype-{i}"), 256 * (i + 1), &REQUIRED_COMPONENTS);
    }
    // No bounds, so the unit query skips it.
    store.with_archetype(
        "ui-overlay",
        32,
        &[ComponentKind::LOCAL_TO_WORLD, ComponentKind::RENDER_MESH],
    )
}

fn main() -> Result<()> {
    use env_logger::{Builder, Env};

    let cli = Cli::parse();
    let config = cli.scheduler_config()?;

    Builder::from_env(Env::default().default_filter_or(config.log_filter.as_str())).init();
    if log::log_enabled!(log::Level::Debug) {
        log::debug!("Sandbox: resolved configuration:\n{}", config.to_ron_string()?);
    }

    let pool = Arc::new(WorkerPool::from_config(&config)?);
    let jobs: Arc<dyn JobSystem> = pool.clone();
    let store = build_store(cli.units);

    let mut render = RenderSubsystem::create(config, &store, jobs)?;
    for i in 0..cli.units {
        render.register(Box::new(ArchetypeUnit::new(&format!("archetype-{i}"))))?;
    }
    render
        .persistent_access_mut()
        .insert_read(Arc::new(RwLock::new(Camera { cull_stride: 7 })));
    render.initialize()?;

    log::info!(
        "Sandbox: {} frame(s), {} unit(s), {} worker(s)",
        cli.frames,
        render.registry().len(),
        pool.thread_count()
    );

    let started = Instant::now();
    for frame in 0..cli.frames {
        let mut per_frame = AccessMap::new();
        per_frame.insert_read(Arc::new(RwLock::new(FrameClock { frame })));

        match render.run_frame(&per_frame, JobHandle::completed())? {
            PassOutcome::Consumed { .. } => {}
            PassOutcome::Deferred(_) => {
                // Unrelated work between fan-out and consumption.
                let animation = pool.submit(
                    Box::new(move || {
                        let _pose: f32 = (0..512).map(|i| (i as f32 * 0.01).sin()).sum();
                    }),
                    &JobHandle::completed(),
                )?;
                pool.flush_batch();
                pool.wait(&animation)?;
                render.draw_pass()?;
            }
        }
    }
    let elapsed = started.elapsed();

    let stats = render.stats();
    let pool_stats = pool.stats();
    log::info!(
        "Sandbox: {} frame(s) in {:.2?}; pass avg {:.3} ms, max {:.3} ms",
        stats.frames,
        elapsed,
        stats.average_pass_ms(),
        stats.max_pass_ms()
    );
    log::info!(
        "Sandbox: {} join(s) over {} frame(s); {} job(s) submitted, {} failed",
        stats.phase1_joins + stats.phase2_joins,
        stats.frames,
        pool_stats.submitted,
        pool_stats.failed
    );

    render.teardown()?;
    Ok(())
}
