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

//! Rolling statistics for scheduling passes.

/// A fixed-size circular buffer for storing numerical samples.
#[derive(Debug, Clone)]
pub struct RingBuffer<T, const N: usize> {
    data: [T; N],
    index: usize,
    count: usize,
}

impl<T: Default + Copy, const N: usize> RingBuffer<T, N> {
    /// Creates a new, empty ring buffer.
    pub fn new() -> Self {
        Self {
            data: [T::default(); N],
            index: 0,
            count: 0,
        }
    }

    /// Pushes a new value into the buffer, overwriting the oldest if full.
    pub fn push(&mut self, value: T) {
        self.data[self.index] = value;
        self.index = (self.index + 1) % N;
        if self.count < N {
            self.count += 1;
        }
    }

    /// Returns the number of elements currently in the buffer.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Returns an iterator over the values in chronological order (oldest to newest).
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        let start = if self.count < N { 0 } else { self.index };
        (0..self.count).map(move |i| &self.data[(start + i) % N])
    }
}

impl<T: Default + Copy, const N: usize> Default for RingBuffer<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> RingBuffer<f32, N> {
    /// Calculates the arithmetic mean of the values in the buffer.
    pub fn average(&self) -> f32 {
        if self.count == 0 {
            return 0.0;
        }
        self.iter().sum::<f32>() / self.count as f32
    }

    /// Returns the maximum value in the buffer, or `0.0` if empty.
    pub fn max(&self) -> f32 {
        self.iter().copied().fold(0.0, f32::max)
    }
}

/// Counters and timings accumulated by the scheduler.
///
/// `phase1_joins` and `phase2_joins` count batched waits, never per-unit waits.
#[derive(Debug, Clone, Default)]
pub struct SchedulerStats {
    /// Frames whose consumption completed.
    pub frames: u64,
    /// Batched joins covering every unit's calculation.
    pub phase1_joins: u64,
    /// Batched joins covering every unit's sync (or combined update).
    pub phase2_joins: u64,
    /// Units fanned out, counted once per unit per frame in either pipeline.
    pub units_scheduled: u64,
    /// `consume` calls made across all units and frames.
    pub units_consumed: u64,
    /// Passes that ended in a fatal error.
    pub aborted_passes: u64,
    // Last 120 pass durations (fan-out start to consumption end) in milliseconds.
    pass_times_ms: RingBuffer<f32, 120>,
}

impl SchedulerStats {
    /// Records the duration of a completed pass.
    pub fn record_pass(&mut self, millis: f32) {
        self.pass_times_ms.push(millis);
    }

    /// Mean duration of the recorded passes.
    pub fn average_pass_ms(&self) -> f32 {
        self.pass_times_ms.average()
    }

    /// Longest recorded pass.
    pub fn max_pass_ms(&self) -> f32 {
        self.pass_times_ms.max()
    }

    /// Number of pass durations currently retained.
    pub fn recorded_passes(&self) -> usize {
        self.pass_times_ms.count()
    }
}
