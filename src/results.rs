//! Packed, point-in-time snapshots of a profiler
//!
//! A capture copies only what was used: tracks with at least one block and
//! blocks with at least one hit, compacted to the front. Derived ratios are
//! computed once at capture time so reports and exports never touch the
//! live counters. Snapshot vectors keep their capacity, so re-capturing
//! into the same `ProfilerResult` every repetition stops allocating after
//! the first run.

use crate::block::{BlockIdentity, BlockRecorder};
use crate::config::{PROFILER_NAME_LEN, TRACK_NAME_LEN};
use crate::name::FixedName;
use crate::profiler::Profiler;
use crate::report;
use crate::timer;
use crate::track::Track;
use serde::Serialize;
use std::io::{self, Write};

/// Snapshot of one block
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BlockResult {
    /// Slot index in the live track table
    pub slot: usize,
    pub file: &'static str,
    pub line: u32,
    pub name: &'static str,
    pub hit_count: u64,
    /// Cumulative CPU ticks
    pub elapsed: u64,
    pub processed_byte_count: u64,
    pub page_fault_count: u64,
    pub elapsed_seconds: f64,
    pub proportion_of_track: f64,
    pub proportion_of_total: f64,
    /// Bytes per second, 0 when no bytes or no time were recorded
    pub bandwidth: f64,
}

impl BlockResult {
    /// Build a snapshot of a live recorder
    pub fn from_recorder(
        slot: usize,
        rec: &BlockRecorder,
        track_elapsed: u64,
        total_elapsed: u64,
        cpu_frequency: u64,
    ) -> Self {
        let mut block = BlockResult::default();
        block.fill(slot, rec, track_elapsed, total_elapsed, cpu_frequency);
        block
    }

    fn fill(
        &mut self,
        slot: usize,
        rec: &BlockRecorder,
        track_elapsed: u64,
        total_elapsed: u64,
        cpu_frequency: u64,
    ) {
        let (file, line, name) = rec
            .identity()
            .map(|id| (id.file, id.line, id.name))
            .unwrap_or(("", 0, ""));
        let elapsed_seconds = timer::ticks_to_seconds(rec.elapsed(), cpu_frequency);

        *self = BlockResult {
            slot,
            file,
            line,
            name,
            hit_count: rec.hit_count(),
            elapsed: rec.elapsed(),
            processed_byte_count: rec.processed_byte_count(),
            page_fault_count: rec.page_fault_count(),
            elapsed_seconds,
            proportion_of_track: report::ratio(rec.elapsed(), track_elapsed),
            proportion_of_total: report::ratio(rec.elapsed(), total_elapsed),
            bandwidth: if elapsed_seconds > 0.0 {
                rec.processed_byte_count() as f64 / elapsed_seconds
            } else {
                0.0
            },
        };
    }

    pub fn identity(&self) -> BlockIdentity {
        BlockIdentity::new(self.file, self.line, self.name)
    }

    /// Processed bytes per page fault, `None` without faults
    pub fn bytes_per_page_fault(&self) -> Option<f64> {
        (self.page_fault_count > 0)
            .then(|| self.processed_byte_count as f64 / self.page_fault_count as f64)
    }
}

/// Snapshot of one used track
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrackResult {
    pub name: FixedName<TRACK_NAME_LEN>,
    /// Index of the track in the live profiler
    pub index: usize,
    pub elapsed: u64,
    pub elapsed_seconds: f64,
    pub proportion_of_total: f64,
    pub blocks: Vec<BlockResult>,
}

impl TrackResult {
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    fn fill<const B: usize>(
        &mut self,
        index: usize,
        track: &Track<B>,
        total_elapsed: u64,
        cpu_frequency: u64,
    ) {
        self.name = *track.fixed_name();
        self.index = index;
        self.elapsed = track.elapsed();
        self.elapsed_seconds = timer::ticks_to_seconds(track.elapsed(), cpu_frequency);
        self.proportion_of_total = report::ratio(track.elapsed(), total_elapsed);

        let mut used = 0;
        for (slot, rec) in track.hit_blocks() {
            if used == self.blocks.len() {
                self.blocks.push(BlockResult::default());
            }
            if let Some(block) = self.blocks.get_mut(used) {
                block.fill(slot, rec, track.elapsed(), total_elapsed, cpu_frequency);
            }
            used += 1;
        }
        self.blocks.truncate(used);
    }
}

/// Snapshot of a whole profiler
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProfilerResult {
    pub name: FixedName<PROFILER_NAME_LEN>,
    pub estimated_cpu_frequency: u64,
    pub elapsed: u64,
    pub elapsed_seconds: f64,
    pub tracks: Vec<TrackResult>,
}

impl ProfilerResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture a fresh snapshot of `profiler`
    pub fn from_profiler<const T: usize, const B: usize>(profiler: &Profiler<T, B>) -> Self {
        let mut result = Self::new();
        result.capture(profiler);
        result
    }

    /// Overwrite this snapshot with the current state of `profiler`
    pub fn capture<const T: usize, const B: usize>(&mut self, profiler: &Profiler<T, B>) {
        let cpu_frequency = timer::calibrated_cpu_frequency(profiler.config().calibration_ms);
        let total = profiler.elapsed();

        self.name = *profiler.fixed_name();
        self.estimated_cpu_frequency = cpu_frequency;
        self.elapsed = total;
        self.elapsed_seconds = timer::ticks_to_seconds(total, cpu_frequency);

        let mut used = 0;
        for (index, track) in profiler.used_tracks() {
            if used == self.tracks.len() {
                self.tracks.push(TrackResult::default());
            }
            if let Some(result) = self.tracks.get_mut(used) {
                result.fill(index, track, total, cpu_frequency);
            }
            used += 1;
        }
        self.tracks.truncate(used);
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    /// Find a block by identity across all tracks
    pub fn find_block(&self, name: &str) -> Option<&BlockResult> {
        self.tracks
            .iter()
            .flat_map(|t| t.blocks.iter())
            .find(|b| b.name == name)
    }

    /// Print the snapshot to stdout
    pub fn report(&self) {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        if let Err(e) = self.write_report(&mut out) {
            tracing::warn!("failed to write result report: {}", e);
        }
    }

    pub fn write_report<W: Write>(&self, w: &mut W) -> io::Result<()> {
        report::write_result(w, self)
    }
}
