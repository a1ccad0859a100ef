//! Profiler session: a fixed set of tracks and a measurement window
//!
//! The profiler owns `T` tracks of `B` slots each. Only tracks that have
//! been used are ever reset, cleared, reported or exported.

use crate::block::{BlockHandle, BlockIdentity};
use crate::config::{ProfilerConfig, BLOCK_CAPACITY, PROFILER_NAME_LEN, TRACK_CAPACITY};
use crate::csv_output;
use crate::error::{ProfileError, Result};
use crate::name::FixedName;
use crate::report;
use crate::results::ProfilerResult;
use crate::surveyor;
use crate::timer;
use crate::track::Track;
use std::fmt;
use std::io::{self, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

/// Source of process-unique profiler epochs; 0 is never handed out
static NEXT_EPOCH: AtomicU64 = AtomicU64::new(1);

fn next_epoch() -> u64 {
    NEXT_EPOCH.fetch_add(1, Ordering::Relaxed)
}

/// A profiling session over `T` tracks of `B` block slots
pub struct Profiler<const T: usize = TRACK_CAPACITY, const B: usize = BLOCK_CAPACITY> {
    name: FixedName<PROFILER_NAME_LEN>,
    start: u64,
    elapsed: u64,
    named_tracks: usize,
    tracks: Box<[Track<B>]>,
    epoch: u64,
    config: ProfilerConfig,
}

impl<const T: usize, const B: usize> Profiler<T, B> {
    const HANDLE_FITS: () = assert!(
        T <= u16::MAX as usize && B <= u16::MAX as usize && T > 0 && B > 0,
        "track and block capacities must be in 1..=65535"
    );

    /// Create a profiler with the default configuration
    pub fn new(name: &str) -> Self {
        Self::with_config(name, ProfilerConfig::default())
    }

    pub fn with_config(name: &str, config: ProfilerConfig) -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::HANDLE_FITS;
        Profiler {
            name: FixedName::new(name),
            start: 0,
            elapsed: 0,
            named_tracks: 0,
            tracks: (0..T).map(|_| Track::new()).collect(),
            epoch: next_epoch(),
            config,
        }
    }

    pub const fn track_capacity() -> usize {
        T
    }

    pub const fn block_capacity() -> usize {
        B
    }

    pub fn config(&self) -> &ProfilerConfig {
        &self.config
    }

    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    pub(crate) fn fixed_name(&self) -> &FixedName<PROFILER_NAME_LEN> {
        &self.name
    }

    /// Rename the profiler; returns `true` if the name was truncated
    pub fn set_name(&mut self, name: &str) -> bool {
        self.name.set(name)
    }

    /// Rename from format arguments; returns `true` if truncated
    pub fn set_name_fmt(&mut self, args: fmt::Arguments<'_>) -> bool {
        self.name.set_fmt(args)
    }

    /// Identifies this profiler's current set of slot bindings. Changes on
    /// every clear, and differs between profiler instances.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Name the next unnamed track and return its index
    pub fn add_track(&mut self, name: &str) -> Result<usize> {
        if self.named_tracks >= T {
            tracing::warn!(
                track = name,
                capacity = T,
                "track could not be added: profiler reached its track capacity"
            );
            return Err(ProfileError::TrackCapacityExceeded {
                name: name.to_string(),
                capacity: T,
            });
        }
        let index = self.named_tracks;
        self.track_mut(index)?.set_name(name);
        self.named_tracks += 1;
        Ok(index)
    }

    /// Name the track at `index`; `Ok(true)` means the name was truncated
    pub fn set_track_name(&mut self, index: usize, name: &str) -> Result<bool> {
        let truncated = self.track_mut(index)?.set_name(name);
        self.named_tracks = self.named_tracks.max(index + 1);
        Ok(truncated)
    }

    pub fn set_track_name_fmt(&mut self, index: usize, args: fmt::Arguments<'_>) -> Result<bool> {
        let truncated = self.track_mut(index)?.set_name_fmt(args);
        self.named_tracks = self.named_tracks.max(index + 1);
        Ok(truncated)
    }

    pub fn track(&self, index: usize) -> Option<&Track<B>> {
        self.tracks.get(index)
    }

    fn track_mut(&mut self, index: usize) -> Result<&mut Track<B>> {
        self.tracks
            .get_mut(index)
            .ok_or(ProfileError::TrackOutOfRange { index, capacity: T })
    }

    pub fn tracks(&self) -> &[Track<B>] {
        &self.tracks
    }

    /// Tracks with at least one block, with their index
    pub fn used_tracks(&self) -> impl Iterator<Item = (usize, &Track<B>)> {
        self.tracks
            .iter()
            .enumerate()
            .filter(|(_, track)| track.has_block())
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    /// Ticks between [`Profiler::initialize`] and [`Profiler::end`]
    pub fn elapsed(&self) -> u64 {
        self.elapsed
    }

    /// Open the measurement window
    pub fn initialize(&mut self) {
        self.start = timer::read_cpu_timer();
    }

    /// Close the measurement window
    pub fn end(&mut self) {
        self.elapsed = timer::read_cpu_timer().saturating_sub(self.start);
    }

    /// Bind a call site to a slot of track `track`.
    ///
    /// Call once per distinct site and cache the handle. Fails with
    /// [`ProfileError::TableExhausted`] when the track has no free slot.
    pub fn resolve(
        &mut self,
        track: usize,
        file: &'static str,
        line: u32,
        name: &'static str,
    ) -> Result<BlockHandle> {
        self.bind(track, BlockIdentity::new(file, line, name), false)
    }

    /// Find the slot bound to `identity`, binding a free one if none is.
    pub fn locate(&mut self, track: usize, identity: BlockIdentity) -> Result<BlockHandle> {
        self.bind(track, identity, true)
    }

    fn bind(&mut self, track: usize, identity: BlockIdentity, lookup: bool) -> Result<BlockHandle> {
        let target = self.track_mut(track)?;
        let slot = if lookup {
            target.locate(identity)
        } else {
            target.resolve(identity)
        };
        let slot = slot.ok_or(ProfileError::TableExhausted { track, capacity: B })?;
        if target.name().is_empty() {
            target.set_name_fmt(format_args!("Track {}", track));
        }
        tracing::trace!(track, slot, file = identity.file, line = identity.line, "bound block");
        // Capacities are checked against u16 at construction
        Ok(BlockHandle::new(track as u16, slot as u16))
    }

    #[inline]
    fn page_faults(&self) -> u64 {
        if self.config.track_page_faults {
            surveyor::read_page_fault_count()
        } else {
            0
        }
    }

    /// Open a bound block. Hot path: no allocation, no locking.
    #[inline]
    pub fn open(&mut self, handle: BlockHandle, byte_count: u64) {
        let page_faults = self.page_faults();
        if let Some(track) = self.tracks.get_mut(handle.track_index()) {
            track.open(handle.slot_index(), timer::read_cpu_timer(), page_faults, byte_count);
        }
    }

    /// Close a bound block; returns the ticks it added
    #[inline]
    pub fn close(&mut self, handle: BlockHandle) -> u64 {
        let now = timer::read_cpu_timer();
        let page_faults = self.page_faults();
        match self.tracks.get_mut(handle.track_index()) {
            Some(track) => track.close(handle.slot_index(), now, page_faults),
            None => 0,
        }
    }

    fn checked_handle(&self, track: usize, slot: usize) -> Result<BlockHandle> {
        if track >= T {
            return Err(ProfileError::TrackOutOfRange { index: track, capacity: T });
        }
        if slot >= B {
            return Err(ProfileError::SlotOutOfRange { index: slot, capacity: B });
        }
        Ok(BlockHandle::new(track as u16, slot as u16))
    }

    /// Index-checked [`Profiler::open`]
    pub fn open_block(&mut self, track: usize, slot: usize, byte_count: u64) -> Result<()> {
        let handle = self.checked_handle(track, slot)?;
        self.open(handle, byte_count);
        Ok(())
    }

    /// Index-checked [`Profiler::close`]
    pub fn close_block(&mut self, track: usize, slot: usize) -> Result<u64> {
        let handle = self.checked_handle(track, slot)?;
        Ok(self.close(handle))
    }

    /// Zero the counters of every used track, keeping block identities
    pub fn reset_tracks(&mut self) {
        for track in self.tracks.iter_mut().filter(|t| t.has_block()) {
            track.reset();
        }
    }

    /// Reset tracks and the profiler window
    pub fn reset(&mut self) {
        self.reset_tracks();
        self.start = 0;
        self.elapsed = 0;
    }

    /// Forget every block of every used track
    pub fn clear_tracks(&mut self) {
        for track in self.tracks.iter_mut().filter(|t| t.has_block()) {
            track.clear();
        }
        // Cached call-site slots point at forgotten bindings now
        self.epoch = next_epoch();
    }

    /// Clear tracks and the profiler window
    pub fn clear(&mut self) {
        self.clear_tracks();
        self.start = 0;
        self.elapsed = 0;
    }

    /// Take a packed snapshot of the current counters
    pub fn capture(&self) -> ProfilerResult {
        ProfilerResult::from_profiler(self)
    }

    /// Print the report to stdout
    pub fn report(&self) {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        if let Err(e) = self.write_report(&mut out) {
            tracing::warn!("failed to write profiler report: {}", e);
        }
    }

    /// Write CPU frequency, session time and every used track
    pub fn write_report<W: Write>(&self, w: &mut W) -> io::Result<()> {
        if !cfg!(feature = "profiling") {
            return report::write_disabled(w);
        }
        let cpu_frequency = timer::calibrated_cpu_frequency(self.config.calibration_ms);
        report::write_profiler_header(
            w,
            self.name(),
            cpu_frequency,
            timer::ticks_to_seconds(self.elapsed, cpu_frequency),
        )?;
        for (_, track) in self.used_tracks() {
            track.write_report(w, self.elapsed, cpu_frequency)?;
        }
        Ok(())
    }

    /// Write a CSV snapshot to `path`. The parent directory must exist.
    pub fn export_csv(&self, path: impl AsRef<Path>) -> Result<()> {
        csv_output::export_csv(path.as_ref(), &self.capture())
    }
}

impl<const T: usize, const B: usize> fmt::Debug for Profiler<T, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Profiler")
            .field("name", &self.name)
            .field("elapsed", &self.elapsed)
            .field("epoch", &self.epoch)
            .field("used_tracks", &self.used_tracks().count())
            .field("config", &self.config)
            .finish()
    }
}
