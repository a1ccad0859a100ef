//! Tracks: one fixed-capacity block table per logical phase or thread
//!
//! Slots are assigned by open addressing on the call site's hash. Each site
//! resolves once and caches its slot, so resolution never compares
//! identities: an occupied slot always belongs to another site and the
//! first empty slot is the right one.

use crate::block::{BlockIdentity, BlockRecorder};
use crate::config::{BLOCK_CAPACITY, TRACK_NAME_LEN};
use crate::name::FixedName;
use crate::report;
use crate::results::BlockResult;
use crate::timer;
use std::fmt;
use std::io::{self, Write};

/// Fixed table of `B` block recorders plus track-level timing
#[derive(Clone)]
pub struct Track<const B: usize = BLOCK_CAPACITY> {
    name: FixedName<TRACK_NAME_LEN>,
    start: u64,
    elapsed: u64,
    has_block: bool,
    blocks: Box<[BlockRecorder]>,
}

impl<const B: usize> Track<B> {
    /// Create an unnamed track with `B` empty slots
    pub fn new() -> Self {
        Track {
            name: FixedName::empty(),
            start: 0,
            elapsed: 0,
            has_block: false,
            blocks: vec![BlockRecorder::EMPTY; B].into_boxed_slice(),
        }
    }

    pub const fn capacity() -> usize {
        B
    }

    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    pub(crate) fn fixed_name(&self) -> &FixedName<TRACK_NAME_LEN> {
        &self.name
    }

    /// Set the track name; returns `true` if it was truncated
    pub fn set_name(&mut self, name: &str) -> bool {
        self.name.set(name)
    }

    /// Set the track name from format arguments; returns `true` if truncated
    pub fn set_name_fmt(&mut self, args: fmt::Arguments<'_>) -> bool {
        self.name.set_fmt(args)
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    /// Cumulative ticks: closed block time, or the initialize/end window
    pub fn elapsed(&self) -> u64 {
        self.elapsed
    }

    /// `true` once any slot has been bound or opened
    pub fn has_block(&self) -> bool {
        self.has_block
    }

    pub fn block(&self, slot: usize) -> Option<&BlockRecorder> {
        self.blocks.get(slot)
    }

    /// Slots that were hit at least once, with their slot index
    pub fn hit_blocks(&self) -> impl Iterator<Item = (usize, &BlockRecorder)> {
        self.blocks
            .iter()
            .enumerate()
            .filter(|(_, rec)| rec.hit_count() > 0)
    }

    /// Number of slots bound to an identity
    pub fn bound_block_count(&self) -> usize {
        self.blocks.iter().filter(|rec| rec.is_bound()).count()
    }

    /// Record the track start time
    pub fn initialize(&mut self) {
        self.start = timer::read_cpu_timer();
    }

    /// Set `elapsed` to the time since [`Track::initialize`]
    pub fn end(&mut self) {
        self.elapsed = timer::read_cpu_timer().saturating_sub(self.start);
    }

    /// Bind `identity` to the first free slot starting at its home slot.
    ///
    /// Must be called once per call site. Returns `None` when every slot is
    /// taken.
    pub fn resolve(&mut self, identity: BlockIdentity) -> Option<usize> {
        let home = identity.home_slot(B);
        for probe in 0..B {
            let slot = (home + probe) % B;
            let rec = self.blocks.get_mut(slot)?;
            if !rec.is_bound() {
                rec.bind(identity);
                self.has_block = true;
                return Some(slot);
            }
        }
        None
    }

    /// Like [`Track::resolve`] but returns the existing slot when
    /// `identity` is already bound. Used when a call site's cached slot is
    /// stale, so repeated calls never bind a site twice.
    pub fn locate(&mut self, identity: BlockIdentity) -> Option<usize> {
        let home = identity.home_slot(B);
        for probe in 0..B {
            let slot = (home + probe) % B;
            let rec = self.blocks.get_mut(slot)?;
            match rec.identity() {
                Some(bound) if *bound == identity => return Some(slot),
                Some(_) => continue,
                None => {
                    rec.bind(identity);
                    self.has_block = true;
                    return Some(slot);
                }
            }
        }
        None
    }

    /// Open the block in `slot` at counter value `now`
    #[inline]
    pub fn open(&mut self, slot: usize, now: u64, page_faults: u64, byte_count: u64) {
        if let Some(rec) = self.blocks.get_mut(slot) {
            rec.open(now, page_faults, byte_count);
            self.has_block = true;
        }
    }

    /// Close the block in `slot`; returns the ticks it added
    #[inline]
    pub fn close(&mut self, slot: usize, now: u64, page_faults: u64) -> u64 {
        match self.blocks.get_mut(slot) {
            Some(rec) => {
                let increment = rec.close(now, page_faults);
                self.elapsed += increment;
                increment
            }
            None => 0,
        }
    }

    /// Zero every block's counters, keeping identities
    pub fn reset_timings(&mut self) {
        for rec in self.blocks.iter_mut() {
            rec.reset();
        }
    }

    /// Zero block counters and track timing, keeping identities
    pub fn reset(&mut self) {
        self.reset_timings();
        self.start = 0;
        self.elapsed = 0;
    }

    /// Forget every block, as if no site had ever resolved here
    pub fn clear_timings(&mut self) {
        for rec in self.blocks.iter_mut() {
            rec.clear();
        }
        self.has_block = false;
    }

    /// Forget blocks and track timing; the name is kept
    pub fn clear(&mut self) {
        self.clear_timings();
        self.start = 0;
        self.elapsed = 0;
    }

    /// Print this track's blocks to stdout
    pub fn report(&self, total_elapsed_reference: u64) {
        let cpu_frequency = timer::estimated_cpu_frequency();
        let stdout = io::stdout();
        let mut out = stdout.lock();
        if let Err(e) = self.write_report(&mut out, total_elapsed_reference, cpu_frequency) {
            tracing::warn!("failed to write track report: {}", e);
        }
    }

    /// Write this track's blocks: hits, ticks, share of track and total,
    /// bandwidth and page faults where recorded
    pub fn write_report<W: Write>(
        &self,
        w: &mut W,
        total_elapsed_reference: u64,
        cpu_frequency: u64,
    ) -> io::Result<()> {
        report::write_track_header(
            w,
            self.name(),
            timer::ticks_to_seconds(self.elapsed, cpu_frequency),
            report::ratio(self.elapsed, total_elapsed_reference),
        )?;
        for (slot, rec) in self.hit_blocks() {
            let block = BlockResult::from_recorder(
                slot,
                rec,
                self.elapsed,
                total_elapsed_reference,
                cpu_frequency,
            );
            report::write_block_line(w, &block)?;
        }
        Ok(())
    }
}

impl<const B: usize> Default for Track<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const B: usize> fmt::Debug for Track<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Track")
            .field("name", &self.name)
            .field("capacity", &B)
            .field("elapsed", &self.elapsed)
            .field("has_block", &self.has_block)
            .field("bound_blocks", &self.bound_block_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(line: u32) -> BlockIdentity {
        BlockIdentity::new("src/track.rs", line, "block")
    }

    #[test]
    fn test_new_track_is_empty() {
        let track = Track::<16>::new();
        assert!(!track.has_block());
        assert_eq!(track.bound_block_count(), 0);
        assert_eq!(Track::<16>::capacity(), 16);
    }

    #[test]
    fn test_resolve_binds_home_slot() {
        let mut track = Track::<16>::new();
        let identity = id(10);
        let slot = track.resolve(identity).unwrap();
        assert_eq!(slot, identity.home_slot(16));
        assert!(track.has_block());
        assert_eq!(track.block(slot).unwrap().identity(), Some(&identity));
    }

    #[test]
    fn test_resolve_new_site_never_reuses_bound_slot() {
        let mut track = Track::<8>::new();
        let mut slots = Vec::new();
        for line in 0..8 {
            slots.push(track.resolve(id(line)).unwrap());
        }
        slots.sort_unstable();
        slots.dedup();
        assert_eq!(slots.len(), 8);
    }

    #[test]
    fn test_resolve_exhausted_table_returns_none() {
        let mut track = Track::<4>::new();
        for line in 0..4 {
            assert!(track.resolve(id(line)).is_some());
        }
        assert_eq!(track.resolve(id(99)), None);
    }

    #[test]
    fn test_locate_returns_existing_slot() {
        let mut track = Track::<8>::new();
        let first = track.locate(id(1)).unwrap();
        track.resolve(id(2)).unwrap();
        assert_eq!(track.locate(id(1)), Some(first));
        assert_eq!(track.bound_block_count(), 2);
    }

    #[test]
    fn test_open_close_accumulates_track_elapsed() {
        let mut track = Track::<8>::new();
        let slot = track.resolve(id(1)).unwrap();
        track.open(slot, 100, 0, 64);
        assert_eq!(track.close(slot, 160, 0), 60);
        track.open(slot, 200, 0, 64);
        track.close(slot, 210, 0);
        assert_eq!(track.elapsed(), 70);
        let rec = track.block(slot).unwrap();
        assert_eq!(rec.hit_count(), 2);
        assert_eq!(rec.processed_byte_count(), 128);
    }

    #[test]
    fn test_out_of_range_slot_is_ignored() {
        let mut track = Track::<4>::new();
        track.open(10, 1, 0, 0);
        assert_eq!(track.close(10, 5, 0), 0);
        assert!(!track.has_block());
    }

    #[test]
    fn test_reset_keeps_identities() {
        let mut track = Track::<8>::new();
        let slot = track.resolve(id(3)).unwrap();
        track.open(slot, 0, 0, 10);
        track.close(slot, 10, 0);

        track.reset();
        assert!(track.has_block());
        assert_eq!(track.elapsed(), 0);
        assert_eq!(track.block(slot).unwrap().hit_count(), 0);
        assert_eq!(track.locate(id(3)), Some(slot));
    }

    #[test]
    fn test_clear_forgets_identities() {
        let mut track = Track::<8>::new();
        track.set_name("Main");
        let slot = track.resolve(id(3)).unwrap();
        track.open(slot, 0, 0, 10);
        track.close(slot, 10, 0);

        track.clear();
        assert!(!track.has_block());
        assert!(!track.block(slot).unwrap().is_bound());
        assert_eq!(track.name(), "Main");
    }

    #[test]
    fn test_initialize_end_window() {
        let mut track = Track::<4>::new();
        track.initialize();
        std::thread::sleep(std::time::Duration::from_millis(1));
        track.end();
        assert!(track.elapsed() > 0);
    }

    #[test]
    fn test_write_report_lists_hit_blocks() {
        let mut track = Track::<8>::new();
        track.set_name("Main");
        let slot = track.resolve(BlockIdentity::new("a.rs", 1, "fill")).unwrap();
        track.resolve(BlockIdentity::new("a.rs", 2, "never_hit")).unwrap();
        track.open(slot, 0, 0, 1000);
        track.close(slot, 1_000_000, 0);

        let mut out = Vec::new();
        track.write_report(&mut out, 2_000_000, 1_000_000_000).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Main"));
        assert!(text.contains("fill[1]"));
        assert!(!text.contains("never_hit"));
    }
}
