//! Block identities, recorders and the slot hash
//!
//! A block is one instrumented call site. Its identity is fixed at compile
//! time (file, line, name); its recorder accumulates timings in a slot of
//! a track table.

use serde::Serialize;

/// Compile-time fingerprint of one instrumentation call site
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct BlockIdentity {
    pub file: &'static str,
    pub line: u32,
    pub name: &'static str,
}

impl BlockIdentity {
    pub const fn new(file: &'static str, line: u32, name: &'static str) -> Self {
        BlockIdentity { file, line, name }
    }

    /// Starting slot of this identity in a table of `capacity` slots
    #[inline]
    pub fn home_slot(&self, capacity: usize) -> usize {
        (block_hash(self.file, self.line) % capacity as u64) as usize
    }
}

/// Position of a bound block: track index and slot index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockHandle {
    pub track: u16,
    pub slot: u16,
}

impl BlockHandle {
    pub const fn new(track: u16, slot: u16) -> Self {
        BlockHandle { track, slot }
    }

    #[inline]
    pub fn track_index(&self) -> usize {
        usize::from(self.track)
    }

    #[inline]
    pub fn slot_index(&self) -> usize {
        usize::from(self.slot)
    }
}

/// Multiply-xor-shift hash of a call site's file and line.
///
/// Any well-distributed 64-bit hash would do; nothing persists these values.
pub fn block_hash(file: &str, line: u32) -> u64 {
    const CHAR_MULTIPLIER: u64 = 65599;
    const MIX_MULTIPLIER: u64 = 73244475;

    let mut res = u64::from(line);
    for byte in file.bytes() {
        res = res.wrapping_mul(CHAR_MULTIPLIER).wrapping_add(u64::from(byte));
    }
    res = ((res << 16) ^ (res >> 16)).wrapping_mul(MIX_MULTIPLIER);
    res = ((res << 16) ^ (res >> 16)).wrapping_mul(MIX_MULTIPLIER);
    (res << 16) ^ (res >> 16)
}

/// Accumulated statistics of one block slot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockRecorder {
    identity: Option<BlockIdentity>,
    start: u64,
    /// Opens not yet matched by a close. Reset and clear drop them, so a
    /// guard that outlives a reset closes to 0.
    open_depth: u32,
    elapsed: u64,
    hit_count: u64,
    processed_byte_count: u64,
    page_fault_count_start: u64,
    page_fault_count_total: u64,
}

impl BlockRecorder {
    /// An unbound slot
    pub const EMPTY: BlockRecorder = BlockRecorder {
        identity: None,
        start: 0,
        open_depth: 0,
        elapsed: 0,
        hit_count: 0,
        processed_byte_count: 0,
        page_fault_count_start: 0,
        page_fault_count_total: 0,
    };

    pub fn identity(&self) -> Option<&BlockIdentity> {
        self.identity.as_ref()
    }

    pub fn is_bound(&self) -> bool {
        self.identity.is_some()
    }

    pub fn elapsed(&self) -> u64 {
        self.elapsed
    }

    pub fn hit_count(&self) -> u64 {
        self.hit_count
    }

    pub fn processed_byte_count(&self) -> u64 {
        self.processed_byte_count
    }

    pub fn page_fault_count(&self) -> u64 {
        self.page_fault_count_total
    }

    pub(crate) fn bind(&mut self, identity: BlockIdentity) {
        self.identity = Some(identity);
    }

    /// Start a measurement at counter value `now`
    #[inline]
    pub fn open(&mut self, now: u64, page_faults: u64, byte_count: u64) {
        self.start = now;
        self.open_depth = self.open_depth.saturating_add(1);
        self.page_fault_count_start = page_faults;
        self.hit_count += 1;
        self.processed_byte_count += byte_count;
    }

    /// Finish the measurement; returns the ticks added to `elapsed`.
    ///
    /// A close without a matching open (the slot was reset or cleared in
    /// between) adds nothing.
    #[inline]
    pub fn close(&mut self, now: u64, page_faults: u64) -> u64 {
        if self.open_depth == 0 {
            return 0;
        }
        self.open_depth -= 1;
        let increment = now.saturating_sub(self.start);
        self.elapsed += increment;
        self.page_fault_count_total += page_faults.saturating_sub(self.page_fault_count_start);
        increment
    }

    /// Zero the counters, keep the identity
    pub fn reset(&mut self) {
        *self = BlockRecorder {
            identity: self.identity,
            ..Self::EMPTY
        };
    }

    /// Forget everything, including the identity
    pub fn clear(&mut self) {
        *self = Self::EMPTY;
    }
}
