//! RAII block guards, call sites and the instrumentation macros
//!
//! A [`CallSite`] is a `static` emitted by [`profile_block!`] or
//! [`profile_function!`]. It resolves its slot once and caches it together
//! with the epoch of the profiler it was resolved against, so the hot path
//! is an atomic load and a compare. The cache is refreshed whenever the
//! site runs against a different profiler or after the profiler was
//! cleared.

use crate::block::{BlockHandle, BlockIdentity};
use crate::config::{BLOCK_CAPACITY, TRACK_CAPACITY};
use crate::error::{ProfileError, Result};
use crate::profiler::Profiler;
use std::cell::RefCell;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};

const SLOT_BITS: u32 = 16;
const SLOT_MASK: u64 = (1 << SLOT_BITS) - 1;

#[derive(Debug)]
enum SiteName {
    Fixed(&'static str),
    /// Resolved lazily; only called on a cache miss
    Function(fn() -> &'static str),
}

/// One instrumentation site with its cached slot
#[derive(Debug)]
pub struct CallSite {
    file: &'static str,
    line: u32,
    name: SiteName,
    track: usize,
    /// `(epoch << 16) | slot`, 0 when unresolved. Epochs start at 1.
    cache: AtomicU64,
}

impl CallSite {
    pub const fn new(file: &'static str, line: u32, name: &'static str, track: usize) -> Self {
        CallSite {
            file,
            line,
            name: SiteName::Fixed(name),
            track,
            cache: AtomicU64::new(0),
        }
    }

    /// A site named after the enclosing function, see [`function_name_of`]
    pub const fn function(
        file: &'static str,
        line: u32,
        name: fn() -> &'static str,
        track: usize,
    ) -> Self {
        CallSite {
            file,
            line,
            name: SiteName::Function(name),
            track,
            cache: AtomicU64::new(0),
        }
    }

    pub fn track(&self) -> usize {
        self.track
    }

    pub fn name(&self) -> &'static str {
        match self.name {
            SiteName::Fixed(name) => name,
            SiteName::Function(name) => name(),
        }
    }

    pub fn identity(&self) -> BlockIdentity {
        BlockIdentity::new(self.file, self.line, self.name())
    }

    /// Handle of this site in `profiler`, resolving it on a cache miss
    #[inline]
    pub fn handle<const T: usize, const B: usize>(
        &self,
        profiler: &mut Profiler<T, B>,
    ) -> Result<BlockHandle> {
        let epoch = profiler.epoch();
        let cached = self.cache.load(Ordering::Relaxed);
        if cached != 0 && cached >> SLOT_BITS == epoch {
            return Ok(BlockHandle::new(self.track as u16, (cached & SLOT_MASK) as u16));
        }

        let handle = profiler.locate(self.track, self.identity())?;
        self.cache.store(
            (epoch << SLOT_BITS) | u64::from(handle.slot),
            Ordering::Relaxed,
        );
        Ok(handle)
    }
}

/// Path of the function enclosing a marker fn item, without the crate
/// name, e.g. `parser::parse_header`.
pub fn function_name_of<F>(_marker: F) -> &'static str {
    let full = std::any::type_name::<F>();
    let mut path = full.rsplit_once("::").map_or(full, |(parent, _)| parent);
    while let Some(outer) = path.strip_suffix("::{{closure}}") {
        path = outer;
    }
    path.split_once("::").map_or(path, |(_, rest)| rest)
}

/// Open block that closes when dropped, on every exit path
///
/// `P` is anything that derefs to the profiler cell: a plain
/// `&RefCell<Profiler>` or the shared `Rc` of the active profiler.
#[must_use = "the block closes as soon as the guard is dropped"]
pub struct ScopedBlock<P, const T: usize = TRACK_CAPACITY, const B: usize = BLOCK_CAPACITY>
where
    P: Deref<Target = RefCell<Profiler<T, B>>>,
{
    profiler: P,
    handle: BlockHandle,
}

impl<P, const T: usize, const B: usize> ScopedBlock<P, T, B>
where
    P: Deref<Target = RefCell<Profiler<T, B>>>,
{
    /// Open an already resolved block
    pub fn new(profiler: P, handle: BlockHandle, byte_count: u64) -> Result<Self> {
        profiler
            .try_borrow_mut()
            .map_err(|_| ProfileError::ProfilerBusy)?
            .open(handle, byte_count);
        Ok(ScopedBlock { profiler, handle })
    }

    /// Resolve `site` if needed, then open it
    pub fn at_site(profiler: P, site: &CallSite, byte_count: u64) -> Result<Self> {
        let handle = {
            let mut target = profiler
                .try_borrow_mut()
                .map_err(|_| ProfileError::ProfilerBusy)?;
            let handle = site.handle(&mut *target)?;
            target.open(handle, byte_count);
            handle
        };
        Ok(ScopedBlock { profiler, handle })
    }

    pub fn handle(&self) -> BlockHandle {
        self.handle
    }
}

impl<P, const T: usize, const B: usize> Drop for ScopedBlock<P, T, B>
where
    P: Deref<Target = RefCell<Profiler<T, B>>>,
{
    fn drop(&mut self) {
        match self.profiler.try_borrow_mut() {
            Ok(mut profiler) => {
                profiler.close(self.handle);
            }
            Err(_) => tracing::warn!(
                track = self.handle.track,
                slot = self.handle.slot,
                "profiler borrowed while closing block; timing lost"
            ),
        }
    }
}

/// Time the rest of the enclosing scope as block `name` of track `track`.
///
/// `name` must be a `&'static str` and `track` a constant index. An
/// optional third argument is the number of bytes processed, used for
/// bandwidth. Records into the thread's active profiler and does nothing
/// when none is set. Panics if the track's block table is full.
///
/// ```ignore
/// fn parse(buf: &[u8]) {
///     blockprof::profile_block!("parse", 0, buf.len());
///     // ...
/// }
/// ```
#[cfg(feature = "profiling")]
#[macro_export]
macro_rules! profile_block {
    ($name:expr, $track:expr) => {
        $crate::profile_block!($name, $track, 0);
    };
    ($name:expr, $track:expr, $bytes:expr) => {
        let _blockprof_block = {
            static SITE: $crate::scoped::CallSite =
                $crate::scoped::CallSite::new(file!(), line!(), $name, $track);
            $crate::active::open_site(&SITE, ($bytes) as u64)
        };
    };
}

#[cfg(not(feature = "profiling"))]
#[macro_export]
macro_rules! profile_block {
    ($name:expr, $track:expr $(, $bytes:expr)?) => {};
}

/// Like [`profile_block!`], named after the enclosing function
#[cfg(feature = "profiling")]
#[macro_export]
macro_rules! profile_function {
    ($track:expr) => {
        $crate::profile_function!($track, 0);
    };
    ($track:expr, $bytes:expr) => {
        let _blockprof_function = {
            fn __blockprof_marker() {}
            fn __blockprof_name() -> &'static str {
                $crate::scoped::function_name_of(__blockprof_marker)
            }
            static SITE: $crate::scoped::CallSite =
                $crate::scoped::CallSite::function(file!(), line!(), __blockprof_name, $track);
            $crate::active::open_site(&SITE, ($bytes) as u64)
        };
    };
}

#[cfg(not(feature = "profiling"))]
#[macro_export]
macro_rules! profile_function {
    ($track:expr $(, $bytes:expr)?) => {};
}

#[cfg(test)]
mod tests {
    use super::*;

    type Small = Profiler<2, 8>;

    static SITE_A: CallSite = CallSite::new("scoped.rs", 1, "a", 0);

    #[test]
    fn test_guard_closes_on_drop() {
        let cell = RefCell::new(Small::new("guard"));
        let handle = cell.borrow_mut().resolve(0, "scoped.rs", 10, "outer").unwrap();
        {
            let _guard = ScopedBlock::new(&cell, handle, 64).unwrap();
            let p = cell.borrow();
            let rec = p.track(0).unwrap().block(handle.slot_index()).unwrap();
            assert_eq!(rec.hit_count(), 1);
        }
        let p = cell.borrow();
        let rec = p.track(0).unwrap().block(handle.slot_index()).unwrap();
        assert_eq!(rec.processed_byte_count(), 64);
        assert_eq!(p.track(0).unwrap().elapsed(), rec.elapsed());
    }

    #[test]
    fn test_guard_closes_on_early_return() {
        fn work(cell: &RefCell<Small>, handle: BlockHandle, bail: bool) -> Option<()> {
            let _guard = ScopedBlock::new(cell, handle, 0).ok()?;
            if bail {
                return None;
            }
            Some(())
        }

        let cell = RefCell::new(Small::new("early"));
        let handle = cell.borrow_mut().resolve(0, "scoped.rs", 20, "work").unwrap();
        assert!(work(&cell, handle, true).is_none());
        assert!(work(&cell, handle, false).is_some());
        let p = cell.borrow();
        assert_eq!(p.track(0).unwrap().block(handle.slot_index()).unwrap().hit_count(), 2);
    }

    #[test]
    fn test_busy_profiler_is_error() {
        let cell = RefCell::new(Small::new("busy"));
        let handle = cell.borrow_mut().resolve(0, "scoped.rs", 30, "x").unwrap();
        let _held = cell.borrow();
        assert!(matches!(
            ScopedBlock::new(&cell, handle, 0),
            Err(ProfileError::ProfilerBusy)
        ));
    }

    #[test]
    fn test_site_cache_reused_until_clear() {
        let cell = RefCell::new(Small::new("cache"));
        let first = {
            let guard = ScopedBlock::at_site(&cell, &SITE_A, 0).unwrap();
            guard.handle()
        };
        let second = ScopedBlock::at_site(&cell, &SITE_A, 0).unwrap().handle();
        assert_eq!(first, second);
        assert_eq!(cell.borrow().track(0).unwrap().bound_block_count(), 1);

        cell.borrow_mut().clear();
        let third = ScopedBlock::at_site(&cell, &SITE_A, 0).unwrap().handle();
        assert_eq!(third, first);
        let p = cell.borrow();
        assert_eq!(p.track(0).unwrap().block(third.slot_index()).unwrap().hit_count(), 1);
    }

    #[test]
    fn test_site_across_profilers_never_double_binds() {
        static SITE: CallSite = CallSite::new("scoped.rs", 2, "shared", 1);
        let a = RefCell::new(Small::new("a"));
        let b = RefCell::new(Small::new("b"));
        for _ in 0..3 {
            drop(ScopedBlock::at_site(&a, &SITE, 0).unwrap());
            drop(ScopedBlock::at_site(&b, &SITE, 0).unwrap());
        }
        for cell in [&a, &b] {
            let p = cell.borrow();
            assert_eq!(p.track(1).unwrap().bound_block_count(), 1);
            let (_, rec) = p.track(1).unwrap().hit_blocks().next().unwrap();
            assert_eq!(rec.hit_count(), 3);
        }
    }

    #[test]
    fn test_function_name_strips_marker_and_crate() {
        fn marker() {}
        let name = function_name_of(marker);
        assert!(name.ends_with("test_function_name_strips_marker_and_crate"));
        assert!(!name.starts_with("blockprof::"));
        assert!(!name.ends_with("::marker"));
    }
}
