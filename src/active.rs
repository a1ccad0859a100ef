//! The per-thread active profiler
//!
//! Instrumentation macros record into whichever profiler is active on the
//! current thread. The profiler is shared as `Rc<RefCell<_>>`, so a handle
//! cannot cross threads; each thread activates its own.
//!
//! The free functions at the bottom are a flat, index-based surface over
//! the active profiler for callers that cannot use the macros (FFI glue,
//! scripted drivers).

use crate::block::BlockHandle;
use crate::error::{ProfileError, Result};
use crate::profiler::Profiler;
use crate::scoped::{CallSite, ScopedBlock};
use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

/// Profiler shared between the thread-local slot and open block guards
pub type SharedProfiler = Rc<RefCell<Profiler>>;

thread_local! {
    static ACTIVE: RefCell<Option<SharedProfiler>> = const { RefCell::new(None) };
}

/// Wrap a profiler for sharing
pub fn shared(profiler: Profiler) -> SharedProfiler {
    Rc::new(RefCell::new(profiler))
}

/// Install `profiler` as this thread's active profiler (or none) and
/// return the one it replaces
pub fn set_profiler(profiler: Option<SharedProfiler>) -> Option<SharedProfiler> {
    ACTIVE.with(|active| active.replace(profiler))
}

/// This thread's active profiler
pub fn profiler() -> Option<SharedProfiler> {
    ACTIVE.with(|active| active.borrow().clone())
}

/// Restores the previously active profiler when dropped
#[must_use = "the profiler is deactivated as soon as the guard is dropped"]
#[derive(Debug)]
pub struct ActiveGuard {
    previous: Option<SharedProfiler>,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        set_profiler(self.previous.take());
    }
}

/// Make `profiler` active until the returned guard drops
pub fn activate(profiler: SharedProfiler) -> ActiveGuard {
    ActiveGuard {
        previous: set_profiler(Some(profiler)),
    }
}

/// Run `f` on the active profiler
pub fn with_profiler<R>(f: impl FnOnce(&mut Profiler) -> R) -> Result<R> {
    let shared = profiler().ok_or(ProfileError::NoActiveProfiler)?;
    let mut target = shared
        .try_borrow_mut()
        .map_err(|_| ProfileError::ProfilerBusy)?;
    Ok(f(&mut target))
}

/// Open `site` in the active profiler. Backs the instrumentation macros.
///
/// Returns `None` when no profiler is active or it is busy.
///
/// # Panics
///
/// When the site cannot be bound: its track's table is full or its track
/// index is out of range. Both are build configuration errors.
pub fn open_site(site: &'static CallSite, byte_count: u64) -> Option<ScopedBlock<SharedProfiler>> {
    let shared = profiler()?;
    match ScopedBlock::at_site(shared, site, byte_count) {
        Ok(guard) => Some(guard),
        Err(ProfileError::ProfilerBusy) => {
            tracing::warn!(
                block = site.name(),
                "active profiler busy; block not recorded"
            );
            None
        }
        Err(e) => panic!("cannot bind block \"{}\": {}", site.name(), e),
    }
}

/// Bind a call site in the active profiler, see [`Profiler::resolve`]
pub fn resolve(
    track: usize,
    file: &'static str,
    line: u32,
    name: &'static str,
) -> Result<BlockHandle> {
    with_profiler(|p| p.resolve(track, file, line, name))?
}

pub fn open_block(track: usize, slot: usize, byte_count: u64) -> Result<()> {
    with_profiler(|p| p.open_block(track, slot, byte_count))?
}

pub fn close_block(track: usize, slot: usize) -> Result<u64> {
    with_profiler(|p| p.close_block(track, slot))?
}

pub fn add_track(name: &str) -> Result<usize> {
    with_profiler(|p| p.add_track(name))?
}

pub fn initialize() -> Result<()> {
    with_profiler(|p| p.initialize())
}

pub fn end() -> Result<()> {
    with_profiler(|p| p.end())
}

pub fn reset() -> Result<()> {
    with_profiler(|p| p.reset())
}

pub fn clear() -> Result<()> {
    with_profiler(|p| p.clear())
}

pub fn report() -> Result<()> {
    with_profiler(|p| p.report())
}

pub fn export_csv(path: impl AsRef<Path>) -> Result<()> {
    with_profiler(|p| p.export_csv(path))?
}
