//! blockprof - instrumentation block profiler
//!
//! Named code regions ("blocks") are timed with the CPU cycle counter and
//! grouped into tracks inside a profiler session. Each call site gets a
//! stable slot in a fixed-capacity table on first use, so recording a
//! block never allocates or locks. Sessions can be snapshotted, repeated
//! with statistics, reported as text, and exported as CSV or JSON.
//!
//! ```no_run
//! use blockprof::{active, profile_block, Profiler};
//!
//! let _active = active::activate(active::shared(Profiler::new("example")));
//! active::initialize().unwrap();
//! {
//!     profile_block!("sum", 0);
//!     let _total: u64 = (0..1000).sum();
//! }
//! active::end().unwrap();
//! active::report().unwrap();
//! ```

pub mod active;
pub mod aggregate;
pub mod block;
pub mod cli;
pub mod config;
pub mod csv_output;
pub mod error;
pub mod json_output;
pub mod name;
pub mod profiler;
pub mod repetition;
pub mod report;
pub mod results;
pub mod scoped;
pub mod surveyor;
pub mod timer;
pub mod track;

pub use active::{activate, set_profiler, SharedProfiler};
pub use aggregate::Statistic;
pub use block::{BlockHandle, BlockIdentity};
pub use config::ProfilerConfig;
pub use error::{ProfileError, Result};
pub use profiler::Profiler;
pub use repetition::{BestRun, RepetitionProfiler, RepetitionTest};
pub use results::{BlockResult, ProfilerResult, TrackResult};
pub use scoped::{CallSite, ScopedBlock};
pub use track::Track;
