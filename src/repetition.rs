//! Repetition drivers: fixed-count runs with statistics, and best-of search
//!
//! Both drivers activate their profiler on the current thread for the
//! duration of the run, so instrumentation macros inside the tested code
//! record into it. Snapshots are captured into reused buffers.

use crate::active::{self, SharedProfiler};
use crate::aggregate::Statistic;
use crate::csv_output::{self, RepetitionSummary};
use crate::error::{ProfileError, Result};
use crate::json_output::JsonRepetitionOutput;
use crate::profiler::Profiler;
use crate::report;
use crate::results::ProfilerResult;
use serde::Serialize;
use std::cell::RefMut;
use std::fmt;
use std::io::{self, Write};
use std::path::Path;
use std::time::{Duration, Instant};

fn borrow(profiler: &SharedProfiler) -> Result<RefMut<'_, Profiler>> {
    profiler
        .try_borrow_mut()
        .map_err(|_| ProfileError::ProfilerBusy)
}

/// `None` is a deadline that never passes
fn passed(now: Instant, deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|deadline| now >= deadline)
}

/// A named zero-argument test for best-of search
pub struct RepetitionTest<'a> {
    name: String,
    run: Box<dyn FnMut() + 'a>,
}

impl<'a> RepetitionTest<'a> {
    pub fn new(name: impl Into<String>, run: impl FnMut() + 'a) -> Self {
        RepetitionTest {
            name: name.into(),
            run: Box::new(run),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for RepetitionTest<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepetitionTest").field("name", &self.name).finish()
    }
}

/// Outcome of best-of search for one test
#[derive(Debug, Clone, Serialize)]
pub struct BestRun {
    pub name: String,
    /// Snapshot of the run with the lowest total elapsed time
    pub best: ProfilerResult,
    pub run_count: u64,
    /// How many times a new best was found, counting the first run
    pub improvements: u64,
}

/// Drives repeated runs of instrumented code against one profiler
#[derive(Debug)]
pub struct RepetitionProfiler {
    profiler: SharedProfiler,
    repetitions: Vec<ProfilerResult>,
    repetition_count: usize,
    average: ProfilerResult,
    variance: ProfilerResult,
    min: ProfilerResult,
    max: ProfilerResult,
    best_runs: Vec<BestRun>,
}

impl RepetitionProfiler {
    pub fn new(profiler: SharedProfiler) -> Self {
        RepetitionProfiler {
            profiler,
            repetitions: Vec::new(),
            repetition_count: 0,
            average: ProfilerResult::new(),
            variance: ProfilerResult::new(),
            min: ProfilerResult::new(),
            max: ProfilerResult::new(),
            best_runs: Vec::new(),
        }
    }

    /// Preallocate snapshot storage for `count` repetitions
    pub fn with_repetition_results(mut self, count: usize) -> Self {
        self.reserve_repetitions(count);
        self
    }

    fn reserve_repetitions(&mut self, count: usize) {
        if self.repetitions.len() < count {
            self.repetitions.resize_with(count, ProfilerResult::new);
        }
    }

    pub fn profiler(&self) -> &SharedProfiler {
        &self.profiler
    }

    /// Run `test` `count` times, snapshot every run and compute statistics.
    ///
    /// Tracks are reset (not cleared) between runs so block bindings
    /// survive.
    pub fn fixed_count_repetition_testing(
        &mut self,
        count: usize,
        mut test: impl FnMut(),
    ) -> Result<()> {
        self.reserve_repetitions(count);
        let _active = active::activate(self.profiler.clone());
        borrow(&self.profiler)?.reset_tracks();

        for index in 0..count {
            borrow(&self.profiler)?.initialize();
            test();
            let mut profiler = borrow(&self.profiler)?;
            profiler.end();
            if let Some(slot) = self.repetitions.get_mut(index) {
                slot.capture(&*profiler);
            }
            profiler.reset_tracks();
        }

        self.repetition_count = count;
        tracing::debug!(repetitions = count, "fixed-count repetition testing finished");
        self.compute_statistics();
        Ok(())
    }

    /// Recompute average, variance, min and max over the captured runs
    pub fn compute_statistics(&mut self) {
        let runs = &self.repetitions[..self.repetition_count.min(self.repetitions.len())];
        self.average.aggregate_from(runs, Statistic::Average, None);
        self.variance
            .aggregate_from(runs, Statistic::Variance, Some(&self.average));
        self.min.aggregate_from(runs, Statistic::Min, None);
        self.max.aggregate_from(runs, Statistic::Max, None);
    }

    /// Run each test back to back and keep its fastest run.
    ///
    /// A test keeps running until `per_test` passes without a new best, or
    /// the global budget runs out. The global deadline is
    /// `start + max(global, per_test)`; once it passes, remaining tests run
    /// exactly once. A budget too large to add to the clock (for example
    /// `Duration::MAX`) means no deadline. Spins, never sleeps.
    pub fn best_of_repetition_testing(
        &mut self,
        tests: &mut [RepetitionTest<'_>],
        per_test: Duration,
        global: Duration,
    ) -> Result<&[BestRun]> {
        let _active = active::activate(self.profiler.clone());
        self.best_runs.clear();

        let start = Instant::now();
        let global_deadline = start.checked_add(per_test.max(global));
        let mut current = ProfilerResult::new();

        for test in tests.iter_mut() {
            let mut run = BestRun {
                name: test.name.clone(),
                best: ProfilerResult::new(),
                run_count: 0,
                improvements: 0,
            };
            let mut best_elapsed = u64::MAX;
            let mut deadline = Instant::now().checked_add(per_test);

            loop {
                {
                    let mut profiler = borrow(&self.profiler)?;
                    profiler.reset_tracks();
                    profiler.initialize();
                }
                (test.run)();
                {
                    let mut profiler = borrow(&self.profiler)?;
                    profiler.end();
                    current.capture(&*profiler);
                }
                run.run_count += 1;

                let now = Instant::now();
                if current.elapsed < best_elapsed {
                    best_elapsed = current.elapsed;
                    std::mem::swap(&mut run.best, &mut current);
                    run.improvements += 1;
                    deadline = now.checked_add(per_test);
                    tracing::debug!(
                        test = %run.name,
                        run = run.run_count,
                        elapsed = best_elapsed,
                        "new best"
                    );
                }
                if passed(now, deadline) || passed(now, global_deadline) {
                    break;
                }
            }
            self.best_runs.push(run);
        }

        tracing::debug!(
            tests = self.best_runs.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "best-of search finished"
        );
        Ok(&self.best_runs)
    }

    pub fn repetition_count(&self) -> usize {
        self.repetition_count
    }

    /// Snapshots of the last fixed-count run
    pub fn repetitions(&self) -> &[ProfilerResult] {
        &self.repetitions[..self.repetition_count.min(self.repetitions.len())]
    }

    pub fn average(&self) -> &ProfilerResult {
        &self.average
    }

    pub fn variance(&self) -> &ProfilerResult {
        &self.variance
    }

    pub fn min(&self) -> &ProfilerResult {
        &self.min
    }

    pub fn max(&self) -> &ProfilerResult {
        &self.max
    }

    pub fn statistic(&self, statistic: Statistic) -> &ProfilerResult {
        match statistic {
            Statistic::Average => &self.average,
            Statistic::Variance => &self.variance,
            Statistic::Min => &self.min,
            Statistic::Max => &self.max,
        }
    }

    pub fn best_runs(&self) -> &[BestRun] {
        &self.best_runs
    }

    /// Print statistics and best-of results to stdout
    pub fn report(&self) {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        if let Err(e) = self.write_report(&mut out) {
            tracing::warn!("failed to write repetition report: {}", e);
        }
    }

    pub fn write_report<W: Write>(&self, w: &mut W) -> io::Result<()> {
        if self.repetition_count > 0 {
            report::write_repetition_statistics(
                w,
                self.repetition_count,
                &self.average,
                &self.variance,
                &self.min,
                &self.max,
            )?;
        }
        for run in &self.best_runs {
            report::write_best_run(w, &run.name, run.run_count, run.improvements, &run.best)?;
        }
        Ok(())
    }

    /// Export statistics and runs as CSV under `dir`.
    ///
    /// Fixed-count results go to `Summary/` and `Repetitions/`, best-of
    /// results to `BestOf/<index>.csv`. Subdirectories are created.
    pub fn export_csv(&self, dir: impl AsRef<Path>) -> Result<()> {
        let dir = dir.as_ref();
        if self.repetition_count > 0 {
            let summary = RepetitionSummary {
                average: &self.average,
                variance: &self.variance,
                min: &self.min,
                max: &self.max,
            };
            csv_output::export_repetition_csv(dir, &summary, self.repetitions())?;
        }
        if !self.best_runs.is_empty() {
            csv_output::export_indexed_csv(
                &dir.join("BestOf"),
                self.best_runs.iter().map(|run| &run.best),
            )?;
        }
        Ok(())
    }

    /// Statistics as a serializable document
    pub fn to_json_document(&self, include_repetitions: bool) -> JsonRepetitionOutput<'_> {
        JsonRepetitionOutput {
            repetition_count: self.repetition_count,
            average: &self.average,
            variance: &self.variance,
            min: &self.min,
            max: &self.max,
            repetitions: if include_repetitions {
                self.repetitions()
            } else {
                &[]
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::active::shared;

    #[test]
    fn test_fixed_count_captures_every_run() {
        let p = shared(Profiler::new("fixed"));
        let handle = p.borrow_mut().resolve(0, "repetition.rs", 1, "step").unwrap();
        let mut reps = RepetitionProfiler::new(p.clone()).with_repetition_results(2);

        let mut calls = 0;
        reps.fixed_count_repetition_testing(5, || {
            calls += 1;
            let mut profiler = p.borrow_mut();
            profiler.open(handle, 10);
            profiler.close(handle);
        })
        .unwrap();

        assert_eq!(calls, 5);
        assert_eq!(reps.repetition_count(), 5);
        assert_eq!(reps.repetitions().len(), 5);
        for run in reps.repetitions() {
            let block = run.find_block("step").unwrap();
            assert_eq!(block.hit_count, 1);
            assert_eq!(block.processed_byte_count, 10);
        }
        assert_eq!(reps.average().tracks[0].blocks[0].hit_count, 1);
        assert_eq!(reps.variance().tracks[0].blocks[0].hit_count, 0);
    }

    #[test]
    fn test_fixed_count_activates_profiler() {
        let p = shared(Profiler::new("activate"));
        let mut reps = RepetitionProfiler::new(p.clone());
        let mut seen = false;
        reps.fixed_count_repetition_testing(1, || {
            seen = active::profiler().is_some_and(|a| std::rc::Rc::ptr_eq(&a, &p));
        })
        .unwrap();
        assert!(seen);
        assert!(active::profiler().is_none());
    }

    #[test]
    fn test_best_of_runs_every_test_once_with_zero_budget() {
        let p = shared(Profiler::new("best"));
        let mut reps = RepetitionProfiler::new(p);
        let mut a = 0;
        let mut b = 0;
        {
            let mut tests = [
                RepetitionTest::new("a", || a += 1),
                RepetitionTest::new("b", || b += 1),
            ];
            let runs = reps
                .best_of_repetition_testing(&mut tests, Duration::ZERO, Duration::ZERO)
                .unwrap();
            assert_eq!(runs.len(), 2);
            assert_eq!(runs[0].name, "a");
            assert_eq!(runs[0].run_count, 1);
            assert_eq!(runs[0].improvements, 1);
        }
        assert_eq!((a, b), (1, 1));
    }

    #[test]
    fn test_busy_profiler_is_error() {
        let p = shared(Profiler::new("busy"));
        let mut reps = RepetitionProfiler::new(p.clone());
        let _held = p.borrow();
        assert!(matches!(
            reps.fixed_count_repetition_testing(1, || {}),
            Err(ProfileError::ProfilerBusy)
        ));
    }

    #[test]
    fn test_unrepresentable_deadline_never_passes() {
        let now = Instant::now();
        assert!(!passed(now, now.checked_add(Duration::MAX)));
        assert!(passed(now, Some(now)));
        assert!(!passed(now, now.checked_add(Duration::from_secs(1))));
    }
}
