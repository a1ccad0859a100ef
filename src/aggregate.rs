//! Statistics across repeated snapshots
//!
//! Snapshots are combined field by field and matched by position: packed
//! track index, then packed block index. That is only meaningful when every
//! repetition hits the same blocks in the same order. Shapes may still
//! differ slightly: the largest track/block count wins and missing entries
//! count as zero. Positions whose block identity differs between
//! repetitions are reported with a warning.

use crate::results::{BlockResult, ProfilerResult, TrackResult};

/// Which statistic to fold a set of snapshots into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Statistic {
    /// Arithmetic mean; integer fields round half up
    Average,
    /// Mean squared deviation from the average (two pass)
    Variance,
    Min,
    Max,
}

impl Statistic {
    pub const ALL: [Statistic; 4] = [
        Statistic::Average,
        Statistic::Variance,
        Statistic::Min,
        Statistic::Max,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Statistic::Average => "Average",
            Statistic::Variance => "Variance",
            Statistic::Min => "Min",
            Statistic::Max => "Max",
        }
    }
}

/// Fold integer samples. `mean` is only read for `Variance`.
///
/// An integer variance above `u64::MAX` (a spread of about 4.3e9 ticks)
/// saturates to `u64::MAX` with a warning.
pub fn combine_u64(values: impl Iterator<Item = u64>, statistic: Statistic, mean: u64) -> u64 {
    match statistic {
        Statistic::Average => {
            let (sum, n) = values.fold((0u128, 0u128), |(s, n), v| (s + u128::from(v), n + 1));
            if n == 0 {
                0
            } else {
                u64::try_from((sum + n / 2) / n).unwrap_or(u64::MAX)
            }
        }
        Statistic::Variance => {
            let (sum, n) = values.fold((0f64, 0usize), |(s, n), v| {
                let diff = v as f64 - mean as f64;
                (s + diff * diff, n + 1)
            });
            if n == 0 {
                return 0;
            }
            let variance = (sum / n as f64).round();
            if variance >= u64::MAX as f64 {
                tracing::warn!(
                    variance,
                    "tick variance exceeds u64 and is saturated; the seconds variance is exact"
                );
            }
            variance as u64
        }
        Statistic::Min => values.min().unwrap_or(0),
        Statistic::Max => values.max().unwrap_or(0),
    }
}

/// Fold floating-point samples. `mean` is only read for `Variance`.
pub fn combine_f64(values: impl Iterator<Item = f64>, statistic: Statistic, mean: f64) -> f64 {
    let mut n = 0usize;
    let folded = match statistic {
        Statistic::Average => values.fold(0.0, |s, v| {
            n += 1;
            s + v
        }),
        Statistic::Variance => values.fold(0.0, |s, v| {
            n += 1;
            s + (v - mean) * (v - mean)
        }),
        Statistic::Min => {
            return values.fold(None, |m: Option<f64>, v| Some(m.map_or(v, |m| m.min(v))))
                .unwrap_or(0.0)
        }
        Statistic::Max => {
            return values.fold(None, |m: Option<f64>, v| Some(m.map_or(v, |m| m.max(v))))
                .unwrap_or(0.0)
        }
    };
    if n == 0 {
        0.0
    } else {
        folded / n as f64
    }
}

impl ProfilerResult {
    /// Field-wise mean of `samples`
    pub fn average_of(samples: &[ProfilerResult]) -> ProfilerResult {
        let mut out = ProfilerResult::new();
        out.aggregate_from(samples, Statistic::Average, None);
        out
    }

    /// Field-wise variance of `samples` around `average`
    pub fn variance_of(samples: &[ProfilerResult], average: &ProfilerResult) -> ProfilerResult {
        let mut out = ProfilerResult::new();
        out.aggregate_from(samples, Statistic::Variance, Some(average));
        out
    }

    /// Field-wise minimum; fields may come from different repetitions
    pub fn min_of(samples: &[ProfilerResult]) -> ProfilerResult {
        let mut out = ProfilerResult::new();
        out.aggregate_from(samples, Statistic::Min, None);
        out
    }

    /// Field-wise maximum; fields may come from different repetitions
    pub fn max_of(samples: &[ProfilerResult]) -> ProfilerResult {
        let mut out = ProfilerResult::new();
        out.aggregate_from(samples, Statistic::Max, None);
        out
    }

    /// Overwrite `self` with `statistic` folded over `samples`, reusing
    /// this result's buffers. `Variance` uses `average` when given and
    /// computes it otherwise.
    pub fn aggregate_from(
        &mut self,
        samples: &[ProfilerResult],
        statistic: Statistic,
        average: Option<&ProfilerResult>,
    ) {
        let computed;
        let mean = match (statistic, average) {
            (Statistic::Variance, None) => {
                computed = ProfilerResult::average_of(samples);
                Some(&computed)
            }
            (_, mean) => mean,
        };

        let Some(first) = samples.first() else {
            self.tracks.clear();
            *self = ProfilerResult {
                tracks: std::mem::take(&mut self.tracks),
                ..ProfilerResult::default()
            };
            return;
        };

        self.name = first.name;
        self.estimated_cpu_frequency = combine_u64(
            samples.iter().map(|s| s.estimated_cpu_frequency),
            statistic,
            mean.map_or(0, |m| m.estimated_cpu_frequency),
        );
        self.elapsed = combine_u64(
            samples.iter().map(|s| s.elapsed),
            statistic,
            mean.map_or(0, |m| m.elapsed),
        );
        self.elapsed_seconds = combine_f64(
            samples.iter().map(|s| s.elapsed_seconds),
            statistic,
            mean.map_or(0.0, |m| m.elapsed_seconds),
        );

        let track_count = samples.iter().map(|s| s.tracks.len()).max().unwrap_or(0);
        self.tracks.resize_with(track_count, TrackResult::default);

        let mut mismatches = 0;
        for (t, out) in self.tracks.iter_mut().enumerate() {
            let mean_track = mean.and_then(|m| m.tracks.get(t));
            mismatches += aggregate_track(out, samples, t, statistic, mean_track);
        }

        if mismatches > 0 {
            tracing::warn!(
                mismatches,
                statistic = statistic.label(),
                "block identities differ across repetitions at the same position; \
                 statistics mix different blocks"
            );
        }
    }
}

/// Fold track `t` of every sample into `out`; returns the number of block
/// positions whose identity differs between samples
fn aggregate_track(
    out: &mut TrackResult,
    samples: &[ProfilerResult],
    t: usize,
    statistic: Statistic,
    mean: Option<&TrackResult>,
) -> usize {
    let tracks = || samples.iter().map(move |s| s.tracks.get(t));

    if let Some(first) = tracks().flatten().next() {
        out.name = first.name;
        out.index = first.index;
    }
    out.elapsed = combine_u64(
        tracks().map(|x| x.map_or(0, |x| x.elapsed)),
        statistic,
        mean.map_or(0, |m| m.elapsed),
    );
    out.elapsed_seconds = combine_f64(
        tracks().map(|x| x.map_or(0.0, |x| x.elapsed_seconds)),
        statistic,
        mean.map_or(0.0, |m| m.elapsed_seconds),
    );
    out.proportion_of_total = combine_f64(
        tracks().map(|x| x.map_or(0.0, |x| x.proportion_of_total)),
        statistic,
        mean.map_or(0.0, |m| m.proportion_of_total),
    );

    let block_count = tracks()
        .map(|x| x.map_or(0, |x| x.blocks.len()))
        .max()
        .unwrap_or(0);
    out.blocks.resize_with(block_count, BlockResult::default);

    let mut mismatches = 0;
    for (b, block) in out.blocks.iter_mut().enumerate() {
        let blocks = || tracks().map(move |x| x.and_then(|x| x.blocks.get(b)));
        let mean_block = mean.and_then(|m| m.blocks.get(b));

        let mut present = blocks().flatten();
        if let Some(first) = present.next() {
            if present.any(|other| other.identity() != first.identity()) {
                mismatches += 1;
            }
            block.slot = first.slot;
            block.file = first.file;
            block.line = first.line;
            block.name = first.name;
        }
        aggregate_block(block, blocks, statistic, mean_block);
    }
    mismatches
}

fn aggregate_block<'a, I>(
    out: &mut BlockResult,
    blocks: impl Fn() -> I,
    statistic: Statistic,
    mean: Option<&BlockResult>,
) where
    I: Iterator<Item = Option<&'a BlockResult>>,
{
    let u = |get: fn(&BlockResult) -> u64| {
        combine_u64(
            blocks().map(|b| b.map_or(0, get)),
            statistic,
            mean.map_or(0, get),
        )
    };
    let f = |get: fn(&BlockResult) -> f64| {
        combine_f64(
            blocks().map(|b| b.map_or(0.0, get)),
            statistic,
            mean.map_or(0.0, get),
        )
    };

    out.hit_count = u(|b| b.hit_count);
    out.elapsed = u(|b| b.elapsed);
    out.processed_byte_count = u(|b| b.processed_byte_count);
    out.page_fault_count = u(|b| b.page_fault_count);
    out.elapsed_seconds = f(|b| b.elapsed_seconds);
    out.proportion_of_track = f(|b| b.proportion_of_track);
    out.proportion_of_total = f(|b| b.proportion_of_total);
    out.bandwidth = f(|b| b.bandwidth);
}
