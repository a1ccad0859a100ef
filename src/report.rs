//! Human-readable reports for live profilers and snapshots

use crate::results::{BlockResult, ProfilerResult, TrackResult};
use std::io::{self, Write};

const MEGABYTE: f64 = (1u64 << 20) as f64;
const GIGABYTE: f64 = (1u64 << 30) as f64;

/// `part / whole`, or 0 when `whole` is 0
#[inline]
pub fn ratio(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

fn display_name(name: &str) -> &str {
    if name.is_empty() {
        "(unnamed)"
    } else {
        name
    }
}

pub fn write_disabled<W: Write>(w: &mut W) -> io::Result<()> {
    writeln!(
        w,
        "Profiling disabled: rebuild with the `profiling` feature to record blocks."
    )
}

pub fn write_profiler_header<W: Write>(
    w: &mut W,
    name: &str,
    cpu_frequency: u64,
    elapsed_seconds: f64,
) -> io::Result<()> {
    writeln!(
        w,
        "\n---- Profiler: {} ({:.4}ms; estimated CPU frequency {} Hz) ----",
        display_name(name),
        1000.0 * elapsed_seconds,
        cpu_frequency
    )
}

pub fn write_track_header<W: Write>(
    w: &mut W,
    name: &str,
    elapsed_seconds: f64,
    proportion_of_total: f64,
) -> io::Result<()> {
    writeln!(
        w,
        "\n---- Profile Track: {} ({:.4}ms; {:.2}% of total) ----",
        display_name(name),
        1000.0 * elapsed_seconds,
        100.0 * proportion_of_total
    )
}

pub fn write_block_line<W: Write>(w: &mut W, block: &BlockResult) -> io::Result<()> {
    write!(
        w,
        "{}[{}]: {} ({:.2}% of track; {:.2}% of total",
        display_name(block.name),
        block.hit_count,
        block.elapsed,
        100.0 * block.proportion_of_track,
        100.0 * block.proportion_of_total
    )?;
    if block.processed_byte_count > 0 {
        write!(
            w,
            "; {:.3}MB at {:.2}MB/s | {:.2}GB/s",
            block.processed_byte_count as f64 / MEGABYTE,
            block.bandwidth / MEGABYTE,
            block.bandwidth / GIGABYTE
        )?;
    }
    if let Some(bytes_per_fault) = block.bytes_per_page_fault() {
        write!(
            w,
            "; {} page faults ({:.4}k/fault)",
            block.page_fault_count,
            bytes_per_fault / 1024.0
        )?;
    }
    writeln!(w, ")")
}

fn write_track_result<W: Write>(w: &mut W, track: &TrackResult) -> io::Result<()> {
    write_track_header(
        w,
        track.name.as_str(),
        track.elapsed_seconds,
        track.proportion_of_total,
    )?;
    for block in &track.blocks {
        write_block_line(w, block)?;
    }
    Ok(())
}

/// Report a snapshot in the same layout as a live profiler
pub fn write_result<W: Write>(w: &mut W, result: &ProfilerResult) -> io::Result<()> {
    if !cfg!(feature = "profiling") {
        return write_disabled(w);
    }
    write_profiler_header(
        w,
        result.name.as_str(),
        result.estimated_cpu_frequency,
        result.elapsed_seconds,
    )?;
    for track in &result.tracks {
        write_track_result(w, track)?;
    }
    Ok(())
}

/// Fastest run of one best-of test
pub fn write_best_run<W: Write>(
    w: &mut W,
    name: &str,
    run_count: u64,
    improvements: u64,
    best: &ProfilerResult,
) -> io::Result<()> {
    if !cfg!(feature = "profiling") {
        return write_disabled(w);
    }
    writeln!(
        w,
        "\n==== Best of {}: {:.4}ms ({} runs; {} improvements) ====",
        display_name(name),
        1000.0 * best.elapsed_seconds,
        run_count,
        improvements
    )?;
    for track in &best.tracks {
        write_track_result(w, track)?;
    }
    Ok(())
}

/// Statistics of one quantity across repetitions, in seconds
struct Spread {
    average: f64,
    std_dev: f64,
    min: f64,
    max: f64,
}

impl Spread {
    fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        write!(
            w,
            "avg {:.4}ms ± {:.4}ms, min {:.4}ms, max {:.4}ms",
            1000.0 * self.average,
            1000.0 * self.std_dev,
            1000.0 * self.min,
            1000.0 * self.max
        )
    }
}

fn block_at(track: Option<&TrackResult>, index: usize) -> Option<&BlockResult> {
    track.and_then(|t| t.blocks.get(index))
}

/// Aggregated repetition statistics, matched by position across the four
/// result sets
pub fn write_repetition_statistics<W: Write>(
    w: &mut W,
    repetitions: usize,
    average: &ProfilerResult,
    variance: &ProfilerResult,
    min: &ProfilerResult,
    max: &ProfilerResult,
) -> io::Result<()> {
    if !cfg!(feature = "profiling") {
        return write_disabled(w);
    }
    writeln!(
        w,
        "\n---- Repetition statistics: {} ({} repetitions; estimated CPU frequency {} Hz) ----",
        display_name(average.name.as_str()),
        repetitions,
        average.estimated_cpu_frequency
    )?;
    write!(w, "Total: ")?;
    Spread {
        average: average.elapsed_seconds,
        std_dev: variance.elapsed_seconds.sqrt(),
        min: min.elapsed_seconds,
        max: max.elapsed_seconds,
    }
    .write(w)?;
    writeln!(w)?;

    for (t, track) in average.tracks.iter().enumerate() {
        let var_track = variance.tracks.get(t);
        let min_track = min.tracks.get(t);
        let max_track = max.tracks.get(t);
        write!(w, "\n---- Profile Track: {} (", display_name(track.name.as_str()))?;
        Spread {
            average: track.elapsed_seconds,
            std_dev: var_track.map_or(0.0, |v| v.elapsed_seconds.sqrt()),
            min: min_track.map_or(0.0, |v| v.elapsed_seconds),
            max: max_track.map_or(0.0, |v| v.elapsed_seconds),
        }
        .write(w)?;
        writeln!(w, ") ----")?;

        for (b, block) in track.blocks.iter().enumerate() {
            write!(w, "{}[{}]: ", display_name(block.name), block.hit_count)?;
            Spread {
                average: block.elapsed_seconds,
                std_dev: block_at(var_track, b).map_or(0.0, |v| v.elapsed_seconds.sqrt()),
                min: block_at(min_track, b).map_or(0.0, |v| v.elapsed_seconds),
                max: block_at(max_track, b).map_or(0.0, |v| v.elapsed_seconds),
            }
            .write(w)?;
            write!(w, " ({:.2}% of track", 100.0 * block.proportion_of_track)?;
            if block.processed_byte_count > 0 {
                write!(
                    w,
                    "; avg {:.2}MB/s, best {:.2}MB/s",
                    block.bandwidth / MEGABYTE,
                    block_at(max_track, b).map_or(0.0, |v| v.bandwidth) / MEGABYTE
                )?;
            }
            writeln!(w, ")")?;
        }
    }
    Ok(())
}
