//! CSV export of profiler snapshots
//!
//! One file per snapshot: the CPU frequency, the profiler totals, then one
//! row per (track, block). Repetition runs write a directory tree with the
//! four summary statistics and every individual repetition.

use crate::error::{ProfileError, Result};
use crate::results::ProfilerResult;
use std::fs;
use std::path::Path;

pub const ROW_HEADER: &str = "TrackName,TrackElapsed,TrackTimeSeconds,TrackProportionOfTotal,\
BlockName,HitCount,BlockElapsed,BlockTimeSeconds,BlockProportionOfTrack,BlockProportionOfTotal,\
PageFaultCount,ProcessedByteCount,Bandwidth";

/// Escape CSV field (handle commas, quotes, newlines)
pub fn escape_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Render a snapshot as CSV text
pub fn to_csv(result: &ProfilerResult) -> String {
    let mut output = String::new();

    output.push_str("EstimatedCPUFrequency\n");
    output.push_str(&result.estimated_cpu_frequency.to_string());
    output.push('\n');

    output.push_str("ProfilerName,TotalElapsed,TotalTimeSeconds\n");
    output.push_str(&format!(
        "{},{},{}\n",
        escape_field(result.name.as_str()),
        result.elapsed,
        result.elapsed_seconds
    ));

    output.push_str(ROW_HEADER);
    output.push('\n');
    for track in &result.tracks {
        let track_fields = format!(
            "{},{},{},{}",
            escape_field(track.name.as_str()),
            track.elapsed,
            track.elapsed_seconds,
            track.proportion_of_total
        );
        for block in &track.blocks {
            output.push_str(&format!(
                "{},{},{},{},{},{},{},{},{},{}\n",
                track_fields,
                escape_field(block.name),
                block.hit_count,
                block.elapsed,
                block.elapsed_seconds,
                block.proportion_of_track,
                block.proportion_of_total,
                block.page_fault_count,
                block.processed_byte_count,
                block.bandwidth
            ));
        }
    }

    output
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).map_err(|e| {
        tracing::warn!(path = %path.display(), error = %e, "CSV export failed");
        ProfileError::io(path, e)
    })
}

fn create_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).map_err(|e| {
        tracing::warn!(path = %path.display(), error = %e, "could not create export directory");
        ProfileError::io(path, e)
    })
}

/// Write one snapshot to `path`. The parent directory must already exist.
pub fn export_csv(path: &Path, result: &ProfilerResult) -> Result<()> {
    if !cfg!(feature = "profiling") {
        tracing::warn!(path = %path.display(), "profiling disabled; CSV export skipped");
        return Ok(());
    }
    write_file(path, &to_csv(result))
}

/// Summary statistics of a repetition run, by file stem
pub struct RepetitionSummary<'a> {
    pub average: &'a ProfilerResult,
    pub variance: &'a ProfilerResult,
    pub min: &'a ProfilerResult,
    pub max: &'a ProfilerResult,
}

/// Write `<dir>/Summary/{Average,Max,Min,Variance}.csv` and
/// `<dir>/Repetitions/<index>.csv`, creating the subdirectories
pub fn export_repetition_csv(
    dir: &Path,
    summary: &RepetitionSummary<'_>,
    repetitions: &[ProfilerResult],
) -> Result<()> {
    if !cfg!(feature = "profiling") {
        tracing::warn!(path = %dir.display(), "profiling disabled; CSV export skipped");
        return Ok(());
    }

    let summary_dir = dir.join("Summary");
    create_dir(&summary_dir)?;
    for (stem, result) in [
        ("Average", summary.average),
        ("Max", summary.max),
        ("Min", summary.min),
        ("Variance", summary.variance),
    ] {
        write_file(&summary_dir.join(format!("{}.csv", stem)), &to_csv(result))?;
    }

    export_indexed_csv(&dir.join("Repetitions"), repetitions)
}

/// Write `<dir>/<index>.csv` for every result, creating `dir`
pub fn export_indexed_csv<'a>(
    dir: &Path,
    results: impl IntoIterator<Item = &'a ProfilerResult>,
) -> Result<()> {
    if !cfg!(feature = "profiling") {
        tracing::warn!(path = %dir.display(), "profiling disabled; CSV export skipped");
        return Ok(());
    }
    create_dir(dir)?;
    for (index, result) in results.into_iter().enumerate() {
        write_file(&dir.join(format!("{}.csv", index)), &to_csv(result))?;
    }
    Ok(())
}
