//! JSON export of profiler snapshots

use crate::error::{ProfileError, Result};
use crate::results::ProfilerResult;
use serde::Serialize;
use std::fs;
use std::path::Path;

/// Repetition statistics as one JSON document
#[derive(Debug, Serialize)]
pub struct JsonRepetitionOutput<'a> {
    pub repetition_count: usize,
    pub average: &'a ProfilerResult,
    pub variance: &'a ProfilerResult,
    pub min: &'a ProfilerResult,
    pub max: &'a ProfilerResult,
    #[serde(skip_serializing_if = "no_repetitions")]
    pub repetitions: &'a [ProfilerResult],
}

fn no_repetitions(repetitions: &&[ProfilerResult]) -> bool {
    repetitions.is_empty()
}

/// Serialize any snapshot document to pretty JSON
pub fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

/// Write a snapshot to `path` as pretty JSON
pub fn export_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if !cfg!(feature = "profiling") {
        tracing::warn!(path = %path.display(), "profiling disabled; JSON export skipped");
        return Ok(());
    }
    let json = to_json(value)?;
    fs::write(path, json).map_err(|e| {
        tracing::warn!(path = %path.display(), error = %e, "JSON export failed");
        ProfileError::io(path, e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::name::FixedName;
    use crate::results::{BlockResult, TrackResult};

    #[test]
    fn test_snapshot_json_shape() {
        let result = ProfilerResult {
            name: FixedName::new("Tests"),
            elapsed: 10,
            tracks: vec![TrackResult {
                name: FixedName::new("Main"),
                blocks: vec![BlockResult {
                    name: "fill",
                    line: 42,
                    hit_count: 2,
                    ..Default::default()
                }],
                ..Default::default()
            }],
            ..Default::default()
        };
        let json = to_json(&result).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["name"], "Tests");
        assert_eq!(value["tracks"][0]["name"], "Main");
        assert_eq!(value["tracks"][0]["blocks"][0]["name"], "fill");
        assert_eq!(value["tracks"][0]["blocks"][0]["hit_count"], 2);
        assert_eq!(value["tracks"][0]["blocks"][0]["line"], 42);
    }

    #[test]
    fn test_repetition_output_skips_empty_repetitions() {
        let r = ProfilerResult::default();
        let doc = JsonRepetitionOutput {
            repetition_count: 0,
            average: &r,
            variance: &r,
            min: &r,
            max: &r,
            repetitions: &[],
        };
        let value: serde_json::Value = serde_json::from_str(&to_json(&doc).unwrap()).unwrap();
        assert!(value.get("repetitions").is_none());
        assert!(value.get("average").is_some());
    }
}
