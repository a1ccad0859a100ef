// Instrumentation macros recording into the thread's active profiler
#![cfg(feature = "profiling")]

use blockprof::{
    active, profile_block, profile_function, CallSite, Profiler, ProfilerConfig, RepetitionProfiler,
};
use blockprof::config::{BLOCK_CAPACITY, TRACK_CAPACITY};

fn quiet(name: &str) -> active::SharedProfiler {
    active::shared(Profiler::with_config(
        name,
        ProfilerConfig::new().with_page_faults(false),
    ))
}

fn checksum(data: &[u64]) -> u64 {
    profile_function!(0, std::mem::size_of_val(data));
    data.iter().sum()
}

fn nested() {
    profile_block!("outer", 1);
    for _ in 0..3 {
        profile_block!("inner", 1);
        std::hint::black_box(0);
    }
}

fn early_exit(stop: bool) -> Option<u32> {
    profile_block!("early_exit", 0);
    if stop {
        return None;
    }
    Some(1)
}

#[test]
fn test_macros_without_active_profiler_are_noops() {
    let _previous = active::set_profiler(None);
    assert_eq!(checksum(&[1, 2, 3]), 6);
    nested();
}

#[test]
fn test_profile_function_names_block_after_function() {
    let profiler = quiet("function");
    let _active = active::activate(profiler.clone());

    checksum(&[1; 128]);
    checksum(&[2; 128]);

    let result = profiler.borrow().capture();
    let block = result
        .tracks
        .iter()
        .flat_map(|t| t.blocks.iter())
        .find(|b| b.name.ends_with("checksum"))
        .unwrap();
    assert_eq!(block.hit_count, 2);
    assert_eq!(block.processed_byte_count, 2 * 128 * 8);
    assert!(block.file.ends_with("instrumentation_tests.rs"));
}

#[test]
fn test_nested_blocks_in_loops() {
    let profiler = quiet("nested");
    let _active = active::activate(profiler.clone());

    nested();
    nested();

    let result = profiler.borrow().capture();
    assert_eq!(result.track_count(), 1);
    assert_eq!(result.tracks[0].index, 1);
    assert_eq!(result.tracks[0].name, "Track 1");
    assert_eq!(result.find_block("outer").unwrap().hit_count, 2);
    let inner = result.find_block("inner").unwrap();
    assert_eq!(inner.hit_count, 6);
    assert!(result.find_block("outer").unwrap().elapsed >= inner.elapsed);
}

#[test]
fn test_block_closes_on_early_return() {
    let profiler = quiet("early");
    let _active = active::activate(profiler.clone());

    assert_eq!(early_exit(true), None);
    assert_eq!(early_exit(false), Some(1));

    let p = profiler.borrow();
    let block = p.capture();
    let block = block.find_block("early_exit").unwrap();
    assert_eq!(block.hit_count, 2);
    assert_eq!(p.track(0).unwrap().elapsed(), block.elapsed);
}

#[test]
fn test_block_closes_during_unwinding() {
    let profiler = quiet("unwind");
    let _active = active::activate(profiler.clone());

    let outcome = std::panic::catch_unwind(|| {
        profile_block!("panicking", 0);
        panic!("boom");
    });
    assert!(outcome.is_err());

    let result = profiler.borrow().capture();
    assert_eq!(result.find_block("panicking").unwrap().hit_count, 1);
}

#[test]
fn test_sites_rebind_after_clear_and_profiler_switch() {
    let first = quiet("first");
    let second = quiet("second");

    {
        let _active = active::activate(first.clone());
        nested();
    }
    {
        let _active = active::activate(second.clone());
        nested();
    }
    first.borrow_mut().clear();
    {
        let _active = active::activate(first.clone());
        nested();
        nested();
    }

    for (profiler, outer_hits) in [(&first, 2), (&second, 1)] {
        let p = profiler.borrow();
        assert_eq!(p.track(1).unwrap().bound_block_count(), 2);
        let result = p.capture();
        assert_eq!(result.find_block("outer").unwrap().hit_count, outer_hits);
    }
}

#[test]
fn test_reset_keeps_cached_sites_valid() {
    let profiler = quiet("reset");
    let _active = active::activate(profiler.clone());

    nested();
    profiler.borrow_mut().reset();
    nested();

    let p = profiler.borrow();
    assert_eq!(p.track(1).unwrap().bound_block_count(), 2);
    assert_eq!(p.capture().find_block("inner").unwrap().hit_count, 3);
}

#[test]
fn test_reset_while_block_open_adds_nothing_on_close() {
    let profiler = quiet("reset-open");
    let _active = active::activate(profiler.clone());

    {
        profile_block!("outer", 0);
        std::hint::black_box(0);
        profiler.borrow_mut().reset();
    }

    let p = profiler.borrow();
    assert_eq!(p.track(0).unwrap().elapsed(), 0);
    assert_eq!(p.track(0).unwrap().hit_blocks().count(), 0);
}

#[test]
fn test_clear_while_block_open_adds_nothing_on_close() {
    let profiler = quiet("clear-open");
    let _active = active::activate(profiler.clone());

    {
        profile_block!("outer", 0);
        profiler.borrow_mut().clear();
    }

    let p = profiler.borrow();
    assert_eq!(p.track(0).unwrap().elapsed(), 0);
    assert_eq!(p.capture().track_count(), 0);
}

#[test]
fn test_outer_block_around_fixed_count_driver() {
    let profiler = quiet("outer-driver");
    let _active = active::activate(profiler.clone());

    let mut reps = RepetitionProfiler::new(profiler.clone());
    {
        profile_block!("around_driver", 0);
        reps.fixed_count_repetition_testing(3, nested).unwrap();
    }

    // The driver resets between runs; the stale outer guard must not add
    // the whole counter value on close
    assert_eq!(profiler.borrow().track(0).unwrap().elapsed(), 0);
    assert_eq!(reps.repetitions().len(), 3);
    for run in reps.repetitions() {
        assert_eq!(run.find_block("inner").unwrap().hit_count, 3);
    }
}

#[test]
#[should_panic(expected = "cannot bind block")]
fn test_macro_path_panics_when_table_is_full() {
    let profiler = quiet("exhausted");
    let _active = active::activate(profiler);

    // One more distinct site than the table holds
    for line in 0..=BLOCK_CAPACITY as u32 {
        let site: &'static CallSite = Box::leak(Box::new(CallSite::new(
            "tests/exhaustion.rs",
            line,
            "site",
            0,
        )));
        drop(active::open_site(site, 0));
    }
}

#[test]
#[should_panic(expected = "cannot bind block")]
fn test_macro_path_panics_on_track_out_of_range() {
    let profiler = quiet("range");
    let _active = active::activate(profiler);

    profile_block!("nowhere", TRACK_CAPACITY);
}
