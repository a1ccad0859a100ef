use anyhow::Result;
use blockprof::cli::{Cli, Command, DemoArgs, DemoMode};
use blockprof::{
    active, json_output, profile_function, timer, Profiler, ProfilerConfig, RepetitionProfiler,
    RepetitionTest,
};
use clap::Parser;
use std::hint::black_box;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber for debug output
fn init_tracing(debug: bool) {
    if debug {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive(tracing::Level::TRACE.into()),
            )
            .with_writer(std::io::stderr)
            .init();
    }
}

/// Fill with indices, timed on track 0
fn fill(arr: &mut [u64]) {
    profile_function!(0);
    for (i, x) in arr.iter_mut().enumerate() {
        *x = i as u64;
    }
    black_box(arr);
}

/// Fill with indices, timed with bandwidth on track 0
fn fill_bandwidth(arr: &mut [u64]) {
    profile_function!(0, std::mem::size_of_val(&*arr));
    for (i, x) in arr.iter_mut().enumerate() {
        *x = i as u64;
    }
    black_box(arr);
}

/// Fill with indices, timed on track 1
fn fill_sub_track(arr: &mut [u64]) {
    profile_function!(1);
    for (i, x) in arr.iter_mut().enumerate() {
        *x = i as u64;
    }
    black_box(arr);
}

fn calibrate(ms: u64) {
    let hz = timer::set_estimated_cpu_frequency(ms);
    println!(
        "Estimated CPU timer frequency: {} Hz ({:.3} GHz) over {} ms",
        hz,
        hz as f64 / 1e9,
        ms
    );
    println!("OS timer frequency: {} Hz", timer::os_timer_frequency());
}

fn budget(seconds: f64, flag: &str) -> Result<Duration> {
    match Duration::try_from_secs_f64(seconds) {
        Ok(duration) => Ok(duration),
        Err(e) => anyhow::bail!(
            "Invalid value for {}: {} (must be a finite number of seconds >= 0: {})",
            flag,
            seconds,
            e
        ),
    }
}

fn run_single(args: &DemoArgs, profiler: Profiler) -> Result<()> {
    let _active = active::activate(active::shared(profiler));
    let mut arr = vec![0u64; args.elements];

    active::initialize()?;
    fill(&mut arr);
    fill_bandwidth(&mut arr);
    fill_sub_track(&mut arr);
    active::end()?;

    active::report()?;
    if let Some(path) = &args.csv {
        active::export_csv(path)?;
    }
    if let Some(path) = &args.json {
        let result = active::with_profiler(|p| p.capture())?;
        json_output::export_json(path, &result)?;
    }
    Ok(())
}

fn run_fixed(args: &DemoArgs, profiler: Profiler) -> Result<()> {
    if args.repetitions == 0 {
        anyhow::bail!("Invalid value for --repetitions: 0 (must be >= 1)");
    }
    let mut arr = vec![0u64; args.elements];
    let mut reps = RepetitionProfiler::new(active::shared(profiler))
        .with_repetition_results(args.repetitions);

    reps.fixed_count_repetition_testing(args.repetitions, || fill_bandwidth(&mut arr))?;

    reps.report();
    if let Some(dir) = &args.csv {
        reps.export_csv(dir)?;
    }
    if let Some(path) = &args.json {
        json_output::export_json(path, &reps.to_json_document(true))?;
    }
    Ok(())
}

fn run_best_of(args: &DemoArgs, profiler: Profiler) -> Result<()> {
    let per_test = budget(args.per_test_timeout, "--per-test-timeout")?;
    let global = budget(args.global_timeout, "--global-timeout")?;
    let mut plain = vec![0u64; args.elements];
    let mut measured = vec![0u64; args.elements];
    let mut reps = RepetitionProfiler::new(active::shared(profiler));

    {
        let mut tests = [
            RepetitionTest::new("fill", || fill(&mut plain)),
            RepetitionTest::new("fill_bandwidth", || fill_bandwidth(&mut measured)),
        ];
        reps.best_of_repetition_testing(&mut tests, per_test, global)?;
    }

    reps.report();
    if let Some(dir) = &args.csv {
        reps.export_csv(dir)?;
    }
    if let Some(path) = &args.json {
        json_output::export_json(path, reps.best_runs())?;
    }
    Ok(())
}

fn run_demo(args: &DemoArgs) -> Result<()> {
    let config = ProfilerConfig::new()
        .with_page_faults(!args.no_page_faults)
        .with_calibration_ms(args.calibration_ms);
    timer::set_estimated_cpu_frequency(args.calibration_ms);

    let mut profiler = Profiler::with_config("Tests", config);
    profiler.set_track_name(0, "Main")?;
    profiler.set_track_name(1, "SubTrack")?;

    match args.mode {
        DemoMode::Single => run_single(args, profiler),
        DemoMode::Fixed => run_fixed(args, profiler),
        DemoMode::BestOf => run_best_of(args, profiler),
    }
}

fn main() -> Result<()> {
    let args = Cli::parse();

    // Initialize tracing if --debug flag is set
    init_tracing(args.debug);

    match &args.command {
        Command::Calibrate { ms } => calibrate(*ms),
        Command::Demo(demo) => run_demo(demo)?,
    }
    Ok(())
}
