use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use visiontrain::progress::ProgressSink;
use visiontrain::{
    ConsoleSink, LookupPolicy, MemoryEngine, PipelineDriver, ProgressEvent, TrainingPlan,
    export_runtime, load_manifest, standard_cascade,
};

#[derive(Parser)]
#[command(name = "visiontrain")]
#[command(about = "Train a three-stage vision tool cascade and export a runtime workspace")]
struct Cli {
    /// Directory of training images (.jpg, .bmp, .png)
    #[arg(long, value_name = "DIR")]
    images: PathBuf,

    /// XML manifest with per-sample geometry annotations
    #[arg(long, value_name = "FILE")]
    manifest: PathBuf,

    /// Directory of defect region mask images
    #[arg(long, value_name = "DIR")]
    regions: Option<PathBuf>,

    /// Path of the exported runtime workspace
    #[arg(long, value_name = "FILE", default_value = "ToolChainRuntime.vrws")]
    output: PathBuf,

    /// Workspace name
    #[arg(long, default_value = "toolchain")]
    workspace: String,

    /// Polling interval in milliseconds
    #[arg(long, default_value_t = 1000)]
    poll_ms: u64,

    /// Abort when a manifest entry has no matching image
    #[arg(long)]
    strict_manifest: bool,

    /// Polls each simulated engine operation takes before completing
    #[arg(long, default_value_t = 3)]
    sim_polls: u32,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Cli::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("visiontrain: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Cli) -> anyhow::Result<()> {
    let entries = load_manifest(&args.manifest)?;
    if args.verbose {
        println!("Manifest: {} entries", entries.len());
    }

    let cascade = standard_cascade(entries, args.regions.as_deref());
    let plan = TrainingPlan::new(&args.images, cascade);

    // No vendor adapter is linked into this binary; runs execute against
    // the in-memory engine, which simulates the vendor's poll-based
    // asynchronous operations.
    let mut engine = MemoryEngine::new(&args.workspace);
    engine.polls_per_operation = args.sim_polls;

    let sink = ConsoleSink::new(args.verbose);
    let policy = if args.strict_manifest {
        LookupPolicy::Strict
    } else {
        LookupPolicy::Lenient
    };

    let report = PipelineDriver::new(&mut engine, &sink)
        .with_poll_interval(Duration::from_millis(args.poll_ms))
        .with_lookup_policy(policy)
        .run(&plan)?;

    let summary = export_runtime(&mut engine, &args.output)?;
    sink.on_event(&ProgressEvent::Exported {
        path: summary.path.clone(),
        bytes: summary.bytes,
    });

    println!("\n=== Training Summary ===");
    println!("Images ingested: {}", report.images);
    for stage in &report.stages {
        println!(
            "  {}: {} annotations applied, {} skipped{}",
            stage.name,
            stage.annotations_applied,
            stage.annotations_skipped,
            match &stage.masks {
                Some(m) => format!(
                    ", masks: {} applied / {} unmatched / {} failed",
                    m.applied, m.unmatched, m.failed
                ),
                None => String::new(),
            }
        );
    }

    Ok(())
}
