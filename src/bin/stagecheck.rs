use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "stagecheck", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compare a captured image against a reference image.
    Compare(CompareArgs),
    /// Execute a run manifest against its simulated cluster.
    Run(RunArgs),
}

#[derive(Parser, Debug)]
struct CompareArgs {
    /// Reference image.
    #[arg(long)]
    reference: PathBuf,

    /// Captured image.
    #[arg(long)]
    captured: PathBuf,

    /// Color space tag of the reference image.
    #[arg(long, default_value = "srgb")]
    reference_color: String,

    /// Color space tag of the captured image.
    #[arg(long, default_value = "srgb")]
    captured_color: String,

    /// Difference metric.
    #[arg(long, value_enum, default_value_t = MetricChoice::MaxChannel)]
    metric: MetricChoice,

    /// Pass threshold for the metric.
    #[arg(long, default_value_t = 2.0)]
    max_delta: f64,
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Run manifest JSON.
    #[arg(long)]
    manifest: PathBuf,

    /// Write the JSON report here.
    #[arg(long)]
    out: Option<PathBuf>,

    /// Only run cases tagged with this workflow.
    #[arg(long, value_enum)]
    workflow: Option<WorkflowChoice>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum WorkflowChoice {
    Icvfx,
    #[value(alias = "vr_scouting")]
    VrScouting,
    Simulcam,
    Vad,
}

impl From<WorkflowChoice> for stagecheck::Workflow {
    fn from(w: WorkflowChoice) -> Self {
        match w {
            WorkflowChoice::Icvfx => Self::Icvfx,
            WorkflowChoice::VrScouting => Self::VrScouting,
            WorkflowChoice::Simulcam => Self::Simulcam,
            WorkflowChoice::Vad => Self::Vad,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum MetricChoice {
    MaxChannel,
    MeanChannel,
    #[value(name = "delta-e76", alias = "delta_e76")]
    DeltaE76,
}

impl From<MetricChoice> for stagecheck::DeltaMetric {
    fn from(m: MetricChoice) -> Self {
        match m {
            MetricChoice::MaxChannel => Self::MaxChannel,
            MetricChoice::MeanChannel => Self::MeanChannel,
            MetricChoice::DeltaE76 => Self::DeltaE76,
        }
    }
}

fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Compare(args) => cmd_compare(args),
        Command::Run(args) => cmd_run(args),
    }
}

fn cmd_compare(args: CompareArgs) -> anyhow::Result<ExitCode> {
    let reference = stagecheck::decode_image_file(
        &args.reference,
        stagecheck::ColorTag::parse(&args.reference_color),
    )?;
    let captured = stagecheck::decode_image_file(
        &args.captured,
        stagecheck::ColorTag::parse(&args.captured_color),
    )?;

    let comparator = stagecheck::Comparator::new(stagecheck::ComparatorOpts {
        metric: args.metric.into(),
        ..stagecheck::ComparatorOpts::default()
    });
    let sample = stagecheck::FrameSample {
        node: stagecheck::NodeId::new("captured"),
        timestamp: stagecheck::FrameIndex(0),
        presented_at: stagecheck::ClockInstant(0),
        frame: captured,
    };
    let result = comparator.compare(&reference, &sample, args.max_delta)?;

    println!(
        "{}",
        serde_json::to_string_pretty(&result).context("serialize comparison")?
    );
    Ok(if result.passed {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

fn cmd_run(args: RunArgs) -> anyhow::Result<ExitCode> {
    let manifest = stagecheck::RunManifest::load(&args.manifest)?;
    manifest.validate()?;

    let workflow = args.workflow.map(stagecheck::Workflow::from);
    let cluster = manifest
        .simulated_cluster()
        .context("manifest has no cluster section to rehearse against")?;
    let orchestrator =
        stagecheck::Orchestrator::new(Arc::new(cluster), manifest.orchestrator_opts(workflow));
    let cases = manifest.cases();

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("build tokio runtime")?;
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    rt.spawn(async move {
        if let Ok(()) = tokio::signal::ctrl_c().await {
            tracing::info!("received Ctrl+C, cancelling run");
            on_interrupt.cancel();
        }
    });
    let run = match &args.out {
        Some(out) => {
            let mut sink = stagecheck::JsonReportSink::new(out);
            rt.block_on(orchestrator.run_with_sink(&cases, &cancel, &mut sink))?
        }
        None => rt.block_on(orchestrator.run(&cases, &cancel))?,
    };

    for row in run.report_rows() {
        eprintln!("{:<12} {}  {}", row.result, row.name, row.message);
    }
    if let Some(out) = &args.out {
        eprintln!("wrote {}", out.display());
    }

    Ok(match run.verdict() {
        Some(stagecheck::RunVerdict::Pass) => ExitCode::SUCCESS,
        Some(stagecheck::RunVerdict::Fail) => ExitCode::from(1),
        _ => ExitCode::from(2),
    })
}
