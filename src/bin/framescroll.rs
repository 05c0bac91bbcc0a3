use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use framescroll::{
    FsFrameLoader, ImageSequence, MountOpts, PixelCanvas, SequenceConfig, View, Viewport,
};
use futures::executor::LocalPool;

#[derive(Parser, Debug)]
#[command(name = "framescroll", version)]
struct Cli {
    /// Enable debug logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render the frame a scroll progress maps to as a PNG.
    Frame(FrameArgs),
    /// Simulate a full scroll through the pinned region, one PNG per step.
    Sweep(SweepArgs),
    /// Print the resolved frame paths and seed set as JSON.
    Plan(PlanArgs),
}

#[derive(Parser, Debug)]
struct SequenceArgs {
    /// Sequence config JSON.
    #[arg(long)]
    config: PathBuf,

    /// Directory frame locators resolve against. Defaults to the config's directory.
    #[arg(long)]
    assets: Option<PathBuf>,

    /// Viewport width in pixels.
    #[arg(long, default_value_t = 1280)]
    width: u32,

    /// Viewport height in pixels.
    #[arg(long, default_value_t = 720)]
    height: u32,
}

#[derive(Parser, Debug)]
struct FrameArgs {
    #[command(flatten)]
    seq: SequenceArgs,

    /// Scroll progress through the pinned region, 0..=1.
    #[arg(long)]
    progress: f64,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,
}

#[derive(Parser, Debug)]
struct SweepArgs {
    #[command(flatten)]
    seq: SequenceArgs,

    /// Number of scroll steps (the sweep writes steps + 1 frames).
    #[arg(long, default_value_t = 10)]
    steps: u32,

    /// Output directory for `step_NNNN.png` files.
    #[arg(long)]
    out_dir: PathBuf,
}

#[derive(Parser, Debug)]
struct PlanArgs {
    /// Sequence config JSON.
    #[arg(long)]
    config: PathBuf,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
    framescroll::init();

    match cli.cmd {
        Command::Frame(args) => cmd_frame(args),
        Command::Sweep(args) => cmd_sweep(args),
        Command::Plan(args) => cmd_plan(args),
    }
}

/// Mount a sequence on a local executor and drive it until the seed set settles.
fn mount_ready(
    args: &SequenceArgs,
    pool: &mut LocalPool,
) -> anyhow::Result<ImageSequence<PixelCanvas>> {
    let config = SequenceConfig::from_path(&args.config)?;
    let root = match &args.assets {
        Some(root) => root.clone(),
        None => args
            .config
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf(),
    };
    let viewport = Viewport::new(args.width, args.height);
    let mut seq = ImageSequence::mount(
        config,
        Rc::new(FsFrameLoader::new(root)),
        PixelCanvas::new(viewport),
        Rc::new(pool.spawner()),
        MountOpts {
            viewport,
            container_offset: 0.0,
        },
    )?;
    pool.run_until_stalled();

    match seq.view() {
        View::Ready { .. } => Ok(seq),
        View::Loading { percent } => {
            let failed = seq.seed_progress().failed;
            anyhow::bail!("seed frames failed to load ({percent}% loaded, failed: {failed:?})")
        }
        View::Error { message } => anyhow::bail!(message),
        View::Disposed => anyhow::bail!("sequence disposed during mount"),
    }
}

fn render_at(
    seq: &mut ImageSequence<PixelCanvas>,
    pool: &mut LocalPool,
    progress: f64,
    out: &Path,
) -> anyhow::Result<()> {
    seq.seek_progress(progress)?;
    pool.run_until_stalled();
    let painted = seq
        .renderer()
        .last_rendered()
        .context("no frame has been painted")?;
    seq.renderer().canvas().save_png(out)?;
    eprintln!("wrote {} (frame {painted})", out.display());
    Ok(())
}

fn cmd_frame(args: FrameArgs) -> anyhow::Result<()> {
    let mut pool = LocalPool::new();
    let mut seq = mount_ready(&args.seq, &mut pool)?;
    render_at(&mut seq, &mut pool, args.progress, &args.out)?;
    seq.dispose();
    Ok(())
}

fn cmd_sweep(args: SweepArgs) -> anyhow::Result<()> {
    anyhow::ensure!(args.steps > 0, "--steps must be > 0");
    let mut pool = LocalPool::new();
    let mut seq = mount_ready(&args.seq, &mut pool)?;
    for step in 0..=args.steps {
        let progress = f64::from(step) / f64::from(args.steps);
        let out = args.out_dir.join(format!("step_{step:04}.png"));
        render_at(&mut seq, &mut pool, progress, &out)?;
    }
    let stats = seq.cache().stats();
    eprintln!(
        "cache: {} loads, {} hits, {} joined, {} failed",
        stats.loads_started, stats.hits, stats.joined, stats.loads_failed
    );
    seq.dispose();
    Ok(())
}

fn cmd_plan(args: PlanArgs) -> anyhow::Result<()> {
    let config = SequenceConfig::from_path(&args.config)?;
    let span = config.validate()?;
    let seeds: Vec<String> = span
        .evenly_spaced(config.seed_count)
        .into_iter()
        .map(|i| config.frame_path(i))
        .collect();
    let plan = serde_json::json!({
        "frame_count": span.count(),
        "first": config.frame_path(span.first()),
        "last": config.frame_path(span.last()),
        "seeds": seeds,
        "prefetch_radius": config.prefetch_radius,
        "pin_viewports": config.pin_viewports,
        "scrub_secs": config.scrub_secs,
    });
    println!("{}", serde_json::to_string_pretty(&plan)?);
    Ok(())
}
