use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use candle_core::{Device, IndexOp as _};
use clap::{Parser, Subcommand, ValueEnum};
use rand::SeedableRng as _;

use discoart::checkpoint::{DIFFUSION_512_SHA256, Verification, verify_file};
use discoart::image::ops::{from_rgb8, to_rgb8};
use discoart::models::reference::{PatchEmbedder, PixelDistance, ReferenceDenoiser};
use discoart::run::sink::sprite_sheet;
use discoart::{
    Collaborators, CutoutParams, Cutouts, EmbeddingModel, Orchestrator, OverviewInnerCutouts,
    PerlinMode, RandomCropCutouts, Resolution, RunConfig, SpriteSheetSink, StepsRemaining,
};

#[derive(Parser, Debug)]
#[command(name = "discoart", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate a run config and print its parsed prompts.
    Check(ConfigArgs),
    /// Print the per-step cutout schedule of a run config.
    Schedule(ConfigArgs),
    /// Render a Perlin starting image as a PNG.
    Perlin(PerlinArgs),
    /// Cut an image into views and write them as a contact sheet.
    Cutouts(CutoutsArgs),
    /// Check a checkpoint file against its SHA-256.
    Verify(VerifyArgs),
    /// Run guided sampling end to end with the untrained reference models.
    DryRun(DryRunArgs),
}

#[derive(Parser, Debug)]
struct ConfigArgs {
    /// Run config JSON (defaults when omitted).
    #[arg(long = "in")]
    in_path: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ModeChoice {
    Color,
    Gray,
    Mixed,
}

impl From<ModeChoice> for PerlinMode {
    fn from(m: ModeChoice) -> Self {
        match m {
            ModeChoice::Color => Self::Color,
            ModeChoice::Gray => Self::Gray,
            ModeChoice::Mixed => Self::Mixed,
        }
    }
}

#[derive(Parser, Debug)]
struct PerlinArgs {
    /// Image width in pixels.
    #[arg(long, default_value_t = 512)]
    width: u32,

    /// Image height in pixels.
    #[arg(long, default_value_t = 512)]
    height: u32,

    /// Channel layout of the two noise fields.
    #[arg(long, value_enum, default_value_t = ModeChoice::Mixed)]
    mode: ModeChoice,

    /// Random seed.
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum CutterChoice {
    /// Overviews plus inner crops.
    Overview,
    /// Augmented random crops.
    Random,
}

#[derive(Parser, Debug)]
struct CutoutsArgs {
    /// Input image.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Generator to use.
    #[arg(long, value_enum, default_value_t = CutterChoice::Overview)]
    kind: CutterChoice,

    /// Side of each view.
    #[arg(long, default_value_t = 224)]
    cut_size: usize,

    /// Overview count (overview generator).
    #[arg(long, default_value_t = 4)]
    overview: usize,

    /// Inner crop count (overview generator).
    #[arg(long, default_value_t = 12)]
    innercut: usize,

    /// Grayscale fraction of inner crops (overview generator).
    #[arg(long, default_value_t = 0.2)]
    ic_gray_p: f64,

    /// Inner crop size exponent (overview generator).
    #[arg(long, default_value_t = 1.0)]
    ic_pow: f64,

    /// View count (random generator).
    #[arg(long, default_value_t = 16)]
    cutn: usize,

    /// Disable augmentations.
    #[arg(long)]
    skip_augs: bool,

    /// Random seed.
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,
}

#[derive(Parser, Debug)]
struct VerifyArgs {
    /// Checkpoint file.
    path: PathBuf,

    /// Expected SHA-256 (the 512x512 diffusion checkpoint when omitted).
    #[arg(long, default_value = DIFFUSION_512_SHA256)]
    sha256: String,
}

#[derive(Parser, Debug)]
struct DryRunArgs {
    /// Run config JSON (defaults when omitted).
    #[arg(long = "in")]
    in_path: Option<PathBuf>,

    /// Output directory for progress sheets and final images.
    #[arg(long)]
    out_dir: PathBuf,

    /// Override the config's step count.
    #[arg(long)]
    steps: Option<usize>,

    /// Override the config's seed.
    #[arg(long)]
    seed: Option<u64>,

    /// Override the config's batch size.
    #[arg(long)]
    batch_size: Option<usize>,

    /// Input side of the reference embedders.
    #[arg(long, default_value_t = 64)]
    embed_size: usize,
}

fn main() -> anyhow::Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.cmd {
        Command::Check(args) => cmd_check(args),
        Command::Schedule(args) => cmd_schedule(args),
        Command::Perlin(args) => cmd_perlin(args),
        Command::Cutouts(args) => cmd_cutouts(args),
        Command::Verify(args) => cmd_verify(args),
        Command::DryRun(args) => cmd_dry_run(args),
    }
}

fn init_logging() {
    let level = std::env::var("DISCOART_LOG_LEVEL").unwrap_or_else(|_| "info".to_owned());
    let filter = tracing_subscriber::EnvFilter::try_new(&level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn read_config(path: Option<&Path>) -> anyhow::Result<RunConfig> {
    match path {
        Some(p) => RunConfig::from_path(p).with_context(|| format!("load config '{}'", p.display())),
        None => Ok(RunConfig::default()),
    }
}

fn write_png(path: &Path, img: &image::RgbImage) -> anyhow::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    image::save_buffer_with_format(
        path,
        img.as_raw(),
        img.width(),
        img.height(),
        image::ColorType::Rgb8,
        image::ImageFormat::Png,
    )
    .with_context(|| format!("write png '{}'", path.display()))?;
    eprintln!("wrote {}", path.display());
    Ok(())
}

fn cmd_check(args: ConfigArgs) -> anyhow::Result<()> {
    let cfg = read_config(args.in_path.as_deref())?;
    cfg.validate()?;
    let res = cfg.resolution()?;
    println!("resolution: {}x{}", res.width, res.height);
    println!("steps:      {} (skip {})", cfg.steps, cfg.skip_steps);
    println!("models:     {}", cfg.clip_models.join(", "));
    for p in cfg.prompts()? {
        println!("prompt:     {:>8.3}  {}", p.weight, p.text);
    }
    Ok(())
}

fn cmd_schedule(args: ConfigArgs) -> anyhow::Result<()> {
    let cfg = read_config(args.in_path.as_deref())?;
    let schedule = cfg.cutout_schedule()?;
    println!("{:>6} {:>9} {:>9} {:>9}", "step", "overview", "innercut", "gray_p");
    for step in 0..schedule.len() {
        let p = schedule.at(StepsRemaining(schedule.len() - 1 - step));
        println!(
            "{:>6} {:>9} {:>9} {:>9.3}",
            step, p.overview, p.innercut, p.ic_gray_p
        );
    }
    Ok(())
}

fn cmd_perlin(args: PerlinArgs) -> anyhow::Result<()> {
    let res = Resolution::new(args.width, args.height)?;
    let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(args.seed);
    let init = discoart::perlin_init(args.mode.into(), res, 1, &mut rng, &Device::Cpu)?;
    write_png(&args.out, &to_rgb8(&init.i(0)?)?)
}

fn cmd_cutouts(args: CutoutsArgs) -> anyhow::Result<()> {
    let img = image::open(&args.in_path)
        .with_context(|| format!("open image '{}'", args.in_path.display()))?
        .to_rgb8();
    let input = from_rgb8(&img, &Device::Cpu)?;
    let cutter: Box<dyn Cutouts> = match args.kind {
        CutterChoice::Overview => Box::new(OverviewInnerCutouts::new(
            args.cut_size,
            CutoutParams {
                overview: args.overview,
                innercut: args.innercut,
                ic_gray_p: args.ic_gray_p,
            },
            args.ic_pow,
            args.skip_augs,
        )?),
        CutterChoice::Random => Box::new(RandomCropCutouts::new(
            args.cut_size,
            args.cutn,
            args.skip_augs,
        )?),
    };
    let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(args.seed);
    let cuts = cutter.cut(&input, &mut rng)?.affine(2.0, -1.0)?;
    let frames = (0..cuts.dim(0)?)
        .map(|i| Ok(to_rgb8(&cuts.i(i)?)?))
        .collect::<anyhow::Result<Vec<_>>>()?;
    write_png(&args.out, &sprite_sheet(&frames)?)
}

fn cmd_verify(args: VerifyArgs) -> anyhow::Result<()> {
    match verify_file(&args.path, &args.sha256)? {
        Verification::Match => {
            println!("ok {}", args.path.display());
            Ok(())
        }
        Verification::Mismatch { actual } => anyhow::bail!(
            "sha256 mismatch for '{}': expected {}, got {actual}",
            args.path.display(),
            args.sha256
        ),
    }
}

fn cmd_dry_run(args: DryRunArgs) -> anyhow::Result<()> {
    let mut cfg = read_config(args.in_path.as_deref())?;
    if let Some(steps) = args.steps {
        cfg.steps = steps;
        cfg.skip_steps = cfg.skip_steps.min(steps.saturating_sub(1));
    }
    if args.seed.is_some() {
        cfg.seed = args.seed;
    }
    if let Some(n) = args.batch_size {
        cfg.batch_size = n;
    }

    let device = Device::Cpu;
    let denoiser = ReferenceDenoiser::new(0.5);
    let embedders = cfg
        .clip_models
        .iter()
        .map(|id| {
            let m = PatchEmbedder::new(id.as_str(), args.embed_size, 8, 64, &device)?;
            Ok(Arc::new(m) as Arc<dyn EmbeddingModel>)
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    let models = Collaborators {
        denoiser: &denoiser,
        embedders: &embedders,
        perceptual: Some(&PixelDistance),
    };
    let batch_name = if cfg.batch_name.is_empty() {
        "discoart".to_owned()
    } else {
        cfg.batch_name.clone()
    };
    let orch = Orchestrator::new(cfg, models, &device)?;
    let token = orch.cancel_token();
    ctrlc::set_handler(move || {
        tracing::warn!("interrupt received, stopping after the current step");
        token.cancel();
    })
    .context("install ctrl-c handler")?;
    let mut sink = SpriteSheetSink::new(&args.out_dir);
    let outcome = orch.run(&mut sink)?;

    for img in &outcome.images {
        let path = args.out_dir.join(format!("{batch_name}-{}.png", img.index.0));
        write_png(&path, &img.image)?;
    }
    for path in sink.written() {
        eprintln!("wrote {}", path.display());
    }
    eprintln!(
        "seed {} ({} image(s){})",
        outcome.base_seed,
        outcome.images.len(),
        if outcome.cancelled { ", cancelled" } else { "" }
    );
    Ok(())
}
