//! Waveshop command line
//!
//! Decode a file, run it through an effect chain and write WAV; analyze a
//! file; process many files through the batch queue; manage export presets.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use waveshop_analysis::BeatDetector;
use waveshop_audio::effects::{LimiterParams, PassFilter, ReverbParams};
use waveshop_audio::{transform, Effect, EffectChain, RenderSession, SampleBuffer};
use waveshop_library::{
    BatchQueue, BatchSummary, ExportConfig, Exporter, FileStore, JobStatus, MediaLoader,
    PresetList,
};

#[derive(Parser)]
#[command(author, version, about = "Offline audio effects, analysis and WAV export")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process one file and write the result
    Render(RenderArgs),
    /// Print tempo, loudness and sound regions of a file
    Analyze(AnalyzeArgs),
    /// Process several files into a directory
    Batch(BatchArgs),
    /// Manage saved export presets
    #[command(subcommand)]
    Preset(PresetCommand),
}

#[derive(Args, Clone)]
struct EffectArgs {
    /// JSON file with an effect chain, applied before the flags below
    #[arg(long)]
    chain: Option<PathBuf>,
    /// High-pass cutoff in Hz
    #[arg(long)]
    highpass: Option<f64>,
    /// Low-pass cutoff in Hz
    #[arg(long)]
    lowpass: Option<f64>,
    /// Gain change in dB
    #[arg(long)]
    gain_db: Option<f32>,
    /// Reverb decay in seconds
    #[arg(long)]
    reverb: Option<f64>,
    /// Reverb wet/dry mix
    #[arg(long, default_value_t = 0.3)]
    reverb_mix: f32,
    /// Seed for a reproducible reverb impulse
    #[arg(long)]
    seed: Option<u64>,
    /// Peak normalization level
    #[arg(long)]
    normalize: Option<f32>,
    /// Hard limit threshold
    #[arg(long)]
    limit: Option<f32>,
    /// Fade-in length in seconds
    #[arg(long, default_value_t = 0.0)]
    fade_in: f64,
    /// Fade-out length in seconds
    #[arg(long, default_value_t = 0.0)]
    fade_out: f64,
}

#[derive(Args, Clone)]
struct OutputArgs {
    /// Export preset name (overrides the flags below)
    #[arg(long)]
    preset: Option<String>,
    /// 16, 24 or 32 (float)
    #[arg(long, default_value_t = 16)]
    bit_depth: u16,
    /// Output sample rate
    #[arg(long)]
    rate: Option<u32>,
    /// Output channel count (1 or 2)
    #[arg(long)]
    channels: Option<u16>,
    /// Add TPDF dither to integer output
    #[arg(long)]
    dither: bool,
}

#[derive(Args)]
struct RenderArgs {
    input: PathBuf,
    output: PathBuf,
    #[command(flatten)]
    effects: EffectArgs,
    #[command(flatten)]
    output_args: OutputArgs,
}

#[derive(Args)]
struct AnalyzeArgs {
    input: PathBuf,
    /// Level below which a frame counts as silent
    #[arg(long, default_value_t = 0.01)]
    silence_threshold: f32,
    /// Shortest silence (seconds) that splits two sound regions
    #[arg(long, default_value_t = 0.5)]
    min_silence: f64,
}

#[derive(Args)]
struct BatchArgs {
    out_dir: PathBuf,
    #[arg(required = true)]
    inputs: Vec<PathBuf>,
    #[command(flatten)]
    effects: EffectArgs,
    #[command(flatten)]
    output_args: OutputArgs,
}

#[derive(Subcommand)]
enum PresetCommand {
    /// List saved presets
    List,
    /// Save output settings under a name
    Save {
        name: String,
        #[command(flatten)]
        output_args: OutputArgs,
    },
    /// Delete a preset
    Remove { name: String },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init()
        .ok();

    let cli = Cli::parse();
    match cli.command {
        Commands::Render(args) => execute_render(args),
        Commands::Analyze(args) => execute_analyze(args),
        Commands::Batch(args) => execute_batch(args),
        Commands::Preset(command) => execute_preset(command),
    }
}

fn build_chain(args: &EffectArgs) -> Result<EffectChain> {
    let mut chain = match &args.chain {
        Some(path) => {
            let json = fs::read_to_string(path)
                .with_context(|| format!("failed to read chain file {}", path.display()))?;
            serde_json::from_str(&json)
                .with_context(|| format!("{} is not a valid effect chain", path.display()))?
        }
        None => EffectChain::new(),
    };

    if let Some(freq) = args.highpass {
        chain.push(Effect::HighPass(PassFilter::new(freq)?));
    }
    if let Some(freq) = args.lowpass {
        chain.push(Effect::LowPass(PassFilter::new(freq)?));
    }
    if let Some(db) = args.gain_db {
        chain.push(Effect::Gain { db });
    }
    if let Some(decay) = args.reverb {
        let mut params = ReverbParams::new(decay, args.reverb_mix)?;
        if let Some(seed) = args.seed {
            params = params.with_seed(seed);
        }
        chain.push(Effect::Reverb(params));
    }
    if let Some(level) = args.normalize {
        chain.push(Effect::Normalize { level });
    }
    if let Some(threshold) = args.limit {
        chain.push(Effect::Limiter(LimiterParams::new(threshold)?));
    }
    if args.fade_in > 0.0 || args.fade_out > 0.0 {
        chain.push(Effect::Fade {
            fade_in: args.fade_in,
            fade_out: args.fade_out,
        });
    }

    chain.validate()?;
    Ok(chain)
}

fn export_config(args: &OutputArgs) -> Result<ExportConfig> {
    if let Some(name) = &args.preset {
        let presets = PresetList::load(&FileStore::default_location())?;
        return presets
            .get(name)
            .cloned()
            .with_context(|| format!("no preset named {name:?}"));
    }
    let config = ExportConfig {
        bit_depth: Some(args.bit_depth),
        sample_rate: args.rate,
        channels: args.channels,
        dithering: args.dither,
        ..ExportConfig::default()
    };
    config.validate()?;
    Ok(config)
}

fn process_file(
    session: &RenderSession,
    chain: &EffectChain,
    exporter: &Exporter,
    config: &ExportConfig,
    input: &Path,
    output: &Path,
    progress: &mut dyn FnMut(f32),
) -> Result<()> {
    let loaded = MediaLoader::new()
        .load(input)
        .with_context(|| format!("failed to decode {}", input.display()))?;
    progress(30.0);

    let rendered = session.render(chain, &loaded.buffer)?;
    progress(70.0);

    let bytes = exporter.export(&rendered, config)?;
    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(output, bytes)
        .with_context(|| format!("failed to write {}", output.display()))?;
    Ok(())
}

fn execute_render(args: RenderArgs) -> Result<()> {
    let chain = build_chain(&args.effects)?;
    let config = export_config(&args.output_args)?;
    let session = RenderSession::new();

    process_file(
        &session,
        &chain,
        &Exporter::new(),
        &config,
        &args.input,
        &args.output,
        &mut |_: f32| {},
    )?;
    println!("Wrote {}", args.output.display());
    Ok(())
}

fn execute_analyze(args: AnalyzeArgs) -> Result<()> {
    let loaded = MediaLoader::new()
        .load(&args.input)
        .with_context(|| format!("failed to decode {}", args.input.display()))?;
    let buffer: &SampleBuffer = &loaded.buffer;

    let beats = BeatDetector::new(buffer.sample_rate())?.detect(buffer.channel(0)?);
    let loudness = transform::estimate_loudness(buffer);
    let regions = transform::detect_silence(buffer, args.silence_threshold, args.min_silence)?;

    println!("File:       {}", args.input.display());
    if let Some(title) = &loaded.metadata.title {
        println!("Title:      {title}");
    }
    println!(
        "Format:     {} ch, {} Hz, {:.2} s",
        buffer.num_channels(),
        buffer.sample_rate(),
        buffer.duration_secs()
    );
    println!("Tempo:      {:.1} BPM (confidence {:.2})", beats.bpm, beats.confidence);
    println!("Loudness:   {loudness:.1} dB (approx.)");
    println!("Peak:       {:.3}", buffer.peak());
    println!("Sound regions:");
    for region in &regions {
        println!("  {:>8.3} s - {:>8.3} s", region.start, region.end);
    }
    Ok(())
}

fn execute_batch(args: BatchArgs) -> Result<()> {
    let chain = build_chain(&args.effects)?;
    let config = export_config(&args.output_args)?;
    let session = RenderSession::new();
    let exporter = Exporter::new();
    fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("failed to create {}", args.out_dir.display()))?;

    let mut queue: BatchQueue<PathBuf, PathBuf> = BatchQueue::new();
    queue.set_observer(|job| match job.status {
        JobStatus::Processing => info!(input = %job.input.display(), progress = job.progress, "processing"),
        JobStatus::Error => warn!(
            input = %job.input.display(),
            error = job.error.as_deref().unwrap_or(""),
            "failed"
        ),
        JobStatus::Complete => info!(input = %job.input.display(), "done"),
        JobStatus::Pending => {}
    });
    for input in args.inputs {
        queue.enqueue(input);
    }

    let extension = config.format.extension();
    let BatchSummary { completed, failed } = queue.process_all(|input, progress| {
        let stem = input
            .file_stem()
            .with_context(|| format!("{} has no file name", input.display()))?;
        let output = args.out_dir.join(stem).with_extension(extension);
        process_file(&session, &chain, &exporter, &config, input, &output, progress)?;
        Ok::<PathBuf, anyhow::Error>(output)
    });

    println!("{completed} file(s) written, {failed} failed");
    if failed > 0 {
        bail!("{failed} file(s) failed");
    }
    Ok(())
}

fn execute_preset(command: PresetCommand) -> Result<()> {
    let mut store = FileStore::default_location();
    let mut presets = PresetList::load(&store)?;

    match command {
        PresetCommand::List => {
            if presets.is_empty() {
                println!("No presets saved in {}", store.dir().display());
            }
            for name in presets.names() {
                println!("{name}");
            }
            return Ok(());
        }
        PresetCommand::Save { name, output_args } => {
            let config = export_config(&OutputArgs {
                preset: None,
                ..output_args
            })?;
            presets.add(name.clone(), config)?;
            println!("Saved preset {name:?}");
        }
        PresetCommand::Remove { name } => {
            if presets.remove(&name).is_none() {
                println!("No preset named {name:?}");
                return Ok(());
            }
            println!("Removed preset {name:?}");
        }
    }

    presets.save(&mut store)?;
    Ok(())
}
