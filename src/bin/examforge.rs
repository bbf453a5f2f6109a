//! CLI binary for exam-forge.
//!
//! A thin shim over the library crate: `generate` maps flags to a
//! `GenerationRequest` + `GenerationConfig`, `crop` maps flags to region
//! requests and writes PNG files.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use exam_forge::config::{parse_provider, split_credentials};
use exam_forge::{
    extract_regions, generate_questions, BoundingBox, ExtractionConfig, GenerationConfig,
    GenerationProgressCallback, GenerationRequest, ProgressCallback, ProviderKind, QuestionType,
    RegionRequest,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// One bar across all batches; batches finish out of order, so lines are
/// printed above the bar as they complete.
struct CliProgressCallback {
    bar: ProgressBar,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(TICKS),
        );
        bar.set_prefix("Planning");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self {
            bar,
            errors: AtomicUsize::new(0),
        })
    }
}

impl GenerationProgressCallback for CliProgressCallback {
    fn on_generation_start(&self, requested: usize, batches: usize) {
        self.bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  \
                 [{bar:42.green/238}] {pos:>3}/{len} batches  ⏱ {elapsed_precise}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ")
            .tick_strings(TICKS),
        );
        self.bar.set_length(batches as u64);
        self.bar.set_prefix("Generating");
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("{requested} questions in {batches} batch(es)…"))
        ));
    }

    fn on_batch_complete(&self, batch: usize, total: usize, produced: usize) {
        self.bar.println(format!(
            "  {} Batch {:>2}/{:<2}  {}",
            green("✓"),
            batch + 1,
            total,
            dim(&format!("{produced:>3} questions")),
        ));
        self.bar.inc(1);
    }

    fn on_batch_error(&self, batch: usize, total: usize, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} Batch {:>2}/{:<2}  {}",
            red("✗"),
            batch + 1,
            total,
            red(&msg),
        ));
        self.bar.inc(1);
    }

    fn on_top_up(&self, shortfall: usize, requested: usize) {
        self.bar.inc_length(1);
        self.bar.println(format!(
            "  {} Short by {shortfall}; top-up batch of {requested}",
            cyan("⚠"),
        ));
    }

    fn on_generation_complete(&self, requested: usize, produced: usize) {
        self.bar.finish_and_clear();
        if produced == requested {
            eprintln!("{} {} questions generated", green("✔"), bold(&produced.to_string()));
        } else {
            eprintln!(
                "{} {}/{} questions generated  ({} batch error(s))",
                if produced == 0 { red("✘") } else { cyan("⚠") },
                bold(&produced.to_string()),
                requested,
                self.errors.load(Ordering::SeqCst),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # 30 single-choice questions, JSON to stdout
  examforge generate --topic "Projectile motion" --subject Physics --count 30

  # Numeric questions for a level, written to a file
  examforge generate -t Thermodynamics -s Chemistry -n 15 --type numeric \
      --level "Class 12" --difficulty 75 -o thermo.json

  # Crop two diagrams (fractional boxes) from page 3
  examforge crop paper.pdf --page 3 --region 0.1,0.2,0.5,0.3 --corners 0.1,0.6,0.9,0.95 -o diagrams/

ENVIRONMENT VARIABLES:
  EXAM_FORGE_API_KEYS     Comma-separated API keys, rotated round-robin
  GEMINI_API_KEY          Single Gemini key (fallback)
  OPENAI_API_KEY          Single OpenAI key (fallback)
  EXAM_FORGE_PROVIDER     gemini (default) or openai
  EXAM_FORGE_MODEL        Model ID override
  EXAM_FORGE_BASE_URL     Service base URL override
  PDFIUM_LIB_PATH         Path to libpdfium; pdftoppm is used if pdfium fails
"#;

/// Generate exam questions and crop PDF diagrams.
#[derive(Parser, Debug)]
#[command(
    name = "examforge",
    version,
    about = "Generate exam questions with an LLM and crop diagrams from PDFs",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "EXAM_FORGE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "EXAM_FORGE_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate questions for a topic.
    Generate(GenerateArgs),
    /// Crop regions from one PDF page into PNG files.
    Crop(CropArgs),
}

#[derive(Args, Debug)]
struct GenerateArgs {
    /// Topic the questions are about.
    #[arg(short, long)]
    topic: String,

    /// Subject, e.g. Physics.
    #[arg(short, long)]
    subject: String,

    /// Number of questions wanted.
    #[arg(short = 'n', long, default_value_t = 10,
          value_parser = clap::value_parser!(u32).range(1..=500))]
    count: u32,

    /// Grade or level, e.g. "Class 10".
    #[arg(long, default_value = "")]
    level: String,

    /// single_choice, multi_choice, true_false, numeric, descriptive.
    #[arg(long = "type", default_value = "single_choice")]
    question_type: QuestionType,

    /// Difficulty on a 1–100 scale.
    #[arg(long, default_value_t = 50,
          value_parser = clap::value_parser!(u8).range(1..=100))]
    difficulty: u8,

    /// Extra free-text instructions for the model.
    #[arg(long)]
    constraints: Option<String>,

    /// Comma-separated API keys (overrides the single-key variables).
    #[arg(long, env = "EXAM_FORGE_API_KEYS", hide_env_values = true)]
    api_keys: Option<String>,

    /// gemini or openai.
    #[arg(long, env = "EXAM_FORGE_PROVIDER")]
    provider: Option<String>,

    /// Model ID.
    #[arg(long, env = "EXAM_FORGE_MODEL")]
    model: Option<String>,

    /// Sampling temperature (0.0–2.0).
    #[arg(long, default_value_t = 0.7)]
    temperature: f32,

    /// Per-call timeout in seconds.
    #[arg(long, env = "EXAM_FORGE_TIMEOUT_SECS", default_value_t = 60,
          value_parser = clap::value_parser!(u64).range(1..))]
    api_timeout: u64,

    /// Write JSON here instead of stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Include batch reports and stats in the JSON output.
    #[arg(long)]
    report: bool,

    /// Disable progress bar.
    #[arg(long)]
    no_progress: bool,
}

#[derive(Args, Debug)]
struct CropArgs {
    /// Local PDF file path or HTTP/HTTPS URL.
    input: String,

    /// 1-indexed page number.
    #[arg(short, long, value_parser = clap::value_parser!(u32).range(1..))]
    page: u32,

    /// Region as x,y,width,height (fractions or pixels). Repeatable.
    #[arg(long = "region", value_name = "X,Y,W,H")]
    regions: Vec<String>,

    /// Region as x1,y1,x2,y2 (fractions or pixels). Repeatable.
    #[arg(long = "corners", value_name = "X1,Y1,X2,Y2")]
    corners: Vec<String>,

    /// Directory for PNG files.
    #[arg(short, long, default_value = ".")]
    output: PathBuf,

    /// Print JSON with data URIs instead of writing files.
    #[arg(long)]
    json: bool,

    /// pdfium upscale factor.
    #[arg(long, default_value_t = 2.0)]
    scale: f32,

    /// Resolution for the pdftoppm fallback.
    #[arg(long, default_value_t = 144)]
    dpi: u32,

    /// HTTP download timeout in seconds.
    #[arg(long, default_value_t = 120)]
    download_timeout: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs unless --verbose is set.
    let show_progress = !cli.quiet
        && matches!(&cli.command, Command::Generate(args) if !args.no_progress);
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Command::Generate(args) => run_generate(args, show_progress, cli.quiet).await,
        Command::Crop(args) => run_crop(args, cli.quiet).await,
    }
}

async fn run_generate(args: GenerateArgs, show_progress: bool, quiet: bool) -> Result<()> {
    let progress: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn GenerationProgressCallback>)
    } else {
        None
    };
    let config = build_generation_config(&args, progress)?;

    let mut request = GenerationRequest::new(&args.topic, &args.subject, args.count as usize)
        .level(&args.level)
        .question_type(args.question_type)
        .difficulty(args.difficulty);
    if let Some(ref c) = args.constraints {
        request = request.constraints(c);
    }

    let output = generate_questions(&request, &config)
        .await
        .context("Generation failed")?;

    let json = if args.report {
        serde_json::to_string_pretty(&output)
    } else {
        serde_json::to_string_pretty(&output.questions)
    }
    .context("Failed to serialise output")?;

    match args.output {
        Some(ref path) => {
            tokio::fs::write(path, json.as_bytes())
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            if !quiet {
                eprintln!(
                    "{}  {}/{} questions  {}ms  →  {}",
                    if output.stats.shortfall == 0 { green("✔") } else { cyan("⚠") },
                    output.stats.produced,
                    output.stats.requested,
                    output.stats.duration_ms,
                    bold(&path.display().to_string()),
                );
            }
        }
        None => println!("{json}"),
    }

    if !quiet && !show_progress {
        eprintln!(
            "Generated {}/{} questions in {}ms  {}",
            output.stats.produced,
            output.stats.requested,
            output.stats.duration_ms,
            dim(&format!(
                "({} batches, {} failed, {} duplicates removed{})",
                output.stats.batches,
                output.stats.failed_batches,
                output.stats.duplicates_removed,
                if output.stats.top_up_used { ", top-up" } else { "" }
            )),
        );
    }
    Ok(())
}

/// Environment first, then CLI flags on top.
fn build_generation_config(
    args: &GenerateArgs,
    progress: Option<ProgressCallback>,
) -> Result<GenerationConfig> {
    let mut config = GenerationConfig::from_env().context("Invalid configuration")?;

    if let Some(ref name) = args.provider {
        config.provider = parse_provider(name)?;
    }
    if let Some(ref keys) = args.api_keys {
        config.credentials = split_credentials(keys);
    }
    if config.credentials.is_empty() {
        let var = match config.provider {
            ProviderKind::Gemini => "GEMINI_API_KEY",
            ProviderKind::OpenAiCompatible => "OPENAI_API_KEY",
        };
        if let Ok(key) = std::env::var(var) {
            config.credentials = split_credentials(&key);
        }
    }
    if let Some(ref model) = args.model {
        config.model = Some(model.clone());
    }
    config.temperature = args.temperature.clamp(0.0, 2.0);
    config.api_timeout_secs = args.api_timeout;
    config.progress_callback = progress;
    Ok(config)
}

async fn run_crop(args: CropArgs, quiet: bool) -> Result<()> {
    let page = args.page as usize;
    let mut requests = Vec::new();
    for spec in &args.regions {
        let [x, y, w, h] = parse_quad(spec)?;
        requests.push(RegionRequest::new(page, BoundingBox::origin(x, y, w, h)));
    }
    for spec in &args.corners {
        let [x1, y1, x2, y2] = parse_quad(spec)?;
        requests.push(RegionRequest::new(page, BoundingBox::corners(x1, y1, x2, y2)));
    }
    if requests.is_empty() {
        anyhow::bail!("No regions given; pass --region or --corners at least once");
    }

    let config = ExtractionConfig::builder()
        .render_scale(args.scale)
        .fallback_dpi(args.dpi)
        .download_timeout_secs(args.download_timeout)
        .build()
        .context("Invalid configuration")?;

    let crops = extract_regions(&args.input, &requests, &config)
        .await
        .context("Extraction failed")?;

    if args.json {
        let items: Vec<_> = crops
            .iter()
            .map(|c| {
                json!({
                    "page": c.page,
                    "rect": c.rect,
                    "backend": c.backend,
                    "image": c.to_data_uri(),
                })
            })
            .collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&items).context("Failed to serialise output")?
        );
        return Ok(());
    }

    tokio::fs::create_dir_all(&args.output)
        .await
        .with_context(|| format!("Failed to create {}", args.output.display()))?;
    for (i, crop) in crops.iter().enumerate() {
        let path = args
            .output
            .join(format!("page{:03}-region{:02}.png", crop.page, i + 1));
        tokio::fs::write(&path, &crop.png)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        if !quiet {
            eprintln!(
                "  {} {}  {}",
                green("✓"),
                path.display(),
                dim(&format!(
                    "{}x{} via {}",
                    crop.rect.width, crop.rect.height, crop.backend
                )),
            );
        }
    }
    Ok(())
}

/// Parse `"a,b,c,d"` into four numbers.
fn parse_quad(spec: &str) -> Result<[f64; 4]> {
    let values: Vec<f64> = spec
        .split(',')
        .map(|v| {
            v.trim()
                .parse::<f64>()
                .with_context(|| format!("Invalid number '{}' in '{}'", v.trim(), spec))
        })
        .collect::<Result<_>>()?;
    match values.as_slice() {
        [a, b, c, d] => Ok([*a, *b, *c, *d]),
        _ => anyhow::bail!("Expected four comma-separated numbers, got '{}'", spec),
    }
}
