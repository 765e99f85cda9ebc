//! CLI for Backdrop - product photo background enhancement.

use anyhow::Context;
use backdrop::compose::{Composition, Corner, Subtitle, TitleSegment, Watermark, WatermarkSpec};
use backdrop::config::Config;
use backdrop::enhance::{AspectRatio, BackgroundStyle, EnhanceRequest, SourceImage};
use backdrop::usage::{local_today, UsageSummary};
use backdrop::{Color, GeminiEnhancer, GeminiModel, Studio};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "backdrop")]
#[command(about = "Re-background product photos with Gemini and add titles and watermarks")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Usage record location (overrides BACKDROP_USAGE_PATH)
    #[arg(long, global = true)]
    usage_path: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Replace the background of a product photo, then compose text and watermark
    Enhance(EnhanceArgs),

    /// Compose text and watermark onto an existing image without calling the model
    Compose(ComposeArgs),

    /// Show usage counters
    Stats,
}

#[derive(Args)]
struct EnhanceArgs {
    /// Product photo
    input: PathBuf,

    /// Output PNG path (default: <input stem>-enhanced.png)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Background treatment
    #[arg(short, long, value_enum, default_value = "default")]
    style: StyleArg,

    /// Color for the solid style, or the first gradient color
    #[arg(long)]
    color: Option<Color>,

    /// Second gradient color
    #[arg(long)]
    color2: Option<Color>,

    /// Replacement background image for the custom style
    #[arg(long)]
    background: Option<PathBuf>,

    /// Gemini model (flash or pro; overrides BACKDROP_MODEL)
    #[arg(long)]
    model: Option<String>,

    #[command(flatten)]
    compose: CompositionArgs,
}

#[derive(Args)]
struct ComposeArgs {
    /// Base image
    input: PathBuf,

    /// Output PNG path (default: <input stem>-enhanced.png)
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[command(flatten)]
    compose: CompositionArgs,
}

#[derive(Args)]
struct CompositionArgs {
    /// Target aspect ratio
    #[arg(short, long, default_value = "1:1")]
    aspect_ratio: AspectRatio,

    /// Title segment as TEXT or TEXT:#rrggbb (repeatable, drawn in order)
    #[arg(short, long = "title", value_parser = parse_segment)]
    title: Vec<TitleSegment>,

    /// Subtitle text
    #[arg(long)]
    subtitle: Option<String>,

    /// Subtitle color
    #[arg(long, default_value = "#ffffff")]
    subtitle_color: Color,

    /// Watermark image
    #[arg(long)]
    watermark: Option<PathBuf>,

    /// Watermark opacity (0-1)
    #[arg(long, default_value_t = 0.7)]
    watermark_opacity: f32,

    /// Watermark width as a fraction of the image width
    #[arg(long, default_value_t = 0.2)]
    watermark_size: f32,

    /// Watermark corner
    #[arg(long, default_value = "bottom-right")]
    watermark_corner: Corner,

    /// Font for title text (overrides BACKDROP_FONT)
    #[arg(long)]
    font: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StyleArg {
    Default,
    Solid,
    Gradient,
    Blur,
    Custom,
}

fn parse_segment(value: &str) -> Result<TitleSegment, String> {
    if let Some((text, color)) = value.rsplit_once(':') {
        if let Ok(color) = color.parse::<Color>() {
            return Ok(TitleSegment::new(text, color));
        }
    }
    Ok(TitleSegment::new(value, Color::WHITE))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = Config::from_env();
    if let Some(path) = cli.usage_path.clone() {
        config.usage_path = Some(path);
    }
    backdrop::logging::init_logging(&config.logging);

    match cli.command {
        Commands::Enhance(args) => enhance(args, config, cli.json).await,
        Commands::Compose(args) => compose(args, config, cli.json),
        Commands::Stats => stats(&config, cli.json),
    }
}

fn build_style(args: &EnhanceArgs) -> anyhow::Result<BackgroundStyle> {
    Ok(match args.style {
        StyleArg::Default => BackgroundStyle::Default,
        StyleArg::Blur => BackgroundStyle::Blur,
        StyleArg::Solid => BackgroundStyle::Solid {
            color: args.color.context("--color is required for the solid style")?,
        },
        StyleArg::Gradient => BackgroundStyle::Gradient {
            from: args.color.context("--color is required for the gradient style")?,
            to: args.color2.context("--color2 is required for the gradient style")?,
        },
        StyleArg::Custom => {
            let path = args
                .background
                .as_ref()
                .context("--background is required for the custom style")?;
            BackgroundStyle::Custom {
                image: SourceImage::from_path(path)
                    .with_context(|| format!("reading {}", path.display()))?,
            }
        }
    })
}

fn build_composition(args: &CompositionArgs) -> anyhow::Result<Composition> {
    let mut composition = Composition::new(args.aspect_ratio);
    composition.title = args.title.clone();
    composition.subtitle = args
        .subtitle
        .as_ref()
        .map(|text| Subtitle::new(text, args.subtitle_color));
    if let Some(path) = &args.watermark {
        composition.watermark = Some(Watermark {
            image: SourceImage::from_path(path)
                .with_context(|| format!("reading {}", path.display()))?,
            spec: WatermarkSpec {
                opacity: args.watermark_opacity,
                size: args.watermark_size,
                corner: args.watermark_corner,
            },
        });
    }
    Ok(composition)
}

fn resolve_output(input: &Path, source: &SourceImage, output: Option<PathBuf>) -> PathBuf {
    output.unwrap_or_else(|| input.with_file_name(source.output_file_name()))
}

fn load_typeface(
    config: &mut Config,
    args: &CompositionArgs,
    composition: &Composition,
) -> anyhow::Result<Option<backdrop::Typeface>> {
    if !composition.has_text() {
        return Ok(None);
    }
    if let Some(font) = &args.font {
        config.font_path = Some(font.clone());
    }
    let face = config.typeface()?;
    if face.is_none() {
        anyhow::bail!("no system font found; pass --font or set BACKDROP_FONT");
    }
    Ok(face)
}

async fn enhance(args: EnhanceArgs, mut config: Config, json_output: bool) -> anyhow::Result<()> {
    // Fail before touching any file when the credential is missing.
    let api_key = config.require_api_key()?.to_string();
    let model: GeminiModel = args.model.as_deref().unwrap_or(&config.model).parse()?;

    let style = build_style(&args)?;
    let composition = build_composition(&args.compose)?;
    let typeface = load_typeface(&mut config, &args.compose, &composition)?;

    let source = SourceImage::from_path(&args.input)
        .with_context(|| format!("reading {}", args.input.display()))?;
    let output = resolve_output(&args.input, &source, args.output);
    let request = EnhanceRequest::new(source)
        .with_style(style)
        .with_aspect_ratio(args.compose.aspect_ratio);

    let enhancer = GeminiEnhancer::builder().api_key(api_key).model(model).build()?;
    let mut studio = Studio::new(enhancer);
    if let Some(store) = config.usage_store() {
        studio = studio.with_usage_store(store);
    }

    let (enhancement, png) = match studio
        .enhance_and_compose(&request, &composition, typeface.as_ref())
        .await
    {
        Ok(done) => done,
        Err(e) => anyhow::bail!(e.user_message()),
    };

    std::fs::write(&output, &png).with_context(|| format!("writing {}", output.display()))?;

    if json_output {
        let result = serde_json::json!({
            "type": "enhance",
            "success": true,
            "output": output.display().to_string(),
            "size_bytes": png.len(),
            "model": enhancement.image.metadata.model,
            "duration_ms": enhancement.image.metadata.duration_ms,
            "usage": enhancement.usage,
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("Enhanced image: {} ({} bytes)", output.display(), png.len());
        if let Some(duration) = enhancement.image.metadata.duration_ms {
            println!("Duration: {}ms", duration);
        }
        if let Some(usage) = enhancement.usage {
            println!("Enhancements today: {} (total {})", usage.today, usage.total);
        }
    }

    Ok(())
}

fn compose(args: ComposeArgs, mut config: Config, json_output: bool) -> anyhow::Result<()> {
    let composition = build_composition(&args.compose)?;
    let typeface = load_typeface(&mut config, &args.compose, &composition)?;

    let base = SourceImage::from_path(&args.input)
        .with_context(|| format!("reading {}", args.input.display()))?;
    let png = composition
        .apply(&base.data, typeface.as_ref())
        .map_err(|e| anyhow::anyhow!(e.user_message()))?;

    let output = resolve_output(&args.input, &base, args.output);
    std::fs::write(&output, &png).with_context(|| format!("writing {}", output.display()))?;

    if json_output {
        let result = serde_json::json!({
            "type": "compose",
            "success": true,
            "output": output.display().to_string(),
            "size_bytes": png.len(),
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("Composed image: {} ({} bytes)", output.display(), png.len());
    }

    Ok(())
}

fn stats(config: &Config, json_output: bool) -> anyhow::Result<()> {
    let summary = config
        .usage_store()
        .map(|store| store.summary(local_today()))
        .unwrap_or_default();
    print_summary(&summary, json_output)
}

fn print_summary(summary: &UsageSummary, json_output: bool) -> anyhow::Result<()> {
    if json_output {
        println!("{}", serde_json::to_string_pretty(summary)?);
    } else {
        println!("Enhancements:");
        println!("  today:       {}", summary.today);
        println!("  yesterday:   {}", summary.yesterday);
        println!("  last 7 days: {}", summary.last_7_days);
        println!("  this month:  {}", summary.this_month);
        println!("  total:       {}", summary.total);
    }
    Ok(())
}
