//! CLI binary for menu-visualizer.
//!
//! A headless shell over the library: loads menu photos into a session,
//! runs the cache-gated extraction and the image enrichment, then prints
//! the dish list and optionally saves the dish pictures.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use menu_visualizer::{
    Dish, EnrichmentEvent, EnrichmentPolicy, Image, ImageStrategy, MenuPipeline, PipelineConfig,
    SessionState,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
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

fn spinner(prefix: &'static str, message: &'static str) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS),
    );
    bar.set_prefix(prefix);
    bar.set_message(message);
    bar.enable_steady_tick(Duration::from_millis(80));
    bar
}

fn dish_bar(total: usize) -> ProgressBar {
    let bar = ProgressBar::new(total as u64);
    bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} dishes  \
             ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS),
    );
    bar.set_prefix("Illustrating");
    bar.enable_steady_tick(Duration::from_millis(80));
    bar
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Read a menu and generate a picture for every dish
  menuviz menu.jpg

  # Two photos, real photos from image search, saved to ./dishes
  menuviz page1.jpg page2.jpg --strategy search --out dishes

  # One dish at a time with a pause in between (gentle on quotas)
  menuviz menu.jpg --sequential

  # Machine-readable output
  menuviz menu.jpg --json > menu.json

  # Read the menu with another vision model through edgequake-llm
  menuviz menu.jpg --provider openai --model gpt-4.1-mini

CREDENTIALS (environment first, then menuviz.toml):
  GEMINI_API_KEY                   Extraction and image generation
  GOOGLE_CUSTOM_SEARCH_API_KEY     Image search strategy
  GOOGLE_CUSTOM_SEARCH_ENGINE_ID   Image search strategy (cx)
  MENUVIZ_CONFIG                   Path of an alternative credentials file

  menuviz.toml is a flat TOML file:
    GEMINI_API_KEY = "AIza..."

NOTES:
  Only the first photo is read by the vision model.
"#;

/// Turn menu photos into an illustrated dish list.
#[derive(Parser, Debug)]
#[command(
    name = "menuviz",
    version,
    about = "Turn menu photos into an illustrated dish list",
    long_about = "Read a restaurant menu photo with a vision model, then find or generate a \
picture for every dish. Extraction uses Gemini directly or any edgequake-llm provider.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Menu photos (JPEG, PNG). Only the first one is extracted.
    #[arg(required = true)]
    images: Vec<PathBuf>,

    /// Where dish images come from.
    #[arg(long, env = "MENUVIZ_STRATEGY", value_enum, default_value = "generation")]
    strategy: StrategyArg,

    /// Process dishes one at a time with a one-second pause.
    #[arg(long, env = "MENUVIZ_SEQUENTIAL", conflicts_with = "concurrency")]
    sequential: bool,

    /// Dish images fetched at once.
    #[arg(short, long, env = "MENUVIZ_CONCURRENCY",
          value_parser = clap::value_parser!(u16).range(1..=16))]
    concurrency: Option<u16>,

    /// Save dish images into this directory.
    #[arg(short, long, env = "MENUVIZ_OUT")]
    out: Option<PathBuf>,

    /// Override the restaurant name read from the menu.
    #[arg(long)]
    restaurant: Option<String>,

    /// Extraction through edgequake-llm: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Model for --provider, or the Gemini extraction model.
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// Credentials file (default: $MENUVIZ_CONFIG or ./menuviz.toml).
    #[arg(long)]
    credentials: Option<PathBuf>,

    /// Skip dish images; only print the extracted menu.
    #[arg(long)]
    no_images: bool,

    /// Output JSON instead of a text listing.
    #[arg(long, env = "MENUVIZ_JSON")]
    json: bool,

    /// Disable progress bars.
    #[arg(long, env = "MENUVIZ_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "MENUVIZ_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "MENUVIZ_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum StrategyArg {
    Generation,
    Search,
}

impl From<StrategyArg> for ImageStrategy {
    fn from(v: StrategyArg) -> Self {
        match v {
            StrategyArg::Generation => ImageStrategy::Generation,
            StrategyArg::Search => ImageStrategy::Search,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bars carry the feedback; library INFO logs would tear them.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
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

    let config = build_config(&cli)?;
    let pipeline = MenuPipeline::from_config(&config).context("Failed to set up the pipeline")?;

    // ── Capture ──────────────────────────────────────────────────────────
    let mut session = SessionState::new();
    for path in &cli.images {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        session.add_image(Image::from_bytes(bytes));
    }
    session.advance().context("No menu photos")?;

    // ── Extract ──────────────────────────────────────────────────────────
    let bar = show_progress.then(|| spinner("Reading", "extracting dishes from the menu…"));
    let outcome = pipeline.extract_for_session(&mut session, false).await;
    if let Some(bar) = bar {
        bar.finish_and_clear();
    }
    outcome.context("Menu extraction failed")?;

    if let Some(ref name) = cli.restaurant {
        session.set_restaurant_name(Some(name.clone()));
    }
    session.advance().context("Extraction produced no result")?;

    if session.dishes().is_empty() {
        if !cli.quiet {
            eprintln!(
                "{} No dishes found. Try a sharper, straighter photo of the menu.",
                red("✘")
            );
        }
        return print_menu(&cli, &session, &BTreeMap::new());
    }

    if !cli.quiet && !cli.json {
        eprintln!(
            "{} {}",
            cyan("◆"),
            bold(&format!(
                "{} dishes{}",
                session.dishes().len(),
                session
                    .restaurant_name()
                    .map(|n| format!(" at {n}"))
                    .unwrap_or_default()
            ))
        );
    }

    // ── Enrich ───────────────────────────────────────────────────────────
    if !cli.no_images {
        let bar = show_progress.then(|| dish_bar(session.dishes().len()));
        let summary = pipeline
            .run_enrichment(&mut session, |event, _| {
                let (Some(bar), EnrichmentEvent::DishUpdated(dish)) = (&bar, event) else {
                    return;
                };
                if dish.is_image_loading {
                    bar.set_message(dish.name.clone());
                    return;
                }
                let mark = if dish.image.is_some() {
                    green("✓")
                } else {
                    red("✗")
                };
                bar.println(format!("  {} {}", mark, dish.name));
                bar.inc(1);
            })
            .await;
        if let Some(bar) = bar {
            bar.finish_and_clear();
        }

        if !cli.quiet && !cli.json {
            eprintln!(
                "{} {}/{} dishes illustrated  {}",
                if summary.flagged() == 0 {
                    green("✔")
                } else {
                    cyan("⚠")
                },
                summary.with_image,
                summary.total,
                dim(&format!("{:.1}s", summary.duration_ms as f64 / 1000.0)),
            );
        }
    }

    // ── Output ───────────────────────────────────────────────────────────
    let saved = match cli.out {
        Some(ref dir) => save_images(dir, session.dishes()).await?,
        None => BTreeMap::new(),
    };
    print_menu(&cli, &session, &saved)
}

/// Map CLI args to `PipelineConfig`.
fn build_config(cli: &Cli) -> Result<PipelineConfig> {
    let policy = if cli.sequential {
        EnrichmentPolicy::sequential()
    } else {
        EnrichmentPolicy::BoundedParallel {
            max_in_flight: cli.concurrency.map(usize::from).unwrap_or(3),
        }
    };

    let mut builder = PipelineConfig::builder()
        .image_strategy(cli.strategy.into())
        .enrichment_policy(policy);

    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.clone());
        if let Some(ref model) = cli.model {
            builder = builder.model(model.clone());
        }
    } else if let Some(ref model) = cli.model {
        builder = builder.extraction_model(model.clone());
    }
    if let Some(ref path) = cli.credentials {
        builder = builder.credentials_path(path.clone());
    }

    builder.build().context("Invalid configuration")
}

/// Write every dish image to `dir`, returning the file name per dish index.
async fn save_images(dir: &Path, dishes: &[Dish]) -> Result<BTreeMap<usize, String>> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create {}", dir.display()))?;

    let mut saved = BTreeMap::new();
    for (i, dish) in dishes.iter().enumerate() {
        let Some(ref image) = dish.image else {
            continue;
        };
        let name = format!("{:02}-{}.{}", i + 1, slug(&dish.name), image.extension());
        tokio::fs::write(dir.join(&name), &image.bytes)
            .await
            .with_context(|| format!("Failed to write {name}"))?;
        saved.insert(i, name);
    }
    Ok(saved)
}

fn slug(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_alphanumeric() {
            out.extend(c.to_lowercase());
        } else if !out.ends_with('-') && !out.is_empty() {
            out.push('-');
        }
    }
    let trimmed = out.trim_end_matches('-');
    if trimmed.is_empty() {
        "dish".to_string()
    } else {
        trimmed.to_string()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MenuView<'a> {
    restaurant_name: Option<&'a str>,
    dishes: Vec<DishView<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DishView<'a> {
    #[serde(flatten)]
    dish: &'a Dish,
    has_image: bool,
    image_load_error: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_file: Option<&'a str>,
}

fn print_menu(cli: &Cli, session: &SessionState, saved: &BTreeMap<usize, String>) -> Result<()> {
    if cli.json {
        let view = MenuView {
            restaurant_name: session.restaurant_name(),
            dishes: session
                .dishes()
                .iter()
                .enumerate()
                .map(|(i, dish)| DishView {
                    dish,
                    has_image: dish.image.is_some(),
                    image_load_error: dish.image_load_error,
                    image_file: saved.get(&i).map(String::as_str),
                })
                .collect(),
        };
        println!(
            "{}",
            serde_json::to_string_pretty(&view).context("Failed to serialise menu")?
        );
        return Ok(());
    }

    if let Some(name) = session.restaurant_name() {
        println!("# {name}\n");
    }

    // Dishes without a section go last, under "Other".
    let mut sections = session.sections();
    sections.push(String::new());
    for section in sections {
        let in_section: Vec<(usize, &Dish)> = session
            .dishes()
            .iter()
            .enumerate()
            .filter(|(_, d)| d.section.as_deref().unwrap_or("") == section)
            .collect();
        if in_section.is_empty() {
            continue;
        }
        println!("## {}", if section.is_empty() { "Other" } else { section.as_str() });
        for (i, dish) in in_section {
            let mut line = format!("- {}", dish.name);
            if let Some(ref price) = dish.price {
                line.push_str(&format!("  {price}"));
            }
            if let Some(file) = saved.get(&i) {
                line.push_str(&format!("  [{file}]"));
            } else if dish.image_load_error {
                line.push_str("  (no image)");
            }
            println!("{line}");
        }
        println!();
    }
    Ok(())
}
