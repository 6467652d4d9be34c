use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info};
use simplelog::{Config, LevelFilter, WriteLogger};

use citeview::preview::{
    Bitmap, CitationSurface, PageRenderer, PreviewScheduler, Thumbnail, derive_key,
};
use citeview::settings::{self, Settings};
use citeview::transcript::load_transcript;

/// Render page previews for the citations in a chat transcript
#[derive(Parser, Debug)]
#[command(name = "citeview", version, about)]
struct Cli {
    /// JSON transcript (array of {role, text, documents}) or raw answer with --raw
    transcript: PathBuf,

    /// Treat the input as one raw tagged backend answer
    #[arg(long)]
    raw: bool,

    /// Write rendered previews as PNG files into this directory
    #[arg(long)]
    out: Option<PathBuf>,

    /// Give up waiting for renders after this many seconds
    #[arg(long, default_value_t = 60)]
    timeout_secs: u64,

    /// Settings file (defaults to the user config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log file
    #[arg(long, default_value = "citeview.log")]
    log_file: PathBuf,

    /// Log at debug level regardless of settings
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    better_panic::install();
    let cli = Cli::parse();

    // Settings pick the log level, so they load before the logger exists
    let settings = settings::load_settings(cli.config.as_deref());
    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        settings.level_filter()
    };
    WriteLogger::init(
        level,
        Config::default(),
        File::create(&cli.log_file)
            .with_context(|| format!("Failed to create log file {:?}", cli.log_file))?,
    )?;

    info!("Starting citeview on {:?}", cli.transcript);
    let res = run(&cli, &settings);
    if let Err(err) = &res {
        error!("Application error: {err:?}");
    }
    info!("Shutting down citeview");
    res
}

fn run(cli: &Cli, settings: &Settings) -> Result<()> {
    let messages = load_transcript(&cli.transcript, cli.raw)?;
    let renderer = build_renderer(settings)?;
    let scheduler =
        PreviewScheduler::with_config(renderer, settings.render_workers, settings.preview_store());
    let mut surface = CitationSurface::new(scheduler);

    // Replay the chat as it happened: the list grows one message at a time and
    // the surface sees the whole list on every change.
    for len in 1..=messages.len() {
        let started = surface.on_messages_changed(&messages[..len]);
        if started > 0 {
            info!("Message {len}: started {started} renders");
        }
        surface.sync();
    }

    let settled = surface
        .scheduler_mut()
        .wait_until_settled(Duration::from_secs(cli.timeout_secs));
    if !settled {
        info!("Timed out with {} renders in flight", surface.scheduler().in_flight());
    }

    if let Some(out) = &cli.out {
        fs::create_dir_all(out).with_context(|| format!("Failed to create {out:?}"))?;
    }

    let mut distinct = BTreeMap::new();
    for citation in messages.iter().flat_map(|m| m.citations.iter()) {
        distinct.entry(derive_key(citation)).or_insert(citation);
    }

    for (key, citation) in distinct {
        let detail = match surface.thumbnail(citation) {
            Thumbnail::Image(small) => {
                if let Some(out) = &cli.out {
                    write_preview(out, &key.joined(), "small", &small)?;
                    if let Some(large) = surface.select_for_modal(citation) {
                        write_preview(out, &key.joined(), "large", &large)?;
                    }
                }
                format!(" {}x{}", small.width_px, small.height_px)
            }
            Thumbnail::External {
                locator, reason, ..
            } => format!(" {reason} (open {locator})"),
            Thumbnail::Loading | Thumbnail::Idle => String::new(),
        };
        let state = surface.scheduler().state(citation);
        println!(
            "{} p.{} [{}]: {}{detail}",
            citation.title,
            key.page,
            key.locator,
            state.label()
        );
    }

    Ok(())
}

fn write_preview(out: &Path, key: &str, size: &str, bitmap: &Bitmap) -> Result<()> {
    let name = format!("{:x}-{size}.png", md5::compute(key.as_bytes()));
    let path = out.join(name);
    fs::write(&path, &bitmap.png).with_context(|| format!("Failed to write {path:?}"))?;
    Ok(())
}

#[cfg(feature = "pdf")]
fn build_renderer(settings: &Settings) -> Result<Arc<dyn PageRenderer>> {
    use citeview::preview::MupdfRenderer;

    Ok(Arc::new(MupdfRenderer::new(
        settings.scales(),
        settings.fetch_timeout(),
    )))
}

#[cfg(not(feature = "pdf"))]
fn build_renderer(_settings: &Settings) -> Result<Arc<dyn PageRenderer>> {
    anyhow::bail!("citeview was built without the `pdf` feature; no page renderer available")
}
