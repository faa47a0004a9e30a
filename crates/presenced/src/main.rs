use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod config;
mod dataset;
mod engine;
mod events;
mod overlay;
mod shutdown;

use config::{Config, LocatorConfig, RunArgs};
use dataset::DatasetExtender;
use engine::{MainLoop, Outputs, Pipeline};
use events::{Event, EventEmitter};
use overlay::OverlayWriter;
use presence_core::{
    CascadeLocator, EmotionClassifier, FaceDetector, FaceLocator, FaceRecognizer, Gallery,
    IdentityMatcher,
};
use presence_hw::{Camera, CaptureThread};
use shutdown::Shutdown;
use std::time::Duration;

/// How long the loop waits on the capture thread before reporting a stall.
const FRAME_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "presenced", about = "Face presence and emotion sensor")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch the capture source and emit events on stdout
    Run(RunArgs),
    /// List V4L2 capture devices
    Devices,
    /// Summarize a gallery file
    Gallery {
        /// Path to the gallery JSON
        path: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries the event stream; diagnostics go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => {
            let config = Config::try_from(args).context("invalid configuration")?;
            run(config).await
        }
        Commands::Devices => {
            let devices = Camera::list_devices();
            if devices.is_empty() {
                println!("no V4L2 capture devices found");
            }
            for d in devices {
                println!("{}\t{}\t{}\t{}", d.path, d.name, d.driver, d.bus);
            }
            Ok(())
        }
        Commands::Gallery { path } => {
            let gallery = Gallery::load(&path).with_context(|| format!("loading {path}"))?;
            println!(
                "{} entries, dimension {}",
                gallery.len(),
                gallery.dimension().unwrap_or(0)
            );
            for (name, count) in gallery.identities() {
                println!("{name}\t{count}");
            }
            Ok(())
        }
    }
}

fn load_pipeline(config: &Config) -> Result<Pipeline> {
    let locator: Box<dyn FaceLocator> = match &config.locator {
        LocatorConfig::Cascade { path, params } => Box::new(
            CascadeLocator::load(&path.to_string_lossy(), *params)
                .context("failed to load face cascade")?,
        ),
        LocatorConfig::Learned { path, variant } => Box::new(
            FaceDetector::load(&path.to_string_lossy(), *variant)
                .context("failed to load face detector")?,
        ),
    };

    let gallery = Gallery::load(&config.gallery.to_string_lossy())
        .context("failed to load gallery")?;
    let embedder = FaceRecognizer::load(&config.recognition_model.to_string_lossy())
        .context("failed to load recognition model")?;
    let classifier = EmotionClassifier::load(&config.emotion_model.to_string_lossy())
        .context("failed to load emotion model")?;

    Ok(Pipeline {
        locator,
        embedder: Box::new(embedder),
        matcher: IdentityMatcher::new(gallery, config.tolerance),
        classifier: Box::new(classifier),
    })
}

async fn run(config: Config) -> Result<()> {
    tracing::info!(?config, "presenced starting");
    let mut emitter = EventEmitter::stdout();

    emitter.emit(&Event::status("loading encodings + face detector..."))?;
    let pipeline = load_pipeline(&config)?;

    emitter.emit(&Event::status("starting video stream..."))?;
    let source = presence_hw::source::open(&config.source)
        .with_context(|| format!("capture source {} unavailable", config.source))?;
    let capture = CaptureThread::spawn(source, config.rotation, FRAME_TIMEOUT)
        .context("failed to start capture thread")?;
    if !capture.wait_ready(config.warmup) {
        anyhow::bail!(
            "capture source {} delivered no frame within {:?}",
            capture.description(),
            config.warmup
        );
    }

    let outputs = Outputs {
        dataset: config.dataset.as_ref().map(DatasetExtender::new),
        overlay: config.overlay.as_ref().map(OverlayWriter::new),
    };
    if let Some(dataset) = &outputs.dataset {
        std::fs::create_dir_all(dataset.root().join(presence_core::UNKNOWN_NAME))
            .with_context(|| format!("creating dataset root {}", dataset.root().display()))?;
    }

    let shutdown = Shutdown::new();
    shutdown.watch_stdin();

    let mut main_loop = MainLoop::new(
        capture,
        pipeline,
        outputs,
        emitter,
        shutdown.clone(),
        config.emotion_tracking,
        config.interval,
        config.process_width,
    );
    let mut handle = tokio::task::spawn_blocking(move || main_loop.run());

    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .context("failed to install SIGTERM handler")?;

    let summary = tokio::select! {
        res = &mut handle => res,
        _ = tokio::signal::ctrl_c() => {
            shutdown.request("SIGINT");
            handle.await
        }
        _ = sigterm.recv() => {
            shutdown.request("SIGTERM");
            handle.await
        }
    }
    .context("main loop panicked")?
    .context("event output failed")?;

    tracing::info!(
        ticks = summary.ticks,
        elapsed_secs = summary.elapsed.as_secs_f64(),
        fps = summary.fps(),
        "presenced stopped"
    );
    Ok(())
}
