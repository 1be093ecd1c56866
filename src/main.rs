use anyhow::Result;
use clap::{Arg, Command};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

mod config;
mod media;
mod pipeline;
mod plan;
mod reconcile;
mod storage;
mod timecode;
mod translation;

use crate::config::MontageConfig;
use crate::media::FfmpegEngine;
use crate::pipeline::{MontagePipeline, RemoteSegmentTranslator};
use crate::plan::SegmentPlan;
use crate::storage::BlobUploader;
use crate::translation::download::ArtifactDownloader;
use crate::translation::orchestrator::JobOrchestrator;
use crate::translation::TranslationApiClient;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter("video_montage=info,warn")
        .init();

    let matches = Command::new("Video Translation Montage")
        .version("0.1.0")
        .about("Cuts a video into segments, translates selected segments remotely, and reassembles the montage")
        .arg(
            Arg::new("source")
                .short('s')
                .long("source")
                .value_name("FILE")
                .help("Source video file")
                .required(true),
        )
        .arg(
            Arg::new("plan")
                .short('p')
                .long("plan")
                .value_name("FILE")
                .help("Segment plan (TOML, one [[segment]] table per record)")
                .required(true),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("FILE")
                .help("Output path (default: 'TRANSLATED <source name>' next to the source)"),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file (credentials also read from environment)"),
        )
        .arg(
            Arg::new("work-dir")
                .long("work-dir")
                .value_name("DIR")
                .help("Root for per-run working directories")
                .default_value("./montage_work"),
        )
        .arg(
            Arg::new("source-locale")
                .long("source-locale")
                .value_name("LOCALE")
                .help("Source locale when running without a config file")
                .default_value("en-US"),
        )
        .get_matches();

    let source = PathBuf::from(matches.get_one::<String>("source").unwrap());
    let plan_path = PathBuf::from(matches.get_one::<String>("plan").unwrap());
    let output = matches.get_one::<String>("output").map(PathBuf::from);
    let work_root = PathBuf::from(matches.get_one::<String>("work-dir").unwrap());
    let source_locale = matches.get_one::<String>("source-locale").unwrap();

    if !source.exists() {
        error!("Source video not found: {}", source.display());
        return Err(anyhow::anyhow!("source video not found"));
    }

    // The configuration record is built once here and handed into the
    // constructors; nothing below reads the environment.
    let config = match matches.get_one::<String>("config") {
        Some(path) => MontageConfig::load(&PathBuf::from(path))?,
        None => MontageConfig::from_env(source_locale)?,
    };
    config.validate()?;

    let plan = SegmentPlan::from_path(&plan_path)?;
    info!("🎬 Video Translation Montage starting...");
    info!("📹 Source: {}", source.display());
    info!("🗂️ Plan: {} segments", plan.segments.len());

    let client = Arc::new(TranslationApiClient::new(&config.speech)?);
    let downloader = Arc::new(ArtifactDownloader::new()?);
    let orchestrator = JobOrchestrator::new(client, downloader);
    let uploader = BlobUploader::new(&config.storage)?;
    let translator = Arc::new(RemoteSegmentTranslator::new(
        uploader,
        orchestrator,
        config.jobs.clone(),
    ));

    let pipeline = MontagePipeline::new(
        Arc::new(FfmpegEngine::new()),
        translator,
        config.overlay.clone(),
        config.tolerance_secs,
        work_root,
    );

    let start_time = std::time::Instant::now();
    let outcome = pipeline.run(&source, &plan, output).await?;
    let elapsed = start_time.elapsed();

    info!("🎉 Montage completed in {:.1}s", elapsed.as_secs_f64());
    info!("📊 Source duration: {:.2}s", outcome.source_duration);
    info!("📊 Output duration: {:.2}s", outcome.output_duration);
    info!("📊 Difference: {:.2}s", outcome.drift.delta);
    if !outcome.drift.within_tolerance {
        warn!(
            "⚠️ Duration difference exceeds tolerance of {:.2}s",
            config.tolerance_secs
        );
    }
    info!("🎥 Output: {}", outcome.output_path.display());

    Ok(())
}
