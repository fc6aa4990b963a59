use anyhow::{Context, Result};
use rollcall_core::recognizer::ARCFACE_EMBEDDING_DIM;
use rollcall_core::{EncodingCache, FacePipeline, RecognitionConfig};
use rollcall_hw::Camera;
use rollcall_store::{validate_key, FirebaseStore};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::Instrument;
use tracing_subscriber::EnvFilter;

mod attendance;
mod config;
mod engine;

use attendance::{AttendanceUpdater, Outcome};
use config::Config;
use engine::{EngineError, EngineEvent};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    tracing::info!("rollcalld starting");

    let config = Config::load().context("loading configuration")?;

    let store = Arc::new(FirebaseStore::connect(&config.database).context("connecting to the database")?);

    let cache = load_cache(&config.recognition)?;
    for identity in cache.identities() {
        validate_key(identity).with_context(|| format!("reference identity {identity:?} is not a valid record key"))?;
    }
    tracing::info!(known = cache.len(), "encodings ready");

    let camera_cfg = config.camera.clone();
    let model_dir = config.recognition.model_dir.clone();
    let min_confidence = config.recognition.min_confidence;
    let events = engine::spawn_engine(
        move || {
            let camera = Camera::open(&camera_cfg.device, camera_cfg.width, camera_cfg.height)?;
            tracing::info!(
                device = %camera.device_path,
                width = camera.width,
                height = camera.height,
                fourcc = %camera.fourcc,
                "camera opened"
            );
            let pipeline = FacePipeline::load(&model_dir, min_confidence)?;
            tracing::info!(dir = %model_dir.display(), "face models loaded");
            Ok::<_, EngineError>((camera, pipeline))
        },
        cache,
        config.recognition.matcher(),
        config.camera.warmup_frames,
        config.attendance.queue_capacity,
    )
    .await
    .context("starting the capture engine")?;

    let updater = AttendanceUpdater::new(store, config.attendance.cooldown());
    let span = tracing::info_span!("session", id = %updater.session());
    run_session(updater, events).instrument(span).await
}

/// Feed recognitions to the updater until Ctrl-C or an engine fault.
async fn run_session(
    mut updater: AttendanceUpdater<FirebaseStore>,
    mut events: mpsc::Receiver<EngineEvent>,
) -> Result<()> {
    tracing::info!("rollcalld ready");
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!(handled = updater.handled(), "rollcalld shutting down");
                return Ok(());
            }
            event = events.recv() => match event {
                Some(EngineEvent::Recognized { identity, distance, sequence }) => {
                    let outcome = updater
                        .record(&identity)
                        .await
                        .with_context(|| format!("updating attendance for {identity}"))?;
                    if let Outcome::Marked { total_attendance } = outcome {
                        tracing::debug!(%identity, distance, sequence, total_attendance, "recognition handled");
                    }
                }
                Some(EngineEvent::Failed(e)) => return Err(e).context("capture engine failed"),
                None => anyhow::bail!(EngineError::ChannelClosed),
            }
        }
    }
}

/// Load the encodings file, or build it from the reference images and save it.
fn load_cache(config: &RecognitionConfig) -> Result<EncodingCache> {
    if config.encodings_file.exists() {
        let cache = EncodingCache::load(&config.encodings_file)
            .with_context(|| format!("loading {}", config.encodings_file.display()))?;
        cache.ensure_dim(ARCFACE_EMBEDDING_DIM).with_context(|| {
            format!(
                "{} was not produced by the current recognition model, re-run `rollcall encode`",
                config.encodings_file.display()
            )
        })?;
        tracing::info!(path = %config.encodings_file.display(), "encodings loaded");
        return Ok(cache);
    }

    tracing::info!(
        dir = %config.images_dir.display(),
        "no encodings file, encoding reference images"
    );
    let mut pipeline =
        FacePipeline::load(&config.model_dir, config.min_confidence).context("loading face models")?;
    let cache = EncodingCache::build(&config.images_dir, &mut pipeline)
        .with_context(|| format!("encoding reference images in {}", config.images_dir.display()))?;
    cache
        .save(&config.encodings_file)
        .with_context(|| format!("writing {}", config.encodings_file.display()))?;
    Ok(cache)
}
