//! pomocnik - spoken scene assistant
//!
//! This binary:
//! 1. Loads configuration (file named by POMOCNIK_CONFIG or --config, then env)
//! 2. Opens a frame source (synthetic camera or an image directory)
//! 3. Loads detector/depth/scene backends (ONNX via tract when built with
//!    `backend-tract` and model paths are configured, scripted otherwise)
//! 4. Feeds frames to the single worker at the source's target rate
//! 5. Speaks rate-limited feedback until Ctrl-C or --frames is reached

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use pomocnik::config::PipelineConfig;
use pomocnik::depth::ScriptedDepth;
use pomocnik::detect::{DetectionTensorBuilder, ScriptedDetector};
use pomocnik::ingest::open_source;
use pomocnik::ocr::TimedRecognizer;
use pomocnik::scene::{self, ScriptedScene};
use pomocnik::{
    Aggregator, CommandSpeech, DepthEstimator, DepthTensor, Detector, FeedbackMode,
    FeedbackScheduler, FrameWorker, LabelSet, LogSpeech, Pipeline, SceneClassifier, SpeechSink,
    Submission,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Config file (JSON, or TOML with a .toml extension).
    #[arg(long, env = "POMOCNIK_CONFIG")]
    config: Option<PathBuf>,
    /// Feedback mode: assist, depth_only, read or scene. Overrides the config file.
    #[arg(long)]
    mode: Option<FeedbackMode>,
    /// Stop after this many source frames (0 runs until Ctrl-C).
    #[arg(long, default_value_t = 0)]
    frames: u64,
    /// Write each depth map as a grayscale PNG to this path.
    #[arg(long)]
    dump_depth: Option<PathBuf>,
    /// Print every frame result as a JSON line on stdout.
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut cfg = PipelineConfig::load_with(args.config.as_deref())?;
    if let Some(mode) = args.mode {
        cfg.feedback.mode = mode;
    }
    log::info!(
        "pomocnik {} starting: mode={:?}, language={}, source={}",
        env!("CARGO_PKG_VERSION"),
        cfg.feedback.mode,
        cfg.language,
        cfg.source.url
    );

    let scheduler = Arc::new(
        FeedbackScheduler::new(build_speech(&cfg)?, cfg.feedback.mode)
            .with_min_interval(cfg.min_interval())
            .with_max_objects(cfg.feedback.max_objects)
            .with_language(cfg.language)?,
    );
    scheduler.set_rate(cfg.speech.rate)?;

    let mut pipeline = build_pipeline(&cfg, Arc::clone(&scheduler))?;
    if let Some(path) = args.dump_depth.clone() {
        log::info!("depth maps will be written to {}", path.display());
        pipeline = pipeline.with_depth_dump(path);
    }

    let print_json = args.json;
    let mut worker = FrameWorker::spawn(pipeline, move |result| {
        if print_json {
            match serde_json::to_string(&result) {
                Ok(line) => println!("{}", line),
                Err(err) => log::warn!("failed to encode frame result: {}", err),
            }
        }
    })?;

    let running = Arc::new(AtomicBool::new(true));
    let handler_flag = Arc::clone(&running);
    ctrlc::set_handler(move || {
        handler_flag.store(false, Ordering::SeqCst);
    })
    .context("error setting Ctrl-C handler")?;

    let mut source = open_source(cfg.source.clone())?;
    source.connect()?;

    let frame_interval = Duration::from_millis(1000 / u64::from(cfg.source.target_fps.max(1)));
    let mut last_health_log = Instant::now();
    let mut frames_read = 0u64;

    while running.load(Ordering::SeqCst) {
        if args.frames > 0 && frames_read >= args.frames {
            break;
        }
        let started = Instant::now();
        match source.next_frame() {
            Ok(frame) => {
                frames_read += 1;
                if worker.submit(frame) == Submission::Stopped {
                    log::warn!("worker stopped unexpectedly");
                    break;
                }
            }
            Err(err) => {
                log::warn!("frame source error: {:#}", err);
                if !source.is_healthy() {
                    break;
                }
            }
        }

        if last_health_log.elapsed() >= Duration::from_secs(10) {
            let stats = worker.stats();
            log::info!(
                "frames: read={}, accepted={}, dropped={}, processed={}, failed={}",
                source.stats().frames_captured,
                stats.accepted,
                stats.dropped,
                stats.processed,
                stats.failed
            );
            last_health_log = Instant::now();
        }

        if let Some(rest) = frame_interval.checked_sub(started.elapsed()) {
            std::thread::sleep(rest);
        }
    }

    log::info!("shutting down");
    worker.stop();
    let stats = worker.stats();
    log::info!(
        "done: accepted={}, dropped={}, processed={}, failed={}",
        stats.accepted,
        stats.dropped,
        stats.processed,
        stats.failed
    );
    Ok(())
}

fn build_speech(cfg: &PipelineConfig) -> Result<Box<dyn SpeechSink>> {
    match cfg.speech.command.as_deref() {
        Some(command) => {
            log::info!("speaking through '{}'", command);
            Ok(Box::new(CommandSpeech::from_command_line(command)?))
        }
        None => {
            log::info!("no speech command configured; utterances are logged");
            Ok(Box::new(LogSpeech::default()))
        }
    }
}

fn build_pipeline(cfg: &PipelineConfig, scheduler: Arc<FeedbackScheduler>) -> Result<Pipeline> {
    let mut aggregator = Aggregator::new(cfg.scale_table()?).with_policy(cfg.ocr_policy()?);
    // No OCR engine ships with this binary; the timed wrapper still bounds it.
    if let Some(timeout) = cfg.ocr.timeout {
        aggregator = aggregator.with_recognizer(TimedRecognizer::spawn(
            pomocnik::ocr::NoText,
            timeout,
        )?);
    }

    match cfg.feedback.mode {
        FeedbackMode::DepthOnly => Ok(Pipeline::depth_only(build_depth(cfg)?, aggregator, scheduler)),
        FeedbackMode::Read => Ok(Pipeline::read(aggregator, scheduler)),
        FeedbackMode::Scene => Ok(Pipeline::scene(build_scene(cfg)?, scheduler)),
        FeedbackMode::Assist => {
            let detector = build_detector(cfg)?;
            let pipeline = Pipeline::assist(detector, Some(build_depth(cfg)?), aggregator, scheduler);
            // Without a scene model the announcement would only repeat scripted output.
            if cfg.scene.announce && cfg.scene.model_path.is_some() {
                Ok(pipeline.with_scene(build_scene(cfg)?))
            } else {
                Ok(pipeline)
            }
        }
    }
}

fn load_scene_labels(cfg: &PipelineConfig) -> Result<LabelSet> {
    match &cfg.scene.labels_dir {
        Some(dir) => scene::labels_for_language(dir, cfg.language),
        None => Ok(LabelSet::parse_categories("corridor\nliving_room\nstreet\n")),
    }
}

fn build_scene(cfg: &PipelineConfig) -> Result<SceneClassifier> {
    let labels = load_scene_labels(cfg)?;

    #[cfg(feature = "backend-tract")]
    if let Some(model_path) = &cfg.scene.model_path {
        let backend = pomocnik::scene::TractScene::new(model_path)?;
        return Ok(SceneClassifier::new(backend, labels));
    }

    if cfg.scene.model_path.is_some() {
        log::warn!("scene model configured but backend-tract is not enabled; using scripted scenes");
    }
    Ok(SceneClassifier::new(
        ScriptedScene::fixed(vec![2.5, 0.3, 0.1]),
        labels,
    ))
}

fn load_labels(cfg: &PipelineConfig) -> Result<LabelSet> {
    match &cfg.detector.labels_dir {
        Some(dir) => LabelSet::for_language(dir, cfg.language),
        None => Ok(LabelSet::new(vec!["person".into(), "door".into(), "chair".into()])),
    }
}

fn build_detector(cfg: &PipelineConfig) -> Result<Detector> {
    let labels = load_labels(cfg)?;
    let settings = &cfg.detector;

    #[cfg(feature = "backend-tract")]
    if let Some(model_path) = &settings.model_path {
        let backend = pomocnik::detect::TractDetector::new(
            model_path,
            settings.input_width,
            settings.input_height,
        )?;
        let mut detector = Detector::new(backend, labels)
            .with_thresholds(settings.confidence_threshold, settings.iou_threshold);
        detector.warm_up()?;
        return Ok(detector);
    }

    if settings.model_path.is_some() {
        log::warn!("detector model configured but backend-tract is not enabled; using scripted detections");
    }
    let demo = DetectionTensorBuilder::new(3, 3)
        .anchor(0, [0.5, 0.55, 0.3, 0.7], &[0.82, 0.0, 0.0])
        .anchor(1, [0.52, 0.55, 0.3, 0.68], &[0.64, 0.0, 0.0])
        .anchor(2, [0.2, 0.5, 0.25, 0.8], &[0.0, 0.71, 0.0])
        .build();
    Ok(Detector::new(ScriptedDetector::fixed(demo), labels)
        .with_thresholds(settings.confidence_threshold, settings.iou_threshold))
}

fn build_depth(cfg: &PipelineConfig) -> Result<DepthEstimator> {
    #[cfg(feature = "backend-tract")]
    if let Some(model_path) = &cfg.depth.model_path {
        let backend = pomocnik::depth::TractDepth::new(model_path, cfg.depth.input_size)?;
        return Ok(DepthEstimator::new(backend));
    }

    if cfg.depth.model_path.is_some() {
        log::warn!("depth model configured but backend-tract is not enabled; using a flat depth map");
    }
    let size = cfg.depth.input_size as usize;
    Ok(DepthEstimator::new(ScriptedDepth::fixed(DepthTensor::filled(
        size, size, 450.0,
    )?)))
}
