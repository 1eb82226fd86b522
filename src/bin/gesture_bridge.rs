//! gesture_bridge - publish debounced hand gestures from a camera to MQTT.
//!
//! 1. Loads configuration (file, then environment)
//! 2. Loads the gesture classifier and opens the stream source
//! 3. Connects to the broker and announces the Home Assistant sensor
//! 4. Runs the acquisition loop until Ctrl-C
//!
//! Exit codes: 0 on clean stop, 2 on initialization failure, 1 if the loop
//! dies.

use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use gesture_bridge::config::BridgeConfig;
use gesture_bridge::detect::{load_classifier, GestureClassifier};
use gesture_bridge::driver::{Driver, DriverSettings};
use gesture_bridge::ingest::FrameSource;
use gesture_bridge::shutdown::StopSignal;
use gesture_bridge::stability::StabilityBuffer;
use gesture_bridge::transport::{GesturePublisher, MqttPublisher};
use gesture_bridge::ui::{Ui, UiMode};

const EXIT_FATAL: u8 = 1;
const EXIT_INIT_FAILURE: u8 = 2;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Publish debounced hand gestures from a camera stream to MQTT / Home Assistant"
)]
struct Args {
    /// JSON or TOML config file. Environment variables override its values.
    #[arg(long, env = "GESTURE_BRIDGE_CONFIG")]
    config: Option<PathBuf>,

    /// UI mode for stderr progress.
    #[arg(long, value_enum, default_value_t = UiMode::Auto)]
    ui: UiMode,

    /// Load configuration and exit without connecting anywhere.
    #[arg(long)]
    check_config: bool,
}

type BridgeDriver = Driver<Box<dyn GestureClassifier>, MqttPublisher>;

fn main() -> ExitCode {
    let args = Args::parse();
    env_logger::Builder::from_env(env_logger::Env::default().filter_or("LOG_LEVEL", "info"))
        .init();
    let ui = Ui::detect(args.ui);

    let config = match BridgeConfig::load_from(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            log::error!("invalid configuration: {:#}", e);
            return ExitCode::from(EXIT_INIT_FAILURE);
        }
    };
    log_banner(&config);
    if args.check_config {
        log::info!("configuration OK");
        return ExitCode::SUCCESS;
    }

    let stop = StopSignal::new();
    let mut driver = match start(&config, &ui, stop.clone()) {
        Ok(driver) => driver,
        Err(e) => {
            log::error!("initialization failed: {:#}", e);
            return ExitCode::from(EXIT_INIT_FAILURE);
        }
    };

    match std::panic::catch_unwind(AssertUnwindSafe(|| driver.run())) {
        Ok(stats) => {
            log::info!(
                "stopped cleanly ({} frames, {} triggers)",
                stats.frames_processed,
                stats.triggers
            );
            ExitCode::SUCCESS
        }
        Err(_) => {
            log::error!("gesture loop terminated unexpectedly");
            ExitCode::from(EXIT_FATAL)
        }
    }
}

fn start(config: &BridgeConfig, ui: &Ui, stop: StopSignal) -> Result<BridgeDriver> {
    let classifier = {
        let _stage = ui.stage("Load gesture classifier");
        load_classifier(
            &config.model_path,
            config.source.width,
            config.source.height,
            config.min_detection_confidence,
        )
        .context("failed to load gesture classifier")?
    };

    let source = {
        let _stage = ui.stage("Prepare stream source");
        FrameSource::for_url(config.source.clone())?
    };
    let stability = StabilityBuffer::new(config.stability.clone())?;

    let publisher = {
        let _stage = ui.stage("Connect to MQTT broker");
        let mut publisher = MqttPublisher::new(config.mqtt.settings()?);
        publisher.connect()?;
        publisher
    };

    // Dropping the publisher on error disconnects it.
    stop.install_ctrlc()?;

    Ok(Driver::new(
        source,
        classifier,
        stability,
        config.gestures.clone(),
        publisher,
        DriverSettings::from_config(config),
        stop,
    ))
}

fn log_banner(config: &BridgeConfig) {
    let enabled: Vec<&str> = config.gestures.enabled().map(|g| g.as_str()).collect();
    log::info!("gesture_bridge v{}", env!("CARGO_PKG_VERSION"));
    log::info!("stream: {} (reconnect every {:?})", config.source.url, config.reconnect_delay);
    log::info!(
        "frames: {}x{} @ {} fps, decoding 1 in {}",
        config.source.width,
        config.source.height,
        config.source.target_fps,
        config.source.skip_frames
    );
    log::info!(
        "mqtt: {}:{} as {} (auth: {}, tls: {})",
        config.mqtt.broker,
        config.mqtt.port,
        config.mqtt.client_id,
        config.mqtt.credentials().is_some(),
        config.mqtt.use_tls
    );
    log::info!(
        "stability: {} detections >= {:.2}, cooldown {:?}",
        config.stability.min_detections,
        config.stability.confidence_threshold,
        config.stability.cooldown
    );
    log::info!(
        "model: {} (min hand presence {:.2})",
        config.model_path,
        config.min_detection_confidence
    );
    log::info!("enabled gestures: {}", enabled.join(", "));
}
