mod ai;
mod audio;
mod cat;
mod config;
mod error;
mod hamlib;
mod radio;
mod rigctld;

use ai::AiBroadcaster;
use audio::{AudioServer, AudioServerConfig, CpalCaptureLine, CpalPlaybackLine};
use cat::CatLink;
use config::DaemonConfig;
use error::DaemonError;
use radio::RadioModel;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{watch, Mutex};
use tokio_serial::SerialPortBuilderExt;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), DaemonError> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config_path = DaemonConfig::default_path();
    let config = DaemonConfig::load(config_path.as_deref());

    if config.serial_port.is_empty() {
        return Err(DaemonError::Config(
            "no serial_port configured; set [serial] port= in settings.ini".to_string(),
        ));
    }

    info!(port = %config.serial_port, baud = config.baud, "opening CAT link");
    let serial = tokio_serial::new(&config.serial_port, config.baud)
        .timeout(Duration::from_millis(config.response_timeout_ms))
        .open_native_async()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
    let cat = CatLink::new(serial, Duration::from_millis(config.response_timeout_ms));

    let mut ai_frames = cat.subscribe_ai();
    cat.enable_auto_info().await.map_err(error::RadioError::from)?;

    let radio = Arc::new(RadioModel::connect(cat).await?);
    info!(head_type = ?radio.head_type, firmware = %radio.firmware_rev, "radio connected");

    let ai = Arc::new(AiBroadcaster::new());
    let ai_for_task = ai.clone();
    tokio::spawn(async move {
        while let Some(frame) = ai_frames.recv().await {
            ai_for_task.broadcast(&frame);
        }
    });

    let rig_lock = Arc::new(Mutex::new(()));
    let rigctl_listener = TcpListener::bind(("0.0.0.0", config.rigctl_port)).await?;
    info!(port = config.rigctl_port, "rigctld listening");
    let rigctld = rigctld::RigctldServer::new(rigctl_listener, radio.clone(), rig_lock, ai);

    let audio_listener = TcpListener::bind(("0.0.0.0", config.audio_port)).await?;
    info!(port = config.audio_port, "audio bridge listening");
    let capture = CpalCaptureLine::open()
        .map_err(|e| warn!(error = %e, "capture device unavailable, audio disabled"))
        .ok()
        .map(|line| Box::new(line) as Box<dyn audio::CaptureLine>);
    let playback = CpalPlaybackLine::open()
        .map_err(|e| warn!(error = %e, "playback device unavailable, audio disabled"))
        .ok()
        .map(|line| Box::new(line) as Box<dyn audio::PlaybackLine>);
    let audio_server = Arc::new(AudioServer::new(
        audio_listener,
        capture,
        playback,
        AudioServerConfig {
            target_latency_ms: config.target_latency_ms,
            heartbeat_interval_s: config.heartbeat_interval_s,
            heartbeat_timeout_multiplier: config.heartbeat_timeout_multiplier,
        },
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let rigctld_shutdown = shutdown_rx.clone();
    let audio_shutdown = shutdown_rx;

    let rigctld_task = tokio::spawn(rigctld.run(rigctld_shutdown));
    let audio_task = tokio::spawn(audio_server.run(audio_shutdown));

    tokio::signal::ctrl_c().await.ok();
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);

    let _ = tokio::join!(rigctld_task, audio_task);
    Ok(())
}
