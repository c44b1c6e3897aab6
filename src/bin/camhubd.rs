//! camhubd - unified camera daemon
//!
//! This daemon:
//! 1. Builds a `CameraManager` from config: the local device always, plus
//!    one network camera when a stream URL is configured
//! 2. Polls frames from the active source
//! 3. Hands each frame to the emotion analyzer
//! 4. Tracks one session per continuous face-visible period and logs its
//!    summary as JSON when the face is lost
//! 5. Releases every source on SIGINT

use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use camhub::{
    CameraManager, CameraSource, CamhubConfig, EmotionAnalyzer, EmotionSession,
    LocalDeviceConfig, LocalDeviceSource, NetworkStreamConfig, NetworkStreamSource, StubAnalyzer,
};

/// Consecutive no-face reads before an open session is closed.
const FACE_LOST_READS: u32 = 15;
/// Pacing between poll cycles.
const POLL_INTERVAL: Duration = Duration::from_millis(100);
const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(5);

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cfg = CamhubConfig::load()?;

    let mut manager = CameraManager::new();
    let local = LocalDeviceSource::new(LocalDeviceConfig {
        device: cfg.local.device.clone(),
        width: cfg.local.width,
        height: cfg.local.height,
    });
    let local_name = local.name().to_string();
    manager.add_source(Box::new(local));

    let mut stream_name = None;
    if let Some(stream) = &cfg.stream {
        let source = NetworkStreamSource::new(NetworkStreamConfig {
            url: stream.url.clone(),
            connect_timeout: stream.connect_timeout,
            read_timeout: stream.read_timeout,
        });
        stream_name = Some(source.name().to_string());
        manager.add_source(Box::new(source));
    }

    let initial = cfg
        .active
        .clone()
        .or(stream_name)
        .unwrap_or(local_name);
    if !manager.set_active_source(&initial) {
        log::warn!(
            "camhubd: source '{}' selected but not connected yet, reads will keep retrying",
            initial
        );
    }

    let running = Arc::new(AtomicBool::new(true));
    let running_handler = running.clone();
    ctrlc::set_handler(move || {
        running_handler.store(false, Ordering::SeqCst);
    })?;

    let mut analyzer = StubAnalyzer::new();
    let mut session = EmotionSession::new();
    let mut misses = 0u32;
    let mut frame_count = 0u64;
    let mut last_health_log = Instant::now();

    log::info!(
        "camhubd running; sources: {:?}, active: {:?}",
        manager.list_sources(),
        manager.active_source_name()
    );

    while running.load(Ordering::SeqCst) {
        if let Some(frame) = manager.read() {
            frame_count += 1;
            match analyzer.analyze(&frame) {
                Ok(Some(reading)) => {
                    misses = 0;
                    session.observe(reading.dominant_emotion);
                }
                Ok(None) => {
                    misses = misses.saturating_add(1);
                    if misses == FACE_LOST_READS {
                        close_session(&mut session);
                    }
                }
                Err(err) => {
                    log::warn!("camhubd: emotion analysis failed: {:#}", err);
                }
            }
        }

        if last_health_log.elapsed() >= HEALTH_LOG_INTERVAL {
            log::info!(
                "camhubd: active={:?} frames={}",
                manager.active_source_name(),
                frame_count
            );
            last_health_log = Instant::now();
        }

        std::thread::sleep(POLL_INTERVAL);
    }

    close_session(&mut session);
    manager.release_all();
    log::info!("camhubd: shut down");
    Ok(())
}

/// End the current session, log its summary, and start a fresh one.
fn close_session(session: &mut EmotionSession) {
    session.end();
    if let Some(summary) = session.summary() {
        match serde_json::to_string(&summary) {
            Ok(json) => log::info!("session summary: {}", json),
            Err(err) => log::warn!("camhubd: failed to encode session summary: {}", err),
        }
    }
    *session = EmotionSession::new();
}
