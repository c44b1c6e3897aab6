//! demo - end-to-end synthetic run: stub camera, stub analyzer, one session

use anyhow::{anyhow, Result};
use clap::Parser;
use std::time::{Duration, Instant};

use camhub::{
    CameraManager, EmotionAnalyzer, EmotionSession, LocalDeviceConfig, LocalDeviceSource,
    StubAnalyzer,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Duration in seconds for the synthetic capture run.
    #[arg(long, default_value_t = 5)]
    seconds: u64,
    /// Synthetic device registered with the manager.
    #[arg(long, default_value = "stub://demo_camera")]
    device: String,
    /// Frames per second to poll at.
    #[arg(long, default_value_t = 10)]
    fps: u32,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut manager = CameraManager::new();
    manager.add_source(Box::new(LocalDeviceSource::new(LocalDeviceConfig {
        device: args.device.clone(),
        ..LocalDeviceConfig::default()
    })));
    if !manager.set_active_source(&args.device) {
        return Err(anyhow!("failed to connect to {}", args.device));
    }

    let interval = if args.fps == 0 {
        Duration::from_millis(100)
    } else {
        Duration::from_millis((1000 / args.fps).max(1) as u64)
    };

    let mut analyzer = StubAnalyzer::new();
    let mut session = EmotionSession::new();
    let mut frames = 0u64;
    let mut faceless = 0u64;

    let deadline = Instant::now() + Duration::from_secs(args.seconds);
    while Instant::now() < deadline {
        if let Some(frame) = manager.read() {
            frames += 1;
            match analyzer.analyze(&frame)? {
                Some(reading) => session.observe(reading.dominant_emotion),
                None => faceless += 1,
            }
        }
        std::thread::sleep(interval);
    }

    session.end();
    manager.release_all();

    log::info!("demo: {} frames polled, {} without a face", frames, faceless);
    match session.summary() {
        Some(summary) => println!("{}", serde_json::to_string_pretty(&summary)?),
        None => println!("no emotions observed"),
    }
    Ok(())
}
