use anyhow::{Context, Result};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use pos_saver::camera::{AcquisitionThread, DepthDevice, SyntheticDevice, SyntheticTracker};
use pos_saver::config::Config;
use pos_saver::mailbox::FrameMailbox;
use pos_saver::pointcloud::CalibrationCache;
use pos_saver::pose::BoneTopology;
use pos_saver::record::{preset_label, spawn_label_prompt, RecordingRouter};
use pos_saver::render::{MinifbRenderer, SceneRenderer, ViewCamera};
use pos_saver::session::{run_render_loop, ActiveFlag, Pipeline};

const CONFIG_PATH: &str = "config.toml";

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config_path = std::env::args().nth(1).unwrap_or_else(|| CONFIG_PATH.to_string());
    let config = Config::load_or_default(&config_path)?;

    println!("=== PosSaver ({}) ===", env!("GIT_VERSION"));
    println!(
        "深度: {}x{} @ {}fps / 出力先: {}",
        config.sensor.depth_width,
        config.sensor.depth_height,
        config.sensor.fps,
        config.recording.output_dir.display()
    );
    println!("Esc: 終了 / F: 全画面切替");
    println!();

    // デバイスとトラッカーはここで開けなければ起動失敗
    let device = SyntheticDevice::open(&config.sensor, &config.tracker).context("Failed to open depth device")?;
    let cache = Arc::new(CalibrationCache::build(device.calibration()));
    let tracker = SyntheticTracker::create(device.calibration(), &config.tracker)
        .context("Failed to create body tracker")?;

    let active = ActiveFlag::new();
    active.register_signals()?;

    let labels = match config.recording.label {
        Some(label) => {
            println!("ラベル番号 {} の計測を行います", label);
            preset_label(label)
        }
        None => spawn_label_prompt()?,
    };
    let router = RecordingRouter::new(&config.recording, labels, active.clone())?;

    let mut renderer = MinifbRenderer::new(&config.viewer)?;
    let (width, height) = renderer.viewport();
    let camera = ViewCamera::new(&config.viewer, width, height);
    let mut pipeline = Pipeline::new(cache, BoneTopology::body().clone(), camera, router);

    let mailbox = Arc::new(FrameMailbox::new());
    let acquisition = AcquisitionThread::spawn(device, tracker, mailbox.clone(), active.clone())?;

    let result = run_render_loop(&mut pipeline, &mailbox, &mut renderer, &active);
    if let Err(e) = &result {
        tracing::error!("Render loop failed: {e:#}");
    }

    // 描画側が先に抜けても取得スレッドを必ず止める
    active.deactivate();
    let acquired = acquisition.join()?;
    let session = pipeline.finish()?;
    drop(mailbox.take());

    tracing::info!(
        captures = acquired.captures,
        published = acquired.frames_published,
        overwritten = mailbox.overwritten(),
        ticks = session.ticks,
        tracked = session.tracked,
        rows = session.rows,
        "Session finished"
    );
    result
}
