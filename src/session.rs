//! セッション全体の制御（停止フラグ・描画/記録ティック）

use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::frame::Frame;
use crate::mailbox::FrameMailbox;
use crate::pointcloud::{project, CalibrationCache, PointCloud};
use crate::pose::{bone_segments_into, extract_skeleton, BoneSegment, BoneTopology, TRACKED_BODY_INDEX};
use crate::record::{RecordingRouter, RouteOutcome};
use crate::render::{Scene, SceneBody, SceneRenderer, ViewCamera};

/// セッション継続フラグ。クローンは同じフラグを共有する
///
/// 内部では「停止要求」を保持する（シグナルハンドラは true を書き込むため）。
#[derive(Debug, Clone, Default)]
pub struct ActiveFlag {
    stop: Arc<AtomicBool>,
}

impl ActiveFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        !self.stop.load(Ordering::Relaxed)
    }

    pub fn deactivate(&self) {
        if !self.stop.swap(true, Ordering::Relaxed) {
            tracing::info!("Session stop requested");
        }
    }

    /// SIGINT / SIGTERM で停止する
    pub fn register_signals(&self) -> Result<()> {
        for signal in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
            signal_hook::flag::register(signal, self.stop.clone())
                .with_context(|| format!("Failed to register signal {}", signal))?;
        }
        Ok(())
    }
}

/// 1ティックの結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// 新しいフレームが無かった
    Idle,
    /// フレームはあったがボディが無い
    NoBody,
    Tracked { body_id: u32, recorded: bool },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub ticks: u64,
    pub frames: u64,
    pub tracked: u64,
    pub rows: u64,
}

/// 描画/記録側の状態。メインスレッドだけが持つ
pub struct Pipeline {
    cache: Arc<CalibrationCache>,
    topology: BoneTopology,
    camera: ViewCamera,
    router: RecordingRouter,
    cloud: PointCloud,
    bones: Vec<BoneSegment>,
    human_present: Option<bool>,
    stats: SessionStats,
}

impl Pipeline {
    pub fn new(
        cache: Arc<CalibrationCache>,
        topology: BoneTopology,
        camera: ViewCamera,
        router: RecordingRouter,
    ) -> Self {
        Self {
            cache,
            topology,
            camera,
            router,
            cloud: PointCloud::new(),
            bones: Vec::new(),
            human_present: None,
            stats: SessionStats::default(),
        }
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn router(&self) -> &RecordingRouter {
        &self.router
    }

    /// 直近のフレームに被験者がいたか（まだフレームが無ければ None）
    pub fn human_present(&self) -> Option<bool> {
        self.human_present
    }

    /// メールボックスから最新フレームを受け取り、投影・描画・記録してから解放する
    pub fn tick<R: SceneRenderer>(
        &mut self,
        mailbox: &FrameMailbox,
        renderer: &mut R,
    ) -> Result<TickOutcome> {
        self.stats.ticks += 1;
        self.router.poll_label();

        let Some(frame) = mailbox.take() else {
            renderer.pump()?;
            return Ok(TickOutcome::Idle);
        };
        self.stats.frames += 1;

        let outcome = self.process(&frame, renderer);
        drop(frame);
        outcome
    }

    fn process<R: SceneRenderer>(&mut self, frame: &Frame, renderer: &mut R) -> Result<TickOutcome> {
        project(frame.depth(), &self.cache, &mut self.cloud).context("Point cloud projection failed")?;

        let skeleton = extract_skeleton(frame);
        self.update_presence(skeleton.is_some());

        let Some(skeleton) = skeleton else {
            renderer.draw(&Scene {
                camera: &self.camera,
                points: &self.cloud,
                body: None,
            })?;
            return Ok(TickOutcome::NoBody);
        };

        let body_id = frame
            .body(TRACKED_BODY_INDEX)
            .map(|body| body.id)
            .unwrap_or_default();
        bone_segments_into(&skeleton, &self.topology, &mut self.bones);
        renderer.draw(&Scene {
            camera: &self.camera,
            points: &self.cloud,
            body: Some(SceneBody {
                id: body_id,
                skeleton: &skeleton,
                bones: &self.bones,
            }),
        })?;

        let recorded = self.router.route(&skeleton) == RouteOutcome::Written;
        self.stats.tracked += 1;
        if recorded {
            self.stats.rows += 1;
        }
        Ok(TickOutcome::Tracked { body_id, recorded })
    }

    fn update_presence(&mut self, present: bool) {
        if self.human_present == Some(present) {
            return;
        }
        if present {
            tracing::info!("Subject detected");
        } else if self.human_present.is_some() {
            tracing::info!("Subject lost");
        }
        self.human_present = Some(present);
    }

    /// 記録を flush して統計を返す
    pub fn finish(mut self) -> Result<SessionStats> {
        self.router.finish()?;
        Ok(self.stats)
    }
}

/// 停止要求かウィンドウが閉じるまでティックを回す
pub fn run_render_loop<R: SceneRenderer>(
    pipeline: &mut Pipeline,
    mailbox: &FrameMailbox,
    renderer: &mut R,
    active: &ActiveFlag,
) -> Result<()> {
    while active.is_active() {
        if !renderer.is_open() {
            tracing::info!("Window closed");
            active.deactivate();
            break;
        }
        pipeline.tick(mailbox, renderer)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{Capture, DepthImage};
    use crate::config::{RecordingConfig, ViewerConfig};
    use crate::frame::Body;
    use crate::pose::{JointId, Skeleton};
    use crate::record::{preset_label, RowFormat};
    use std::path::Path;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingRenderer {
        draws: Vec<Option<(u32, usize)>>,
        valid_points: Vec<usize>,
        pumps: usize,
        open_ticks: Option<usize>,
    }

    impl SceneRenderer for RecordingRenderer {
        fn viewport(&self) -> (usize, usize) {
            (64, 48)
        }

        fn is_open(&self) -> bool {
            self.open_ticks
                .map_or(true, |n| self.draws.len() + self.pumps < n)
        }

        fn draw(&mut self, scene: &Scene<'_>) -> Result<()> {
            self.draws.push(scene.body.map(|b| (b.id, b.bones.len())));
            self.valid_points.push(scene.points.valid_count());
            Ok(())
        }

        fn pump(&mut self) -> Result<()> {
            self.pumps += 1;
            Ok(())
        }
    }

    fn pipeline(dir: &Path, label: u32) -> Pipeline {
        let cache = CalibrationCache::from_rays(2, 2, vec![[0.0, 0.0, 1.0]; 4]).unwrap();
        let config = RecordingConfig {
            output_dir: dir.to_path_buf(),
            row_format: RowFormat::Labeled,
            label: Some(label),
            stop_session_on_error: false,
        };
        let router = RecordingRouter::new(&config, preset_label(label), ActiveFlag::new()).unwrap();
        Pipeline::new(
            Arc::new(cache),
            BoneTopology::body().clone(),
            ViewCamera::new(&ViewerConfig::default(), 64, 48),
            router,
        )
    }

    fn frame(bodies: Vec<Body>) -> Frame {
        let depth = DepthImage::new(2, 2, vec![1000, 0, 1200, 1500]).unwrap();
        Frame::new(
            Capture {
                depth,
                timestamp: Duration::from_millis(66),
            },
            bodies,
        )
    }

    fn body(id: u32) -> Body {
        let positions: [[f32; 3]; JointId::COUNT] =
            std::array::from_fn(|i| [i as f32 * 10.0, 0.0, 2000.0]);
        Body {
            id,
            skeleton: Skeleton::from_positions(&positions),
        }
    }

    #[test]
    fn test_active_flag_shared() {
        let flag = ActiveFlag::new();
        let other = flag.clone();
        assert!(flag.is_active());
        other.deactivate();
        assert!(!flag.is_active());
        // 2回目は何もしない
        other.deactivate();
        assert!(!other.is_active());
    }

    #[test]
    fn test_idle_tick_pumps_events() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = pipeline(dir.path(), 1);
        let mailbox = FrameMailbox::new();
        let mut renderer = RecordingRenderer::default();

        assert_eq!(pipeline.tick(&mailbox, &mut renderer).unwrap(), TickOutcome::Idle);
        assert_eq!(renderer.pumps, 1);
        assert!(renderer.draws.is_empty());
        assert_eq!(pipeline.human_present(), None);
    }

    #[test]
    fn test_zero_body_tick() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = pipeline(dir.path(), 1);
        let mailbox = FrameMailbox::new();
        let mut renderer = RecordingRenderer::default();
        let active = ActiveFlag::new();

        mailbox.set(frame(Vec::new()));
        let outcome = pipeline.tick(&mailbox, &mut renderer).unwrap();

        assert_eq!(outcome, TickOutcome::NoBody);
        assert_eq!(renderer.draws, vec![None]);
        assert_eq!(renderer.valid_points, vec![3]);
        assert_eq!(pipeline.router().rows_written(), 0);
        assert_eq!(pipeline.human_present(), Some(false));
        assert!(active.is_active());
        assert!(mailbox.is_empty());
    }

    #[test]
    fn test_tracked_tick_renders_and_records() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = pipeline(dir.path(), 5);
        let mailbox = FrameMailbox::new();
        let mut renderer = RecordingRenderer::default();

        mailbox.set(frame(vec![body(3), body(8)]));
        let outcome = pipeline.tick(&mailbox, &mut renderer).unwrap();

        assert_eq!(
            outcome,
            TickOutcome::Tracked {
                body_id: 3,
                recorded: true
            }
        );
        assert_eq!(renderer.draws, vec![Some((3, JointId::COUNT - 1))]);
        assert_eq!(pipeline.human_present(), Some(true));

        let path = pipeline.router().sink_path().unwrap().to_path_buf();
        let stats = pipeline.finish().unwrap();
        assert_eq!(stats.rows, 1);
        assert_eq!(stats.frames, 1);

        let content = std::fs::read_to_string(path).unwrap();
        assert_eq!(content.lines().count(), 1);
        assert!(content.starts_with("5,"));

        // 取り出した骨格の関節順のまま列に並ぶ
        let fields: Vec<&str> = content.trim_end().split(',').collect();
        assert_eq!(fields.len(), 2 + JointId::COUNT * 3);
        let expected = body(3).skeleton;
        for (i, joint) in expected.joints.iter().enumerate() {
            let column = &fields[2 + 3 * i..5 + 3 * i];
            let parsed: Vec<f32> = column.iter().map(|f| f.parse().unwrap()).collect();
            assert_eq!(parsed, joint.position.to_vec(), "joint {}", i);
        }
    }

    #[test]
    fn test_only_latest_frame_is_processed() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = pipeline(dir.path(), 1);
        let mailbox = FrameMailbox::new();
        let mut renderer = RecordingRenderer::default();

        mailbox.set(frame(vec![body(1)]));
        mailbox.set(frame(Vec::new()));
        assert_eq!(pipeline.tick(&mailbox, &mut renderer).unwrap(), TickOutcome::NoBody);
        assert_eq!(pipeline.tick(&mailbox, &mut renderer).unwrap(), TickOutcome::Idle);
        assert_eq!(pipeline.stats().rows, 0);
    }

    #[test]
    fn test_render_loop_stops_when_window_closes() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = pipeline(dir.path(), 1);
        let mailbox = FrameMailbox::new();
        let mut renderer = RecordingRenderer {
            open_ticks: Some(3),
            ..RecordingRenderer::default()
        };
        let active = ActiveFlag::new();

        run_render_loop(&mut pipeline, &mailbox, &mut renderer, &active).unwrap();
        assert_eq!(renderer.pumps, 3);
        assert!(!active.is_active());
    }

    #[test]
    fn test_render_loop_stops_on_flag() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = pipeline(dir.path(), 1);
        let mailbox = FrameMailbox::new();
        let mut renderer = RecordingRenderer::default();
        let active = ActiveFlag::new();
        active.deactivate();

        run_render_loop(&mut pipeline, &mailbox, &mut renderer, &active).unwrap();
        assert_eq!(pipeline.stats().ticks, 0);
    }
}
