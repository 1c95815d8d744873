//! Hardware-free sensor and tracker: a standing subject swaying in front of a
//! wall, rendered into the depth map and reported as a tracked body.

use anyhow::{bail, Context, Result};
use std::collections::VecDeque;
use std::f32::consts::TAU;
use std::thread;
use std::time::{Duration, Instant};

use super::capture::{BodyTracker, Capture, DepthDevice, DepthImage};
use crate::calibration::{load_intrinsics, Intrinsics};
use crate::config::{SensorConfig, TrackerConfig};
use crate::frame::{Body, Frame};
use crate::pose::{BoneTopology, JointId, Skeleton};

/// 体の太さ（深度画像に描く円の半径 mm）
const BODY_RADIUS_MM: f32 = 70.0;
/// 骨に沿って円を置く間隔（mm）
const BONE_SAMPLE_STEP_MM: f32 = 35.0;

/// 直立姿勢（PELVIS 基準、mm、y は下向き）
const REST_POSE_MM: [[f32; 3]; JointId::COUNT] = [
    [0.0, 0.0, 0.0],          // Pelvis
    [0.0, -190.0, 0.0],       // SpineNavel
    [0.0, -350.0, 0.0],       // SpineChest
    [0.0, -520.0, 0.0],       // Neck
    [40.0, -480.0, 0.0],      // ClavicleLeft
    [170.0, -470.0, 0.0],     // ShoulderLeft
    [200.0, -200.0, 0.0],     // ElbowLeft
    [220.0, 40.0, 0.0],       // WristLeft
    [225.0, 110.0, 0.0],      // HandLeft
    [230.0, 180.0, 0.0],      // HandTipLeft
    [195.0, 110.0, -30.0],    // ThumbLeft
    [-40.0, -480.0, 0.0],     // ClavicleRight
    [-170.0, -470.0, 0.0],    // ShoulderRight
    [-200.0, -200.0, 0.0],    // ElbowRight
    [-220.0, 40.0, 0.0],      // WristRight
    [-225.0, 110.0, 0.0],     // HandRight
    [-230.0, 180.0, 0.0],     // HandTipRight
    [-195.0, 110.0, -30.0],   // ThumbRight
    [90.0, 0.0, 0.0],         // HipLeft
    [100.0, 420.0, 0.0],      // KneeLeft
    [100.0, 820.0, 0.0],      // AnkleLeft
    [100.0, 860.0, -120.0],   // FootLeft
    [-90.0, 0.0, 0.0],        // HipRight
    [-100.0, 420.0, 0.0],     // KneeRight
    [-100.0, 820.0, 0.0],     // AnkleRight
    [-100.0, 860.0, -120.0],  // FootRight
    [0.0, -640.0, 0.0],       // Head
    [0.0, -620.0, -90.0],     // Nose
    [35.0, -660.0, -70.0],    // EyeLeft
    [75.0, -640.0, 0.0],      // EarLeft
    [-35.0, -660.0, -70.0],   // EyeRight
    [-75.0, -640.0, 0.0],     // EarRight
];

/// 被験者の動き（デバイスとトラッカーで共有）
#[derive(Debug, Clone)]
pub struct SubjectMotion {
    distance_mm: f32,
    sway_amplitude_mm: f32,
    sway_period_secs: f32,
    absent_every_secs: f32,
    absent_for_secs: f32,
}

impl SubjectMotion {
    pub fn new(config: &TrackerConfig) -> Self {
        Self {
            distance_mm: config.subject_distance_mm,
            sway_amplitude_mm: config.sway_amplitude_mm,
            sway_period_secs: config.sway_period_secs.max(f32::EPSILON),
            absent_every_secs: config.absent_every_secs,
            absent_for_secs: config.absent_for_secs,
        }
    }

    /// 各周期の末尾 `absent_for_secs` の間だけ不在
    pub fn is_present(&self, t: Duration) -> bool {
        if self.absent_every_secs <= 0.0 {
            return true;
        }
        let cycle = t.as_secs_f32() % self.absent_every_secs;
        cycle < self.absent_every_secs - self.absent_for_secs
    }

    pub fn skeleton_at(&self, t: Duration) -> Skeleton {
        let phase = TAU * t.as_secs_f32() / self.sway_period_secs;
        let origin = [
            self.sway_amplitude_mm * phase.sin(),
            15.0 * (2.0 * phase).sin(),
            self.distance_mm,
        ];
        // 揺れに合わせて少しだけ体をひねる
        let yaw = 0.1 * phase.sin();
        let orientation = [0.0, (yaw / 2.0).sin(), 0.0, (yaw / 2.0).cos()];
        let arm_swing = 60.0 * phase.sin();

        let mut skeleton = Skeleton::default();
        for (id, joint) in JointId::ALL.iter().zip(skeleton.joints.iter_mut()) {
            let rest = REST_POSE_MM[id.index()];
            let swing = match id {
                JointId::WristLeft | JointId::HandLeft | JointId::HandTipLeft | JointId::ThumbLeft => -arm_swing,
                JointId::WristRight | JointId::HandRight | JointId::HandTipRight | JointId::ThumbRight => arm_swing,
                _ => 0.0,
            };
            joint.position = [
                origin[0] + rest[0],
                origin[1] + rest[1],
                origin[2] + rest[2] + swing,
            ];
            joint.orientation = orientation;
        }
        skeleton
    }
}

/// 合成深度センサー
pub struct SyntheticDevice {
    intrinsics: Intrinsics,
    motion: SubjectMotion,
    wall_mm: u16,
    /// モデル範囲内の画素（範囲外は実機同様 0）
    valid_mask: Vec<bool>,
    frame_interval: Duration,
    started: Option<Instant>,
    frame_index: u32,
}

impl SyntheticDevice {
    pub fn open(sensor: &SensorConfig, tracker: &TrackerConfig) -> Result<Self> {
        let intrinsics = match &sensor.calibration_file {
            Some(path) => load_intrinsics(path)
                .with_context(|| format!("Failed to load intrinsics from {}", path))?,
            None => Intrinsics::sensor_default(sensor.depth_width, sensor.depth_height),
        };
        if intrinsics.width != sensor.depth_width || intrinsics.height != sensor.depth_height {
            bail!(
                "Calibration is {}x{} but depth mode is {}x{}",
                intrinsics.width,
                intrinsics.height,
                sensor.depth_width,
                sensor.depth_height
            );
        }
        if sensor.fps == 0 {
            bail!("Camera FPS must be positive");
        }
        let device = Self::with_intrinsics(intrinsics, tracker, sensor.fps)?;
        tracing::info!(
            width = sensor.depth_width,
            height = sensor.depth_height,
            fps = sensor.fps,
            "Synthetic depth camera started"
        );
        Ok(device)
    }

    pub fn with_intrinsics(intrinsics: Intrinsics, tracker: &TrackerConfig, fps: u32) -> Result<Self> {
        intrinsics.validate()?;
        let mut valid_mask = Vec::with_capacity(intrinsics.pixel_count());
        for y in 0..intrinsics.height {
            for x in 0..intrinsics.width {
                valid_mask.push(intrinsics.unproject(x as f32, y as f32).is_some());
            }
        }
        Ok(Self {
            intrinsics,
            motion: SubjectMotion::new(tracker),
            wall_mm: tracker.wall_distance_mm,
            valid_mask,
            frame_interval: Duration::from_secs_f64(1.0 / fps.max(1) as f64),
            started: None,
            frame_index: 0,
        })
    }

    /// 時刻 t の深度画像を描く（壁 + 被験者）
    pub fn render_depth(&self, t: Duration) -> DepthImage {
        let (w, h) = (self.intrinsics.width, self.intrinsics.height);
        let mut depth = DepthImage::filled(w, h, self.wall_mm);

        if self.motion.is_present(t) {
            let skeleton = self.motion.skeleton_at(t);
            for (joint, parent) in BoneTopology::body().bones() {
                let a = skeleton.get(joint).position;
                let b = skeleton.get(parent).position;
                let length = ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)).sqrt();
                let steps = (length / BONE_SAMPLE_STEP_MM).ceil().max(1.0) as usize;
                for i in 0..=steps {
                    let s = i as f32 / steps as f32;
                    let p = [
                        a[0] + (b[0] - a[0]) * s,
                        a[1] + (b[1] - a[1]) * s,
                        a[2] + (b[2] - a[2]) * s,
                    ];
                    self.splat(&mut depth, p);
                }
            }
        }

        for (pixel, valid) in depth.pixels_mut().iter_mut().zip(&self.valid_mask) {
            if !valid {
                *pixel = 0;
            }
        }
        depth
    }

    /// 3D点のまわりを円で塗る（手前優先）
    fn splat(&self, depth: &mut DepthImage, p: [f32; 3]) {
        let Some([u, v]) = self.intrinsics.project(p) else {
            return;
        };
        let z = p[2].clamp(1.0, u16::MAX as f32) as u16;
        let r = (BODY_RADIUS_MM * self.intrinsics.fx as f32 / p[2]).max(1.0);
        let (w, h) = (depth.width() as i32, depth.height() as i32);
        let x0 = ((u - r).floor() as i32).max(0);
        let x1 = ((u + r).ceil() as i32).min(w - 1);
        let y0 = ((v - r).floor() as i32).max(0);
        let y1 = ((v + r).ceil() as i32).min(h - 1);
        let pixels = depth.pixels_mut();
        for y in y0..=y1 {
            for x in x0..=x1 {
                let (dx, dy) = (x as f32 - u, y as f32 - v);
                if dx * dx + dy * dy > r * r {
                    continue;
                }
                let px = &mut pixels[y as usize * w as usize + x as usize];
                if *px == 0 || z < *px {
                    *px = z;
                }
            }
        }
    }
}

impl DepthDevice for SyntheticDevice {
    fn calibration(&self) -> &Intrinsics {
        &self.intrinsics
    }

    fn capture(&mut self) -> Result<Capture> {
        let started = *self.started.get_or_insert_with(Instant::now);
        let timestamp = self.frame_interval * self.frame_index;
        let due = started + timestamp;
        let now = Instant::now();
        if due > now {
            thread::sleep(due - now);
        }
        self.frame_index = self.frame_index.wrapping_add(1);
        Ok(Capture {
            depth: self.render_depth(timestamp),
            timestamp,
        })
    }
}

impl Drop for SyntheticDevice {
    fn drop(&mut self) {
        tracing::info!(frames = self.frame_index, "Synthetic depth camera closed");
    }
}

/// 合成ボディトラッカー
///
/// キャプチャ時刻から被験者の姿勢を再計算して返す。キューが満杯のときは
/// 新しいキャプチャを黙って捨てる。
pub struct SyntheticTracker {
    motion: SubjectMotion,
    queue: VecDeque<Capture>,
    capacity: usize,
    dropped: u64,
    body_id: u32,
    was_present: bool,
}

impl SyntheticTracker {
    pub fn create(intrinsics: &Intrinsics, config: &TrackerConfig) -> Result<Self> {
        intrinsics.validate()?;
        if config.queue_capacity == 0 {
            bail!("Tracker queue capacity must be at least 1");
        }
        tracing::info!(queue = config.queue_capacity, "Synthetic body tracker created");
        Ok(Self {
            motion: SubjectMotion::new(config),
            queue: VecDeque::with_capacity(config.queue_capacity),
            capacity: config.queue_capacity,
            dropped: 0,
            body_id: 0,
            was_present: false,
        })
    }

    /// キュー満杯で捨てたキャプチャ数
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl BodyTracker for SyntheticTracker {
    fn enqueue(&mut self, capture: Capture) -> Result<()> {
        if self.queue.len() >= self.capacity {
            self.dropped += 1;
            tracing::trace!("tracker queue full, capture dropped");
            return Ok(());
        }
        self.queue.push_back(capture);
        Ok(())
    }

    fn pop_result(&mut self) -> Result<Option<Frame>> {
        let Some(capture) = self.queue.pop_front() else {
            return Ok(None);
        };

        let present = self.motion.is_present(capture.timestamp);
        // 再登場したら新しいIDを振る
        if present && !self.was_present {
            self.body_id += 1;
        }
        self.was_present = present;

        let bodies = if present {
            vec![Body {
                id: self.body_id,
                skeleton: self.motion.skeleton_at(capture.timestamp),
            }]
        } else {
            Vec::new()
        };
        Ok(Some(Frame::new(capture, bodies)))
    }
}

impl Drop for SyntheticTracker {
    fn drop(&mut self) {
        tracing::info!(dropped = self.dropped, "Synthetic body tracker shut down");
    }
}
