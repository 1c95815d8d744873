use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::record::RowFormat;

#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub sensor: SensorConfig,
    #[serde(default)]
    pub tracker: TrackerConfig,
    #[serde(default)]
    pub recording: RecordingConfig,
    #[serde(default)]
    pub viewer: ViewerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SensorConfig {
    /// 深度画像の幅（NFOV unbinned: 640）
    #[serde(default = "default_depth_width")]
    pub depth_width: usize,
    /// 深度画像の高さ（NFOV unbinned: 576）
    #[serde(default = "default_depth_height")]
    pub depth_height: usize,
    #[serde(default = "default_fps")]
    pub fps: u32,
    /// 内部パラメータJSON。未指定ならセンサー既定値を使う
    #[serde(default)]
    pub calibration_file: Option<String>,
}

fn default_depth_width() -> usize { 640 }
fn default_depth_height() -> usize { 576 }
fn default_fps() -> u32 { 15 }

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            depth_width: default_depth_width(),
            depth_height: default_depth_height(),
            fps: default_fps(),
            calibration_file: None,
        }
    }
}

/// 合成トラッカーの動作パラメータ
#[derive(Debug, Deserialize, Clone)]
pub struct TrackerConfig {
    /// 推論キューの長さ。満杯時は新しいキャプチャを捨てる
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// 被験者までの距離（mm）
    #[serde(default = "default_subject_distance")]
    pub subject_distance_mm: f32,
    /// 左右の揺れ幅（mm）
    #[serde(default = "default_sway_amplitude")]
    pub sway_amplitude_mm: f32,
    /// 揺れの周期（秒）
    #[serde(default = "default_sway_period")]
    pub sway_period_secs: f32,
    /// 不在区間の周期（秒）。0なら常に在席
    #[serde(default = "default_absent_every")]
    pub absent_every_secs: f32,
    /// 各周期の末尾で被験者が消える時間（秒）
    #[serde(default = "default_absent_for")]
    pub absent_for_secs: f32,
    /// 背景の壁までの距離（mm）
    #[serde(default = "default_wall_distance")]
    pub wall_distance_mm: u16,
}

fn default_queue_capacity() -> usize { 3 }
fn default_subject_distance() -> f32 { 2200.0 }
fn default_sway_amplitude() -> f32 { 150.0 }
fn default_sway_period() -> f32 { 4.0 }
fn default_absent_every() -> f32 { 12.0 }
fn default_absent_for() -> f32 { 2.0 }
fn default_wall_distance() -> u16 { 3500 }

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            subject_distance_mm: default_subject_distance(),
            sway_amplitude_mm: default_sway_amplitude(),
            sway_period_secs: default_sway_period(),
            absent_every_secs: default_absent_every(),
            absent_for_secs: default_absent_for(),
            wall_distance_mm: default_wall_distance(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RecordingConfig {
    /// 出力先ディレクトリ（ラベルごとのサブディレクトリにCSVを作成）
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default)]
    pub row_format: RowFormat,
    /// 指定するとラベル入力を省略する
    #[serde(default)]
    pub label: Option<u32>,
    /// 書き込み失敗時にセッション全体を止めるか
    #[serde(default)]
    pub stop_session_on_error: bool,
}

fn default_output_dir() -> PathBuf { PathBuf::from("temp") }

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            row_format: RowFormat::default(),
            label: None,
            stop_session_on_error: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ViewerConfig {
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default = "default_window_width")]
    pub width: usize,
    #[serde(default = "default_window_height")]
    pub height: usize,
    #[serde(default = "default_target_fps")]
    pub target_fps: usize,
    /// 垂直画角（度）
    #[serde(default = "default_fov")]
    pub fov_deg: f32,
    #[serde(default = "default_near")]
    pub near: f32,
    #[serde(default = "default_far")]
    pub far: f32,
    /// 点群の間引き（n点に1点描画）
    #[serde(default = "default_point_stride")]
    pub point_stride: usize,
    /// 関節球の半径（メートル）
    #[serde(default = "default_joint_radius")]
    pub joint_radius: f32,
}

fn default_title() -> String { "pos_saver".to_string() }
fn default_window_width() -> usize { 640 }
fn default_window_height() -> usize { 480 }
fn default_target_fps() -> usize { 60 }
fn default_fov() -> f32 { 65.0 }
fn default_near() -> f32 { 0.1 }
fn default_far() -> f32 { 150.0 }
fn default_point_stride() -> usize { 2 }
fn default_joint_radius() -> f32 { 0.024 }

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            title: default_title(),
            width: default_window_width(),
            height: default_window_height(),
            target_fps: default_target_fps(),
            fov_deg: default_fov(),
            near: default_near(),
            far: default_far(),
            point_stride: default_point_stride(),
            joint_radius: default_joint_radius(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse config")?;
        Ok(config)
    }

    /// ファイルが無ければ既定値。壊れている場合はエラー
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!("{} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load(path)
    }
}
