use anyhow::Result;

use super::view::ViewCamera;
use crate::pointcloud::PointCloud;
use crate::pose::{BoneSegment, Skeleton};

/// 描画対象の骨格
#[derive(Debug, Clone, Copy)]
pub struct SceneBody<'a> {
    pub id: u32,
    pub skeleton: &'a Skeleton,
    pub bones: &'a [BoneSegment],
}

/// 1ティック分の描画内容（座標は mm）
#[derive(Debug, Clone, Copy)]
pub struct Scene<'a> {
    pub camera: &'a ViewCamera,
    pub points: &'a PointCloud,
    pub body: Option<SceneBody<'a>>,
}

/// ウィンドウ側の描画先
pub trait SceneRenderer {
    fn viewport(&self) -> (usize, usize);

    fn is_open(&self) -> bool;

    /// シーンを描いて表示する
    fn draw(&mut self, scene: &Scene<'_>) -> Result<()>;

    /// 新しいフレームが無いティックでイベントだけ処理する
    fn pump(&mut self) -> Result<()>;
}
