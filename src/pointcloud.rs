//! Depth image → camera-space point cloud through a per-pixel ray table.

use anyhow::{bail, Result};

use crate::calibration::Intrinsics;
use crate::camera::DepthImage;

/// 深度が無い画素の値。有効な点は必ず z > 0 なので原点と区別できる
pub const INVALID_POINT: [f32; 3] = [0.0, 0.0, 0.0];

/// 画素ごとの光線テーブル
///
/// 各光線は z = 1 に正規化されており、深度値（光軸方向の距離 mm）を掛けると
/// カメラ座標の位置になる。モデル外の画素はゼロベクトル。
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationCache {
    width: usize,
    height: usize,
    rays: Vec<[f32; 3]>,
}

impl CalibrationCache {
    pub fn build(intrinsics: &Intrinsics) -> Self {
        let (width, height) = (intrinsics.width, intrinsics.height);
        let mut rays = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                rays.push(
                    intrinsics
                        .unproject(x as f32, y as f32)
                        .unwrap_or(INVALID_POINT),
                );
            }
        }

        let invalid = rays.iter().filter(|r| **r == INVALID_POINT).count();
        tracing::debug!(width, height, invalid, "Built calibration cache");
        Self { width, height, rays }
    }

    pub fn from_rays(width: usize, height: usize, rays: Vec<[f32; 3]>) -> Result<Self> {
        if rays.len() != width * height {
            bail!("Ray table has {} entries, expected {}x{}", rays.len(), width, height);
        }
        Ok(Self { width, height, rays })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn len(&self) -> usize {
        self.rays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rays.is_empty()
    }

    pub fn ray(&self, x: usize, y: usize) -> Option<&[f32; 3]> {
        if x >= self.width {
            return None;
        }
        self.rays.get(y * self.width + x)
    }

    pub fn rays(&self) -> &[[f32; 3]] {
        &self.rays
    }
}

/// 深度画素と同じ並びの点群（mm）。フレーム間で使い回す
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointCloud {
    points: Vec<[f32; 3]>,
    valid: usize,
}

impl PointCloud {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn points(&self) -> &[[f32; 3]] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// 直近の投影で有効だった点の数
    pub fn valid_count(&self) -> usize {
        self.valid
    }

    pub fn valid_points(&self) -> impl Iterator<Item = &[f32; 3]> {
        self.points.iter().filter(|p| **p != INVALID_POINT)
    }
}

/// 深度画像を点群に投影する。`out` はサイズが変わった時だけ確保し直す
pub fn project(depth: &DepthImage, cache: &CalibrationCache, out: &mut PointCloud) -> Result<()> {
    if depth.width() != cache.width || depth.height() != cache.height {
        bail!(
            "Depth image {}x{} does not match calibration {}x{}",
            depth.width(),
            depth.height(),
            cache.width,
            cache.height
        );
    }

    let len = cache.rays.len();
    if out.points.len() != len {
        out.points.resize(len, INVALID_POINT);
    }

    let mut valid = 0;
    for ((point, ray), &d) in out.points.iter_mut().zip(&cache.rays).zip(depth.pixels()) {
        if d == 0 || *ray == INVALID_POINT {
            *point = INVALID_POINT;
            continue;
        }
        let d = d as f32;
        *point = [ray[0] * d, ray[1] * d, ray[2] * d];
        valid += 1;
    }
    out.valid = valid;
    Ok(())
}
