use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// 未収束とみなす残差（正規化座標の二乗誤差）
const MAX_UNDISTORT_RESIDUAL: f64 = 1e-12;

/// Brown-Conrady 有理モデルの歪み係数（OpenCV と同じ並び）
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Distortion {
    pub k1: f64,
    pub k2: f64,
    pub k3: f64,
    pub k4: f64,
    pub k5: f64,
    pub k6: f64,
    pub p1: f64,
    pub p2: f64,
}

impl Distortion {
    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }

    /// 半径方向の倍率と r² に対する微分
    fn radial(&self, r2: f64) -> (f64, f64) {
        let r4 = r2 * r2;
        let r6 = r4 * r2;
        let num = 1.0 + self.k1 * r2 + self.k2 * r4 + self.k3 * r6;
        let den = 1.0 + self.k4 * r2 + self.k5 * r4 + self.k6 * r6;
        let dnum = self.k1 + 2.0 * self.k2 * r2 + 3.0 * self.k3 * r4;
        let dden = self.k4 + 2.0 * self.k5 * r2 + 3.0 * self.k6 * r4;
        (num / den, (dnum * den - num * dden) / (den * den))
    }
}

/// 深度カメラの内部パラメータ
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intrinsics {
    pub width: usize,
    pub height: usize,
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
    #[serde(default)]
    pub distortion: Distortion,
    /// モデルが有効な正規化半径。0なら制限なし
    #[serde(default)]
    pub metric_radius: f64,
}

impl Intrinsics {
    pub fn pinhole(width: usize, height: usize, fx: f64, fy: f64, cx: f64, cy: f64) -> Self {
        Self {
            width,
            height,
            fx,
            fy,
            cx,
            cy,
            distortion: Distortion::default(),
            metric_radius: 0.0,
        }
    }

    /// NFOV深度モード相当の典型値（解像度に合わせてスケール）
    pub fn sensor_default(width: usize, height: usize) -> Self {
        let f = 504.0 * width as f64 / 640.0;
        Self {
            width,
            height,
            fx: f,
            fy: f,
            cx: (width as f64 - 1.0) / 2.0,
            cy: (height as f64 - 1.0) / 2.0,
            distortion: Distortion {
                k1: 0.5,
                k2: -0.05,
                k4: 0.85,
                k5: 0.05,
                ..Distortion::default()
            },
            metric_radius: 1.7,
        }
    }

    pub fn pixel_count(&self) -> usize {
        self.width * self.height
    }

    fn within_radius(&self, r2: f64) -> bool {
        self.metric_radius <= 0.0 || r2 <= self.metric_radius * self.metric_radius
    }

    /// 正規化座標に歪みを適用
    pub fn distort(&self, x: f64, y: f64) -> (f64, f64) {
        let d = &self.distortion;
        let r2 = x * x + y * y;
        let (radial, _) = d.radial(r2);
        (
            x * radial + 2.0 * d.p1 * x * y + d.p2 * (r2 + 2.0 * x * x),
            y * radial + d.p1 * (r2 + 2.0 * y * y) + 2.0 * d.p2 * x * y,
        )
    }

    /// カメラ座標の3D点 → ピクセル座標。背面やモデル範囲外は None
    pub fn project(&self, point: [f32; 3]) -> Option<[f32; 2]> {
        let z = point[2] as f64;
        if z <= 0.0 {
            return None;
        }
        let x = point[0] as f64 / z;
        let y = point[1] as f64 / z;
        if !self.within_radius(x * x + y * y) {
            return None;
        }
        let (xd, yd) = self.distort(x, y);
        Some([(xd * self.fx + self.cx) as f32, (yd * self.fy + self.cy) as f32])
    }

    /// ピクセル座標 → 光線 (x, y, 1)。深度 d[mm] を掛けると位置になる
    ///
    /// Newton-Raphson で順方向歪みモデル f(x, y) = 観測値 を解く。
    /// 収束しない、またはモデル半径の外なら None。
    pub fn unproject(&self, u: f32, v: f32) -> Option<[f32; 3]> {
        let xd = (u as f64 - self.cx) / self.fx;
        let yd = (v as f64 - self.cy) / self.fy;

        if self.distortion.is_zero() {
            return self
                .within_radius(xd * xd + yd * yd)
                .then_some([xd as f32, yd as f32, 1.0]);
        }

        let d = &self.distortion;
        let mut x = xd;
        let mut y = yd;
        let mut best = (x, y, f64::MAX);

        for _ in 0..30 {
            let r2 = x * x + y * y;
            let (radial, dr_dr2) = d.radial(r2);

            let fx_val = x * radial + 2.0 * d.p1 * x * y + d.p2 * (r2 + 2.0 * x * x) - xd;
            let fy_val = y * radial + d.p1 * (r2 + 2.0 * y * y) + 2.0 * d.p2 * x * y - yd;

            let residual = fx_val * fx_val + fy_val * fy_val;
            if residual < best.2 {
                best = (x, y, residual);
            }
            if residual < 1e-20 {
                break;
            }

            let j00 = radial + 2.0 * x * x * dr_dr2 + 2.0 * d.p1 * y + 6.0 * d.p2 * x;
            let j01 = 2.0 * x * y * dr_dr2 + 2.0 * d.p1 * x + 2.0 * d.p2 * y;
            let j11 = radial + 2.0 * y * y * dr_dr2 + 6.0 * d.p1 * y + 2.0 * d.p2 * x;

            let det = j00 * j11 - j01 * j01;
            if det.abs() < 1e-12 {
                break;
            }

            x -= (j11 * fx_val - j01 * fy_val) / det;
            y -= (-j01 * fx_val + j00 * fy_val) / det;
        }

        let (x, y, residual) = best;
        if residual > MAX_UNDISTORT_RESIDUAL || !self.within_radius(x * x + y * y) {
            return None;
        }
        Some([x as f32, y as f32, 1.0])
    }

    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            bail!("Invalid depth resolution {}x{}", self.width, self.height);
        }
        if self.fx <= 0.0 || self.fy <= 0.0 {
            bail!("Focal length must be positive (fx={}, fy={})", self.fx, self.fy);
        }
        Ok(())
    }
}

// --- Save / Load ---

pub fn save_intrinsics<P: AsRef<Path>>(path: P, intrinsics: &Intrinsics) -> Result<()> {
    let json = serde_json::to_string_pretty(intrinsics)?;
    fs::write(path, json).context("Failed to write calibration file")?;
    Ok(())
}

pub fn load_intrinsics<P: AsRef<Path>>(path: P) -> Result<Intrinsics> {
    let content = fs::read_to_string(path).context("Failed to read calibration file")?;
    let intrinsics: Intrinsics = serde_json::from_str(&content)?;
    intrinsics.validate()?;
    Ok(intrinsics)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pinhole_principal_point_is_optical_axis() {
        let k = Intrinsics::pinhole(640, 576, 500.0, 500.0, 320.0, 288.0);
        assert_eq!(k.unproject(320.0, 288.0), Some([0.0, 0.0, 1.0]));
    }

    #[test]
    fn test_pinhole_unproject_offset() {
        let k = Intrinsics::pinhole(640, 576, 500.0, 400.0, 320.0, 288.0);
        let ray = k.unproject(420.0, 248.0).unwrap();
        assert!((ray[0] - 0.2).abs() < 1e-6);
        assert!((ray[1] + 0.1).abs() < 1e-6);
        assert_eq!(ray[2], 1.0);
    }

    #[test]
    fn test_distorted_unproject_inverts_project() {
        let k = Intrinsics::sensor_default(640, 576);
        for &(u, v) in &[(100.0, 80.0), (319.5, 287.5), (600.0, 500.0), (50.0, 540.0)] {
            let ray = k.unproject(u, v).expect("inside model radius");
            let p = [ray[0] * 1500.0, ray[1] * 1500.0, 1500.0];
            let [pu, pv] = k.project(p).unwrap();
            assert!((pu - u).abs() < 1e-2, "u: expected {}, got {}", u, pu);
            assert!((pv - v).abs() < 1e-2, "v: expected {}, got {}", v, pv);
        }
    }

    #[test]
    fn test_metric_radius_rejects_far_pixels() {
        let mut k = Intrinsics::pinhole(640, 576, 100.0, 100.0, 320.0, 288.0);
        k.metric_radius = 1.0;
        assert!(k.unproject(330.0, 288.0).is_some());
        // (600-320)/100 = 2.8 > 1.0
        assert!(k.unproject(600.0, 288.0).is_none());
    }

    #[test]
    fn test_project_behind_camera() {
        let k = Intrinsics::pinhole(640, 576, 500.0, 500.0, 320.0, 288.0);
        assert!(k.project([0.0, 0.0, -1.0]).is_none());
        assert!(k.project([0.0, 0.0, 0.0]).is_none());
    }

    #[test]
    fn test_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("calibration.json");
        let k = Intrinsics::sensor_default(320, 288);
        save_intrinsics(&path, &k).unwrap();
        assert_eq!(load_intrinsics(&path).unwrap(), k);
    }

    #[test]
    fn test_load_rejects_zero_focal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(
            &path,
            r#"{"width": 4, "height": 4, "fx": 0.0, "fy": 1.0, "cx": 2.0, "cy": 2.0}"#,
        )
        .unwrap();
        assert!(load_intrinsics(&path).is_err());
    }
}
