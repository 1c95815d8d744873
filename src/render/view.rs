use nalgebra::{Matrix4, Perspective3, Point3, Vector3, Vector4};

use crate::config::ViewerConfig;

/// センサー原点から +Z を向き、-Y を上とする透視カメラ
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewCamera {
    view: Matrix4<f32>,
    projection: Matrix4<f32>,
    width: usize,
    height: usize,
    fov_y: f32,
}

impl ViewCamera {
    pub fn new(params: &ViewerConfig, width: usize, height: usize) -> Self {
        let fov_y = params.fov_deg.to_radians();
        let aspect = width as f32 / height.max(1) as f32;
        let projection = Perspective3::new(aspect, fov_y, params.near, params.far).to_homogeneous();
        let view = Matrix4::look_at_rh(
            &Point3::origin(),
            &Point3::new(0.0, 0.0, 1.0),
            &Vector3::new(0.0, -1.0, 0.0),
        );
        Self {
            view,
            projection,
            width,
            height,
            fov_y,
        }
    }

    pub fn view(&self) -> &Matrix4<f32> {
        &self.view
    }

    pub fn projection(&self) -> &Matrix4<f32> {
        &self.projection
    }

    pub fn viewport(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    /// 奥行き1mあたりの画素数（垂直方向）
    pub fn focal_px(&self) -> f32 {
        self.height as f32 * 0.5 / (self.fov_y * 0.5).tan()
    }

    /// ワールド座標（m）→ 画面座標（px）。視錐台の外なら None
    pub fn project_point(&self, p: [f32; 3]) -> Option<[f32; 2]> {
        let clip = self.projection * self.view * Vector4::new(p[0], p[1], p[2], 1.0);
        if clip.w <= f32::EPSILON {
            return None;
        }
        let ndc = clip.xyz() / clip.w;
        if !(-1.0..=1.0).contains(&ndc.z) {
            return None;
        }
        let x = (ndc.x + 1.0) * 0.5 * self.width as f32;
        let y = (1.0 - ndc.y) * 0.5 * self.height as f32;
        Some([x, y])
    }

    /// 点までの視線方向の距離（m）
    pub fn depth_of(&self, p: [f32; 3]) -> f32 {
        let v = self.view * Vector4::new(p[0], p[1], p[2], 1.0);
        -v.z
    }
}
