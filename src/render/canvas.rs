use super::scene::Scene;
use super::skeleton::{body_color, BACKGROUND_COLOR, MIN_JOINT_RADIUS_PX, POINT_COLOR};
use crate::config::ViewerConfig;
use crate::pointcloud::INVALID_POINT;

fn mm_to_m(p: &[f32; 3]) -> [f32; 3] {
    [p[0] / 1000.0, p[1] / 1000.0, p[2] / 1000.0]
}

/// 0RGB の画素バッファ。点・線・円をソフトウェアで描く
pub struct Canvas {
    buffer: Vec<u32>,
    width: usize,
    height: usize,
    point_stride: usize,
    joint_radius: f32,
}

impl Canvas {
    pub fn new(params: &ViewerConfig, width: usize, height: usize) -> Self {
        Self {
            buffer: vec![BACKGROUND_COLOR; width * height],
            width,
            height,
            point_stride: params.point_stride.max(1),
            joint_radius: params.joint_radius,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn buffer(&self) -> &[u32] {
        &self.buffer
    }

    pub fn pixel(&self, x: usize, y: usize) -> Option<u32> {
        if x >= self.width {
            return None;
        }
        self.buffer.get(y * self.width + x).copied()
    }

    pub fn clear(&mut self) {
        self.buffer.fill(BACKGROUND_COLOR);
    }

    /// 点群 → 骨 → 関節の順に描く
    pub fn paint(&mut self, scene: &Scene<'_>) {
        self.clear();
        let camera = scene.camera;

        for point in scene.points.points().iter().step_by(self.point_stride) {
            if *point == INVALID_POINT {
                continue;
            }
            if let Some([x, y]) = camera.project_point(mm_to_m(point)) {
                self.set_pixel(x as i32, y as i32, POINT_COLOR);
            }
        }

        let Some(body) = scene.body else {
            return;
        };
        let color = body_color(body.id);

        for bone in body.bones {
            let start = camera.project_point(mm_to_m(&bone.start));
            let end = camera.project_point(mm_to_m(&bone.end));
            if let (Some([x0, y0]), Some([x1, y1])) = (start, end) {
                self.draw_line(x0 as i32, y0 as i32, x1 as i32, y1 as i32, color);
            }
        }

        let focal = camera.focal_px();
        for (_, joint) in body.skeleton.iter() {
            let p = joint.position_m();
            let Some([x, y]) = camera.project_point(p) else {
                continue;
            };
            let depth = camera.depth_of(p);
            let radius = ((self.joint_radius * focal / depth).round() as i32).max(MIN_JOINT_RADIUS_PX);
            self.draw_circle(x as i32, y as i32, radius, color);
        }
    }

    /// Bresenhamのアルゴリズムで線を描画
    fn draw_line(&mut self, x0: i32, y0: i32, x1: i32, y1: i32, color: u32) {
        let dx = (x1 - x0).abs();
        let dy = -(y1 - y0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let sy = if y0 < y1 { 1 } else { -1 };
        let mut err = dx + dy;
        let (mut x, mut y) = (x0, y0);

        loop {
            self.set_pixel(x, y, color);
            if x == x1 && y == y1 {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x += sx;
            }
            if e2 <= dx {
                err += dx;
                y += sy;
            }
        }
    }

    fn draw_circle(&mut self, cx: i32, cy: i32, radius: i32, color: u32) {
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                if dx * dx + dy * dy <= radius * radius {
                    self.set_pixel(cx + dx, cy + dy, color);
                }
            }
        }
    }

    fn set_pixel(&mut self, x: i32, y: i32, color: u32) {
        if x >= 0 && x < self.width as i32 && y >= 0 && y < self.height as i32 {
            self.buffer[y as usize * self.width + x as usize] = color;
        }
    }
}
