use std::time::Duration;

use crate::camera::{Capture, DepthImage};
use crate::pose::Skeleton;

/// トラッカーが検出した1人分の骨格
#[derive(Debug, Clone, PartialEq)]
pub struct Body {
    pub id: u32,
    pub skeleton: Skeleton,
}

/// 1回のキャプチャとボディトラッキング結果
///
/// `Clone` を実装しないため所有者は常に1つ。スレッド間は move で受け渡し、
/// drop した時点で解放される。
#[derive(Debug)]
pub struct Frame {
    capture: Capture,
    bodies: Vec<Body>,
}

impl Frame {
    pub fn new(capture: Capture, bodies: Vec<Body>) -> Self {
        Self { capture, bodies }
    }

    pub fn number_of_bodies(&self) -> usize {
        self.bodies.len()
    }

    pub fn body(&self, index: usize) -> Option<&Body> {
        self.bodies.get(index)
    }

    pub fn bodies(&self) -> &[Body] {
        &self.bodies
    }

    pub fn capture(&self) -> &Capture {
        &self.capture
    }

    pub fn depth(&self) -> &DepthImage {
        &self.capture.depth
    }

    /// デバイス時刻（ストリーム開始からの経過）
    pub fn timestamp(&self) -> Duration {
        self.capture.timestamp
    }
}
