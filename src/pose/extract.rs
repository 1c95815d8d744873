use crate::frame::Frame;

use super::joint::Skeleton;

/// 1セッション1人の前提で、常に先頭（index 0）のボディを使う
pub const TRACKED_BODY_INDEX: usize = 0;

/// フレームから骨格を取り出す。ボディが無ければ None（そのティックは描画・記録しない）
pub fn extract_skeleton(frame: &Frame) -> Option<Skeleton> {
    frame
        .body(TRACKED_BODY_INDEX)
        .map(|body| body.skeleton.clone())
}
