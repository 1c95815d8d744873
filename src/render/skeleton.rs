/// ボディID → 表示色 (RGB)
pub const BODY_PALETTE: [u32; 6] = [
    0x3F_A9_F5, // 水色
    0xF5_7F_3F, // 橙
    0x7F_E0_5A, // 黄緑
    0xE0_5A_C8, // 紫
    0xF5_E0_3F, // 黄
    0x5A_E0_D0, // 青緑
];

/// 点群の色 (RGB)
pub const POINT_COLOR: u32 = 0xFF_FF_FF;

/// 背景色
pub const BACKGROUND_COLOR: u32 = 0x00_00_00;

/// 関節球の最小半径（px）
pub const MIN_JOINT_RADIUS_PX: i32 = 2;

pub fn body_color(id: u32) -> u32 {
    BODY_PALETTE[id as usize % BODY_PALETTE.len()]
}
