/// ボディトラッキングの 32 関節インデックス（記録の列順もこの順）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(usize)]
pub enum JointId {
    Pelvis = 0,
    SpineNavel = 1,
    SpineChest = 2,
    Neck = 3,
    ClavicleLeft = 4,
    ShoulderLeft = 5,
    ElbowLeft = 6,
    WristLeft = 7,
    HandLeft = 8,
    HandTipLeft = 9,
    ThumbLeft = 10,
    ClavicleRight = 11,
    ShoulderRight = 12,
    ElbowRight = 13,
    WristRight = 14,
    HandRight = 15,
    HandTipRight = 16,
    ThumbRight = 17,
    HipLeft = 18,
    KneeLeft = 19,
    AnkleLeft = 20,
    FootLeft = 21,
    HipRight = 22,
    KneeRight = 23,
    AnkleRight = 24,
    FootRight = 25,
    Head = 26,
    Nose = 27,
    EyeLeft = 28,
    EarLeft = 29,
    EyeRight = 30,
    EarRight = 31,
}

impl JointId {
    pub const COUNT: usize = 32;

    pub const ALL: [JointId; Self::COUNT] = [
        Self::Pelvis,
        Self::SpineNavel,
        Self::SpineChest,
        Self::Neck,
        Self::ClavicleLeft,
        Self::ShoulderLeft,
        Self::ElbowLeft,
        Self::WristLeft,
        Self::HandLeft,
        Self::HandTipLeft,
        Self::ThumbLeft,
        Self::ClavicleRight,
        Self::ShoulderRight,
        Self::ElbowRight,
        Self::WristRight,
        Self::HandRight,
        Self::HandTipRight,
        Self::ThumbRight,
        Self::HipLeft,
        Self::KneeLeft,
        Self::AnkleLeft,
        Self::FootLeft,
        Self::HipRight,
        Self::KneeRight,
        Self::AnkleRight,
        Self::FootRight,
        Self::Head,
        Self::Nose,
        Self::EyeLeft,
        Self::EarLeft,
        Self::EyeRight,
        Self::EarRight,
    ];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn index(self) -> usize {
        self as usize
    }

    /// 解析スクリプトと共通の関節名
    pub fn name(self) -> &'static str {
        match self {
            Self::Pelvis => "PELVIS",
            Self::SpineNavel => "SPINE_NAVAL",
            Self::SpineChest => "SPINE_CHEST",
            Self::Neck => "NECK",
            Self::ClavicleLeft => "CLAVICLE_LEFT",
            Self::ShoulderLeft => "SHOULDER_LEFT",
            Self::ElbowLeft => "ELBOW_LEFT",
            Self::WristLeft => "WRIST_LEFT",
            Self::HandLeft => "HAND_LEFT",
            Self::HandTipLeft => "HANDTIP_LEFT",
            Self::ThumbLeft => "THUMB_LEFT",
            Self::ClavicleRight => "CLAVICLE_RIGHT",
            Self::ShoulderRight => "SHOULDER_RIGHT",
            Self::ElbowRight => "ELBOW_RIGHT",
            Self::WristRight => "WRIST_RIGHT",
            Self::HandRight => "HAND_RIGHT",
            Self::HandTipRight => "HANDTIP_RIGHT",
            Self::ThumbRight => "THUMB_RIGHT",
            Self::HipLeft => "HIP_LEFT",
            Self::KneeLeft => "KNEE_LEFT",
            Self::AnkleLeft => "ANKLE_LEFT",
            Self::FootLeft => "FOOT_LEFT",
            Self::HipRight => "HIP_RIGHT",
            Self::KneeRight => "KNEE_RIGHT",
            Self::AnkleRight => "ANKLE_RIGHT",
            Self::FootRight => "FOOT_RIGHT",
            Self::Head => "HEAD",
            Self::Nose => "NOSE",
            Self::EyeLeft => "EYE_LEFT",
            Self::EarLeft => "EAR_LEFT",
            Self::EyeRight => "EYE_RIGHT",
            Self::EarRight => "EAR_RIGHT",
        }
    }
}

/// 単一関節
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Joint {
    /// カメラ座標の位置（mm）
    pub position: [f32; 3],
    /// 回転（クォータニオン: x, y, z, w）
    pub orientation: [f32; 4],
}

impl Joint {
    pub fn new(position: [f32; 3], orientation: [f32; 4]) -> Self {
        Self { position, orientation }
    }

    /// 回転なし
    pub fn at(position: [f32; 3]) -> Self {
        Self::new(position, [0.0, 0.0, 0.0, 1.0])
    }

    /// 描画用（メートル）
    pub fn position_m(&self) -> [f32; 3] {
        [
            self.position[0] / 1000.0,
            self.position[1] / 1000.0,
            self.position[2] / 1000.0,
        ]
    }
}

impl Default for Joint {
    fn default() -> Self {
        Self::at([0.0, 0.0, 0.0])
    }
}

/// 32関節からなる骨格
#[derive(Debug, Clone, PartialEq)]
pub struct Skeleton {
    pub joints: [Joint; JointId::COUNT],
}

impl Skeleton {
    pub fn new(joints: [Joint; JointId::COUNT]) -> Self {
        Self { joints }
    }

    pub fn from_positions(positions: &[[f32; 3]; JointId::COUNT]) -> Self {
        Self::new(std::array::from_fn(|i| Joint::at(positions[i])))
    }

    pub fn get(&self, id: JointId) -> &Joint {
        &self.joints[id as usize]
    }

    /// 正規の関節順で走査
    pub fn iter(&self) -> impl Iterator<Item = (JointId, &Joint)> {
        JointId::ALL.iter().copied().zip(self.joints.iter())
    }
}

impl Default for Skeleton {
    fn default() -> Self {
        Self::new([Joint::default(); JointId::COUNT])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_joint_id_count() {
        assert_eq!(JointId::COUNT, 32);
        assert_eq!(JointId::ALL.len(), JointId::COUNT);
    }

    #[test]
    fn test_all_is_in_index_order() {
        for (i, id) in JointId::ALL.iter().enumerate() {
            assert_eq!(id.index(), i);
        }
    }

    #[test]
    fn test_joint_id_from_index() {
        assert_eq!(JointId::from_index(0), Some(JointId::Pelvis));
        assert_eq!(JointId::from_index(26), Some(JointId::Head));
        assert_eq!(JointId::from_index(31), Some(JointId::EarRight));
        assert_eq!(JointId::from_index(32), None);
    }

    #[test]
    fn test_joint_position_m() {
        let joint = Joint::at([1000.0, -250.0, 2000.0]);
        assert_eq!(joint.position_m(), [1.0, -0.25, 2.0]);
    }

    #[test]
    fn test_skeleton_get() {
        let mut positions = [[0.0; 3]; JointId::COUNT];
        positions[JointId::Nose as usize] = [1.0, 2.0, 3.0];
        let skeleton = Skeleton::from_positions(&positions);
        assert_eq!(skeleton.get(JointId::Nose).position, [1.0, 2.0, 3.0]);
        assert_eq!(skeleton.get(JointId::Nose).orientation, [0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_skeleton_iter_order() {
        let skeleton = Skeleton::default();
        let ids: Vec<JointId> = skeleton.iter().map(|(id, _)| id).collect();
        assert_eq!(ids, JointId::ALL.to_vec());
    }
}
