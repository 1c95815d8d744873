use anyhow::{bail, Result};

use super::joint::{JointId, Skeleton};

/// 標準骨格の親関節（PELVIS がルート）
const BODY_PARENTS: [Option<JointId>; JointId::COUNT] = {
    use JointId::*;
    [
        None,                // Pelvis
        Some(Pelvis),        // SpineNavel
        Some(SpineNavel),    // SpineChest
        Some(SpineChest),    // Neck
        Some(SpineChest),    // ClavicleLeft
        Some(ClavicleLeft),  // ShoulderLeft
        Some(ShoulderLeft),  // ElbowLeft
        Some(ElbowLeft),     // WristLeft
        Some(WristLeft),     // HandLeft
        Some(HandLeft),      // HandTipLeft
        Some(WristLeft),     // ThumbLeft
        Some(SpineChest),    // ClavicleRight
        Some(ClavicleRight), // ShoulderRight
        Some(ShoulderRight), // ElbowRight
        Some(ElbowRight),    // WristRight
        Some(WristRight),    // HandRight
        Some(HandRight),     // HandTipRight
        Some(WristRight),    // ThumbRight
        Some(Pelvis),        // HipLeft
        Some(HipLeft),       // KneeLeft
        Some(KneeLeft),      // AnkleLeft
        Some(AnkleLeft),     // FootLeft
        Some(Pelvis),        // HipRight
        Some(HipRight),      // KneeRight
        Some(KneeRight),     // AnkleRight
        Some(AnkleRight),    // FootRight
        Some(Neck),          // Head
        Some(Head),          // Nose
        Some(Head),          // EyeLeft
        Some(Head),          // EarLeft
        Some(Head),          // EyeRight
        Some(Head),          // EarRight
    ]
};

/// 関節 → 親関節の木構造
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoneTopology {
    parents: [Option<JointId>; JointId::COUNT],
    root: JointId,
}

/// センサー標準の32関節骨格
pub static BODY_TOPOLOGY: BoneTopology = BoneTopology {
    parents: BODY_PARENTS,
    root: JointId::Pelvis,
};

impl BoneTopology {
    /// 親テーブルが木（ルート1つ、循環なし）であることを確認して構築
    pub fn new(parents: [Option<JointId>; JointId::COUNT]) -> Result<Self> {
        let roots: Vec<JointId> = JointId::ALL
            .iter()
            .copied()
            .filter(|id| parents[id.index()].is_none())
            .collect();
        let root = match roots.as_slice() {
            [root] => *root,
            _ => bail!("Topology must have exactly one root, found {}", roots.len()),
        };

        for id in JointId::ALL {
            let mut current = id;
            let mut steps = 0;
            while let Some(parent) = parents[current.index()] {
                steps += 1;
                if steps > JointId::COUNT {
                    bail!("Cycle in topology at {}", id.name());
                }
                current = parent;
            }
        }

        Ok(Self { parents, root })
    }

    pub fn body() -> &'static Self {
        &BODY_TOPOLOGY
    }

    pub fn parent(&self, id: JointId) -> Option<JointId> {
        self.parents[id.index()]
    }

    pub fn root(&self) -> JointId {
        self.root
    }

    /// (関節, 親) を正規の関節順で列挙。ルートは含まない
    pub fn bones(&self) -> impl Iterator<Item = (JointId, JointId)> + '_ {
        JointId::ALL
            .iter()
            .filter_map(|&id| self.parent(id).map(|parent| (id, parent)))
    }
}

/// 骨の線分（位置は mm）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoneSegment {
    pub joint: JointId,
    pub parent: JointId,
    pub start: [f32; 3],
    pub end: [f32; 3],
}

pub fn bone_segments(skeleton: &Skeleton, topology: &BoneTopology) -> Vec<BoneSegment> {
    let mut segments = Vec::with_capacity(JointId::COUNT - 1);
    bone_segments_into(skeleton, topology, &mut segments);
    segments
}

/// `out` を再利用して線分を書き込む
pub fn bone_segments_into(
    skeleton: &Skeleton,
    topology: &BoneTopology,
    out: &mut Vec<BoneSegment>,
) {
    out.clear();
    out.extend(topology.bones().map(|(joint, parent)| BoneSegment {
        joint,
        parent,
        start: skeleton.get(joint).position,
        end: skeleton.get(parent).position,
    }));
}
