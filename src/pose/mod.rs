pub mod extract;
pub mod joint;
pub mod topology;

pub use extract::{extract_skeleton, TRACKED_BODY_INDEX};
pub use joint::{Joint, JointId, Skeleton};
pub use topology::{bone_segments, bone_segments_into, BoneSegment, BoneTopology, BODY_TOPOLOGY};
