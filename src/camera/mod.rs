pub mod capture;
pub mod synthetic;

pub use capture::{
    run_acquisition, AcquisitionStats, AcquisitionThread, BodyTracker, Capture, DepthDevice,
    DepthImage,
};
pub use synthetic::{SubjectMotion, SyntheticDevice, SyntheticTracker};
