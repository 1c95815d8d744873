pub mod calibration;
pub mod camera;
pub mod config;
pub mod frame;
pub mod mailbox;
pub mod pointcloud;
pub mod pose;
pub mod record;
pub mod render;
pub mod session;
