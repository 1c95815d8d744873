pub mod canvas;
pub mod scene;
pub mod skeleton;
pub mod view;
#[cfg(feature = "desktop")]
pub mod window;

pub use canvas::Canvas;
pub use scene::{Scene, SceneBody, SceneRenderer};
pub use skeleton::body_color;
pub use view::ViewCamera;
#[cfg(feature = "desktop")]
pub use window::MinifbRenderer;
