use anyhow::Result;
use minifb::{Key, KeyRepeat, Scale, Window, WindowOptions};

use super::canvas::Canvas;
use super::scene::{Scene, SceneRenderer};
use crate::config::ViewerConfig;

/// minifbを使用したレンダラー
pub struct MinifbRenderer {
    window: Window,
    canvas: Canvas,
    title: String,
    target_fps: usize,
    fullscreen: bool,
}

impl MinifbRenderer {
    /// ウィンドウを作成
    pub fn new(params: &ViewerConfig) -> Result<Self> {
        let window = open_window(&params.title, params.width, params.height, false, params.target_fps)?;
        Ok(Self {
            window,
            canvas: Canvas::new(params, params.width, params.height),
            title: params.title.clone(),
            target_fps: params.target_fps,
            fullscreen: false,
        })
    }

    /// F キーでボーダーレス全画面と通常ウィンドウを切り替える
    fn handle_keys(&mut self) -> Result<()> {
        if self.window.is_key_pressed(Key::F, KeyRepeat::No) {
            self.fullscreen = !self.fullscreen;
            self.window = open_window(
                &self.title,
                self.canvas.width(),
                self.canvas.height(),
                self.fullscreen,
                self.target_fps,
            )?;
            tracing::info!(fullscreen = self.fullscreen, "Window mode changed");
        }
        Ok(())
    }

    fn present(&mut self) -> Result<()> {
        self.window
            .update_with_buffer(self.canvas.buffer(), self.canvas.width(), self.canvas.height())?;
        self.handle_keys()
    }
}

fn open_window(
    title: &str,
    width: usize,
    height: usize,
    fullscreen: bool,
    target_fps: usize,
) -> Result<Window> {
    let options = if fullscreen {
        WindowOptions {
            borderless: true,
            scale: Scale::FitScreen,
            ..WindowOptions::default()
        }
    } else {
        WindowOptions {
            resize: false,
            ..WindowOptions::default()
        }
    };
    let mut window = Window::new(title, width, height, options)?;
    window.set_target_fps(target_fps);
    Ok(window)
}

impl SceneRenderer for MinifbRenderer {
    fn viewport(&self) -> (usize, usize) {
        (self.canvas.width(), self.canvas.height())
    }

    /// Escape でも閉じる
    fn is_open(&self) -> bool {
        self.window.is_open() && !self.window.is_key_down(Key::Escape)
    }

    fn draw(&mut self, scene: &Scene<'_>) -> Result<()> {
        self.canvas.paint(scene);
        self.present()
    }

    fn pump(&mut self) -> Result<()> {
        // 前回の画面をそのまま出し直す
        self.present()
    }
}
