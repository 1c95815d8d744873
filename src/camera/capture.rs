use anyhow::{bail, Result};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::calibration::Intrinsics;
use crate::frame::Frame;
use crate::mailbox::FrameMailbox;
use crate::session::ActiveFlag;

/// キャプチャ失敗後の待機時間
const CAPTURE_RETRY_DELAY: Duration = Duration::from_millis(100);

/// 16bit 深度画像（mm、0 は無効画素）
#[derive(Debug, Clone, PartialEq)]
pub struct DepthImage {
    width: usize,
    height: usize,
    data: Vec<u16>,
}

impl DepthImage {
    pub fn new(width: usize, height: usize, data: Vec<u16>) -> Result<Self> {
        if data.len() != width * height {
            bail!(
                "Depth buffer has {} pixels, expected {}x{}",
                data.len(),
                width,
                height
            );
        }
        Ok(Self { width, height, data })
    }

    pub fn filled(width: usize, height: usize, value: u16) -> Self {
        Self {
            width,
            height,
            data: vec![value; width * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn pixels(&self) -> &[u16] {
        &self.data
    }

    pub fn pixels_mut(&mut self) -> &mut [u16] {
        &mut self.data
    }
}

/// センサーから1回分のキャプチャ
#[derive(Debug, Clone)]
pub struct Capture {
    pub depth: DepthImage,
    /// ストリーム開始からのデバイス時刻
    pub timestamp: Duration,
}

/// 深度センサー
pub trait DepthDevice: Send {
    fn calibration(&self) -> &Intrinsics;

    /// 次のキャプチャまでブロックする（フレームレートで律速）
    fn capture(&mut self) -> Result<Capture>;
}

/// ボディトラッカー
pub trait BodyTracker: Send {
    /// キャプチャを推論キューに積む。キューが満杯なら捨ててよい
    fn enqueue(&mut self, capture: Capture) -> Result<()>;

    /// 結果があれば返す。待たない
    fn pop_result(&mut self) -> Result<Option<Frame>>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AcquisitionStats {
    pub captures: u64,
    pub capture_errors: u64,
    pub frames_published: u64,
}

/// 別スレッドでキャプチャ→トラッキングを回し、結果をメールボックスへ置く
pub struct AcquisitionThread {
    handle: thread::JoinHandle<AcquisitionStats>,
}

impl AcquisitionThread {
    pub fn spawn<D, T>(
        device: D,
        tracker: T,
        mailbox: Arc<FrameMailbox>,
        active: ActiveFlag,
    ) -> Result<Self>
    where
        D: DepthDevice + 'static,
        T: BodyTracker + 'static,
    {
        let handle = thread::Builder::new()
            .name("acquisition".to_string())
            .spawn(move || run_acquisition(device, tracker, &mailbox, &active))?;
        Ok(Self { handle })
    }

    /// スレッド終了を待つ。終了要求は `ActiveFlag` で出す
    pub fn join(self) -> Result<AcquisitionStats> {
        match self.handle.join() {
            Ok(stats) => Ok(stats),
            Err(_) => bail!("Acquisition thread panicked"),
        }
    }
}

/// acquisition ループ本体。`active` が落ちるまで回り、抜けたら tracker → device の順で解放する
pub fn run_acquisition<D, T>(
    mut device: D,
    mut tracker: T,
    mailbox: &FrameMailbox,
    active: &ActiveFlag,
) -> AcquisitionStats
where
    D: DepthDevice,
    T: BodyTracker,
{
    let mut stats = AcquisitionStats::default();
    tracing::info!("Acquisition started");

    while active.is_active() {
        let capture = match device.capture() {
            Ok(capture) => capture,
            Err(e) => {
                stats.capture_errors += 1;
                tracing::warn!("capture failed: {e:#}");
                thread::sleep(CAPTURE_RETRY_DELAY);
                continue;
            }
        };
        stats.captures += 1;

        if let Err(e) = tracker.enqueue(capture) {
            tracing::warn!("enqueue failed: {e:#}");
            continue;
        }

        match tracker.pop_result() {
            Ok(Some(frame)) => {
                mailbox.set(frame);
                stats.frames_published += 1;
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("tracker result failed: {e:#}"),
        }
    }

    drop(tracker);
    drop(device);
    tracing::info!(
        captures = stats.captures,
        published = stats.frames_published,
        errors = stats.capture_errors,
        "Acquisition stopped"
    );
    stats
}
