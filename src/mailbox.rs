//! Single-slot, latest-wins hand-off between the acquisition thread and the
//! render thread.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::frame::Frame;

/// 最新フレームを1つだけ保持するメールボックス
///
/// `set` は未消費のフレームを置き換え、古いフレームはロック解放後に drop する。
/// `take` は中身を取り出して空にするので、同じフレームが2回返ることはない。
pub struct FrameMailbox<F = Frame> {
    slot: Mutex<Option<F>>,
    overwritten: AtomicU64,
}

impl<F> FrameMailbox<F> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            overwritten: AtomicU64::new(0),
        }
    }

    pub fn set(&self, frame: F) {
        let previous = self.slot.lock().replace(frame);
        // ロック外で解放（producer は入れ替えの間だけ待つ）
        if let Some(previous) = previous {
            self.overwritten.fetch_add(1, Ordering::Relaxed);
            drop(previous);
        }
    }

    pub fn take(&self) -> Option<F> {
        self.slot.lock().take()
    }

    pub fn is_empty(&self) -> bool {
        self.slot.lock().is_none()
    }

    /// 消費される前に上書きされたフレーム数
    pub fn overwritten(&self) -> u64 {
        self.overwritten.load(Ordering::Relaxed)
    }
}

impl<F> Default for FrameMailbox<F> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    /// drop 回数を数えるテスト用フレーム
    struct Tracked {
        id: u32,
        drops: Arc<Mutex<Vec<u32>>>,
    }

    impl Drop for Tracked {
        fn drop(&mut self) {
            self.drops.lock().push(self.id);
        }
    }

    fn tracked(id: u32, drops: &Arc<Mutex<Vec<u32>>>) -> Tracked {
        Tracked { id, drops: drops.clone() }
    }

    #[test]
    fn test_take_empty() {
        let mailbox: FrameMailbox<u32> = FrameMailbox::new();
        assert!(mailbox.take().is_none());
        assert!(mailbox.is_empty());
    }

    #[test]
    fn test_consumed_once() {
        let mailbox = FrameMailbox::new();
        mailbox.set(7u32);
        assert_eq!(mailbox.take(), Some(7));
        assert_eq!(mailbox.take(), None);
    }

    #[test]
    fn test_overwrite_releases_previous_exactly_once() {
        let drops = Arc::new(Mutex::new(Vec::new()));
        let mailbox = FrameMailbox::new();

        mailbox.set(tracked(1, &drops));
        mailbox.set(tracked(2, &drops));
        assert_eq!(*drops.lock(), vec![1]);
        assert_eq!(mailbox.overwritten(), 1);

        let frame = mailbox.take().unwrap();
        assert_eq!(frame.id, 2);
        assert!(mailbox.take().is_none());

        drop(frame);
        assert_eq!(*drops.lock(), vec![1, 2]);
    }

    #[test]
    fn test_dropping_mailbox_releases_stored_frame() {
        let drops = Arc::new(Mutex::new(Vec::new()));
        let mailbox = FrameMailbox::new();
        mailbox.set(tracked(5, &drops));
        drop(mailbox);
        assert_eq!(*drops.lock(), vec![5]);
    }

    #[test]
    fn test_concurrent_frames_never_delivered_twice() {
        let mailbox = Arc::new(FrameMailbox::new());
        let producer = {
            let mailbox = mailbox.clone();
            std::thread::spawn(move || {
                for id in 0..10_000u32 {
                    mailbox.set(id);
                }
            })
        };

        let mut seen = HashSet::new();
        let mut last = None;
        while !producer.is_finished() || !mailbox.is_empty() {
            if let Some(id) = mailbox.take() {
                assert!(seen.insert(id), "frame {} delivered twice", id);
                // 最新優先なので単調増加
                if let Some(prev) = last {
                    assert!(id > prev);
                }
                last = Some(id);
            }
        }
        producer.join().unwrap();

        let delivered = seen.len() as u64;
        assert_eq!(delivered + mailbox.overwritten(), 10_000);
    }
}
