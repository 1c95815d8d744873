use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use crossbeam_channel::{Receiver, TryRecvError};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use super::row::{LabeledRecord, RowFormat};
use crate::config::RecordingConfig;
use crate::pose::Skeleton;
use crate::session::ActiveFlag;

/// 1回の `route` の結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// 1行書き込んだ
    Written,
    /// ラベル未確定のため書かなかった
    AwaitingLabel,
    /// 書き込みに失敗済み。以降このセッションでは記録しない
    Stopped,
}

/// ラベルに紐づく出力先
struct RowSink {
    label: u32,
    path: PathBuf,
    writer: csv::Writer<Box<dyn Write + Send>>,
}

enum SinkState {
    AwaitingLabel,
    Recording(RowSink),
    Failed,
}

/// 骨格をラベル付きのCSVに振り分ける
///
/// ラベルはチャネル経由で1回だけ届き、届いた時点で出力ファイルを開く。
/// 書き込みエラーは記録の停止として扱い、呼び出し側には伝播しない。
pub struct RecordingRouter {
    output_dir: PathBuf,
    format: RowFormat,
    stop_session_on_error: bool,
    labels: Receiver<u32>,
    active: ActiveFlag,
    state: SinkState,
    rows: u64,
}

impl RecordingRouter {
    /// 出力ディレクトリが無ければ作成する
    pub fn new(config: &RecordingConfig, labels: Receiver<u32>, active: ActiveFlag) -> Result<Self> {
        fs::create_dir_all(&config.output_dir).with_context(|| {
            format!(
                "Failed to create output directory {}",
                config.output_dir.display()
            )
        })?;
        Ok(Self {
            output_dir: config.output_dir.clone(),
            format: config.row_format,
            stop_session_on_error: config.stop_session_on_error,
            labels,
            active,
            state: SinkState::AwaitingLabel,
            rows: 0,
        })
    }

    pub fn label(&self) -> Option<u32> {
        match &self.state {
            SinkState::Recording(sink) => Some(sink.label),
            _ => None,
        }
    }

    pub fn sink_path(&self) -> Option<&Path> {
        match &self.state {
            SinkState::Recording(sink) => Some(&sink.path),
            _ => None,
        }
    }

    pub fn rows_written(&self) -> u64 {
        self.rows
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.state, SinkState::Failed)
    }

    /// ラベルが届いていれば出力ファイルを開く。待たない
    pub fn poll_label(&mut self) {
        if !matches!(self.state, SinkState::AwaitingLabel) {
            return;
        }
        let label = match self.labels.try_recv() {
            Ok(label) => label,
            Err(TryRecvError::Empty) => return,
            Err(TryRecvError::Disconnected) => {
                tracing::debug!("label channel closed without a label");
                return;
            }
        };

        let now = Local::now();
        match open_sink(&self.output_dir, label, &now) {
            Ok((path, file)) => {
                tracing::info!(label, path = %path.display(), "Recording started");
                self.attach(label, path, Box::new(BufWriter::new(file)));
            }
            Err(e) => self.fail(e),
        }
    }

    fn attach(&mut self, label: u32, path: PathBuf, out: Box<dyn Write + Send>) {
        let writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(out);
        self.state = SinkState::Recording(RowSink { label, path, writer });
    }

    pub fn route(&mut self, skeleton: &Skeleton) -> RouteOutcome {
        self.route_at(skeleton, &Local::now())
    }

    /// 1行を書いて flush する
    pub fn route_at(&mut self, skeleton: &Skeleton, now: &DateTime<Local>) -> RouteOutcome {
        self.poll_label();

        let result = match &mut self.state {
            SinkState::AwaitingLabel => return RouteOutcome::AwaitingLabel,
            SinkState::Failed => return RouteOutcome::Stopped,
            SinkState::Recording(sink) => {
                let record = LabeledRecord::from_skeleton(skeleton, self.format, sink.label, now);
                write_row(&mut sink.writer, &record)
                    .with_context(|| format!("Failed to write {}", sink.path.display()))
            }
        };

        match result {
            Ok(()) => {
                self.rows += 1;
                RouteOutcome::Written
            }
            Err(e) => {
                self.fail(e);
                RouteOutcome::Stopped
            }
        }
    }

    /// セッション終了時の flush
    pub fn finish(&mut self) -> Result<()> {
        if let SinkState::Recording(sink) = &mut self.state {
            sink.writer
                .flush()
                .with_context(|| format!("Failed to flush {}", sink.path.display()))?;
            tracing::info!(
                label = sink.label,
                rows = self.rows,
                path = %sink.path.display(),
                "Recording finished"
            );
        }
        Ok(())
    }

    fn fail(&mut self, error: anyhow::Error) {
        tracing::error!("Recording stopped: {error:#}");
        self.state = SinkState::Failed;
        if self.stop_session_on_error {
            self.active.deactivate();
        }
    }
}

fn write_row<W: Write>(writer: &mut csv::Writer<W>, record: &LabeledRecord) -> Result<()> {
    writer.write_record(record.fields())?;
    writer.flush()?;
    Ok(())
}

/// `<output_dir>/<label>/pos_<yyyyMMdd_HHmmssfff>.csv` を追記モードで開く
fn open_sink(output_dir: &Path, label: u32, now: &DateTime<Local>) -> Result<(PathBuf, File)> {
    let dir = output_dir.join(label.to_string());
    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create label directory {}", dir.display()))?;
    let path = dir.join(format!("pos_{}.csv", now.format("%Y%m%d_%H%M%S%3f")));
    let file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    Ok((path, file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::JointId;
    use crate::record::label::preset_label;
    use crossbeam_channel::bounded;
    use std::io;

    fn skeleton(offset: f32) -> Skeleton {
        let positions: [[f32; 3]; JointId::COUNT] =
            std::array::from_fn(|i| [i as f32 + offset, 0.0, 1000.0]);
        Skeleton::from_positions(&positions)
    }

    fn config(dir: &Path, format: RowFormat, stop: bool) -> RecordingConfig {
        RecordingConfig {
            output_dir: dir.join("out"),
            row_format: format,
            label: None,
            stop_session_on_error: stop,
        }
    }

    struct BrokenWriter;

    impl Write for BrokenWriter {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::Other, "disk full"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::Other, "disk full"))
        }
    }

    #[test]
    fn test_creates_output_dir() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path(), RowFormat::Labeled, false);
        let _router = RecordingRouter::new(&cfg, preset_label(1), ActiveFlag::new()).unwrap();
        assert!(cfg.output_dir.is_dir());
    }

    #[test]
    fn test_awaits_label() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, rx) = bounded(1);
        let mut router = RecordingRouter::new(
            &config(dir.path(), RowFormat::Labeled, false),
            rx,
            ActiveFlag::new(),
        )
        .unwrap();

        assert_eq!(router.route(&skeleton(0.0)), RouteOutcome::AwaitingLabel);
        assert_eq!(router.rows_written(), 0);

        tx.send(4).unwrap();
        assert_eq!(router.route(&skeleton(0.0)), RouteOutcome::Written);
        assert_eq!(router.label(), Some(4));
        assert_eq!(router.rows_written(), 1);
    }

    #[test]
    fn test_one_row_per_route() {
        let dir = tempfile::tempdir().unwrap();
        let mut router = RecordingRouter::new(
            &config(dir.path(), RowFormat::Plain, false),
            preset_label(2),
            ActiveFlag::new(),
        )
        .unwrap();

        for i in 0..3 {
            assert_eq!(router.route(&skeleton(i as f32)), RouteOutcome::Written);
        }
        router.finish().unwrap();

        let path = router.sink_path().unwrap().to_path_buf();
        assert_eq!(path.parent().unwrap(), dir.path().join("out").join("2"));
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("pos_") && name.ends_with(".csv"));

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1].split(',').count(), JointId::COUNT * 3);
        assert!(lines[1].starts_with("1,0,1000,2,0,1000"));
    }

    #[test]
    fn test_labeled_rows_flushed_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let mut router = RecordingRouter::new(
            &config(dir.path(), RowFormat::Labeled, false),
            preset_label(9),
            ActiveFlag::new(),
        )
        .unwrap();

        router.route(&skeleton(0.0));
        // finish 前でも読める
        let content = fs::read_to_string(router.sink_path().unwrap()).unwrap();
        let fields: Vec<&str> = content.trim_end().split(',').collect();
        assert_eq!(fields.len(), RowFormat::Labeled.column_count());
        assert_eq!(fields[0], "9");
        assert_eq!(fields[1].len(), 9);
    }

    #[test]
    fn test_write_failure_stops_recording_only() {
        let dir = tempfile::tempdir().unwrap();
        let active = ActiveFlag::new();
        let (_tx, rx) = bounded(1);
        let mut router =
            RecordingRouter::new(&config(dir.path(), RowFormat::Plain, false), rx, active.clone())
                .unwrap();
        router.attach(1, dir.path().join("broken.csv"), Box::new(BrokenWriter));

        assert_eq!(router.route(&skeleton(0.0)), RouteOutcome::Stopped);
        assert!(router.is_failed());
        assert_eq!(router.route(&skeleton(0.0)), RouteOutcome::Stopped);
        assert_eq!(router.rows_written(), 0);
        assert!(active.is_active());
    }

    #[test]
    fn test_write_failure_can_stop_session() {
        let dir = tempfile::tempdir().unwrap();
        let active = ActiveFlag::new();
        let (_tx, rx) = bounded(1);
        let mut router =
            RecordingRouter::new(&config(dir.path(), RowFormat::Plain, true), rx, active.clone())
                .unwrap();
        router.attach(1, dir.path().join("broken.csv"), Box::new(BrokenWriter));

        assert_eq!(router.route(&skeleton(0.0)), RouteOutcome::Stopped);
        assert!(!active.is_active());
    }
}
