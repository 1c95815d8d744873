//! 記録済みCSVの集計（ラベルごとの行数・軸ごとのばらつき）

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::io::Read;
use std::path::Path;

use super::row::RowFormat;

/// 1軸分の集計（母標準偏差と範囲）
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AxisStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl AxisStats {
    pub fn push(&mut self, value: f64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        // Welford
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn std_dev(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            (self.m2 / self.count as f64).sqrt()
        }
    }

    pub fn range(&self) -> f64 {
        self.max - self.min
    }

    fn merge(&mut self, other: &AxisStats) {
        if other.count == 0 {
            return;
        }
        if self.count == 0 {
            *self = *other;
            return;
        }
        let count = self.count + other.count;
        let delta = other.mean - self.mean;
        self.m2 += other.m2 + delta * delta * (self.count * other.count) as f64 / count as f64;
        self.mean += delta * other.count as f64 / count as f64;
        self.count = count;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }
}

/// ラベル1つ分の集計
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabelStats {
    pub rows: u64,
    pub axes: [AxisStats; 3],
}

impl LabelStats {
    fn merge(&mut self, other: &LabelStats) {
        self.rows += other.rows;
        for (a, b) in self.axes.iter_mut().zip(&other.axes) {
            a.merge(b);
        }
    }
}

impl fmt::Display for LabelStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rows={}", self.rows)?;
        for (name, axis) in ["x", "y", "z"].iter().zip(&self.axes) {
            write!(
                f,
                "  {}: std={:.3} range={:.3}",
                name,
                axis.std_dev(),
                axis.range()
            )?;
        }
        Ok(())
    }
}

/// ファイル全体の集計。ラベル無し形式は `None` に入る
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordingStats {
    pub by_label: BTreeMap<Option<u32>, LabelStats>,
}

impl RecordingStats {
    pub fn total(&self) -> LabelStats {
        let mut total = LabelStats::default();
        for stats in self.by_label.values() {
            total.merge(stats);
        }
        total
    }
}

pub fn summarize_file<P: AsRef<Path>>(path: P, format: RowFormat) -> Result<RecordingStats> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    summarize(file, format).with_context(|| format!("Failed to read {}", path.display()))
}

/// 数値にならない列は読み飛ばす。ラベル列か座標が1つも読めない行は行ごと飛ばす
pub fn summarize<R: Read>(input: R, format: RowFormat) -> Result<RecordingStats> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(input);

    let mut stats = RecordingStats::default();
    for (line, record) in reader.records().enumerate() {
        let record = record?;
        let label = match format {
            RowFormat::Plain => None,
            RowFormat::Labeled => match record.get(0).and_then(|s| s.parse::<u32>().ok()) {
                Some(label) => Some(label),
                None => {
                    tracing::debug!(line = line + 1, "Skipping row without a label");
                    continue;
                }
            },
        };

        // NaN / inf は欠損扱い
        let values: Vec<(usize, f64)> = record
            .iter()
            .skip(format.prefix_len())
            .enumerate()
            .filter_map(|(i, field)| field.parse::<f64>().ok().map(|v| (i % 3, v)))
            .filter(|(_, v)| v.is_finite())
            .collect();
        if values.is_empty() {
            tracing::debug!(line = line + 1, "Skipping row without coordinates");
            continue;
        }

        let entry = stats.by_label.entry(label).or_default();
        entry.rows += 1;
        for (axis, value) in values {
            entry.axes[axis].push(value);
        }
    }
    Ok(stats)
}
