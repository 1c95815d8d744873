use chrono::{DateTime, Local};
use serde::Deserialize;

use crate::pose::{JointId, Skeleton};

/// CSVの行形式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowFormat {
    /// `label, HHmmssfff, x0, y0, z0, ...`
    #[default]
    Labeled,
    /// `x0, y0, z0, ...`
    Plain,
}

impl RowFormat {
    /// 座標列より前に置く列数
    pub fn prefix_len(self) -> usize {
        match self {
            Self::Labeled => 2,
            Self::Plain => 0,
        }
    }

    pub fn column_count(self) -> usize {
        self.prefix_len() + JointId::COUNT * 3
    }
}

/// 行に埋め込む時刻（時分秒ミリ秒、`HHmmssfff`）
pub fn timestamp_field(now: &DateTime<Local>) -> String {
    now.format("%H%M%S%3f").to_string()
}

/// CSV 1行分
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledRecord {
    fields: Vec<String>,
}

impl LabeledRecord {
    pub fn from_skeleton(
        skeleton: &Skeleton,
        format: RowFormat,
        label: u32,
        now: &DateTime<Local>,
    ) -> Self {
        let mut fields = Vec::with_capacity(format.column_count());
        if format == RowFormat::Labeled {
            fields.push(label.to_string());
            fields.push(timestamp_field(now));
        }
        for (_, joint) in skeleton.iter() {
            let [x, y, z] = joint.position;
            fields.push(x.to_string());
            fields.push(y.to_string());
            fields.push(z.to_string());
        }
        Self { fields }
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_time() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 5, 1, 9, 8, 7).unwrap() + chrono::Duration::milliseconds(45)
    }

    fn skeleton() -> Skeleton {
        let positions: [[f32; 3]; JointId::COUNT] =
            std::array::from_fn(|i| [i as f32, i as f32 + 0.5, 1000.0 - i as f32]);
        Skeleton::from_positions(&positions)
    }

    #[test]
    fn test_timestamp_field() {
        assert_eq!(timestamp_field(&fixed_time()), "090807045");
    }

    #[test]
    fn test_labeled_row() {
        let record = LabeledRecord::from_skeleton(&skeleton(), RowFormat::Labeled, 3, &fixed_time());
        let fields = record.fields();
        assert_eq!(fields.len(), 2 + 96);
        assert_eq!(fields[0], "3");
        assert_eq!(fields[1], "090807045");
        assert_eq!(&fields[2..5], &["0", "0.5", "1000"]);
        assert_eq!(&fields[5..8], &["1", "1.5", "999"]);
    }

    #[test]
    fn test_plain_row() {
        let record = LabeledRecord::from_skeleton(&skeleton(), RowFormat::Plain, 3, &fixed_time());
        assert_eq!(record.fields().len(), RowFormat::Plain.column_count());
        assert_eq!(record.fields()[0], "0");
        assert_eq!(record.fields()[95], "969");
    }
}
