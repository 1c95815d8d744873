pub mod label;
pub mod router;
pub mod row;
pub mod stats;

pub use label::{parse_label, preset_label, read_label, spawn_label_prompt};
pub use router::{RecordingRouter, RouteOutcome};
pub use row::{timestamp_field, LabeledRecord, RowFormat};
pub use stats::{summarize, summarize_file, AxisStats, LabelStats, RecordingStats};
