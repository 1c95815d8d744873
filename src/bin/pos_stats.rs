//! 記録済みCSVのラベル別統計を表示する
//!
//! 使い方: pos_stats <csv> [--plain]

use anyhow::{bail, Result};
use tracing_subscriber::EnvFilter;

use pos_saver::record::{summarize_file, RowFormat};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut path = None;
    let mut format = RowFormat::Labeled;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--plain" => format = RowFormat::Plain,
            _ if path.is_none() => path = Some(arg),
            _ => bail!("Unexpected argument: {}", arg),
        }
    }
    let Some(path) = path else {
        bail!("Usage: pos_stats <csv> [--plain]");
    };

    let stats = summarize_file(&path, format)?;
    if stats.by_label.is_empty() {
        println!("{}: 行がありません", path);
        return Ok(());
    }

    println!("=== {} ===", path);
    for (label, label_stats) in &stats.by_label {
        match label {
            Some(label) => println!("label {:>3}  {}", label, label_stats),
            None => println!("(no label) {}", label_stats),
        }
    }
    println!("total      {}", stats.total());
    Ok(())
}
