use anyhow::Result;
use crossbeam_channel::{bounded, Receiver};
use std::io::{self, BufRead, Write};
use std::thread;

const PROMPT: &str = "ラベルの番号を入力してください（0以上の整数）: ";
const INVALID: &str = "無効な入力です。0以上の整数を入力してください";

/// ラベル文字列を解釈する（0以上の整数のみ）
pub fn parse_label(input: &str) -> Option<u32> {
    input.trim().parse().ok()
}

/// 有効なラベルが入るまで再入力を求める。入力が閉じたら None
pub fn read_label<R: BufRead, W: Write>(input: &mut R, output: &mut W) -> Result<Option<u32>> {
    let mut line = String::new();
    loop {
        write!(output, "{}", PROMPT)?;
        output.flush()?;

        line.clear();
        if input.read_line(&mut line)? == 0 {
            return Ok(None);
        }

        match parse_label(&line) {
            Some(label) => {
                writeln!(output, "ラベル番号 {} の計測を行います", label)?;
                return Ok(Some(label));
            }
            None => writeln!(output, "{}", INVALID)?,
        }
    }
}

/// 標準入力でラベルを待つスレッドを起動し、結果を1つだけ流すチャネルを返す
///
/// 描画スレッドは `try_recv` で確認するだけで、入力待ちには入らない。
pub fn spawn_label_prompt() -> Result<Receiver<u32>> {
    let (tx, rx) = bounded(1);
    thread::Builder::new()
        .name("label-prompt".to_string())
        .spawn(move || {
            let stdin = io::stdin();
            let mut input = stdin.lock();
            let mut output = io::stdout();
            match read_label(&mut input, &mut output) {
                Ok(Some(label)) => {
                    // 受信側が先に終了していれば何もしない
                    let _ = tx.send(label);
                }
                Ok(None) => tracing::warn!("stdin closed before a label was entered"),
                Err(e) => tracing::error!("label prompt failed: {e:#}"),
            }
        })?;
    Ok(rx)
}

/// 設定で指定済みのラベルを即座に流すチャネル
pub fn preset_label(label: u32) -> Receiver<u32> {
    let (tx, rx) = bounded(1);
    // 容量1の空チャネルなので失敗しない
    let _ = tx.send(label);
    rx
}
