//! Tesseract OCR 引擎（命令行封装）

use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use super::engine::OcrEngine;
use super::types::{OcrWord, TesseractConfig};
use super::OcrError;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

pub struct TesseractEngine {
    config: TesseractConfig,
    timeout: Duration,
}

impl TesseractEngine {
    /// 可执行文件无法运行时返回错误
    pub fn new(config: TesseractConfig, timeout: Duration) -> Result<Self, OcrError> {
        let version = get_tesseract_version(config.binary_or_default())?;
        log::info!("[Tesseract] 就绪，版本 {}", version);
        Ok(Self { config, timeout })
    }

    fn command(&self, image_path: &Path) -> Command {
        let mut cmd = Command::new(self.config.binary_or_default());
        cmd.arg(image_path)
            .arg("stdout")
            .arg("-l")
            .arg(self.config.lang_or_default())
            .arg("--psm")
            .arg(self.config.psm_or_default().to_string())
            .arg("--oem")
            .arg(self.config.oem_or_default().to_string())
            .arg("tsv");

        if let Some(tessdata_path) = &self.config.tessdata_path {
            cmd.env("TESSDATA_PREFIX", tessdata_path);
        }
        cmd
    }
}

impl OcrEngine for TesseractEngine {
    fn recognize_file(&self, image_path: &Path) -> Result<Vec<OcrWord>, OcrError> {
        let start = Instant::now();

        // stdout 写入临时文件，避免轮询期间大量 TSV 输出塞满管道
        let mut stdout = tempfile::tempfile()?;
        let mut stderr = tempfile::tempfile()?;
        let mut cmd = self.command(image_path);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::from(stdout.try_clone()?))
            .stderr(Stdio::from(stderr.try_clone()?));

        log::debug!(
            "[Tesseract] 执行: {} {} -l {} --psm {} --oem {} tsv",
            self.config.binary_or_default(),
            image_path.display(),
            self.config.lang_or_default(),
            self.config.psm_or_default(),
            self.config.oem_or_default()
        );

        let mut child = cmd.spawn()?;
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if start.elapsed() >= self.timeout {
                let _ = child.kill();
                let _ = child.wait();
                return Err(OcrError::Timeout(self.timeout.as_secs()));
            }
            std::thread::sleep(POLL_INTERVAL);
        };

        if !status.success() {
            let mut message = String::new();
            stderr.seek(SeekFrom::Start(0))?;
            stderr.read_to_string(&mut message)?;
            return Err(OcrError::Failed(message.trim().to_string()));
        }

        let mut raw = Vec::new();
        stdout.seek(SeekFrom::Start(0))?;
        stdout.read_to_end(&mut raw)?;
        let words = parse_tesseract_tsv(&String::from_utf8_lossy(&raw));

        log::info!(
            "[Tesseract] 识别出 {} 个单词，耗时 {} ms",
            words.len(),
            start.elapsed().as_millis()
        );
        Ok(words)
    }
}

/// 解析 Tesseract TSV 输出
///
/// 列：
/// level page_num block_num par_num line_num word_num left top width height conf text
///
/// 只保留有文本且置信度非负的单词行（level 5）。
pub fn parse_tesseract_tsv(tsv: &str) -> Vec<OcrWord> {
    let mut words = Vec::new();

    for line in tsv.lines().skip(1) {
        let cols: Vec<&str> = line.split('\t').collect();
        if cols.len() < 12 {
            continue;
        }

        let level: i32 = cols[0].parse().unwrap_or(-1);
        let conf: f32 = cols[10].parse().unwrap_or(-1.0);
        let text = cols[11].trim();
        if level != 5 || text.is_empty() || conf < 0.0 {
            continue;
        }

        words.push(OcrWord {
            text: text.to_string(),
            confidence: conf / 100.0,
            block: cols[2].parse().unwrap_or(0),
            paragraph: cols[3].parse().unwrap_or(0),
            line: cols[4].parse().unwrap_or(0),
        });
    }

    words
}

/// `tesseract --version` 报告的版本
pub fn get_tesseract_version(binary_path: &str) -> Result<String, OcrError> {
    let output = Command::new(binary_path)
        .arg("--version")
        .output()
        .map_err(|e| OcrError::Unavailable(format!("cannot run {}: {}", binary_path, e)))?;

    if !output.status.success() {
        return Err(OcrError::Unavailable(format!(
            "{} --version exited with {}",
            binary_path, output.status
        )));
    }

    let combined = format!(
        "{}{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );

    // "tesseract 5.3.0" 或 "tesseract v5.3.0"
    for line in combined.lines() {
        if line.contains("tesseract") {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() >= 2 {
                return Ok(parts[1].trim_start_matches('v').to_string());
            }
        }
    }

    Ok("unknown".to_string())
}
