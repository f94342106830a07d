//! 检测回放输入 (JSON Lines)
//!
//! 每行一帧:
//! `{"frame": 12, "t_sec": 12.0, "detections": [{"class_name": "truck", "confidence": 0.9, "bbox": [x1, y1, x2, y2]}]}`
//! `t_sec` 可省略 (由帧号/fps 推算); 空行和 `#` 开头的行被忽略。

use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::detection::Detection;

/// 一帧的检测结果
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrameDetections {
    pub frame: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t_sec: Option<f64>,
    #[serde(default)]
    pub detections: Vec<Detection>,
}

impl FrameDetections {
    pub fn new(frame: u64, detections: Vec<Detection>) -> Self {
        Self {
            frame,
            t_sec: None,
            detections,
        }
    }

    /// 置信度裁剪到 [0, 1]
    fn sanitize(mut self) -> Self {
        for det in &mut self.detections {
            det.confidence = det.confidence.clamp(0.0, 1.0);
        }
        self
    }
}

/// 解析一行; 空行/注释返回 None
pub fn parse_line(line: &str) -> Result<Option<FrameDetections>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let frame: FrameDetections = serde_json::from_str(line).context("帧数据解析失败")?;
    Ok(Some(frame.sanitize()))
}

/// 逐行读取帧
pub struct ReplayReader<R> {
    lines: std::io::Lines<R>,
    line_no: usize,
}

impl<R: BufRead> ReplayReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line_no: 0,
        }
    }
}

impl ReplayReader<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("无法打开检测文件: {}", path.display()))?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead> Iterator for ReplayReader<R> {
    type Item = Result<FrameDetections>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = self.lines.next()?;
            self.line_no += 1;
            let parsed = line
                .context("读取失败")
                .and_then(|l| parse_line(&l))
                .with_context(|| format!("第 {} 行", self.line_no));
            match parsed {
                Ok(None) => continue,
                Ok(Some(frame)) => return Some(Ok(frame)),
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

/// 写出帧序列 (演示数据导出)
pub fn write_frames<W: Write>(mut out: W, frames: &[FrameDetections]) -> Result<()> {
    for frame in frames {
        let line = serde_json::to_string(frame).context("帧序列化失败")?;
        writeln!(out, "{}", line).context("写入失败")?;
    }
    Ok(())
}
