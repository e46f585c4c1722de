// 该文件是 Qianlu （前路） 项目的一部分。
// src/output/directory_record.rs - 目录记录输出
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Datelike, Utc};
use serde_json::json;
use thiserror::Error;
use tracing::debug;

use crate::{
  FromUrl, FromUrlWithScheme,
  decision::ObstacleReport,
  frame::{Frame, FrameError, ToRgbImage},
  output::Render,
  pipeline::Verdict,
  utils::{url_file_path, url_has_flag},
};

const RECORD_FILE: &str = "verdicts.jsonl";

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("帧错误: {0}")]
  FrameError(#[from] FrameError),
  #[error("记录序列化错误: {0}")]
  JsonError(#[from] serde_json::Error),
}

/// 按日期分目录保存有障碍的帧，并把每帧判定追加到 `verdicts.jsonl`。
/// 带 `?always` 时畅通的帧也保存图像。
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  frame_counter: AtomicU64,
  always: bool,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    Ok(Self::new(url_file_path(uri), url_has_flag(uri, "always")))
  }
}

impl DirectoryRecordOutput {
  pub fn new(directory: impl Into<PathBuf>, always: bool) -> Self {
    Self {
      directory: directory.into(),
      frame_counter: AtomicU64::new(0),
      always,
    }
  }

  pub fn directory(&self) -> &Path {
    &self.directory
  }

  fn frame_id(&self) -> u64 {
    self.frame_counter.fetch_add(1, Ordering::Relaxed) + 1
  }

  fn frame_path(&self, now: &DateTime<Utc>, frame_id: u64) -> Result<PathBuf, std::io::Error> {
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    std::fs::create_dir_all(&directory)?;

    Ok(directory.join(format!("{}-{:06}.png", now.format("%H-%M-%S"), frame_id)))
  }

  fn append_record(&self, line: &serde_json::Value) -> Result<(), DirectoryRecordOutputError> {
    std::fs::create_dir_all(&self.directory)?;
    let mut file = std::fs::OpenOptions::new()
      .create(true)
      .append(true)
      .open(self.directory.join(RECORD_FILE))?;
    writeln!(file, "{}", serde_json::to_string(line)?)?;
    Ok(())
  }
}

fn report_json(report: &ObstacleReport) -> serde_json::Value {
  json!({
    "class": report.class_name,
    "class_id": report.class_id,
    "confidence": report.confidence,
    "bbox": [report.bbox.x, report.bbox.y, report.bbox.width, report.bbox.height],
    "area": report.area,
    "coverage": report.coverage,
    "threshold": report.threshold,
    "exceeds": report.exceeds(),
  })
}

impl Render<Frame, Verdict> for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(&self, frame: &Frame, result: &Verdict) -> Result<(), Self::Error> {
    let now = Utc::now();
    let frame_id = self.frame_id();

    let saved = if self.always || !result.clear {
      let path = self.frame_path(&now, frame_id)?;
      match &result.image {
        Some(image) => image.save(&path)?,
        None => frame.to_rgb_image()?.save(&path)?,
      }
      debug!("保存帧: {}", path.display());
      Some(path)
    } else {
      None
    };

    let record = json!({
      "timestamp": now.to_rfc3339(),
      "frame": frame_id,
      "width": frame.width(),
      "height": frame.height(),
      "clear": result.clear,
      "image": saved.map(|p| p.display().to_string()),
      "obstacles": result.reports.iter().map(report_json).collect::<Vec<_>>(),
    });
    self.append_record(&record)
  }
}
