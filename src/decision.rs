// 该文件是 Qianlu （前路） 项目的一部分。
// src/decision.rs - 障碍判定
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

use std::fmt;

use image::RgbImage;
use thiserror::Error;
use tracing::{info, warn};

use crate::{
  catalog::ClassCatalog,
  detect::{BBox, Candidate},
  output::draw::Draw,
};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecisionError {
  #[error("类别编号 {class_id} 超出类别目录范围 ({len})")]
  UnknownClass { class_id: usize, len: usize },
  #[error("画面面积为零")]
  EmptyFrame,
}

/// 单个保留目标的覆盖情况，对应控制台上的一到两行输出
#[derive(Debug, Clone, PartialEq)]
pub struct ObstacleReport {
  pub class_id: usize,
  pub class_name: String,
  pub confidence: f32,
  pub bbox: BBox,
  pub area: u64,
  pub coverage: f64,
  pub threshold: f32,
}

impl ObstacleReport {
  pub fn exceeds(&self) -> bool {
    self.coverage > self.threshold as f64
  }

  pub fn label(&self) -> String {
    format!("{}: {:.2}", self.class_name, self.confidence)
  }

  pub fn warning(&self) -> Option<String> {
    self
      .exceeds()
      .then(|| format!("Be careful! Obstacle {} in front!", self.class_name))
  }
}

impl fmt::Display for ObstacleReport {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "Class {} covers ({}, {}) {} pixels, i.e. {}% of the image.",
      self.class_name,
      self.bbox.width,
      self.bbox.height,
      self.area,
      significant(self.coverage * 100.0)
    )
  }
}

const SIGNIFICANT_DIGITS: i32 = 3;

/// 三位有效数字，去掉尾随零但至少保留一位小数：0.814、29.3、1.0
fn significant(value: f64) -> String {
  if value == 0.0 || !value.is_finite() {
    return format!("{:.1}", value);
  }
  let magnitude = value.abs().log10().floor() as i32;
  let decimals = (SIGNIFICANT_DIGITS - 1 - magnitude).max(1) as usize;
  let text = format!("{:.*}", decimals, value);
  let trimmed = text.trim_end_matches('0');
  if trimmed.ends_with('.') {
    format!("{}0", trimmed)
  } else {
    trimmed.to_string()
  }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Decision {
  pub clear: bool,
  /// 只在请求标注时填充
  pub reports: Vec<ObstacleReport>,
}

/// 标注请求：在给定图像上绘制保留框
pub struct Annotation<'a> {
  pub image: &'a mut RgbImage,
  pub draw: &'a Draw,
}

/// 根据保留框的面积占比判定前方是否畅通。
///
/// 任一目标的覆盖率严格大于其类别阈值即判定为不畅通（逻辑或）。
/// 不请求标注时没有任何副作用。
pub fn decide(
  retained: &[Candidate],
  image_width: u32,
  image_height: u32,
  catalog: &ClassCatalog,
  annotation: Option<Annotation<'_>>,
) -> Result<Decision, DecisionError> {
  let image_area = image_width as u64 * image_height as u64;
  if image_area == 0 {
    return Err(DecisionError::EmptyFrame);
  }

  let mut clear = true;
  let mut reports = Vec::new();
  let mut annotation = annotation;

  for candidate in retained {
    let entry = catalog
      .get(candidate.class_id)
      .ok_or(DecisionError::UnknownClass {
        class_id: candidate.class_id,
        len: catalog.len(),
      })?;

    let area = candidate.bbox.area();
    let report = ObstacleReport {
      class_id: candidate.class_id,
      class_name: entry.name.clone(),
      confidence: candidate.confidence,
      bbox: candidate.bbox,
      area,
      coverage: area as f64 / image_area as f64,
      threshold: entry.area_threshold,
    };

    if report.exceeds() {
      clear = false;
    }

    if let Some(Annotation { image, draw }) = annotation.as_mut() {
      draw.draw_labeled_box(image, &report.bbox, &report.label(), entry.color);
      info!("{}", report);
      if let Some(warning) = report.warning() {
        warn!("{}", warning);
      }
      reports.push(report);
    }
  }

  Ok(Decision { clear, reports })
}
