// 该文件是 Qianlu （前路） 项目的一部分。
// src/detect/decode.rs - 原始输出解码
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

use thiserror::Error;
use tracing::debug;

use crate::{
  detect::{BBox, Candidate},
  model::RawOutput,
};

const BOX_VALUES: usize = 4;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
  #[error("输出层 {layer} 行宽 {width} 与 {classes} 个类别的行布局不符")]
  MalformedOutput {
    layer: usize,
    width: usize,
    classes: usize,
  },
}

/// 将各输出层的原始检测解码为像素坐标候选框。
///
/// 每行必须恰好是 `4 + objectness + num_classes` 个值，类别分数紧跟在
/// 坐标（以及 objectness）之后；objectness 不参与打分。
/// 只输出最高分严格大于 `conf_threshold` 的行，不做去重。
pub fn decode(
  outputs: &[RawOutput],
  image_width: u32,
  image_height: u32,
  conf_threshold: f32,
  num_classes: usize,
  objectness: bool,
) -> Result<Vec<Candidate>, DecodeError> {
  let score_offset = BOX_VALUES + objectness as usize;
  let (w, h) = (image_width as f32, image_height as f32);
  let mut candidates = Vec::new();

  for (layer, output) in outputs.iter().enumerate() {
    let width = output.width();
    if num_classes == 0 || width != score_offset + num_classes {
      return Err(DecodeError::MalformedOutput {
        layer,
        width,
        classes: num_classes,
      });
    }

    for row in output.rows() {
      let scores = &row[score_offset..];
      let (class_id, confidence) = argmax(scores);

      // NaN 分数同样丢弃
      if confidence.is_nan() || confidence <= conf_threshold {
        continue;
      }

      let center_x = (row[0] * w) as i32;
      let center_y = (row[1] * h) as i32;
      let box_w = (row[2] * w).max(0.0) as i32;
      let box_h = (row[3] * h).max(0.0) as i32;

      candidates.push(Candidate {
        bbox: BBox {
          x: (center_x as f32 - box_w as f32 / 2.0) as i32,
          y: (center_y as f32 - box_h as f32 / 2.0) as i32,
          width: box_w as u32,
          height: box_h as u32,
        },
        class_id,
        confidence,
      });
    }
  }

  debug!("解码得到 {} 个候选框", candidates.len());
  Ok(candidates)
}

/// 取最高分，分数相同时保留编号最小的类别
fn argmax(scores: &[f32]) -> (usize, f32) {
  let mut best = (0usize, scores[0]);
  for (class_id, &score) in scores.iter().enumerate().skip(1) {
    if score > best.1 {
      best = (class_id, score);
    }
  }
  best
}
