// 该文件是 Qianlu （前路） 项目的一部分。
// src/detect.rs - 检测结果与后处理
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

/// NCHW 输入张量，形状 `[1, 3, S, S]`，取值 `[0, 1]`
pub type Tensor = ndarray::Array4<f32>;

/// 像素坐标下的边界框，(x, y) 为左上角，可能落在画面之外
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BBox {
  pub x: i32,
  pub y: i32,
  pub width: u32,
  pub height: u32,
}

impl BBox {
  pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
    Self {
      x,
      y,
      width,
      height,
    }
  }

  pub fn area(&self) -> u64 {
    self.width as u64 * self.height as u64
  }

  pub fn right(&self) -> i64 {
    self.x as i64 + self.width as i64
  }

  pub fn bottom(&self) -> i64 {
    self.y as i64 + self.height as i64
  }

  /// 交并比
  pub fn iou(&self, other: &BBox) -> f32 {
    let x1 = (self.x as i64).max(other.x as i64);
    let y1 = (self.y as i64).max(other.y as i64);
    let x2 = self.right().min(other.right());
    let y2 = self.bottom().min(other.bottom());

    let intersection = ((x2 - x1).max(0) * (y2 - y1).max(0)) as f64;
    let union = self.area() as f64 + other.area() as f64 - intersection;

    if union > 0.0 {
      (intersection / union) as f32
    } else {
      0.0
    }
  }
}

/// 通过置信度阈值的候选检测
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
  pub bbox: BBox,
  pub class_id: usize,
  pub confidence: f32,
}

mod decode;
mod preprocess;
mod suppress;

pub use self::decode::{DecodeError, decode};
pub use self::preprocess::{DEFAULT_INPUT_SIZE, preprocess};
pub use self::suppress::suppress;
