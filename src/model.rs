// 该文件是 Qianlu （前路） 项目的一部分。
// src/model.rs - 推理引擎接口
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

use crate::detect::Tensor;

/// 推理引擎：预处理后的张量进，逐层原始检测输出出。
///
/// 核心流程不关心网络结构，只要求每一行是
/// `(cx, cy, w, h, [objectness], score_0, ..., score_{n-1})`，
/// 坐标相对于原图宽高归一化。
pub trait InferenceEngine {
  type Error;

  fn infer(&self, input: &Tensor) -> Result<Vec<RawOutput>, Self::Error>;
}

impl<M: InferenceEngine + ?Sized> InferenceEngine for &M {
  type Error = M::Error;

  fn infer(&self, input: &Tensor) -> Result<Vec<RawOutput>, Self::Error> {
    (**self).infer(input)
  }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RawOutputError {
  #[error("行宽为零")]
  ZeroWidth,
  #[error("数据长度 {len} 不是行宽 {width} 的整数倍")]
  Ragged { len: usize, width: usize },
}

/// 一个输出层，按行展平的 `rows x width` 矩阵
#[derive(Debug, Clone, PartialEq)]
pub struct RawOutput {
  width: usize,
  data: Box<[f32]>,
}

impl RawOutput {
  pub fn new(width: usize, data: Vec<f32>) -> Result<Self, RawOutputError> {
    if width == 0 {
      return Err(RawOutputError::ZeroWidth);
    }
    if data.len() % width != 0 {
      return Err(RawOutputError::Ragged {
        len: data.len(),
        width,
      });
    }
    Ok(Self {
      width,
      data: data.into_boxed_slice(),
    })
  }

  /// 由逐行数据构造，所有行必须等宽
  pub fn from_rows<R: AsRef<[f32]>>(width: usize, rows: &[R]) -> Result<Self, RawOutputError> {
    let mut data = Vec::with_capacity(width * rows.len());
    for row in rows {
      let row = row.as_ref();
      if row.len() != width {
        return Err(RawOutputError::Ragged {
          len: row.len(),
          width,
        });
      }
      data.extend_from_slice(row);
    }
    Self::new(width, data)
  }

  pub fn width(&self) -> usize {
    self.width
  }

  pub fn num_rows(&self) -> usize {
    self.data.len() / self.width
  }

  pub fn rows(&self) -> impl Iterator<Item = &[f32]> {
    self.data.chunks_exact(self.width)
  }
}

#[cfg(feature = "onnx")]
pub mod onnx;
#[cfg(feature = "onnx")]
pub use self::onnx::{OnnxEngine, OnnxEngineBuilder, OnnxError};

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn splits_rows_by_width() {
    let output = RawOutput::new(3, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
    assert_eq!(output.num_rows(), 2);
    let rows: Vec<_> = output.rows().collect();
    assert_eq!(rows[1], &[4.0, 5.0, 6.0]);
  }

  #[test]
  fn rejects_ragged_data() {
    assert_eq!(
      RawOutput::new(4, vec![0.0; 6]),
      Err(RawOutputError::Ragged { len: 6, width: 4 })
    );
    assert_eq!(RawOutput::new(0, vec![]), Err(RawOutputError::ZeroWidth));
    assert!(RawOutput::from_rows(2, &[vec![0.0, 1.0], vec![0.0]]).is_err());
  }

  #[test]
  fn empty_output_has_no_rows() {
    let output = RawOutput::new(85, vec![]).unwrap();
    assert_eq!(output.rows().count(), 0);
  }
}
