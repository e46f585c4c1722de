// 该文件是 Qianlu （前路） 项目的一部分。
// src/detect/preprocess.rs - 输入预处理
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

use image::imageops::{self, FilterType};

use crate::{
  detect::Tensor,
  frame::{Frame, FrameError, ToRgbImage},
};

pub const DEFAULT_INPUT_SIZE: u32 = 320;

/// 将帧拉伸到 `size x size`，转为 RGB、缩放到 `[0, 1]` 的 NCHW 张量。
/// 不保持宽高比，解码时按原图宽高分别还原。
pub fn preprocess(frame: &Frame, size: u32) -> Result<Tensor, FrameError> {
  let image = frame.to_rgb_image()?;
  let resized = imageops::resize(&image, size, size, FilterType::Triangle);

  let side = size as usize;
  let tensor = Tensor::from_shape_fn((1, 3, side, side), |(_, c, h, w)| {
    resized.get_pixel(w as u32, h as u32)[c] as f32 / 255.0
  });

  Ok(tensor)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::frame::ChannelOrder;

  #[test]
  fn produces_fixed_square_shape() {
    let frame = Frame::filled(640, 480, [255, 0, 51]);
    let tensor = preprocess(&frame, 320).unwrap();
    assert_eq!(tensor.shape(), &[1, 3, 320, 320]);
    assert!((tensor[[0, 0, 10, 10]] - 1.0).abs() < 1e-6);
    assert!(tensor[[0, 1, 10, 10]].abs() < 1e-6);
    assert!((tensor[[0, 2, 10, 10]] - 0.2).abs() < 1e-6);
  }

  #[test]
  fn values_are_in_unit_range() {
    let data = (0..16 * 9 * 3).map(|i| (i % 256) as u8).collect();
    let frame = Frame::new(16, 9, 3, ChannelOrder::Rgb, data).unwrap();
    let tensor = preprocess(&frame, 8).unwrap();
    assert!(tensor.iter().all(|v| (0.0..=1.0).contains(v)));
  }

  #[test]
  fn bgr_input_is_swapped() {
    let data = [0u8, 0, 255].repeat(4);
    let frame = Frame::new(2, 2, 3, ChannelOrder::Bgr, data).unwrap();
    let tensor = preprocess(&frame, 4).unwrap();
    // BGR 中的 255 在最后一个通道，转换后应落在 R 通道
    assert!((tensor[[0, 0, 0, 0]] - 1.0).abs() < 1e-6);
    assert!(tensor[[0, 2, 0, 0]].abs() < 1e-6);
  }

  #[test]
  fn empty_frame_is_rejected() {
    let frame = Frame::new(0, 0, 3, ChannelOrder::Rgb, vec![]).unwrap();
    assert!(matches!(
      preprocess(&frame, 320),
      Err(FrameError::Empty { .. })
    ));
  }

  #[test]
  fn unsupported_channel_count_is_rejected() {
    let frame = Frame::new(2, 2, 2, ChannelOrder::Rgb, vec![0; 8]).unwrap();
    assert_eq!(
      preprocess(&frame, 320),
      Err(FrameError::UnsupportedChannels(2))
    );
  }
}
