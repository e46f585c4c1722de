// 该文件是 Qianlu （前路） 项目的一部分。
// src/frame.rs - 帧定义
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

use image::{DynamicImage, ImageBuffer, Rgb, RgbImage};
use thiserror::Error;

const GRAY_CHANNELS: usize = 1;
const RGB_CHANNELS: usize = 3;
const RGBA_CHANNELS: usize = 4;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
  #[error("数据长度不匹配: 期望长度 {expected}, 实际长度 {actual}")]
  LengthMismatch { expected: usize, actual: usize },
  #[error("帧面积为零: {width}x{height}")]
  Empty { width: u32, height: u32 },
  #[error("不支持的通道数: {0}")]
  UnsupportedChannels(usize),
}

/// 彩色帧的通道排列。四通道帧的 alpha 总在最后。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelOrder {
  #[default]
  Rgb,
  Bgr,
}

/// 交错存储（HWC）的原始帧
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
  width: u32,
  height: u32,
  channels: usize,
  order: ChannelOrder,
  data: Box<[u8]>,
}

impl Frame {
  pub fn new(
    width: u32,
    height: u32,
    channels: usize,
    order: ChannelOrder,
    data: Vec<u8>,
  ) -> Result<Self, FrameError> {
    let expected = width as usize * height as usize * channels;
    if data.len() != expected {
      return Err(FrameError::LengthMismatch {
        expected,
        actual: data.len(),
      });
    }

    Ok(Self {
      width,
      height,
      channels,
      order,
      data: data.into_boxed_slice(),
    })
  }

  /// 纯色 RGB 帧，主要用于测试和探测
  pub fn filled(width: u32, height: u32, color: [u8; 3]) -> Self {
    let data = color
      .iter()
      .copied()
      .cycle()
      .take(width as usize * height as usize * RGB_CHANNELS)
      .collect::<Vec<_>>();
    Self {
      width,
      height,
      channels: RGB_CHANNELS,
      order: ChannelOrder::Rgb,
      data: data.into_boxed_slice(),
    }
  }

  pub fn width(&self) -> u32 {
    self.width
  }

  pub fn height(&self) -> u32 {
    self.height
  }

  pub fn channels(&self) -> usize {
    self.channels
  }

  pub fn order(&self) -> ChannelOrder {
    self.order
  }

  pub fn area(&self) -> u64 {
    self.width as u64 * self.height as u64
  }

  pub fn as_hwc(&self) -> &[u8] {
    &self.data
  }

  /// 检查帧是否可以送入预处理
  pub fn validate(&self) -> Result<(), FrameError> {
    if self.width == 0 || self.height == 0 {
      return Err(FrameError::Empty {
        width: self.width,
        height: self.height,
      });
    }
    match self.channels {
      GRAY_CHANNELS | RGB_CHANNELS | RGBA_CHANNELS => Ok(()),
      other => Err(FrameError::UnsupportedChannels(other)),
    }
  }
}

impl AsMut<[u8]> for Frame {
  fn as_mut(&mut self) -> &mut [u8] {
    &mut self.data
  }
}

pub trait ToRgbImage {
  fn to_rgb_image(&self) -> Result<RgbImage, FrameError>;
}

pub trait FromRgbImage {
  fn from_rgb_image(image: &RgbImage) -> Self;
}

impl ToRgbImage for Frame {
  fn to_rgb_image(&self) -> Result<RgbImage, FrameError> {
    self.validate()?;

    let width = self.width as usize;
    let channels = self.channels;
    let order = self.order;
    let data = &self.data;

    // 将 HWC 帧统一转为 RGB 图像
    Ok(ImageBuffer::from_fn(self.width, self.height, |x, y| {
      let idx = (y as usize * width + x as usize) * channels;
      if channels == GRAY_CHANNELS {
        let v = data[idx];
        return Rgb([v, v, v]);
      }
      let (a, b, c) = (data[idx], data[idx + 1], data[idx + 2]);
      match order {
        ChannelOrder::Rgb => Rgb([a, b, c]),
        ChannelOrder::Bgr => Rgb([c, b, a]),
      }
    }))
  }
}

impl FromRgbImage for Frame {
  fn from_rgb_image(image: &RgbImage) -> Self {
    Self {
      width: image.width(),
      height: image.height(),
      channels: RGB_CHANNELS,
      order: ChannelOrder::Rgb,
      data: image.as_raw().clone().into_boxed_slice(),
    }
  }
}

impl FromRgbImage for RgbImage {
  fn from_rgb_image(image: &RgbImage) -> Self {
    image.clone()
  }
}

impl From<RgbImage> for Frame {
  fn from(image: RgbImage) -> Self {
    let (width, height) = image.dimensions();
    Self {
      width,
      height,
      channels: RGB_CHANNELS,
      order: ChannelOrder::Rgb,
      data: image.into_raw().into_boxed_slice(),
    }
  }
}

impl From<DynamicImage> for Frame {
  fn from(image: DynamicImage) -> Self {
    let (width, height) = (image.width(), image.height());
    match image {
      DynamicImage::ImageLuma8(gray) => Self {
        width,
        height,
        channels: GRAY_CHANNELS,
        order: ChannelOrder::Rgb,
        data: gray.into_raw().into_boxed_slice(),
      },
      DynamicImage::ImageRgba8(rgba) => Self {
        width,
        height,
        channels: RGBA_CHANNELS,
        order: ChannelOrder::Rgb,
        data: rgba.into_raw().into_boxed_slice(),
      },
      other => Frame::from(other.to_rgb8()),
    }
  }
}
