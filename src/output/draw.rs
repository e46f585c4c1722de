// 该文件是 Qianlu （前路） 项目的一部分。
// src/output/draw.rs - 检测框与标签绘制
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

use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use thiserror::Error;
use tracing::{info, warn};

use crate::detect::BBox;

// 内置字体 DejaVu Sans Mono，许可见 assets/FONT-LICENSE
static EMBEDDED_FONT: &[u8] = include_bytes!("../../assets/font.ttf");

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 16.0;
const LABEL_TEXT_HEIGHT: i32 = 18;
const LABEL_CHAR_WIDTH: f32 = 8.0; // 每字符平均宽度（粗略估计）
const LABEL_OFFSET: i32 = 5;
const LABEL_TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const BOX_THICKNESS: i32 = 2;

#[derive(Error, Debug)]
pub enum FontError {
  #[error("无法读取字体文件: {0}")]
  Io(#[from] std::io::Error),
  #[error("字体文件无效: {0}")]
  Invalid(#[from] ab_glyph::InvalidFont),
}

/// 标注绘制器。默认使用内置字体，可用 `with_font_file` 替换。
#[derive(Clone)]
pub struct Draw {
  font: Option<FontArc>,
  font_scale: PxScale,
  label_text_height: i32,
  label_char_width: f32,
}

impl Default for Draw {
  fn default() -> Self {
    let font = match FontArc::try_from_slice(EMBEDDED_FONT) {
      Ok(font) => Some(font),
      Err(e) => {
        warn!("内置字体无效，标签不渲染文字: {}", e);
        None
      }
    };

    Self {
      font,
      font_scale: PxScale::from(LABEL_FONT_SIZE),
      label_text_height: LABEL_TEXT_HEIGHT,
      label_char_width: LABEL_CHAR_WIDTH,
    }
  }
}

impl std::fmt::Debug for Draw {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Draw")
      .field("font", &self.font.is_some())
      .field("font_scale", &self.font_scale.y)
      .finish()
  }
}

impl Draw {
  pub fn with_font(mut self, font: FontArc) -> Self {
    self.font = Some(font);
    self
  }

  pub fn with_font_file(self, path: impl AsRef<Path>) -> Result<Self, FontError> {
    let path = path.as_ref();
    info!("加载字体文件: {}", path.display());
    let data = std::fs::read(path)?;
    let font = FontArc::try_from_vec(data)?;
    Ok(self.with_font(font))
  }

  pub fn has_font(&self) -> bool {
    self.font.is_some()
  }

  /// 画出边界框（2 像素）以及框上方的标签
  pub fn draw_labeled_box(&self, image: &mut RgbImage, bbox: &BBox, label: &str, color: Rgb<u8>) {
    let Some((x, y, width, height)) = clip(image, bbox) else {
      return;
    };

    for t in 0..BOX_THICKNESS {
      let w = width.saturating_sub(2 * t as u32);
      let h = height.saturating_sub(2 * t as u32);
      if w == 0 || h == 0 {
        break;
      }
      draw_hollow_rect_mut(image, Rect::at(x + t, y + t).of_size(w, h), color);
    }

    self.draw_label(image, x, y, label, color);
  }

  fn draw_label(&self, image: &mut RgbImage, x: i32, y: i32, label: &str, color: Rgb<u8>) {
    let text_width = match &self.font {
      Some(font) => text_size(self.font_scale, font, label).0 as i32 + 2,
      None => (label.chars().count() as f32 * self.label_char_width) as i32,
    };
    let label_y = (y - LABEL_OFFSET - self.label_text_height).max(0);
    let max_width = (image.width() as i32 - x).max(0);
    let label_width = text_width.min(max_width) as u32;

    if label_width == 0 {
      return;
    }

    let rect = Rect::at(x, label_y).of_size(label_width, self.label_text_height as u32);
    draw_filled_rect_mut(image, rect, color);

    if let Some(font) = &self.font {
      draw_text_mut(
        image,
        LABEL_TEXT_COLOR,
        x + 1,
        label_y,
        self.font_scale,
        font,
        label,
      );
    }
  }
}

/// 把框裁剪到画面内，返回 (x, y, width, height)；完全在画面外时返回 None
fn clip(image: &RgbImage, bbox: &BBox) -> Option<(i32, i32, u32, u32)> {
  let (w, h) = (image.width() as i64, image.height() as i64);
  let x_min = (bbox.x as i64).clamp(0, w);
  let y_min = (bbox.y as i64).clamp(0, h);
  let x_max = bbox.right().clamp(0, w);
  let y_max = bbox.bottom().clamp(0, h);

  if x_min >= x_max || y_min >= y_max {
    return None;
  }

  Some((
    x_min as i32,
    y_min as i32,
    (x_max - x_min) as u32,
    (y_max - y_min) as u32,
  ))
}
