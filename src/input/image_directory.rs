// 该文件是 Qianlu （前路） 项目的一部分。
// src/input/image_directory.rs - 图像目录输入，按文件名顺序逐帧读取
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

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme, frame::Frame, input::read_image_file::read_frame,
  utils::url_file_path,
};

const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

#[derive(Error, Debug)]
pub enum ImageDirectoryInputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("无法读取目录 {}: {}", .0.display(), .1)]
  IoError(PathBuf, std::io::Error),
}

/// 把目录下的图像文件当作帧序列；无法解码的文件跳过
pub struct ImageDirectoryInput {
  paths: std::vec::IntoIter<PathBuf>,
}

impl FromUrlWithScheme for ImageDirectoryInput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for ImageDirectoryInput {
  type Error = ImageDirectoryInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ImageDirectoryInputError::SchemeMismatch);
    }
    Self::open(url_file_path(url))
  }
}

impl ImageDirectoryInput {
  pub fn open(directory: impl AsRef<Path>) -> Result<Self, ImageDirectoryInputError> {
    let directory = directory.as_ref();
    let entries = std::fs::read_dir(directory)
      .map_err(|e| ImageDirectoryInputError::IoError(directory.to_path_buf(), e))?;

    let mut paths = Vec::new();
    for entry in entries {
      let path = entry
        .map_err(|e| ImageDirectoryInputError::IoError(directory.to_path_buf(), e))?
        .path();
      if path.is_file() && is_image(&path) {
        paths.push(path);
      }
    }
    paths.sort();

    info!("图像目录 {} 共 {} 帧", directory.display(), paths.len());
    Ok(Self {
      paths: paths.into_iter(),
    })
  }
}

fn is_image(path: &Path) -> bool {
  path
    .extension()
    .and_then(|ext| ext.to_str())
    .map(|ext| {
      IMAGE_EXTENSIONS
        .iter()
        .any(|known| known.eq_ignore_ascii_case(ext))
    })
    .unwrap_or(false)
}

impl Iterator for ImageDirectoryInput {
  type Item = Frame;

  fn next(&mut self) -> Option<Self::Item> {
    for path in self.paths.by_ref() {
      match read_frame(&path) {
        Ok(frame) => {
          debug!("读取帧: {}", path.display());
          return Some(frame);
        }
        Err(e) => warn!("跳过无法读取的文件 {}: {}", path.display(), e),
      }
    }
    None
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::{Rgb, RgbImage};

  #[test]
  fn reads_images_in_name_order_and_skips_others() {
    let dir = tempfile::tempdir().unwrap();
    RgbImage::from_pixel(2, 2, Rgb([2, 0, 0]))
      .save(dir.path().join("0002.png"))
      .unwrap();
    RgbImage::from_pixel(2, 2, Rgb([1, 0, 0]))
      .save(dir.path().join("0001.png"))
      .unwrap();
    std::fs::write(dir.path().join("notes.txt"), "not a frame").unwrap();
    std::fs::write(dir.path().join("0003.png"), "broken").unwrap();

    let frames: Vec<_> = ImageDirectoryInput::open(dir.path()).unwrap().collect();
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].as_hwc()[0], 1);
    assert_eq!(frames[1].as_hwc()[0], 2);
  }

  #[test]
  fn missing_directory_is_an_error() {
    assert!(matches!(
      ImageDirectoryInput::open("/nonexistent/frames"),
      Err(ImageDirectoryInputError::IoError(..))
    ));
  }
}
