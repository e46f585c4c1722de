// 该文件是 Qianlu （前路） 项目的一部分。
// src/input.rs - 图像输入
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

use crate::{FromUrl, FromUrlWithScheme, frame::Frame};

mod image_directory;
mod read_image_file;

pub use self::image_directory::{ImageDirectoryInput, ImageDirectoryInputError};
pub use self::read_image_file::{ImageFileInput, ImageFileInputError};

#[derive(Error, Debug)]
pub enum InputError {
  #[error("Image file input error: {0}")]
  ImageFileInputError(#[from] ImageFileInputError),
  #[error("Image directory input error: {0}")]
  ImageDirectoryInputError(#[from] ImageDirectoryInputError),
  #[error("URI scheme mismatch: {0}")]
  SchemeMismatch(String),
}

pub enum InputWrapper {
  ReadImageFile(ImageFileInput),
  ImageDirectory(ImageDirectoryInput),
}

impl FromUrl for InputWrapper {
  type Error = InputError;

  fn from_url(url: &url::Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      ImageFileInput::SCHEME => Ok(InputWrapper::ReadImageFile(ImageFileInput::from_url(url)?)),
      ImageDirectoryInput::SCHEME => Ok(InputWrapper::ImageDirectory(
        ImageDirectoryInput::from_url(url)?,
      )),
      other => Err(InputError::SchemeMismatch(other.to_string())),
    }
  }
}

impl Iterator for InputWrapper {
  type Item = Frame;

  fn next(&mut self) -> Option<Self::Item> {
    match self {
      InputWrapper::ReadImageFile(input) => input.next(),
      InputWrapper::ImageDirectory(input) => input.next(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use url::Url;

  #[test]
  fn unknown_scheme_is_rejected() {
    let url = Url::parse("v4l2:///dev/video0").unwrap();
    assert!(matches!(
      InputWrapper::from_url(&url),
      Err(InputError::SchemeMismatch(s)) if s == "v4l2"
    ));
  }

  #[test]
  fn dispatches_by_scheme() {
    let dir = tempfile::tempdir().unwrap();
    image::RgbImage::new(4, 3)
      .save(dir.path().join("a.png"))
      .unwrap();

    let folder = Url::from_directory_path(dir.path()).unwrap();
    let folder = Url::parse(&folder.as_str().replacen("file", "folder", 1)).unwrap();
    let input = InputWrapper::from_url(&folder).unwrap();
    assert!(matches!(input, InputWrapper::ImageDirectory(_)));
    assert_eq!(input.count(), 1);

    let file = Url::from_file_path(dir.path().join("a.png")).unwrap();
    let file = Url::parse(&file.as_str().replacen("file", "image", 1)).unwrap();
    let mut input = InputWrapper::from_url(&file).unwrap();
    let frame = input.next().unwrap();
    assert_eq!((frame.width(), frame.height()), (4, 3));
    assert!(input.next().is_none());
  }
}
