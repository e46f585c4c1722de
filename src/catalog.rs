// 该文件是 Qianlu （前路） 项目的一部分。
// src/catalog.rs - 类别目录（名称、颜色、面积阈值）
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

use image::Rgb;
use thiserror::Error;
use tracing::{debug, info};

/// 默认面积阈值：目标覆盖画面 20% 以上即视为障碍
pub const DEFAULT_AREA_THRESHOLD: f32 = 0.2;

#[derive(Error, Debug)]
pub enum CatalogError {
  #[error("无法读取类别文件 {path}: {source}")]
  Io {
    path: String,
    #[source]
    source: std::io::Error,
  },
  #[error("类别列表为空")]
  Empty,
  #[error("未知类别: {0}")]
  UnknownClass(String),
  #[error("面积阈值超出范围 [0, 1]: {0}")]
  ThresholdOutOfRange(f32),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassEntry {
  pub name: String,
  pub color: Rgb<u8>,
  pub area_threshold: f32,
}

/// 只读类别目录，按类别编号索引
#[derive(Debug, Clone, PartialEq)]
pub struct ClassCatalog {
  entries: Box<[ClassEntry]>,
}

impl ClassCatalog {
  pub fn new<I, S>(names: I, area_threshold: f32) -> Result<Self, CatalogError>
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    check_threshold(area_threshold)?;

    let names: Vec<String> = names.into_iter().map(Into::into).collect();
    if names.is_empty() {
      return Err(CatalogError::Empty);
    }

    let count = names.len();
    let entries = names
      .into_iter()
      .enumerate()
      .map(|(i, name)| ClassEntry {
        name,
        color: palette_color(i, count),
        area_threshold,
      })
      .collect::<Vec<_>>();

    Ok(Self {
      entries: entries.into_boxed_slice(),
    })
  }

  /// 解析换行分隔的类别名称列表
  pub fn parse(text: &str, area_threshold: f32) -> Result<Self, CatalogError> {
    Self::new(
      text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty()),
      area_threshold,
    )
  }

  pub fn load(path: impl AsRef<Path>, area_threshold: f32) -> Result<Self, CatalogError> {
    let path = path.as_ref();
    info!("加载类别文件: {}", path.display());
    let text = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
      path: path.display().to_string(),
      source,
    })?;
    let catalog = Self::parse(&text, area_threshold)?;
    debug!("类别数量: {}", catalog.len());
    Ok(catalog)
  }

  /// 按名称覆盖某一类别的面积阈值
  pub fn with_threshold(mut self, name: &str, area_threshold: f32) -> Result<Self, CatalogError> {
    check_threshold(area_threshold)?;
    let entry = self
      .entries
      .iter_mut()
      .find(|entry| entry.name == name)
      .ok_or_else(|| CatalogError::UnknownClass(name.to_string()))?;
    entry.area_threshold = area_threshold;
    Ok(self)
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn get(&self, class_id: usize) -> Option<&ClassEntry> {
    self.entries.get(class_id)
  }

  pub fn iter(&self) -> impl Iterator<Item = &ClassEntry> {
    self.entries.iter()
  }
}

fn check_threshold(area_threshold: f32) -> Result<(), CatalogError> {
  if (0.0..=1.0).contains(&area_threshold) {
    Ok(())
  } else {
    Err(CatalogError::ThresholdOutOfRange(area_threshold))
  }
}

/// 在色环上均匀取色，保证每个类别颜色固定
fn palette_color(index: usize, count: usize) -> Rgb<u8> {
  let hue = (index as f32 / count as f32) * 360.0;
  hsv_to_rgb(hue, 0.8, 0.9)
}

fn hsv_to_rgb(h: f32, s: f32, v: f32) -> Rgb<u8> {
  let c = v * s;
  let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
  let m = v - c;

  let (r, g, b) = if h < 60.0 {
    (c, x, 0.0)
  } else if h < 120.0 {
    (x, c, 0.0)
  } else if h < 180.0 {
    (0.0, c, x)
  } else if h < 240.0 {
    (0.0, x, c)
  } else if h < 300.0 {
    (x, 0.0, c)
  } else {
    (c, 0.0, x)
  };

  Rgb([
    ((r + m) * 255.0) as u8,
    ((g + m) * 255.0) as u8,
    ((b + m) * 255.0) as u8,
  ])
}
