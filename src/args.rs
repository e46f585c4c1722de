// 该文件是 Qianlu （前路） 项目的一部分。
// src/args.rs - 命令行参数
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

use std::path::PathBuf;

use anyhow::Result;
use tracing::info;
use url::Url;

use crate::{
  catalog::{ClassCatalog, DEFAULT_AREA_THRESHOLD},
  detect::DEFAULT_INPUT_SIZE,
  output::draw::Draw,
  pipeline::{DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_NMS_THRESHOLD, PipelineConfig},
};

/// 两个可执行程序共用的检测参数
#[derive(clap::Args, Debug, Clone)]
pub struct DetectArgs {
  /// 模型路径，例如 onnx:///models/yolov3-320.onnx?threads=4
  #[arg(long, value_name = "MODEL")]
  pub model: Url,

  /// 输入来源
  /// 支持格式:
  /// - 单张图片: image:///path/to/frame.jpg
  /// - 图片目录: folder:///path/to/frames
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,

  /// 输出去向
  /// 支持格式:
  /// - 标注图片: image:///path/to/out.png
  /// - 记录目录: folder:///path/to/records[?always]
  /// - 仅日志: log://
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,

  /// 类别名称文件，每行一个类别
  #[arg(long, value_name = "FILE")]
  pub labels: PathBuf,

  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, default_value_t = DEFAULT_CONFIDENCE_THRESHOLD, value_name = "THRESHOLD")]
  pub confidence: f32,

  /// NMS IOU 阈值 (0.0 - 1.0)
  #[arg(long, default_value_t = DEFAULT_NMS_THRESHOLD, value_name = "THRESHOLD")]
  pub nms_threshold: f32,

  /// 网络输入边长
  #[arg(long, default_value_t = DEFAULT_INPUT_SIZE, value_name = "PIXELS")]
  pub input_size: u32,

  /// 所有类别默认的面积占比阈值
  #[arg(long, default_value_t = DEFAULT_AREA_THRESHOLD, value_name = "RATIO")]
  pub area_threshold: f32,

  /// 模型输出行不带 objectness（每行为 4 个坐标加类别分数）
  #[arg(long)]
  pub no_objectness: bool,

  /// 单个类别的面积占比阈值，格式 NAME=VALUE，可重复
  #[arg(long, value_name = "NAME=VALUE", value_parser = parse_class_threshold)]
  pub class_threshold: Vec<(String, f32)>,

  /// 标签字体文件 (TTF/OTF)
  #[arg(long, value_name = "FILE")]
  pub font: Option<PathBuf>,

  /// 不绘制标注，也不输出逐框报告
  #[arg(long)]
  pub no_annotate: bool,
}

fn parse_class_threshold(s: &str) -> Result<(String, f32), String> {
  let (name, value) = s
    .rsplit_once('=')
    .ok_or_else(|| format!("缺少 '=': {}", s))?;
  let name = name.trim();
  if name.is_empty() {
    return Err(format!("类别名称为空: {}", s));
  }
  let value: f32 = value
    .trim()
    .parse()
    .map_err(|e| format!("无效的阈值 '{}': {}", value, e))?;
  Ok((name.to_string(), value))
}

impl DetectArgs {
  pub fn annotate(&self) -> bool {
    !self.no_annotate
  }

  pub fn pipeline_config(&self) -> PipelineConfig {
    PipelineConfig {
      input_size: self.input_size,
      confidence_threshold: self.confidence,
      nms_threshold: self.nms_threshold,
      objectness: !self.no_objectness,
    }
  }

  /// 读取类别文件，并应用逐类别阈值
  pub fn catalog(&self) -> Result<ClassCatalog> {
    let mut catalog = ClassCatalog::load(&self.labels, self.area_threshold)?;
    for (name, threshold) in &self.class_threshold {
      info!("类别 {} 面积阈值: {}", name, threshold);
      catalog = catalog.with_threshold(name, *threshold)?;
    }
    Ok(catalog)
  }

  pub fn draw(&self) -> Result<Draw> {
    let draw = Draw::default();
    Ok(match &self.font {
      Some(path) => draw.with_font_file(path)?,
      None => draw,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use clap::Parser;

  #[derive(Parser)]
  struct Cli {
    #[command(flatten)]
    detect: DetectArgs,
  }

  const REQUIRED: [&str; 9] = [
    "qianlu",
    "--model",
    "onnx:///m.onnx",
    "--input",
    "image:///in.jpg",
    "--output",
    "log://",
    "--labels",
    "coco.names",
  ];

  #[test]
  fn defaults_follow_detector_constants() {
    let cli = Cli::try_parse_from(REQUIRED).unwrap();
    let config = cli.detect.pipeline_config();
    assert_eq!(config, PipelineConfig::default());
    assert_eq!(cli.detect.area_threshold, DEFAULT_AREA_THRESHOLD);
    assert!(cli.detect.annotate());
    assert!(cli.detect.class_threshold.is_empty());
  }

  #[test]
  fn objectness_can_be_turned_off() {
    let mut argv = REQUIRED.to_vec();
    argv.push("--no-objectness");
    let cli = Cli::try_parse_from(argv).unwrap();
    assert!(!cli.detect.pipeline_config().objectness);
  }

  #[test]
  fn class_thresholds_repeat() {
    let mut argv = REQUIRED.to_vec();
    argv.extend(["--class-threshold", "person=0.3", "--class-threshold", "traffic light=0.05"]);
    let cli = Cli::try_parse_from(argv).unwrap();
    assert_eq!(
      cli.detect.class_threshold,
      vec![
        ("person".to_string(), 0.3),
        ("traffic light".to_string(), 0.05)
      ]
    );
  }

  #[test]
  fn class_threshold_parser_rejects_garbage() {
    assert!(parse_class_threshold("person").is_err());
    assert!(parse_class_threshold("=0.3").is_err());
    assert!(parse_class_threshold("person=abc").is_err());
  }

  #[test]
  fn catalog_applies_overrides() {
    let dir = tempfile::tempdir().unwrap();
    let labels = dir.path().join("labels.names");
    std::fs::write(&labels, "person\ncar\n").unwrap();

    let mut argv: Vec<String> = REQUIRED.iter().map(|s| s.to_string()).collect();
    argv[8] = labels.display().to_string();
    argv.extend(["--class-threshold".to_string(), "car=0.5".to_string()]);
    let cli = Cli::try_parse_from(argv).unwrap();

    let catalog = cli.detect.catalog().unwrap();
    assert_eq!(catalog.get(0).unwrap().area_threshold, DEFAULT_AREA_THRESHOLD);
    assert_eq!(catalog.get(1).unwrap().area_threshold, 0.5);
  }

  #[test]
  fn unknown_class_override_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let labels = dir.path().join("labels.names");
    std::fs::write(&labels, "person\n").unwrap();

    let mut argv: Vec<String> = REQUIRED.iter().map(|s| s.to_string()).collect();
    argv[8] = labels.display().to_string();
    argv.extend(["--class-threshold".to_string(), "zebra=0.5".to_string()]);
    let cli = Cli::try_parse_from(argv).unwrap();

    assert!(cli.detect.catalog().is_err());
  }
}
