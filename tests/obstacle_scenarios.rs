// 该文件是 Qianlu （前路） 项目的一部分。
// tests/obstacle_scenarios.rs - 端到端判定场景
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

use std::convert::Infallible;

use image::Rgb;
use url::Url;

use qianlu::{
  FromUrl,
  catalog::ClassCatalog,
  detect::{BBox, Tensor},
  frame::Frame,
  input::InputWrapper,
  model::{InferenceEngine, RawOutput},
  output::OutputWrapper,
  pipeline::{Pipeline, PipelineConfig, PipelineError},
  task::{OneShotTask, Task},
};

const WIDTH: f32 = 640.0;
const HEIGHT: f32 = 480.0;

/// 每次推理都返回同一组输出
struct FixedEngine(Vec<RawOutput>);

impl InferenceEngine for FixedEngine {
  type Error = Infallible;

  fn infer(&self, _input: &Tensor) -> Result<Vec<RawOutput>, Self::Error> {
    Ok(self.0.clone())
  }
}

/// 带 objectness 的 YOLOv3 行：4 个坐标 + 1 + 3 个类别分数。
/// 坐标多加半个像素，截断后正好落在整数像素上。
fn row(x: u32, y: u32, w: u32, h: u32, class_id: usize, score: f32) -> Vec<f32> {
  let cx = x as f32 + w as f32 / 2.0 + 0.5;
  let cy = y as f32 + h as f32 / 2.0 + 0.5;
  let mut row = vec![
    cx / WIDTH,
    cy / HEIGHT,
    (w as f32 + 0.5) / WIDTH,
    (h as f32 + 0.5) / HEIGHT,
    1.0,
    0.0,
    0.0,
    0.0,
  ];
  row[5 + class_id] = score;
  row
}

fn pipeline(rows: &[Vec<f32>]) -> Pipeline<FixedEngine> {
  let output = if rows.is_empty() {
    RawOutput::new(8, vec![]).unwrap()
  } else {
    RawOutput::from_rows(8, rows).unwrap()
  };
  let catalog = ClassCatalog::new(["person", "car", "boat"], 0.2).unwrap();
  Pipeline::new(FixedEngine(vec![output]), catalog, PipelineConfig::default()).unwrap()
}

fn frame() -> Frame {
  Frame::filled(640, 480, [40, 40, 40])
}

#[test]
fn small_obstacle_leaves_path_clear() {
  let pipeline = pipeline(&[row(100, 100, 50, 50, 0, 0.9)]);
  let verdict = pipeline.run(&frame(), true).unwrap();

  assert!(verdict.clear);
  assert_eq!(verdict.reports.len(), 1);
  let report = &verdict.reports[0];
  assert_eq!(report.bbox, BBox::new(100, 100, 50, 50));
  assert_eq!(report.area, 2500);
  assert!(!report.exceeds());
  assert!(report.warning().is_none());
}

#[test]
fn large_obstacle_blocks_path() {
  let pipeline = pipeline(&[row(100, 100, 300, 300, 0, 0.9)]);
  let verdict = pipeline.run(&frame(), true).unwrap();

  assert!(!verdict.clear);
  assert_eq!(verdict.reports.len(), 1);
  let report = &verdict.reports[0];
  assert_eq!(report.bbox, BBox::new(100, 100, 300, 300));
  assert!((report.coverage - 90_000.0 / 307_200.0).abs() < 1e-9);
  assert_eq!(
    report.warning().as_deref(),
    Some("Be careful! Obstacle person in front!")
  );
  assert_eq!(
    report.to_string(),
    "Class person covers (300, 300) 90000 pixels, i.e. 29.3% of the image."
  );

  let color = pipeline.catalog().get(0).unwrap().color;
  let image = verdict.image.unwrap();
  assert_eq!(image.get_pixel(100, 250), &color);
  assert_eq!(image.get_pixel(399, 250), &color);
  assert_eq!(image.get_pixel(250, 250), &Rgb([40, 40, 40]));
}

#[test]
fn annotate_off_gives_same_decision_without_side_effects() {
  let pipeline = pipeline(&[row(100, 100, 300, 300, 1, 0.9)]);
  let verdict = pipeline.run(&frame(), false).unwrap();

  assert!(!verdict.clear);
  assert!(verdict.reports.is_empty());
  assert!(verdict.image.is_none());
}

#[test]
fn empty_detections_are_clear_and_untouched() {
  let pipeline = pipeline(&[]);
  let frame = frame();
  let verdict = pipeline.run(&frame, true).unwrap();

  assert!(verdict.clear);
  assert!(verdict.reports.is_empty());
  assert_eq!(verdict.image.unwrap().as_raw().as_slice(), frame.as_hwc());
}

#[test]
fn low_confidence_boxes_are_ignored() {
  let pipeline = pipeline(&[row(0, 0, 640, 480, 2, 0.55)]);
  assert!(pipeline.run(&frame(), true).unwrap().clear);
}

#[test]
fn overlapping_duplicates_are_reported_once() {
  let pipeline = pipeline(&[
    row(100, 100, 300, 300, 0, 0.9),
    row(102, 101, 300, 300, 1, 0.8),
  ]);
  let verdict = pipeline.run(&frame(), true).unwrap();
  assert_eq!(verdict.reports.len(), 1);
  assert_eq!(verdict.reports[0].class_name, "person");
}

#[derive(Debug, thiserror::Error)]
#[error("设备离线")]
struct Offline;

/// 探测时正常，真正推理时失败
struct FlakyEngine;

impl InferenceEngine for FlakyEngine {
  type Error = Offline;

  fn infer(&self, input: &Tensor) -> Result<Vec<RawOutput>, Self::Error> {
    if input.iter().all(|&v| v == 0.0) {
      Ok(vec![RawOutput::new(8, vec![]).unwrap()])
    } else {
      Err(Offline)
    }
  }
}

#[test]
fn inference_errors_surface_unchanged() {
  let catalog = ClassCatalog::new(["person", "car", "boat"], 0.2).unwrap();
  let pipeline = Pipeline::new(FlakyEngine, catalog, PipelineConfig::default()).unwrap();
  assert!(matches!(
    pipeline.run(&frame(), true),
    Err(PipelineError::Inference(Offline))
  ));
}

#[test]
fn one_shot_reads_file_and_writes_annotated_image() {
  let dir = tempfile::tempdir().unwrap();
  let input_path = dir.path().join("in.png");
  let output_path = dir.path().join("out/annotated.png");
  image::RgbImage::from_pixel(640, 480, Rgb([40, 40, 40]))
    .save(&input_path)
    .unwrap();

  let input =
    InputWrapper::from_url(&Url::parse(&format!("image://{}", input_path.display())).unwrap())
      .unwrap();
  let output =
    OutputWrapper::from_url(&Url::parse(&format!("image://{}", output_path.display())).unwrap())
      .unwrap();

  let pipeline = pipeline(&[row(100, 100, 300, 300, 0, 0.9)]);
  let summary = OneShotTask::default()
    .run_task(input, &pipeline, output)
    .unwrap();
  assert_eq!(summary.blocked, 1);

  let saved = image::open(&output_path).unwrap().to_rgb8();
  let color = pipeline.catalog().get(0).unwrap().color;
  assert_eq!(saved.get_pixel(100, 250), &color);
}
