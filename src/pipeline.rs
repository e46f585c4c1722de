// 该文件是 Qianlu （前路） 项目的一部分。
// src/pipeline.rs - 单帧检测到判定的完整流程
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

use image::RgbImage;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::{
  catalog::ClassCatalog,
  decision::{Annotation, DecisionError, ObstacleReport, decide},
  detect::{self, Candidate, DEFAULT_INPUT_SIZE, DecodeError, Tensor},
  frame::{Frame, FrameError, ToRgbImage},
  model::{InferenceEngine, RawOutput},
  output::draw::Draw,
};

pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.55;
pub const DEFAULT_NMS_THRESHOLD: f32 = 0.4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineConfig {
  /// 网络输入边长
  pub input_size: u32,
  pub confidence_threshold: f32,
  pub nms_threshold: f32,
  /// 每行坐标之后是否带一个 objectness 值（YOLOv3 为真）
  pub objectness: bool,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self {
      input_size: DEFAULT_INPUT_SIZE,
      confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
      nms_threshold: DEFAULT_NMS_THRESHOLD,
      objectness: true,
    }
  }
}

#[derive(Error, Debug)]
pub enum PipelineError<E> {
  #[error("无效输入: {0}")]
  InvalidInput(#[from] FrameError),
  #[error("推理失败: {0}")]
  Inference(#[source] E),
  #[error("解码失败: {0}")]
  Decode(#[from] DecodeError),
  #[error("判定失败: {0}")]
  Decision(#[from] DecisionError),
  #[error("模型输出行宽 {width} 与类别数 {classes} 不匹配")]
  ClassCountMismatch { width: usize, classes: usize },
  #[error("模型没有任何输出")]
  NoOutputs,
}

/// 单帧判定结果。无论是否请求标注，结构都一致。
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
  pub clear: bool,
  pub reports: Vec<ObstacleReport>,
  pub image: Option<RgbImage>,
}

/// 推理阶段的中间结果，供流水线任务跨线程传递
#[derive(Debug, Clone)]
pub struct Inferred {
  pub outputs: Vec<RawOutput>,
}

/// 检测流程上下文：引擎、类别目录与阈值一次构造，之后只读
pub struct Pipeline<M> {
  engine: M,
  catalog: ClassCatalog,
  config: PipelineConfig,
  draw: Draw,
}

impl<M: InferenceEngine> Pipeline<M> {
  /// 构造并用空白张量探测一次模型，确认输出行宽与类别数、行布局一致
  pub fn new(
    engine: M,
    catalog: ClassCatalog,
    config: PipelineConfig,
  ) -> Result<Self, PipelineError<M::Error>> {
    let pipeline = Self {
      engine,
      catalog,
      config,
      draw: Draw::default(),
    };
    pipeline.probe()?;
    info!(
      "检测流程就绪: 输入 {0}x{0}, 类别 {1}, 置信度阈值 {2}, NMS 阈值 {3}",
      config.input_size,
      pipeline.catalog.len(),
      config.confidence_threshold,
      config.nms_threshold
    );
    Ok(pipeline)
  }

  pub fn with_draw(mut self, draw: Draw) -> Self {
    self.draw = draw;
    self
  }

  pub fn catalog(&self) -> &ClassCatalog {
    &self.catalog
  }

  pub fn config(&self) -> &PipelineConfig {
    &self.config
  }

  pub fn engine(&self) -> &M {
    &self.engine
  }

  fn probe(&self) -> Result<(), PipelineError<M::Error>> {
    let side = self.config.input_size as usize;
    let blank = Tensor::zeros((1, 3, side, side));
    let outputs = self
      .engine
      .infer(&blank)
      .map_err(PipelineError::Inference)?;

    if outputs.is_empty() {
      error!("模型没有任何输出");
      return Err(PipelineError::NoOutputs);
    }

    let classes = self.catalog.len();
    let expected = 4 + self.config.objectness as usize + classes;
    for output in &outputs {
      if output.width() != expected {
        error!(
          "模型输出行宽 {} 与类别数 {} 不匹配",
          output.width(),
          classes
        );
        return Err(PipelineError::ClassCountMismatch {
          width: output.width(),
          classes,
        });
      }
    }
    debug!("模型输出层数: {}", outputs.len());
    Ok(())
  }

  /// 预处理并推理
  pub fn infer_stage(&self, frame: &Frame) -> Result<Inferred, PipelineError<M::Error>> {
    let tensor = detect::preprocess(frame, self.config.input_size)?;
    let outputs = self
      .engine
      .infer(&tensor)
      .map_err(PipelineError::Inference)?;
    Ok(Inferred { outputs })
  }

  /// 解码、抑制并判定；`annotate` 为真时返回标注后的图像
  pub fn finish_stage(
    &self,
    frame: &Frame,
    inferred: &Inferred,
    annotate: bool,
  ) -> Result<Verdict, PipelineError<M::Error>> {
    let retained = self.retained(frame, &inferred.outputs)?;

    if !annotate {
      let decision = decide(&retained, frame.width(), frame.height(), &self.catalog, None)?;
      return Ok(Verdict {
        clear: decision.clear,
        reports: decision.reports,
        image: None,
      });
    }

    let mut image = frame.to_rgb_image()?;
    let decision = decide(
      &retained,
      frame.width(),
      frame.height(),
      &self.catalog,
      Some(Annotation {
        image: &mut image,
        draw: &self.draw,
      }),
    )?;

    Ok(Verdict {
      clear: decision.clear,
      reports: decision.reports,
      image: Some(image),
    })
  }

  fn retained(
    &self,
    frame: &Frame,
    outputs: &[RawOutput],
  ) -> Result<Vec<Candidate>, PipelineError<M::Error>> {
    let candidates = detect::decode(
      outputs,
      frame.width(),
      frame.height(),
      self.config.confidence_threshold,
      self.catalog.len(),
      self.config.objectness,
    )?;
    let kept = detect::suppress(
      &candidates,
      self.config.confidence_threshold,
      self.config.nms_threshold,
    );
    Ok(kept.into_iter().map(|i| candidates[i]).collect())
  }

  /// 单帧完整流程：预处理 → 推理 → 解码 → 抑制 → 判定
  pub fn run(&self, frame: &Frame, annotate: bool) -> Result<Verdict, PipelineError<M::Error>> {
    let inferred = self.infer_stage(frame)?;
    self.finish_stage(frame, &inferred, annotate)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::convert::Infallible;

  struct FixedEngine(Vec<RawOutput>);

  impl InferenceEngine for FixedEngine {
    type Error = Infallible;

    fn infer(&self, _input: &Tensor) -> Result<Vec<RawOutput>, Self::Error> {
      Ok(self.0.clone())
    }
  }

  fn catalog() -> ClassCatalog {
    ClassCatalog::new(["person", "car", "boat"], 0.2).unwrap()
  }

  #[test]
  fn rejects_mismatched_class_count() {
    let engine = FixedEngine(vec![RawOutput::new(85, vec![]).unwrap()]);
    let err = Pipeline::new(engine, catalog(), PipelineConfig::default())
      .err()
      .unwrap();
    assert!(matches!(
      err,
      PipelineError::ClassCountMismatch {
        width: 85,
        classes: 3
      }
    ));
  }

  #[test]
  fn rejects_engine_without_outputs() {
    let err = Pipeline::new(FixedEngine(vec![]), catalog(), PipelineConfig::default())
      .err()
      .unwrap();
    assert!(matches!(err, PipelineError::NoOutputs));
  }

  #[test]
  fn catalog_one_class_off_is_fatal() {
    let names: Vec<String> = (0..81).map(|i| format!("c{}", i)).collect();
    let catalog = ClassCatalog::new(names, 0.2).unwrap();
    let engine = FixedEngine(vec![RawOutput::new(85, vec![]).unwrap()]);
    let err = Pipeline::new(engine, catalog, PipelineConfig::default())
      .err()
      .unwrap();
    assert!(matches!(
      err,
      PipelineError::ClassCountMismatch {
        width: 85,
        classes: 81
      }
    ));
  }

  #[test]
  fn row_layout_follows_objectness_flag() {
    let with = FixedEngine(vec![RawOutput::new(8, vec![]).unwrap()]);
    assert!(Pipeline::new(with, catalog(), PipelineConfig::default()).is_ok());

    let without = FixedEngine(vec![RawOutput::new(7, vec![]).unwrap()]);
    assert!(Pipeline::new(without, catalog(), PipelineConfig::default()).is_err());

    let config = PipelineConfig {
      objectness: false,
      ..PipelineConfig::default()
    };
    let without = FixedEngine(vec![RawOutput::new(7, vec![]).unwrap()]);
    assert!(Pipeline::new(without, catalog(), config).is_ok());
  }

  #[test]
  fn zero_area_frame_is_invalid_input() {
    let engine = FixedEngine(vec![RawOutput::new(8, vec![]).unwrap()]);
    let pipeline = Pipeline::new(engine, catalog(), PipelineConfig::default()).unwrap();
    let frame = Frame::new(0, 0, 3, Default::default(), vec![]).unwrap();
    assert!(matches!(
      pipeline.run(&frame, true),
      Err(PipelineError::InvalidInput(FrameError::Empty { .. }))
    ));
  }

  #[test]
  fn result_shape_follows_annotate_flag() {
    let engine = FixedEngine(vec![RawOutput::new(8, vec![]).unwrap()]);
    let pipeline = Pipeline::new(engine, catalog(), PipelineConfig::default()).unwrap();
    let frame = Frame::filled(64, 48, [9, 9, 9]);

    let plain = pipeline.run(&frame, false).unwrap();
    assert!(plain.clear);
    assert!(plain.image.is_none());

    let annotated = pipeline.run(&frame, true).unwrap();
    assert!(annotated.clear);
    assert!(annotated.reports.is_empty());
    assert_eq!(annotated.image, Some(frame.to_rgb_image().unwrap()));
  }
}
