// 该文件是 Qianlu （前路） 项目的一部分。
// src/model/onnx.rs - ONNX Runtime 推理后端
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
use std::sync::Mutex;

use ort::session::Session;
use ort::value::TensorRef;
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  detect::Tensor,
  model::{InferenceEngine, RawOutput, RawOutputError},
  utils::{url_file_path, url_query_value},
};

const DEFAULT_INTRA_THREADS: usize = 4;

#[derive(Error, Debug)]
pub enum OnnxError {
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
  #[error("模型文件不存在: {}", .0.display())]
  ModelNotFound(PathBuf),
  #[error("ONNX Runtime 错误: {0}")]
  OrtError(#[from] ort::Error),
  #[error("输入张量不连续")]
  NonContiguousInput,
  #[error("推理会话锁已失效")]
  SessionPoisoned,
  #[error("输出 {index} 无效: {source}")]
  InvalidOutput {
    index: usize,
    #[source]
    source: RawOutputError,
  },
}

pub struct OnnxEngineBuilder {
  model_path: PathBuf,
  intra_threads: usize,
}

impl FromUrlWithScheme for OnnxEngineBuilder {
  const SCHEME: &'static str = "onnx";
}

impl FromUrl for OnnxEngineBuilder {
  type Error = OnnxError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(OnnxError::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    let intra_threads = match url_query_value(url, "threads") {
      Some(value) => value
        .parse()
        .map_err(|_| OnnxError::ModelPathError(format!("无效的线程数: {}", value)))?,
      None => DEFAULT_INTRA_THREADS,
    };

    Ok(OnnxEngineBuilder {
      model_path: url_file_path(url),
      intra_threads,
    })
  }
}

impl OnnxEngineBuilder {
  pub fn new(model_path: impl Into<PathBuf>) -> Self {
    Self {
      model_path: model_path.into(),
      intra_threads: DEFAULT_INTRA_THREADS,
    }
  }

  pub fn intra_threads(mut self, threads: usize) -> Self {
    self.intra_threads = threads;
    self
  }

  pub fn build(self) -> Result<OnnxEngine, OnnxError> {
    info!("加载模型文件: {}", self.model_path.display());
    if !self.model_path.is_file() {
      error!("模型文件不存在: {}", self.model_path.display());
      return Err(OnnxError::ModelNotFound(self.model_path));
    }

    let session = Session::builder()?
      .with_intra_threads(self.intra_threads)?
      .commit_from_file(&self.model_path)?;
    info!("模型加载完成");
    debug!("推理线程数: {}", self.intra_threads);

    Ok(OnnxEngine {
      session: Mutex::new(session),
      model_path: self.model_path,
    })
  }
}

/// 基于 ONNX Runtime 的推理引擎
pub struct OnnxEngine {
  session: Mutex<Session>,
  model_path: PathBuf,
}

impl OnnxEngine {
  pub fn model_path(&self) -> &std::path::Path {
    &self.model_path
  }
}

impl InferenceEngine for OnnxEngine {
  type Error = OnnxError;

  fn infer(&self, input: &Tensor) -> Result<Vec<RawOutput>, Self::Error> {
    let dims: Vec<i64> = input.shape().iter().map(|&d| d as i64).collect();
    let data = input.as_slice().ok_or(OnnxError::NonContiguousInput)?;
    let tensor = TensorRef::from_array_view((dims, data))?;

    let mut session = self
      .session
      .lock()
      .map_err(|_| OnnxError::SessionPoisoned)?;

    debug!("执行模型推理");
    let outputs = session.run(ort::inputs![tensor])?;

    let mut layers = Vec::with_capacity(outputs.len());
    for index in 0..outputs.len() {
      let (shape, data) = outputs[index].try_extract_tensor::<f32>()?;
      // 最后一维是行宽，其余维度全部展平为行
      let width = shape.last().copied().unwrap_or(0).max(0) as usize;
      debug!("输出 {} 形状: {:?}", index, shape);
      let layer = RawOutput::new(width, data.to_vec())
        .map_err(|source| OnnxError::InvalidOutput { index, source })?;
      layers.push(layer);
    }

    Ok(layers)
  }
}
