// 该文件是 Qianlu （前路） 项目的一部分。
// src/bin/stream.rs - 连续帧障碍判定
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

use anyhow::Result;
use clap::Parser;
use tracing::info;

use qianlu::{
  FromUrl,
  args::DetectArgs,
  input::InputWrapper,
  model::OnnxEngineBuilder,
  output::OutputWrapper,
  pipeline::Pipeline,
  task::{ContinuousTask, DEFAULT_QUEUE_DEPTH, PipelinedTask, Task},
};

/// 逐帧处理图片目录，Ctrl-C 在帧边界退出
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  #[command(flatten)]
  pub detect: DetectArgs,

  /// 最多处理的帧数
  #[arg(long, value_name = "FRAME_NUMBER")]
  pub frame_number: Option<usize>,

  /// 推理与后处理在两个线程上重叠执行
  #[arg(long)]
  pub pipelined: bool,

  /// 流水线模式下推理结果队列的深度
  #[arg(long, default_value_t = DEFAULT_QUEUE_DEPTH, value_name = "DEPTH")]
  pub queue_depth: usize,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();
  let detect = &args.detect;

  info!("模型文件路径: {}", detect.model);
  info!("输入来源: {}", detect.input);
  info!("输出路径: {}", detect.output);

  let input = InputWrapper::from_url(&detect.input)?;
  let engine = OnnxEngineBuilder::from_url(&detect.model)?.build()?;
  let pipeline = Pipeline::new(engine, detect.catalog()?, detect.pipeline_config())?
    .with_draw(detect.draw()?);
  let output = OutputWrapper::from_url(&detect.output)?;

  let summary = if args.pipelined {
    PipelinedTask::default()
      .with_queue_depth(args.queue_depth)
      .with_frame_number(args.frame_number)
      .with_annotate(detect.annotate())
      .with_interrupt(true)
      .run_task(input, &pipeline, output)?
  } else {
    ContinuousTask::default()
      .with_frame_number(args.frame_number)
      .with_annotate(detect.annotate())
      .with_interrupt(true)
      .run_task(input, &pipeline, output)?
  };

  info!("共处理 {} 帧，其中 {} 帧有障碍", summary.frames, summary.blocked);
  Ok(())
}
