// 该文件是 Qianlu （前路） 项目的一部分。
// src/task.rs - 任务循环
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

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::{thread, time::Duration, time::Instant};

use tracing::{info, warn};

use crate::{
  frame::Frame,
  model::InferenceEngine,
  output::Render,
  pipeline::{Pipeline, PipelineError, Verdict},
};

pub const DEFAULT_QUEUE_DEPTH: usize = 2;

pub trait Task<I, M, O>: Sized {
  type Error;
  fn run_task(self, input: I, pipeline: &Pipeline<M>, output: O)
  -> Result<TaskSummary, Self::Error>;
}

/// 任务结束时的统计
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TaskSummary {
  pub frames: usize,
  pub blocked: usize,
}

impl TaskSummary {
  fn record(&mut self, index: usize, verdict: &Verdict) {
    self.frames += 1;
    if verdict.clear {
      info!("第 {} 帧: 前方畅通", index);
    } else {
      self.blocked += 1;
      warn!("第 {} 帧: 前方有障碍", index);
    }
  }
}

/// 安装 Ctrl-C 处理器；同一进程只能安装一次
fn install_interrupt() -> anyhow::Result<Receiver<()>> {
  let (tx, rx) = mpsc::channel();
  ctrlc::set_handler(move || {
    info!("收到中断信号，准备退出...");
    let _ = tx.send(());
    thread::spawn(|| {
      thread::sleep(Duration::from_secs(30));
      warn!("强制退出程序");
      std::process::exit(1);
    });
  })?;
  Ok(rx)
}

fn interrupted(stop: &Option<Receiver<()>>) -> bool {
  stop.as_ref().map(|rx| rx.try_recv().is_ok()).unwrap_or(false)
}

pub struct OneShotTask {
  annotate: bool,
}

impl Default for OneShotTask {
  fn default() -> Self {
    Self { annotate: true }
  }
}

impl OneShotTask {
  pub fn with_annotate(mut self, annotate: bool) -> Self {
    self.annotate = annotate;
    self
  }
}

impl<I, M, O, RE> Task<I, M, O> for OneShotTask
where
  I: Iterator<Item = Frame>,
  M: InferenceEngine,
  M::Error: std::error::Error + Sync + Send + 'static,
  O: Render<Frame, Verdict, Error = RE>,
  RE: std::error::Error + Sync + Send + 'static,
{
  type Error = anyhow::Error;

  fn run_task(
    self,
    mut input: I,
    pipeline: &Pipeline<M>,
    output: O,
  ) -> Result<TaskSummary, Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;
    info!("输入帧获取成功，开始推理...");
    let now = Instant::now();
    let verdict = pipeline.run(&frame, self.annotate)?;
    info!("判定完成，耗时: {:.2?}", now.elapsed());
    output.render_result(&frame, &verdict)?;
    info!("渲染完成，耗时: {:.2?}", now.elapsed());

    let mut summary = TaskSummary::default();
    summary.record(1, &verdict);
    Ok(summary)
  }
}

/// 顺序处理每一帧，前一帧完全结束后才取下一帧
#[derive(Debug)]
pub struct ContinuousTask {
  frame_number: Option<usize>,
  annotate: bool,
  interrupt: bool,
}

impl Default for ContinuousTask {
  fn default() -> Self {
    Self {
      frame_number: None,
      annotate: true,
      interrupt: false,
    }
  }
}

impl ContinuousTask {
  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number;
    self
  }

  pub fn with_annotate(mut self, annotate: bool) -> Self {
    self.annotate = annotate;
    self
  }

  /// 收到 Ctrl-C 后在帧边界退出
  pub fn with_interrupt(mut self, interrupt: bool) -> Self {
    self.interrupt = interrupt;
    self
  }
}

impl<I, M, O, RE> Task<I, M, O> for ContinuousTask
where
  I: Iterator<Item = Frame>,
  M: InferenceEngine,
  M::Error: std::error::Error + Sync + Send + 'static,
  O: Render<Frame, Verdict, Error = RE>,
  RE: std::error::Error + Sync + Send + 'static,
{
  type Error = anyhow::Error;

  fn run_task(
    self,
    input: I,
    pipeline: &Pipeline<M>,
    output: O,
  ) -> Result<TaskSummary, Self::Error> {
    info!("开始任务...");
    let stop = if self.interrupt {
      Some(install_interrupt()?)
    } else {
      None
    };

    let mut summary = TaskSummary::default();
    let mut frame_index = 0usize;
    let mut now = Instant::now();
    for frame in input {
      frame_index += 1;
      info!("处理第 {} 帧图像", frame_index);
      match pipeline.run(&frame, self.annotate) {
        Ok(verdict) => {
          let elapsed_a = now.elapsed();
          output.render_result(&frame, &verdict)?;
          let elapsed_b = now.elapsed();
          info!("判定完成，耗时: {:.2?} / {:.2?}", elapsed_a, elapsed_b);
          summary.record(frame_index, &verdict);
        }
        Err(PipelineError::InvalidInput(e)) => {
          warn!("跳过第 {} 帧: {}", frame_index, e);
        }
        Err(e) => return Err(e.into()),
      }
      now = Instant::now();

      if self.frame_number.map(|n| frame_index >= n).unwrap_or(false) {
        info!("达到指定帧数 {}, 退出任务循环", frame_index);
        break;
      }
      if interrupted(&stop) {
        warn!("中断信号接收，退出任务循环");
        break;
      }
    }

    info!("任务完成，退出");
    Ok(summary)
  }
}

/// 推理与后处理重叠：工作线程做预处理和推理，当前线程做解码、判定与输出。
/// 两者之间是有界队列，帧顺序不变。
#[derive(Debug)]
pub struct PipelinedTask {
  queue_depth: usize,
  frame_number: Option<usize>,
  annotate: bool,
  interrupt: bool,
}

impl Default for PipelinedTask {
  fn default() -> Self {
    Self {
      queue_depth: DEFAULT_QUEUE_DEPTH,
      frame_number: None,
      annotate: true,
      interrupt: false,
    }
  }
}

impl PipelinedTask {
  pub fn with_queue_depth(mut self, queue_depth: usize) -> Self {
    self.queue_depth = queue_depth.max(1);
    self
  }

  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number;
    self
  }

  pub fn with_annotate(mut self, annotate: bool) -> Self {
    self.annotate = annotate;
    self
  }

  pub fn with_interrupt(mut self, interrupt: bool) -> Self {
    self.interrupt = interrupt;
    self
  }
}

impl<I, M, O, RE> Task<I, M, O> for PipelinedTask
where
  I: Iterator<Item = Frame> + Send,
  M: InferenceEngine + Sync,
  M::Error: std::error::Error + Sync + Send + 'static,
  O: Render<Frame, Verdict, Error = RE>,
  RE: std::error::Error + Sync + Send + 'static,
{
  type Error = anyhow::Error;

  fn run_task(
    self,
    input: I,
    pipeline: &Pipeline<M>,
    output: O,
  ) -> Result<TaskSummary, Self::Error> {
    info!("开始流水线任务，队列深度 {}", self.queue_depth);
    let stop = if self.interrupt {
      Some(install_interrupt()?)
    } else {
      None
    };

    let limit = self.frame_number;
    let halt = AtomicBool::new(false);

    thread::scope(|scope| {
      let (tx, rx) = mpsc::sync_channel(self.queue_depth);
      let halt = &halt;

      scope.spawn(move || {
        for (index, frame) in input.enumerate() {
          if halt.load(Ordering::Relaxed) || limit.map(|n| index >= n).unwrap_or(false) {
            break;
          }
          let inferred = pipeline.infer_stage(&frame);
          if tx.send((frame, inferred)).is_err() {
            break;
          }
        }
      });

      let mut summary = TaskSummary::default();
      let mut outcome = Ok(());
      for (frame_index, (frame, inferred)) in rx.iter().enumerate() {
        let frame_index = frame_index + 1;
        let step = inferred
          .and_then(|inferred| pipeline.finish_stage(&frame, &inferred, self.annotate));

        match step {
          Ok(verdict) => {
            if let Err(e) = output.render_result(&frame, &verdict) {
              outcome = Err(anyhow::Error::from(e));
              break;
            }
            summary.record(frame_index, &verdict);
          }
          Err(PipelineError::InvalidInput(e)) => {
            warn!("跳过第 {} 帧: {}", frame_index, e);
          }
          Err(e) => {
            outcome = Err(e.into());
            break;
          }
        }

        if interrupted(&stop) {
          warn!("中断信号接收，退出任务循环");
          break;
        }
      }

      // 关闭接收端，阻塞在发送上的工作线程随之退出
      halt.store(true, Ordering::Relaxed);
      drop(rx);

      outcome.map(|_| {
        info!("任务完成，退出");
        summary
      })
    })
  }
}
