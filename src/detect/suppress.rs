// 该文件是 Qianlu （前路） 项目的一部分。
// src/detect/suppress.rs - 非极大值抑制
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

use std::cmp::Ordering;

use tracing::debug;

use crate::detect::Candidate;

/// 与类别无关的非极大值抑制，返回保留候选在输入中的下标。
///
/// 先过滤置信度不超过 `conf_threshold` 的候选，再按置信度稳定降序排序，
/// 与已保留框的 IoU 超过 `iou_threshold` 的候选被丢弃。
pub fn suppress(candidates: &[Candidate], conf_threshold: f32, iou_threshold: f32) -> Vec<usize> {
  let mut order: Vec<usize> = (0..candidates.len())
    .filter(|&i| candidates[i].confidence > conf_threshold)
    .collect();

  // sort_by 是稳定排序，置信度相同时保持输入顺序
  order.sort_by(|&a, &b| {
    candidates[b]
      .confidence
      .partial_cmp(&candidates[a].confidence)
      .unwrap_or(Ordering::Equal)
  });

  let mut kept: Vec<usize> = Vec::with_capacity(order.len());
  for index in order {
    let bbox = &candidates[index].bbox;
    let overlaps = kept
      .iter()
      .any(|&k| candidates[k].bbox.iou(bbox) > iou_threshold);
    if !overlaps {
      kept.push(index);
    }
  }

  debug!("NMS 保留 {} / {} 个候选框", kept.len(), candidates.len());
  kept
}
