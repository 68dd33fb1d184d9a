// 该文件是 Guanshan （关山飞度） 项目的一部分。
// src/task.rs - 任务定义
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

use tracing::info;

use crate::{model::Model, output::Render};

pub trait Task<I, M, O>: Sized {
  type Error;
  fn run_task(self, input: I, model: M, output: O) -> Result<(), Self::Error>;
}

/// 单张图像的一次性检测任务：取一帧，推理一次，渲染一次。
/// 整个流程同步阻塞，不重试。
pub struct OneShotTask;

impl<
  F,
  D,
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = F>,
  M: Model<Input = F, Output = D, Error = ME>,
  O: Render<F, D, Error = RE>,
> Task<I, M, O> for OneShotTask
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, mut model: M, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;
    info!("输入帧获取成功，开始推理...");
    let now = std::time::Instant::now();
    let result = model.infer(&frame)?;
    let elapsed = now.elapsed();
    info!("推理完成，耗时: {:.2?}", elapsed);
    output.render_result(&frame, &result)?;
    info!("渲染完成，耗时: {:.2?}", now.elapsed());

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::cell::Cell;
  use thiserror::Error;

  #[derive(Error, Debug)]
  #[error("测试错误")]
  struct NeverError;

  struct DoubleModel;

  impl Model for DoubleModel {
    type Input = u32;
    type Output = u32;
    type Error = NeverError;

    fn infer(&mut self, input: &u32) -> Result<u32, NeverError> {
      Ok(input * 2)
    }
  }

  struct RecordingOutput {
    rendered: Cell<Option<(u32, u32)>>,
  }

  impl Render<u32, u32> for &RecordingOutput {
    type Error = NeverError;

    fn render_result(&self, frame: &u32, result: &u32) -> Result<(), NeverError> {
      self.rendered.set(Some((*frame, *result)));
      Ok(())
    }
  }

  #[test]
  fn one_shot_runs_the_pipeline_once() {
    let output = RecordingOutput {
      rendered: Cell::new(None),
    };
    OneShotTask
      .run_task([21u32].into_iter(), DoubleModel, &output)
      .unwrap();
    assert_eq!(output.rendered.get(), Some((21, 42)));
  }

  #[test]
  fn one_shot_fails_without_input() {
    let output = RecordingOutput {
      rendered: Cell::new(None),
    };
    let result = OneShotTask.run_task(std::iter::empty::<u32>(), DoubleModel, &output);
    assert!(result.is_err());
    assert_eq!(output.rendered.get(), None);
  }
}
