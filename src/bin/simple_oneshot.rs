// 该文件是 Guanshan （关山飞度） 项目的一部分。
// src/bin/simple_oneshot.rs - 单张图像检测程序
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
use url::Url;

use guanshan::{
  FromUrl,
  input::ImageFileInput,
  model::Yolov9Builder,
  output::SaveImageFileOutput,
  task::{OneShotTask, Task},
};

/// Guanshan 项目参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// ONNX 模型文件路径 (yolov9:/path/to/model.onnx)
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入图像 (image:/path/to/input.jpg)
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出图像 (image:/path/to/output.png)
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,
  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, default_value = "0.5", value_name = "THRESHOLD")]
  pub score_threshold: f32,
  /// 算子内部并行线程数
  #[arg(long, default_value = "1", value_name = "COUNT")]
  pub intra_threads: usize,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型文件路径: {}", args.model);
  info!("输入图像: {}", args.input);
  info!("输出路径: {}", args.output);
  info!("置信度阈值: {}", args.score_threshold);

  let input = ImageFileInput::from_url(&args.input)?;
  let model = Yolov9Builder::from_url(&args.model)?
    .score_threshold(args.score_threshold)
    .intra_threads(args.intra_threads)
    .build()?;
  let output = SaveImageFileOutput::from_url(&args.output)?;

  OneShotTask.run_task(input, model, output)?;

  Ok(())
}
