// 该文件是 Guanshan （关山飞度） 项目的一部分。
// src/model/yolov9.rs - YOLOv9 检测器
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
use ort::session::Session;
use ort::session::builder::GraphOptimizationLevel;
use ort::value::TensorRef;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{
  FromUrl,
  frame::{self, BgrNchwTensor},
  model::{DetectItem, DetectResult, Model},
};

const YOLOV9_NUM_INPUTS: usize = 1;
const YOLOV9_SCORE_THRESH: f32 = 0.5;
const YOLOV9_INTRA_THREADS: usize = 1;
const YOLOV9_SCHEME: &str = "yolov9";

// 几何属性数：cx, cy, w, h，其后每类别一个分数
const BOX_ATTRIBUTES: usize = 4;

#[derive(Error, Debug)]
pub enum Yolov9Error {
  #[error("模型加载错误: {0}")]
  ModelLoadError(std::io::Error),
  #[error("模型无效: {0}")]
  ModelInvalid(String),
  #[error("onnxruntime 错误: {0}")]
  OrtError(ort::Error),
  #[error("推理执行失败: {0}")]
  InferenceFailed(ort::Error),
  #[error("模型未加载")]
  NotLoaded,
  #[error("输出张量形状不兼容: {0:?}")]
  IncompatibleShape(Box<[usize]>),
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
}

impl From<std::io::Error> for Yolov9Error {
  fn from(err: std::io::Error) -> Self {
    Yolov9Error::ModelLoadError(err)
  }
}

impl From<ort::Error> for Yolov9Error {
  fn from(err: ort::Error) -> Self {
    Yolov9Error::OrtError(err)
  }
}

/// 模型输出的原始张量，布局由后处理解释。
/// 期望形状为 [1, 4 + 类别数, 候选数]，按候选主序存放：
/// 属性 a、候选 i 位于 data[候选数 * a + i]。
#[derive(Debug, Clone)]
pub struct OutputTensor {
  pub shape: Box<[usize]>,
  pub data: Box<[f32]>,
}

/// YOLOv9 目标检测器。
///
/// 独占持有 onnxruntime 会话及启动时发现的输入输出节点名。
/// 生命周期只有已加载/未加载两个状态：未加载时推理被拒绝；
/// 推理运行时失败后会话被丢弃，需显式重新加载。
pub struct Yolov9 {
  session: Option<Session>,
  input_names: Vec<String>,
  output_names: Vec<String>,
  intra_threads: usize,
  score_threshold: f32,
}

impl Yolov9 {
  /// 创建一个未加载的检测器。
  pub fn unloaded() -> Self {
    Yolov9 {
      session: None,
      input_names: Vec::new(),
      output_names: Vec::new(),
      intra_threads: YOLOV9_INTRA_THREADS,
      score_threshold: YOLOV9_SCORE_THRESH,
    }
  }

  pub fn is_loaded(&self) -> bool {
    self.session.is_some()
  }

  pub fn score_threshold(&self) -> f32 {
    self.score_threshold
  }

  /// 加载 ONNX 模型文件。失败时检测器保持未加载状态。
  ///
  /// 输入输出节点名从会话中动态发现并缓存，不写死具体名称，
  /// 因此任何满足张量布局约定、单输入至少单输出的模型都可用。
  pub fn load(&mut self, model_path: &str) -> Result<(), Yolov9Error> {
    self.session = None;

    let metadata = std::fs::metadata(model_path)?;
    info!("加载模型文件: {}", model_path);
    debug!(
      "模型文件大小: {:.2} MB",
      metadata.len() as f64 / (1024.0 * 1024.0)
    );

    info!("创建 onnxruntime 推理会话");
    let session = Session::builder()?
      .with_optimization_level(GraphOptimizationLevel::Level3)?
      .with_intra_threads(self.intra_threads)?
      .commit_from_file(model_path)?;

    let input_names: Vec<String> = session.inputs.iter().map(|i| i.name.clone()).collect();
    let output_names: Vec<String> = session.outputs.iter().map(|o| o.name.clone()).collect();

    if input_names.len() != YOLOV9_NUM_INPUTS {
      error!(
        "预期模型输入数量为 {}, 实际为 {}",
        YOLOV9_NUM_INPUTS,
        input_names.len()
      );
      return Err(Yolov9Error::ModelInvalid(format!(
        "预期模型输入数量为 {}, 实际为 {}",
        YOLOV9_NUM_INPUTS,
        input_names.len()
      )));
    }

    if output_names.is_empty() {
      error!("模型没有输出节点");
      return Err(Yolov9Error::ModelInvalid("模型没有输出节点".to_string()));
    }

    debug!("模型输入节点: {:?}", input_names);
    debug!("模型输出节点: {:?}", output_names);

    self.input_names = input_names;
    self.output_names = output_names;
    self.session = Some(session);
    info!("模型加载完成");

    Ok(())
  }

  /// 执行一次同步前向推理，输入张量进、输出张量出。
  ///
  /// 不解释张量内容。运行时错误在此边界捕获并转为 [`Yolov9Error::InferenceFailed`]；
  /// 失败后保守处理：丢弃会话，检测器回到未加载状态。
  pub fn run(&mut self, input: &BgrNchwTensor) -> Result<OutputTensor, Yolov9Error> {
    let mut session = self.session.take().ok_or(Yolov9Error::NotLoaded)?;

    let result = Self::run_session(
      &mut session,
      &self.input_names,
      &self.output_names,
      input,
    );

    match result {
      Ok(output) => {
        self.session = Some(session);
        Ok(output)
      }
      Err(err) => {
        warn!("推理失败，检测器进入未加载状态，需重新加载模型");
        Err(err)
      }
    }
  }

  fn run_session(
    session: &mut Session,
    input_names: &[String],
    output_names: &[String],
    input: &BgrNchwTensor,
  ) -> Result<OutputTensor, Yolov9Error> {
    let input_name = input_names
      .first()
      .ok_or_else(|| Yolov9Error::ModelInvalid("缺少输入节点名".to_string()))?;
    let output_name = output_names
      .first()
      .ok_or_else(|| Yolov9Error::ModelInvalid("缺少输出节点名".to_string()))?;

    let array = input.as_array().as_standard_layout();
    let tensor = TensorRef::from_array_view(&array)?;

    debug!("执行模型推理");
    let outputs = session
      .run(ort::inputs![input_name.as_str() => tensor])
      .map_err(Yolov9Error::InferenceFailed)?;

    let value = outputs
      .get(output_name.as_str())
      .ok_or_else(|| Yolov9Error::ModelInvalid(format!("找不到输出节点: {output_name}")))?;
    let (shape, data) = value.try_extract_tensor::<f32>()?;

    let shape: Vec<usize> = shape.iter().map(|&d| d as usize).collect();
    debug!("模型输出形状: {:?}", shape);

    Ok(OutputTensor {
      shape: shape.into_boxed_slice(),
      data: data.to_vec().into_boxed_slice(),
    })
  }

  /// 对一张图像做完整的检测流水线：预处理、推理、解码。
  pub fn detect(&mut self, image: &RgbImage) -> Result<DetectResult, Yolov9Error> {
    if !self.is_loaded() {
      return Err(Yolov9Error::NotLoaded);
    }

    debug!("预处理输入图像: {}x{}", image.width(), image.height());
    let tensor = BgrNchwTensor::from_image(image);

    let output = self.run(&tensor)?;

    let result = decode(&output, image.width(), image.height(), self.score_threshold)?;
    info!("检测到 {} 个目标", result.items.len());
    debug!("检测结果: {:?}", result.items);

    Ok(result)
  }
}

impl Model for Yolov9 {
  type Input = RgbImage;
  type Output = DetectResult;
  type Error = Yolov9Error;

  fn infer(&mut self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    self.detect(input)
  }
}

/// 把模型的原始输出解码为原图像素坐标下的检测框。
///
/// 输出张量布局: [1, 4 + 类别数, 候选数]，属性依次为
/// cx, cy, w, h, class0, class1, ...，坐标位于 640x640 网络空间。
/// x 与 w 按 原图宽/640 缩放，y 与 h 按 原图高/640 缩放，
/// 再由中心点转为左上角基准。
///
/// 每个候选对每个分数严格大于阈值的类别各发出一个检测框，
/// 同一候选可发出多个框；不做非极大值抑制，重叠框按原样保留。
/// 输出顺序固定：候选索引升序，候选内类别索引升序。
///
/// 形状不满足约定（秩不为 3、batch 不为 1、属性数不大于 4、
/// 数据长度与形状不符）说明模型与该流水线不兼容，
/// 返回 [`Yolov9Error::IncompatibleShape`]。
pub fn decode(
  output: &OutputTensor,
  original_width: u32,
  original_height: u32,
  score_threshold: f32,
) -> Result<DetectResult, Yolov9Error> {
  let shape = &output.shape;
  if shape.len() != 3 || shape[0] != 1 || shape[1] <= BOX_ATTRIBUTES {
    error!("输出张量形状不兼容: {:?}", shape);
    return Err(Yolov9Error::IncompatibleShape(shape.clone()));
  }

  let attributes = shape[1];
  let candidates = shape[2];
  if output.data.len() != attributes * candidates {
    error!(
      "输出张量数据长度 {} 与形状 {:?} 不符",
      output.data.len(),
      shape
    );
    return Err(Yolov9Error::IncompatibleShape(shape.clone()));
  }

  let classes = attributes - BOX_ATTRIBUTES;
  debug!("解码输出: {} 个候选, {} 个类别", candidates, classes);

  let scale_x = original_width as f32 / frame::INPUT_WIDTH as f32;
  let scale_y = original_height as f32 / frame::INPUT_HEIGHT as f32;

  // 候选主序: 属性 a、候选 i 位于 data[candidates * a + i]
  let value = |attr: usize, i: usize| output.data[candidates * attr + i];

  let mut items = Vec::new();
  for i in 0..candidates {
    let w = value(2, i) * scale_x;
    let h = value(3, i) * scale_y;
    let x = value(0, i) * scale_x - w / 2.0;
    let y = value(1, i) * scale_y - h / 2.0;

    for j in 0..classes {
      let score = value(BOX_ATTRIBUTES + j, i);
      if score > score_threshold {
        items.push(DetectItem {
          class_id: j as u32,
          score,
          bbox: [x, y, w, h],
        });
      }
    }
  }

  Ok(DetectResult {
    items: items.into_boxed_slice(),
  })
}

pub struct Yolov9Builder {
  model_path: String,
  intra_threads: usize,
  score_threshold: f32,
}

impl FromUrl for Yolov9Builder {
  type Error = Yolov9Error;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != YOLOV9_SCHEME {
      return Err(Yolov9Error::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        YOLOV9_SCHEME
      )));
    }

    Ok(Yolov9Builder::new(url.path()))
  }
}

impl Yolov9Builder {
  pub fn new(model_path: impl Into<String>) -> Self {
    Yolov9Builder {
      model_path: model_path.into(),
      intra_threads: YOLOV9_INTRA_THREADS,
      score_threshold: YOLOV9_SCORE_THRESH,
    }
  }

  /// 算子内部并行线程数提示，加载时一次性生效。
  pub fn intra_threads(mut self, intra_threads: usize) -> Self {
    self.intra_threads = intra_threads;
    self
  }

  pub fn score_threshold(mut self, score_threshold: f32) -> Self {
    self.score_threshold = score_threshold;
    self
  }

  pub fn build(self) -> Result<Yolov9, Yolov9Error> {
    let mut detector = Yolov9 {
      session: None,
      input_names: Vec::new(),
      output_names: Vec::new(),
      intra_threads: self.intra_threads,
      score_threshold: self.score_threshold,
    };
    detector.load(&self.model_path)?;
    Ok(detector)
  }
}
