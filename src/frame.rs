// 该文件是 Guanshan （关山飞度） 项目的一部分。
// src/frame.rs - 模型输入张量与预处理
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

use image::{RgbImage, imageops::FilterType};
use ndarray::Array4;

const BGR_CHANNELS: usize = 3;

pub const INPUT_WIDTH: u32 = 640;
pub const INPUT_HEIGHT: u32 = 640;

/// 模型输入张量，形状固定为 [1, 3, 640, 640]，平面 BGR 布局，
/// 像素值已归一化到 [0, 1]。每次推理前新建，推理后即丢弃。
#[derive(Debug, Clone)]
pub struct BgrNchwTensor {
  data: Array4<f32>,
}

impl BgrNchwTensor {
  /// 把任意尺寸的 RGB 图像转换为模型输入张量。
  ///
  /// 缩放到 640x640 使用最近邻采样，且不保持宽高比。
  /// 这一拉伸是模型训练时的固定约定，后处理按同样的比例
  /// 把坐标还原到原图，二者必须严格一致。
  /// RGB 通道顺序反转写入平面 BGR 布局（图像通道 0 写入张量通道 2），
  /// 同样是训练时约定。
  /// 调用方必须保证图像非空。
  pub fn from_image(image: &RgbImage) -> Self {
    let resized = image::imageops::resize(image, INPUT_WIDTH, INPUT_HEIGHT, FilterType::Nearest);

    let mut data = Array4::<f32>::zeros((
      1,
      BGR_CHANNELS,
      INPUT_HEIGHT as usize,
      INPUT_WIDTH as usize,
    ));
    for (x, y, pixel) in resized.enumerate_pixels() {
      let (x, y) = (x as usize, y as usize);
      data[[0, 2, y, x]] = pixel[0] as f32 / 255.0;
      data[[0, 1, y, x]] = pixel[1] as f32 / 255.0;
      data[[0, 0, y, x]] = pixel[2] as f32 / 255.0;
    }

    Self { data }
  }

  pub fn as_array(&self) -> &Array4<f32> {
    &self.data
  }

  pub fn width(&self) -> usize {
    INPUT_WIDTH as usize
  }

  pub fn height(&self) -> usize {
    INPUT_HEIGHT as usize
  }

  pub fn channels(&self) -> usize {
    BGR_CHANNELS
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Rgb;

  fn solid_image(width: u32, height: u32, color: [u8; 3]) -> RgbImage {
    RgbImage::from_pixel(width, height, Rgb(color))
  }

  #[test]
  fn tensor_shape_is_fixed() {
    // 无论输入尺寸如何，张量形状恒为 [1, 3, 640, 640]
    for (w, h) in [(1, 1), (41, 23), (640, 640), (1920, 1080)] {
      let tensor = BgrNchwTensor::from_image(&solid_image(w, h, [0, 0, 0]));
      assert_eq!(tensor.as_array().shape(), &[1, 3, 640, 640]);
    }
  }

  #[test]
  fn values_are_normalized() {
    let mut image = solid_image(64, 48, [0, 0, 0]);
    image.put_pixel(0, 0, Rgb([255, 128, 7]));
    image.put_pixel(63, 47, Rgb([1, 254, 200]));

    let tensor = BgrNchwTensor::from_image(&image);
    for &v in tensor.as_array().iter() {
      assert!((0.0..=1.0).contains(&v), "数值越界: {v}");
    }
  }

  #[test]
  fn channel_order_is_reversed() {
    // 纯红图像：红色写入通道 2，通道 0（蓝）与通道 1（绿）全为 0
    let tensor = BgrNchwTensor::from_image(&solid_image(16, 16, [255, 0, 0]));
    let array = tensor.as_array();

    for y in 0..INPUT_HEIGHT as usize {
      for x in 0..INPUT_WIDTH as usize {
        assert_eq!(array[[0, 0, y, x]], 0.0);
        assert_eq!(array[[0, 1, y, x]], 0.0);
        assert_eq!(array[[0, 2, y, x]], 1.0);
      }
    }
  }

  #[test]
  fn values_come_from_division_by_255() {
    let tensor = BgrNchwTensor::from_image(&solid_image(8, 8, [51, 102, 204]));
    let array = tensor.as_array();
    assert_eq!(array[[0, 2, 0, 0]], 51.0 / 255.0);
    assert_eq!(array[[0, 1, 0, 0]], 102.0 / 255.0);
    assert_eq!(array[[0, 0, 0, 0]], 204.0 / 255.0);
  }
}
