// 该文件是 Guanshan （关山飞度） 项目的一部分。
// src/output/draw.rs - 目标检测结果可视化
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

use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

use crate::model::{DetectItem, DetectResult};

const BORDER_COLOR: [u8; 3] = [0, 255, 255]; // 青色
const BORDER_THICKNESS: i32 = 2;

pub struct Draw {
  border_color: [u8; 3],
  border_thickness: i32,
}

impl Default for Draw {
  fn default() -> Self {
    Self {
      border_color: BORDER_COLOR,
      border_thickness: BORDER_THICKNESS,
    }
  }
}

impl Draw {
  // bbox 为原图像素坐标 [x, y, w, h]，可能为负或超出图像边界，
  // 绘制时由画布裁剪，检测数据本身不改动
  fn draw_bbox(&self, image: &mut RgbImage, bbox: &[f32; 4]) {
    let x = bbox[0].floor() as i32;
    let y = bbox[1].floor() as i32;
    let w = bbox[2].ceil() as i64;
    let h = bbox[3].ceil() as i64;

    for t in 0..self.border_thickness {
      let w = w - 2 * t as i64;
      let h = h - 2 * t as i64;
      if w < 1 || h < 1 {
        break;
      }
      let rect = Rect::at(x + t, y + t).of_size(w as u32, h as u32);
      draw_hollow_rect_mut(image, rect, Rgb(self.border_color));
    }
  }

  /// 在图像上绘制所有检测框。类别名不渲染，只画边框。
  pub fn draw_detections_on_image(&self, image: &mut RgbImage, result: &DetectResult) {
    for DetectItem { bbox, .. } in result.items.iter() {
      self.draw_bbox(image, bbox);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn out_of_bounds_boxes_do_not_panic() {
    let draw = Draw::default();
    let mut image = RgbImage::new(32, 32);
    let result = DetectResult {
      items: vec![
        DetectItem {
          class_id: 0,
          score: 0.9,
          bbox: [-10.0, -10.0, 100.0, 100.0],
        },
        DetectItem {
          class_id: 1,
          score: 0.6,
          bbox: [30.0, 30.0, 0.2, 0.2],
        },
      ]
      .into_boxed_slice(),
    };

    draw.draw_detections_on_image(&mut image, &result);
  }

  #[test]
  fn border_pixels_are_painted() {
    let draw = Draw::default();
    let mut image = RgbImage::new(32, 32);
    let result = DetectResult {
      items: vec![DetectItem {
        class_id: 0,
        score: 0.9,
        bbox: [4.0, 4.0, 16.0, 16.0],
      }]
      .into_boxed_slice(),
    };

    draw.draw_detections_on_image(&mut image, &result);
    assert_eq!(image.get_pixel(4, 4), &Rgb(BORDER_COLOR));
    assert_eq!(image.get_pixel(0, 0), &Rgb([0, 0, 0]));
  }
}
