//! # 边缘检测模块
//!
//! ## 设计思路
//!
//! 拼图块内部与周围背景在像素层面非常相似，唯一稳定的区分信号是拼图轮廓。
//! 因此匹配在边缘图上进行，而不是原始像素。
//!
//! ## 实现思路
//!
//! 经典 Canny：
//! 1. 3x3 Sobel 求梯度（`imageproc::gradients`）
//! 2. L1 幅值 `|gx| + |gy|`
//! 3. 按四个方向做非极大值抑制，幅值差在 `nms_tie_tolerance` 以内的相邻像素视为并列，一起保留
//! 4. 双阈值 + 8 邻域滞后连接

use image::{GrayImage, Luma, imageops};
use imageproc::gradients::{horizontal_sobel, vertical_sobel};

use super::filters::gaussian_blur;
use super::{RasterImage, RegistrationConfig};

/// tan(22.5°)
const TAN_22_5: f32 = 0.414_213_57;
/// tan(67.5°)
const TAN_67_5: f32 = 2.414_213_6;

const EDGE: u8 = 255;

/// 二值边缘图（0 / 255）。
#[derive(Debug, Clone)]
pub struct EdgeMap {
    edges: GrayImage,
}

impl EdgeMap {
    pub fn as_gray(&self) -> &GrayImage {
        &self.edges
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.edges.dimensions()
    }

    pub fn edge_pixel_count(&self) -> usize {
        self.edges.pixels().filter(|p| p[0] == EDGE).count()
    }
}

/// 灰度 -> 高斯模糊 -> Canny，每一步的中间缓冲在进入下一步后立即释放。
pub fn edge_map(image: &RasterImage, config: &RegistrationConfig) -> EdgeMap {
    let gray = imageops::grayscale(image.pixels());
    let blurred = gaussian_blur(&gray, config.blur_kernel_size, config.blur_sigma);
    drop(gray);

    let edges = canny(
        &blurred,
        config.canny_low,
        config.canny_high,
        config.nms_tie_tolerance,
    );
    log::trace!(
        "🧭 边缘提取完成 - 来源: {} 边缘像素: {}",
        image.origin(),
        edges.edge_pixel_count()
    );
    edges
}

/// 对（已平滑的）灰度图执行 Canny 边缘检测。
///
/// 像素落在两个像素之间的阶跃边缘，两侧梯度幅值相等，经典抑制只保留其中一个；
/// 轻微噪声就会让保留的一侧来回翻转。`tie_tolerance` 为 0 时退化为经典规则。
pub(crate) fn canny(image: &GrayImage, low: f32, high: f32, tie_tolerance: f32) -> EdgeMap {
    let (width, height) = image.dimensions();
    let (w, h) = (width as usize, height as usize);

    let gx = horizontal_sobel(image);
    let gy = vertical_sobel(image);

    let magnitude: Vec<f32> = gx
        .pixels()
        .zip(gy.pixels())
        .map(|(x, y)| (x[0] as f32).abs() + (y[0] as f32).abs())
        .collect();

    let mag_at = |x: isize, y: isize| -> f32 {
        if x < 0 || y < 0 || x >= w as isize || y >= h as isize {
            0.0
        } else {
            magnitude[y as usize * w + x as usize]
        }
    };

    // 非极大值抑制：0 = 非边缘，1 = 弱边缘候选，2 = 强边缘
    let mut state = vec![0_u8; w * h];
    for y in 0..h {
        for x in 0..w {
            let m = magnitude[y * w + x];
            if m <= low {
                continue;
            }

            let dx = gx.get_pixel(x as u32, y as u32)[0] as f32;
            let dy = gy.get_pixel(x as u32, y as u32)[0] as f32;
            let (ax, ay) = (dx.abs(), dy.abs());
            let (xi, yi) = (x as isize, y as isize);

            let (before, after) = if ay <= ax * TAN_22_5 {
                (mag_at(xi - 1, yi), mag_at(xi + 1, yi))
            } else if ay >= ax * TAN_67_5 {
                (mag_at(xi, yi - 1), mag_at(xi, yi + 1))
            } else if (dx > 0.0) == (dy > 0.0) {
                (mag_at(xi - 1, yi - 1), mag_at(xi + 1, yi + 1))
            } else {
                (mag_at(xi + 1, yi - 1), mag_at(xi - 1, yi + 1))
            };

            let reach = m * (1.0 + tie_tolerance);
            if reach > before && reach >= after {
                state[y * w + x] = if m > high { 2 } else { 1 };
            }
        }
    }

    // 滞后连接：从强边缘出发，沿 8 邻域吸收弱边缘
    let mut edges = GrayImage::new(width, height);
    let mut stack: Vec<(usize, usize)> = Vec::new();
    for y in 0..h {
        for x in 0..w {
            if state[y * w + x] == 2 {
                stack.push((x, y));
            }
        }
    }

    while let Some((x, y)) = stack.pop() {
        if edges.get_pixel(x as u32, y as u32)[0] == EDGE {
            continue;
        }
        edges.put_pixel(x as u32, y as u32, Luma([EDGE]));

        for ny in y.saturating_sub(1)..=(y + 1).min(h - 1) {
            for nx in x.saturating_sub(1)..=(x + 1).min(w - 1) {
                if state[ny * w + nx] != 0 && edges.get_pixel(nx as u32, ny as u32)[0] != EDGE {
                    stack.push((nx, ny));
                }
            }
        }
    }

    EdgeMap { edges }
}
