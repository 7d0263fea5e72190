//! 高斯平滑
//!
//! 边缘检测前先做一次固定核大小的高斯模糊，压掉会产生伪边缘的高频噪声。
//! sigma 非正时按核大小自动推导：核不超过 7 时使用固定的二项式权重表，
//! 否则使用 `0.3 * ((k - 1) * 0.5 - 1) + 0.8`。边界采用 reflect-101 镜像。

use image::{GrayImage, Luma};

/// 生成归一化的一维高斯核。
pub(crate) fn gaussian_kernel(size: usize, sigma: f32) -> Vec<f32> {
    if sigma <= 0.0 {
        match size {
            1 => return vec![1.0],
            3 => return vec![0.25, 0.5, 0.25],
            5 => return vec![0.0625, 0.25, 0.375, 0.25, 0.0625],
            7 => {
                return vec![
                    0.03125, 0.109375, 0.21875, 0.28125, 0.21875, 0.109375, 0.03125,
                ];
            }
            _ => {}
        }
    }

    let sigma = if sigma > 0.0 {
        sigma
    } else {
        0.3 * ((size as f32 - 1.0) * 0.5 - 1.0) + 0.8
    };

    let center = (size / 2) as f32;
    let denom = 2.0 * sigma * sigma;
    let mut weights: Vec<f32> = (0..size)
        .map(|i| {
            let d = i as f32 - center;
            (-(d * d) / denom).exp()
        })
        .collect();

    let sum: f32 = weights.iter().sum();
    for w in &mut weights {
        *w /= sum;
    }
    weights
}

/// reflect-101：`-1 -> 1`，`n -> n - 2`，不重复边界像素本身。
fn reflect_101(index: isize, len: usize) -> usize {
    if len == 1 {
        return 0;
    }
    let last = len as isize - 1;
    let mut i = index;
    while i < 0 || i > last {
        if i < 0 {
            i = -i;
        }
        if i > last {
            i = 2 * last - i;
        }
    }
    i as usize
}

/// 可分离高斯模糊（先横向后纵向），返回新的灰度图。
pub(crate) fn gaussian_blur(image: &GrayImage, kernel_size: usize, sigma: f32) -> GrayImage {
    let (width, height) = image.dimensions();
    let kernel = gaussian_kernel(kernel_size, sigma);
    let radius = (kernel.len() / 2) as isize;
    let (w, h) = (width as usize, height as usize);
    let src = image.as_raw();

    let mut horizontal = vec![0.0_f32; w * h];
    for y in 0..h {
        let row = &src[y * w..(y + 1) * w];
        for x in 0..w {
            let mut acc = 0.0;
            for (k, weight) in kernel.iter().enumerate() {
                let sx = reflect_101(x as isize + k as isize - radius, w);
                acc += weight * row[sx] as f32;
            }
            horizontal[y * w + x] = acc;
        }
    }

    GrayImage::from_fn(width, height, |x, y| {
        let (x, y) = (x as usize, y as usize);
        let mut acc = 0.0;
        for (k, weight) in kernel.iter().enumerate() {
            let sy = reflect_101(y as isize + k as isize - radius, h);
            acc += weight * horizontal[sy * w + x];
        }
        Luma([acc.round().clamp(0.0, 255.0) as u8])
    })
}
