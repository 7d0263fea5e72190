//! # 图像缓冲模块
//!
//! ## 设计思路
//!
//! `RasterImage` 是流水线中唯一的图像句柄：强类型、独占所有权、构造即校验非零尺寸。
//! 中间缓冲（灰度、模糊、边缘、得分面）都是各阶段内的局部值，离开作用域即释放，
//! 成功与失败路径一视同仁，不依赖“尽力而为”的手动清理循环。
//!
//! ## 实现思路
//!
//! 1. 猜测格式并读取 header 尺寸
//! 2. 按像素上限快速拒绝
//! 3. 完整解码
//! 4. 统一转换为 3 通道 RGB（透明通道直接丢弃）

use std::io::Cursor;
use std::path::Path;

use image::{DynamicImage, GenericImageView, RgbImage};

use super::{CaptchaError, Stage};

/// 已解码的 RGB 图像及其来源标签。
#[derive(Debug, Clone)]
pub struct RasterImage {
    pixels: RgbImage,
    origin: String,
}

impl RasterImage {
    /// 由已有像素构造，拒绝零尺寸图像。
    pub fn new(pixels: RgbImage, origin: impl Into<String>) -> Result<Self, CaptchaError> {
        let origin = origin.into();
        let (width, height) = pixels.dimensions();
        if width == 0 || height == 0 {
            return Err(CaptchaError::invalid_image(
                Stage::Decode,
                origin,
                format!("图片尺寸为空：{}x{}", width, height),
            ));
        }

        Ok(Self { pixels, origin })
    }

    pub fn from_dynamic(image: DynamicImage, origin: impl Into<String>) -> Result<Self, CaptchaError> {
        Self::new(image.to_rgb8(), origin)
    }

    /// 从内存字节解码。
    ///
    /// 先读 header 尺寸做像素上限检查，再完整解码，避免异常输入造成内存峰值。
    pub fn decode(
        bytes: &[u8],
        origin: impl Into<String>,
        max_pixels: u64,
    ) -> Result<Self, CaptchaError> {
        let origin = origin.into();
        if bytes.is_empty() {
            return Err(CaptchaError::invalid_image(Stage::Decode, origin, "图片内容为空"));
        }

        let (header_width, header_height) = inspect_dimensions(bytes, &origin)?;
        validate_pixel_limits(&origin, header_width, header_height, max_pixels)?;

        let decoded = image::load_from_memory(bytes).map_err(|e| {
            CaptchaError::invalid_image(Stage::Decode, origin.clone(), format!("图片解码失败：{}", e))
        })?;

        let (width, height) = decoded.dimensions();
        validate_pixel_limits(&origin, width, height, max_pixels)?;

        log::debug!("🖼️ 图片解码成功 - 来源: {} 尺寸: {}x{}", origin, width, height);

        Self::from_dynamic(decoded, origin)
    }

    /// 读取本地文件并解码。
    pub fn open(path: impl AsRef<Path>, max_pixels: u64) -> Result<Self, CaptchaError> {
        let path = path.as_ref();
        let origin = path.display().to_string();
        if !path.exists() {
            return Err(CaptchaError::invalid_image(
                Stage::Load,
                origin,
                "文件不存在",
            ));
        }

        let bytes = std::fs::read(path).map_err(|e| {
            CaptchaError::invalid_image(Stage::Load, origin.clone(), format!("无法读取图片文件：{}", e))
        })?;

        Self::decode(&bytes, origin, max_pixels)
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn pixels(&self) -> &RgbImage {
        &self.pixels
    }

    /// 保存到磁盘，格式由扩展名决定。
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), CaptchaError> {
        let path = path.as_ref();
        self.pixels.save(path).map_err(|e| {
            CaptchaError::FileSystem(format!("保存图片失败：{}（{}）", path.display(), e))
        })
    }

    /// 显式结束图像生命周期。
    pub fn release(self) {
        log::trace!(
            "♻️ 释放图像缓冲 - 来源: {} 尺寸: {}x{}",
            self.origin,
            self.pixels.width(),
            self.pixels.height()
        );
    }
}

fn inspect_dimensions(bytes: &[u8], origin: &str) -> Result<(u32, u32), CaptchaError> {
    let reader = image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| {
            CaptchaError::invalid_image(Stage::Decode, origin, format!("无法识别图片格式：{}", e))
        })?;

    reader.into_dimensions().map_err(|e| {
        CaptchaError::invalid_image(Stage::Decode, origin, format!("无法读取图片尺寸：{}", e))
    })
}

fn validate_pixel_limits(
    origin: &str,
    width: u32,
    height: u32,
    max_pixels: u64,
) -> Result<(), CaptchaError> {
    if width == 0 || height == 0 {
        return Err(CaptchaError::invalid_image(
            Stage::Decode,
            origin,
            format!("图片尺寸为空：{}x{}", width, height),
        ));
    }

    let pixels = (width as u64)
        .checked_mul(height as u64)
        .ok_or_else(|| CaptchaError::ResourceLimit("图片像素数溢出".to_string()))?;

    if pixels > max_pixels {
        return Err(CaptchaError::ResourceLimit(format!(
            "图片像素过大：{} 像素（限制：{} 像素，来源：{}）",
            pixels, max_pixels, origin
        )));
    }

    Ok(())
}
