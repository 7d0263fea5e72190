//! 坐标空间换算模块
//!
//! 验证码控件在页面上按 CSS 像素显示（浏览器空间），而背景图文件有自己的真实分辨率（实际空间）。
//! 该模块负责两者之间的换算：
//!
//! 1. **裁剪带换算** (`ScaleContext::crop_region`)：
//!    把浏览器空间里的 `{top, cropHeight}` 换算为实际像素中的裁剪矩形。
//!
//! 2. **偏移回算** (`ScaleContext::to_browser_offset`)：
//!    把匹配得到的实际像素 x 坐标按裁剪图宽度归一化，再映射回浏览器宽度。
//!
//! # 设计思路
//!
//! - 纯函数化：输入尺寸与坐标，输出唯一结果，便于测试。
//! - 先换算再校验：越界的区域直接拒绝，不做静默收敛。

use serde::Serialize;

use super::{CaptchaError, Stage};

/// 浏览器空间中的裁剪带（CSS 像素）。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BrowserBand {
    pub top: f64,
    pub crop_height: f64,
}

impl BrowserBand {
    pub fn new(top: f64, crop_height: f64) -> Self {
        Self { top, crop_height }
    }

    /// 由控件的 em 单位样式推导裁剪带。
    ///
    /// 滑块容器的 `style.top` 以 em 表示，需要乘以外层容器的 `font-size`（px）。
    pub fn from_em(top_em: f64, font_size_px: f64, crop_height: f64) -> Self {
        Self {
            top: top_em * font_size_px,
            crop_height,
        }
    }
}

/// 浏览器显示尺寸与图片真实尺寸的对应关系。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleContext {
    browser_width: f64,
    browser_height: f64,
    actual_width: u32,
    actual_height: u32,
}

/// 实际像素空间中的裁剪矩形。`left` 恒为 0，宽度为整幅图宽。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CropRegion {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

impl ScaleContext {
    pub fn new(
        browser_width: f64,
        browser_height: f64,
        actual_width: u32,
        actual_height: u32,
    ) -> Result<Self, CaptchaError> {
        if actual_width == 0 || actual_height == 0 {
            return Err(CaptchaError::invalid_image(
                Stage::Scale,
                "background",
                format!("无法获取图片尺寸：{}x{}", actual_width, actual_height),
            ));
        }

        if !(browser_width.is_finite() && browser_height.is_finite())
            || browser_width <= 0.0
            || browser_height <= 0.0
        {
            return Err(CaptchaError::Config(format!(
                "浏览器显示尺寸无效：{}x{}",
                browser_width, browser_height
            )));
        }

        Ok(Self {
            browser_width,
            browser_height,
            actual_width,
            actual_height,
        })
    }

    pub fn scale_x(&self) -> f64 {
        self.actual_width as f64 / self.browser_width
    }

    pub fn scale_y(&self) -> f64 {
        self.actual_height as f64 / self.browser_height
    }

    /// 将浏览器空间裁剪带换算为实际像素裁剪矩形。
    ///
    /// # 实现步骤
    /// 1. `top`、`cropHeight` 分别乘以纵向缩放比并四舍五入
    /// 2. 校验 `0 <= top`、`height > 0`、`top + height <= actualHeight`
    /// 3. 宽度取整幅图宽，`left = 0`
    pub fn crop_region(&self, band: BrowserBand) -> Result<CropRegion, CaptchaError> {
        let scale_y = self.scale_y();
        let top = round_to_i64(band.top * scale_y);
        let height = round_to_i64(band.crop_height * scale_y);

        log::debug!(
            "📐 缩放比例: X={:.2}, Y={:.2}；浏览器坐标 top={}, height={} -> 实际坐标 top={}, height={}",
            self.scale_x(),
            scale_y,
            band.top,
            band.crop_height,
            top,
            height
        );

        let out_of_bounds = CaptchaError::RegionOutOfBounds {
            top,
            height,
            image_width: self.actual_width,
            image_height: self.actual_height,
        };

        if top < 0 || height <= 0 {
            return Err(out_of_bounds);
        }

        match top.checked_add(height) {
            Some(bottom) if bottom <= self.actual_height as i64 => Ok(CropRegion {
                left: 0,
                top: top as u32,
                width: self.actual_width,
                height: height as u32,
            }),
            _ => Err(out_of_bounds),
        }
    }

    /// 将匹配得到的实际像素 x 坐标换算回浏览器中的拖动距离。
    ///
    /// `cropped_width` 为参与匹配的（裁剪后）背景图宽度。
    pub fn to_browser_offset(&self, matched_x: u32, cropped_width: u32) -> i64 {
        if cropped_width == 0 {
            return 0;
        }
        round_to_i64(matched_x as f64 / cropped_width as f64 * self.browser_width)
    }
}

/// 非有限值一律按越界处理（映射为极值，交由调用侧校验拒绝）。
fn round_to_i64(value: f64) -> i64 {
    if value.is_nan() {
        return i64::MIN;
    }
    value.round().clamp(i64::MIN as f64, i64::MAX as f64) as i64
}
