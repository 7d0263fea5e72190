//! # 配置模块
//!
//! ## 设计思路
//!
//! 将所有“可调策略”集中到配置结构体，保证运行时行为可观测、可调整、可测试。
//! 模糊核、Canny 阈值等常数都是针对目标站点经验调出来的，离线无法验证最优性，
//! 因此只作为默认值存在，不在算法里写死。
//!
//! ## 实现思路
//!
//! - `RegistrationConfig`：纯图像流水线参数（模糊 + 边缘检测）。
//! - `SolverConfig`：编排层参数（浏览器尺寸、加载限制、重试、诊断输出、置信度策略）。
//! - `Default` 提供与线上一致的参数；`validate` 在生效前拒绝非法组合。

use std::path::PathBuf;

use super::CaptchaError;

/// 模板匹配流水线参数。
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationConfig {
    /// 高斯模糊核边长（必须为正奇数）。
    pub blur_kernel_size: usize,
    /// 高斯 sigma；`<= 0` 表示按核大小自动推导。
    pub blur_sigma: f32,
    /// Canny 低阈值。
    pub canny_low: f32,
    /// Canny 高阈值。
    pub canny_high: f32,
    /// 非极大值抑制的并列容差（相对幅值）；0 为经典规则。
    pub nms_tie_tolerance: f32,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            blur_kernel_size: 5,
            blur_sigma: 0.0,
            canny_low: 30.0,
            canny_high: 100.0,
            nms_tie_tolerance: 0.05,
        }
    }
}

impl RegistrationConfig {
    pub fn validate(&self) -> Result<(), CaptchaError> {
        if self.blur_kernel_size == 0 || self.blur_kernel_size % 2 == 0 {
            return Err(CaptchaError::Config(format!(
                "模糊核大小必须为正奇数：{}",
                self.blur_kernel_size
            )));
        }

        if !self.blur_sigma.is_finite() {
            return Err(CaptchaError::Config("模糊 sigma 必须为有限值".to_string()));
        }

        if !(self.canny_low.is_finite() && self.canny_high.is_finite()) || self.canny_low < 0.0 {
            return Err(CaptchaError::Config(format!(
                "Canny 阈值无效：low={}, high={}",
                self.canny_low, self.canny_high
            )));
        }

        if self.canny_low > self.canny_high {
            return Err(CaptchaError::Config(format!(
                "Canny 低阈值不能大于高阈值：low={}, high={}",
                self.canny_low, self.canny_high
            )));
        }

        if !(0.0..1.0).contains(&self.nms_tie_tolerance) {
            return Err(CaptchaError::Config(format!(
                "非极大值抑制容差必须位于 [0, 1)：{}",
                self.nms_tie_tolerance
            )));
        }

        Ok(())
    }
}

/// 固定次数 + 固定间隔的重试策略。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay_ms: 1_000,
        }
    }
}

/// 识别服务配置。
#[derive(Debug, Clone)]
pub struct SolverConfig {
    pub registration: RegistrationConfig,
    /// 验证码控件在浏览器中的显示宽度（CSS 像素）。
    pub browser_width: f64,
    /// 验证码控件在浏览器中的显示高度（CSS 像素）。
    pub browser_height: f64,
    /// 默认裁剪带高度（CSS 像素）。
    pub default_crop_height: f64,
    /// 读取原始字节时允许的最大文件体积（字节）。
    pub max_file_size: u64,
    /// 解码后的像素上限（`width * height`）。
    pub max_decoded_pixels: u64,
    /// 网络下载总超时（秒）。
    pub download_timeout: u64,
    /// 建立连接超时（秒）。
    pub connect_timeout: u64,
    /// 下载首包超时（毫秒）。
    pub stream_first_byte_timeout_ms: u64,
    /// 下载分块读取超时（毫秒）。
    pub stream_chunk_timeout_ms: u64,
    /// 图片加载的重试策略。
    pub retry: RetryPolicy,
    /// 最低可信置信度；`None` 表示总是信任匹配结果。
    pub min_confidence: Option<f32>,
    /// 中间产物（裁剪图、诊断图）输出目录。
    pub work_dir: PathBuf,
    /// 是否输出带标注的诊断图。
    pub save_diagnostics: bool,
    /// 是否保留裁剪后的背景图。
    pub keep_cropped: bool,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            registration: RegistrationConfig::default(),
            browser_width: 340.0,
            browser_height: 212.0,
            default_crop_height: 68.0,
            max_file_size: 10 * 1024 * 1024,
            max_decoded_pixels: 16_000_000,
            download_timeout: 20,
            connect_timeout: 8,
            stream_first_byte_timeout_ms: 10_000,
            stream_chunk_timeout_ms: 10_000,
            retry: RetryPolicy::default(),
            min_confidence: None,
            work_dir: PathBuf::from("tmp"),
            save_diagnostics: false,
            keep_cropped: false,
        }
    }
}

impl SolverConfig {
    pub fn validate(&self) -> Result<(), CaptchaError> {
        self.registration.validate()?;

        for (name, value) in [
            ("browser_width", self.browser_width),
            ("browser_height", self.browser_height),
            ("default_crop_height", self.default_crop_height),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(CaptchaError::Config(format!("{} 必须为正数：{}", name, value)));
            }
        }

        if self.max_file_size == 0 || self.max_decoded_pixels == 0 {
            return Err(CaptchaError::Config("文件体积与像素上限必须大于 0".to_string()));
        }

        if !(1..=300).contains(&self.download_timeout) {
            return Err(CaptchaError::Config(format!(
                "download_timeout 超出范围（1-300 秒）：{}",
                self.download_timeout
            )));
        }

        if !(1..=60).contains(&self.connect_timeout) {
            return Err(CaptchaError::Config(format!(
                "connect_timeout 超出范围（1-60 秒）：{}",
                self.connect_timeout
            )));
        }

        if self.retry.attempts == 0 {
            return Err(CaptchaError::Config("重试次数至少为 1".to_string()));
        }

        if let Some(threshold) = self.min_confidence {
            if !(0.0..=1.0).contains(&threshold) {
                return Err(CaptchaError::Config(format!(
                    "置信度阈值必须位于 [0, 1]：{}",
                    threshold
                )));
            }
        }

        Ok(())
    }
}
