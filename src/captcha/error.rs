//! # 错误模型模块
//!
//! ## 设计思路
//!
//! 使用单一错误枚举承载识别链路中的所有错误来源，避免字符串拼接式错误处理。
//! 通过 `thiserror` 保持人类可读错误，同时让调用侧可按分支匹配。
//!
//! 每个错误都带上“失败阶段 + 出错对象（路径/尺寸）”，调用方无需补日志重跑即可定位问题。
//! 是否重试由调用方决定：`is_retryable` 只给出建议，核心流程本身从不重试。

use std::fmt;

/// 识别流水线中的阶段名，用于错误上下文与日志。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Load,
    Decode,
    Scale,
    Crop,
    Match,
    Replay,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Load => "load",
            Self::Decode => "decode",
            Self::Scale => "scale",
            Self::Crop => "crop",
            Self::Match => "match",
            Self::Replay => "replay",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 验证码识别统一错误类型。
#[derive(Debug, thiserror::Error)]
pub enum CaptchaError {
    #[error("图片无效（阶段：{stage}，来源：{origin}）：{reason}")]
    InvalidImage {
        stage: Stage,
        origin: String,
        reason: String,
    },

    #[error(
        "裁剪区域超出图片范围：top={top}, height={height}, 图片尺寸={image_width}x{image_height}"
    )]
    RegionOutOfBounds {
        top: i64,
        height: i64,
        image_width: u32,
        image_height: u32,
    },

    #[error("模板匹配失败（阶段：{stage}）：{reason}")]
    MatchFailure { stage: Stage, reason: String },

    #[error("匹配置信度过低：{confidence:.4}（阈值：{threshold:.4}）")]
    LowConfidence { confidence: f32, threshold: f32 },

    #[error("配置错误：{0}")]
    Config(String),

    #[error("网络错误：{0}")]
    Network(String),

    #[error("文件错误：{0}")]
    FileSystem(String),

    #[error("超时错误：{0}")]
    Timeout(String),

    #[error("资源限制：{0}")]
    ResourceLimit(String),

    #[error("拖动回放失败：{0}")]
    Replay(String),
}

impl CaptchaError {
    pub(crate) fn invalid_image(
        stage: Stage,
        origin: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidImage {
            stage,
            origin: origin.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn match_failure(stage: Stage, reason: impl Into<String>) -> Self {
        Self::MatchFailure {
            stage,
            reason: reason.into(),
        }
    }

    /// 错误发生的阶段。
    pub fn stage(&self) -> Stage {
        match self {
            Self::InvalidImage { stage, .. } | Self::MatchFailure { stage, .. } => *stage,
            Self::RegionOutOfBounds { .. } => Stage::Crop,
            Self::LowConfidence { .. } => Stage::Match,
            Self::Config(_) => Stage::Scale,
            Self::Network(_) | Self::FileSystem(_) | Self::Timeout(_) | Self::ResourceLimit(_) => {
                Stage::Load
            }
            Self::Replay(_) => Stage::Replay,
        }
    }

    /// 稳定错误码，便于日志检索与调用方分支。
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidImage { .. } => "E_INVALID_IMAGE",
            Self::RegionOutOfBounds { .. } => "E_REGION_OUT_OF_BOUNDS",
            Self::MatchFailure { .. } => "E_MATCH_FAILURE",
            Self::LowConfidence { .. } => "E_LOW_CONFIDENCE",
            Self::Config(_) => "E_CONFIG",
            Self::Network(_) => "E_NETWORK",
            Self::FileSystem(_) => "E_FILE_SYSTEM",
            Self::Timeout(_) => "E_TIMEOUT",
            Self::ResourceLimit(_) => "E_RESOURCE_LIMIT",
            Self::Replay(_) => "E_REPLAY",
        }
    }

    /// 是否属于瞬时错误（网络抖动、下载不完整导致的解码失败等）。
    ///
    /// 裁剪区域越界、配置错误、匹配失败属于结构性错误，重试没有意义。
    /// 加载/解码失败只对网络来源有重试价值，编排层据此只对 URL 应用重试策略。
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) => true,
            Self::InvalidImage { stage, .. } => matches!(stage, Stage::Load | Stage::Decode),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_error_is_terminal_and_reports_crop_stage() {
        let err = CaptchaError::RegionOutOfBounds {
            top: 300,
            height: 100,
            image_width: 552,
            image_height: 344,
        };

        assert_eq!(err.stage(), Stage::Crop);
        assert_eq!(err.code(), "E_REGION_OUT_OF_BOUNDS");
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("552x344"));
    }

    #[test]
    fn decode_failures_are_retryable() {
        let err = CaptchaError::invalid_image(Stage::Decode, "bg.jpg", "truncated");
        assert!(err.is_retryable());
        assert!(err.to_string().contains("bg.jpg"));
        assert!(err.to_string().contains("decode"));

        let err = CaptchaError::match_failure(Stage::Match, "template larger than background");
        assert!(!err.is_retryable());
    }

    #[test]
    fn stage_names_are_the_reported_pipeline_steps() {
        let names: Vec<String> = [
            Stage::Load,
            Stage::Decode,
            Stage::Scale,
            Stage::Crop,
            Stage::Match,
            Stage::Replay,
        ]
        .iter()
        .map(|stage| stage.to_string())
        .collect();

        assert_eq!(names, ["load", "decode", "scale", "crop", "match", "replay"]);
    }
}
