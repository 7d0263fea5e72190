//! 统一错误类型模块
//!
//! # 设计思路
//!
//! 库内各模块使用 `CaptchaError`，命令行入口再包一层 `AppError`，
//! 把结果序列化等入口层错误与识别错误统一起来。
//!
//! # 实现思路
//!
//! - 使用 `thiserror` 派生可读错误消息。
//! - 为 `CaptchaError` / `serde_json::Error` 提供 `From` 转换，无需手动 map。
//! - 实现 `Serialize`，`--json` 模式下错误也以结构化形式输出。

use serde::Serialize;
use serde::ser::SerializeStruct;

use crate::captcha::CaptchaError;

/// 应用级统一错误类型
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// 识别 / 轨迹 / 回放错误
    #[error("{0}")]
    Captcha(#[from] CaptchaError),

    /// 结果输出失败
    #[error("结果输出失败: {0}")]
    Output(String),
}

impl AppError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Captcha(e) => e.code(),
            Self::Output(_) => "E_OUTPUT",
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(error: serde_json::Error) -> Self {
        Self::Output(error.to_string())
    }
}

/// 序列化为 `{ "code": ..., "message": ... }`。
impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("AppError", 2)?;
        state.serialize_field("code", self.code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}
