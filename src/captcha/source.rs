//! # 数据源与中间模型
//!
//! - `ImageSource`：外部输入来源（网络地址 / 本地文件 / Base64 / 内存字节）
//! - `RawImageData`：已加载但未解码的字节，附带来源标签

use std::path::{Path, PathBuf};

/// 图片输入来源。
#[derive(Debug, Clone)]
pub enum ImageSource {
    /// 网络地址（http / https）。
    Url(String),
    /// 本地文件路径。
    File(PathBuf),
    /// Base64（支持 Data URL 与纯 Base64 字符串）。
    Base64(String),
    /// 已在内存中的图片字节，附带来源标签。
    Bytes { bytes: Vec<u8>, label: String },
}

impl ImageSource {
    /// 按输入文本推断来源类型。
    ///
    /// `file://` 地址与已存在的本地路径视为文件，`data:image/` 视为 Base64，其余按 URL 处理。
    pub fn detect(input: &str) -> Self {
        let trimmed = input.trim();

        if let Some(local) = trimmed.strip_prefix("file://") {
            return Self::File(PathBuf::from(local));
        }

        if trimmed.starts_with("data:image/") {
            return Self::Base64(trimmed.to_string());
        }

        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            return Self::Url(trimmed.to_string());
        }

        if Path::new(trimmed).exists() {
            return Self::File(PathBuf::from(trimmed));
        }

        Self::Url(trimmed.to_string())
    }

    /// 日志与输出文件命名使用的来源标签。
    pub fn label(&self) -> String {
        match self {
            Self::Url(url) => url.clone(),
            Self::File(path) => path.display().to_string(),
            Self::Base64(_) => "base64".to_string(),
            Self::Bytes { label, .. } => label.clone(),
        }
    }
}

/// 加载阶段输出：原始字节与来源标签。
#[derive(Debug)]
pub(crate) struct RawImageData {
    pub(crate) bytes: Vec<u8>,
    pub(crate) origin: String,
}
