//! # 加载与校验模块
//!
//! ## 设计思路
//!
//! 统一处理不同来源（URL / Base64 / 本地文件 / 内存字节）的原始字节加载，并尽早校验输入。
//! 验证码图片很小，异常输入（错误页面、超大文件、截断数据）应在解码前就被拒绝。
//!
//! ## 实现思路
//!
//! - URL：协议校验 + 内容类型 + Content-Length + 流式下载（首包 / 分块超时）+ 签名探测。
//! - Base64：Data URL 解析 + 解码前体积估算 + 签名校验。
//! - 文件：存在性 + metadata 体积限制 + 读取 + 签名校验。
//! - 网络错误统一映射到 `CaptchaError`，重试交给编排层的 `RetryPolicy`。

use std::path::Path;
use std::time::Duration;

use base64::{Engine as _, engine::general_purpose};

use super::source::RawImageData;
use super::{CaptchaError, ImageSource, SliderSolver, SolverConfig, Stage};

const STREAM_SIGNATURE_SNIFF_BYTES: usize = 4096;
const BUFFER_INITIAL_CAPACITY: usize = 16 * 1024;
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

impl SliderSolver {
    /// 按来源加载原始字节。
    pub(super) async fn load_raw(
        &self,
        source: &ImageSource,
        config: &SolverConfig,
    ) -> Result<RawImageData, CaptchaError> {
        match source {
            ImageSource::Url(url) => Self::load_from_url(url, config).await,
            ImageSource::File(path) => Self::load_from_file(path, config),
            ImageSource::Base64(data) => Self::load_from_base64(data, config),
            ImageSource::Bytes { bytes, label } => {
                if bytes.len() as u64 > config.max_file_size {
                    return Err(Self::too_large("图片", bytes.len() as u64, config.max_file_size));
                }
                Self::validate_image_signature(bytes, label)?;
                Ok(RawImageData {
                    bytes: bytes.clone(),
                    origin: label.clone(),
                })
            }
        }
    }

    async fn load_from_url(url: &str, config: &SolverConfig) -> Result<RawImageData, CaptchaError> {
        log::info!("🌐 开始下载图片 - URL: {}", Self::redact_url_for_log(url));

        let bytes = Self::download_with_validation(url, config).await?;

        Ok(RawImageData {
            bytes,
            origin: url.to_string(),
        })
    }

    fn load_from_base64(data: &str, config: &SolverConfig) -> Result<RawImageData, CaptchaError> {
        log::info!("📝 开始处理 base64 图片");

        let bytes = Self::parse_base64_with_limit(data, config.max_file_size)?;
        if bytes.len() as u64 > config.max_file_size {
            return Err(Self::too_large("Base64 解码后", bytes.len() as u64, config.max_file_size));
        }
        Self::validate_image_signature(&bytes, "base64")?;

        Ok(RawImageData {
            bytes,
            origin: "base64".to_string(),
        })
    }

    fn load_from_file(path: &Path, config: &SolverConfig) -> Result<RawImageData, CaptchaError> {
        let origin = path.display().to_string();
        log::info!("📁 开始读取本地图片 - 路径: {}", origin);

        if !path.exists() {
            return Err(CaptchaError::invalid_image(Stage::Load, origin, "文件不存在"));
        }

        let metadata = std::fs::metadata(path).map_err(|e| {
            CaptchaError::invalid_image(Stage::Load, origin.clone(), format!("无法读取文件信息：{}", e))
        })?;
        if metadata.len() > config.max_file_size {
            return Err(CaptchaError::invalid_image(
                Stage::Load,
                origin,
                Self::too_large("文件", metadata.len(), config.max_file_size).to_string(),
            ));
        }

        let bytes = std::fs::read(path).map_err(|e| {
            CaptchaError::invalid_image(Stage::Load, origin.clone(), format!("无法读取图片文件：{}", e))
        })?;
        Self::validate_image_signature(&bytes, &origin)?;

        Ok(RawImageData { bytes, origin })
    }

    /// 流式下载，逐块校验体积并尽早探测文件签名。
    pub(super) async fn download_with_validation(
        url: &str,
        config: &SolverConfig,
    ) -> Result<Vec<u8>, CaptchaError> {
        let parsed = reqwest::Url::parse(url).map_err(|e| {
            CaptchaError::invalid_image(Stage::Load, Self::redact_url_for_log(url), format!("URL 格式错误：{}", e))
        })?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(CaptchaError::invalid_image(
                Stage::Load,
                Self::redact_url_for_log(url),
                "仅支持 HTTP/HTTPS",
            ));
        }

        let client = Self::build_http_client(config)?;
        log::debug!("📡 发送 HTTP 请求...");
        let response = client
            .get(parsed.clone())
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .header(
                reqwest::header::ACCEPT,
                "image/avif,image/webp,image/apng,image/*,*/*;q=0.8",
            )
            .send()
            .await
            .map_err(|e| Self::map_reqwest_error(e, url, config))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CaptchaError::Network(format!(
                "HTTP {}: {}（{}）",
                status.as_u16(),
                Self::status_message(status.as_u16()),
                Self::redact_url_for_log(url)
            )));
        }

        if let Some(ct) = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|ct| ct.to_str().ok())
        {
            if !Self::is_image_content_type(ct) {
                return Err(CaptchaError::invalid_image(
                    Stage::Load,
                    Self::redact_url_for_log(url),
                    format!("不是图片类型：{}", ct),
                ));
            }
        }

        let total_len = response
            .headers()
            .get(reqwest::header::CONTENT_LENGTH)
            .and_then(|cl| cl.to_str().ok())
            .and_then(|cl| cl.parse::<u64>().ok());
        if let Some(size) = total_len {
            if size > config.max_file_size {
                return Err(Self::too_large("文件", size, config.max_file_size));
            }
        }

        let initial_capacity = total_len
            .map(|len| len.min(config.max_file_size) as usize)
            .filter(|len| *len > 0)
            .unwrap_or(BUFFER_INITIAL_CAPACITY);
        let mut buffer = Vec::with_capacity(initial_capacity);
        let mut response = response;
        let mut signature_validated = false;
        let mut received_first_chunk = false;

        loop {
            let read_timeout = if received_first_chunk {
                Duration::from_millis(config.stream_chunk_timeout_ms)
            } else {
                Duration::from_millis(config.stream_first_byte_timeout_ms)
            };

            let next_chunk = tokio::time::timeout(read_timeout, response.chunk())
                .await
                .map_err(|_| {
                    if received_first_chunk {
                        CaptchaError::Timeout("下载数据流读取超时".to_string())
                    } else {
                        CaptchaError::Timeout("下载首包超时".to_string())
                    }
                })?;

            let Some(chunk) = next_chunk
                .map_err(|e| CaptchaError::Network(format!("下载失败：{}", e)))?
            else {
                break;
            };
            received_first_chunk = true;

            if (buffer.len() + chunk.len()) as u64 > config.max_file_size {
                return Err(CaptchaError::ResourceLimit("下载后文件超过大小限制".to_string()));
            }
            buffer.extend_from_slice(&chunk);

            if !signature_validated {
                signature_validated =
                    Self::validate_stream_signature_prefix(&buffer, STREAM_SIGNATURE_SNIFF_BYTES, url)?;
            }
        }

        if !signature_validated {
            Self::validate_image_signature(&buffer, &Self::redact_url_for_log(url))?;
        }

        log::debug!("✅ 下载完成 - {} bytes", buffer.len());
        Ok(buffer)
    }

    fn build_http_client(config: &SolverConfig) -> Result<reqwest::Client, CaptchaError> {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(config.download_timeout))
            .connect_timeout(Duration::from_secs(config.connect_timeout))
            .build()
            .map_err(|e| CaptchaError::Network(format!("无法创建 HTTP 客户端：{}", e)))
    }

    fn too_large(what: &str, size: u64, limit: u64) -> CaptchaError {
        CaptchaError::ResourceLimit(format!(
            "{}过大：{:.2} MB（限制：{:.2} MB）",
            what,
            size as f64 / 1024.0 / 1024.0,
            limit as f64 / 1024.0 / 1024.0
        ))
    }

    fn is_image_content_type(content_type: &str) -> bool {
        content_type
            .split(';')
            .next()
            .map(|base| base.trim().to_ascii_lowercase().starts_with("image/"))
            .unwrap_or(false)
    }

    /// 去掉 query 与 fragment，避免签名参数进入日志。
    pub(crate) fn redact_url_for_log(url: &str) -> String {
        let Ok(parsed) = reqwest::Url::parse(url) else {
            return "<invalid-url>".to_string();
        };

        let host = parsed.host_str().unwrap_or("<unknown-host>");
        let port = parsed.port().map(|p| format!(":{}", p)).unwrap_or_default();
        format!("{}://{}{}{}", parsed.scheme(), host, port, parsed.path())
    }

    fn estimate_base64_decoded_upper_bound_len(base64_data: &str) -> Result<u64, CaptchaError> {
        let len = base64_data.trim().len() as u64;
        let groups = len
            .checked_add(3)
            .ok_or_else(|| CaptchaError::ResourceLimit("Base64 输入长度溢出".to_string()))?
            / 4;

        groups
            .checked_mul(3)
            .ok_or_else(|| CaptchaError::ResourceLimit("Base64 解码体积估算溢出".to_string()))
    }

    /// 解析 Base64 输入（支持 Data URL / 纯 Base64），解码前先按估算体积拒绝超大输入。
    fn parse_base64_with_limit(data: &str, max_file_size: u64) -> Result<Vec<u8>, CaptchaError> {
        let normalized = data.trim();
        let payload = if normalized.starts_with("data:") {
            let start = normalized.find(";base64,").ok_or_else(|| {
                CaptchaError::invalid_image(Stage::Load, "base64", "Data URL 缺少 base64 标记")
            })?;
            &normalized[start + ";base64,".len()..]
        } else {
            normalized
        };

        let estimated_len = Self::estimate_base64_decoded_upper_bound_len(payload)?;
        if estimated_len > max_file_size {
            return Err(Self::too_large("Base64 预计解码体积", estimated_len, max_file_size));
        }

        general_purpose::STANDARD.decode(payload).map_err(|e| {
            CaptchaError::invalid_image(Stage::Decode, "base64", format!("Base64 解码失败：{}", e))
        })
    }

    fn map_reqwest_error(e: reqwest::Error, url: &str, config: &SolverConfig) -> CaptchaError {
        let err_msg = e.to_string().replace(url, &Self::redact_url_for_log(url));

        if e.is_timeout() {
            CaptchaError::Timeout(format!("下载超时（{}秒）", config.download_timeout))
        } else if e.is_connect() {
            CaptchaError::Network(format!("无法连接：{}", err_msg))
        } else {
            CaptchaError::Network(format!("请求失败：{}", err_msg))
        }
    }

    fn status_message(code: u16) -> &'static str {
        match code {
            404 => "未找到",
            403 => "访问被拒绝",
            429 => "请求过于频繁",
            500..=599 => "服务器错误",
            _ => "请求失败",
        }
    }

    /// 通过文件签名（magic bytes）校验输入是否为图片。
    fn validate_image_signature(bytes: &[u8], origin: &str) -> Result<(), CaptchaError> {
        if bytes.is_empty() {
            return Err(CaptchaError::invalid_image(Stage::Load, origin, "图片内容为空"));
        }

        let kind = infer::get(bytes)
            .ok_or_else(|| CaptchaError::invalid_image(Stage::Load, origin, "无法识别图片类型"))?;

        if kind.matcher_type() != infer::MatcherType::Image {
            return Err(CaptchaError::invalid_image(
                Stage::Load,
                origin,
                format!("文件签名不是图片类型：{}", kind.mime_type()),
            ));
        }

        Ok(())
    }

    /// 流式下载阶段的签名探测。
    ///
    /// - `Ok(true)`：已识别为图片
    /// - `Ok(false)`：字节不足以判断，继续下载
    /// - `Err(...)`：已识别为非图片，或达到探测上限仍无法识别
    fn validate_stream_signature_prefix(
        bytes: &[u8],
        sniff_limit: usize,
        url: &str,
    ) -> Result<bool, CaptchaError> {
        if bytes.is_empty() {
            return Ok(false);
        }

        if let Some(kind) = infer::get(bytes) {
            if kind.matcher_type() != infer::MatcherType::Image {
                return Err(CaptchaError::invalid_image(
                    Stage::Load,
                    Self::redact_url_for_log(url),
                    format!("下载内容不是图片类型：{}", kind.mime_type()),
                ));
            }
            return Ok(true);
        }

        if bytes.len() >= sniff_limit {
            return Err(CaptchaError::invalid_image(
                Stage::Load,
                Self::redact_url_for_log(url),
                format!("下载前 {} 字节内无法识别图片类型", sniff_limit),
            ));
        }

        Ok(false)
    }
}
