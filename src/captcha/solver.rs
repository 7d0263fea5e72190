//! # 核心编排模块
//!
//! ## 设计思路
//!
//! `SliderSolver` 只负责流程编排与配置管理，图像算法本身都是无状态的同步函数。
//! 处理链路固定为：
//! 1. 读取配置快照
//! 2. 按来源加载原始字节并解码（带固定间隔重试）
//! 3. 在阻塞线程池中完成 缩放换算 -> 裁剪 -> 模板匹配 -> 偏移回算
//! 4. 按置信度策略决定是否信任结果
//!
//! ## 实现思路
//!
//! - 配置通过 `Arc<RwLock<SolverConfig>>` 支持运行时调整，单次请求内使用同一快照。
//! - CPU 密集的图像计算放进 `tokio::task::spawn_blocking`，不阻塞异步运行时。
//! - 记录 `load/crop/match/total` 阶段耗时，便于性能诊断。

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use serde::Serialize;

use super::diagnostics::{cropped_name, match_result_name, resolve_output_path};
use super::{
    BrowserBand, CaptchaError, CropRegion, ImageSource, MatchResult, RasterImage, RetryPolicy,
    ScaleContext, SolverConfig, Stage, crop_to_region, match_template,
};
use crate::trajectory::{PointerDriver, ReplayConfig, TrajectoryConfig, replay_track, synthesize_trajectory_with};

/// 一次完整识别的输出。
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SliderOffset {
    /// 浏览器空间中的拖动距离（CSS 像素）。
    pub browser_offset_x: i64,
    /// 实际参与匹配的裁剪区域（背景图像素）。
    pub crop_region: CropRegion,
    /// 在裁剪图上的匹配结果。
    pub match_result: MatchResult,
}

/// 裁剪命令的输出。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CroppedBackground {
    pub region: CropRegion,
    pub path: PathBuf,
}

/// 滑块验证码识别器。
pub struct SliderSolver {
    config: Arc<RwLock<SolverConfig>>,
}

impl SliderSolver {
    /// 根据初始配置创建识别器，配置非法时直接拒绝。
    ///
    /// # 示例
    /// ```rust,ignore
    /// use captcha_slider::captcha::{SliderSolver, SolverConfig};
    ///
    /// let solver = SliderSolver::new(SolverConfig::default())?;
    /// # Ok::<(), captcha_slider::captcha::CaptchaError>(())
    /// ```
    pub fn new(config: SolverConfig) -> Result<Self, CaptchaError> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(RwLock::new(config)),
        })
    }

    /// 获取配置快照，保证单次请求链路使用一致参数。
    pub fn config_snapshot(&self) -> Result<SolverConfig, CaptchaError> {
        self.config
            .read()
            .map(|cfg| cfg.clone())
            .map_err(|_| CaptchaError::ResourceLimit("配置读取锁已中毒".to_string()))
    }

    /// 整体替换配置，校验通过后才生效。
    pub fn update_config(&self, config: SolverConfig) -> Result<(), CaptchaError> {
        config.validate()?;

        let mut current = self
            .config
            .write()
            .map_err(|_| CaptchaError::ResourceLimit("配置写入锁已中毒".to_string()))?;
        *current = config;

        log::info!(
            "⚙️ 已更新识别配置（browser={}x{}, retry={}x{}ms, min_confidence={:?}）",
            current.browser_width,
            current.browser_height,
            current.retry.attempts,
            current.retry.delay_ms,
            current.min_confidence
        );
        Ok(())
    }

    /// 设置最低可信置信度；`None` 表示总是信任匹配结果。
    pub fn set_confidence_threshold(&self, threshold: Option<f32>) -> Result<(), CaptchaError> {
        let mut config = self.config_snapshot()?;
        config.min_confidence = threshold;
        self.update_config(config)
    }

    /// 加载并解码一张图片，瞬时错误按 `RetryPolicy` 重试。
    pub async fn load_image(&self, source: &ImageSource) -> Result<RasterImage, CaptchaError> {
        let config = self.config_snapshot()?;
        self.load_image_with(source, &config).await
    }

    async fn load_image_with(
        &self,
        source: &ImageSource,
        config: &SolverConfig,
    ) -> Result<RasterImage, CaptchaError> {
        let label = source.label();
        let origin = label.as_str();
        retry_fixed(retry_policy_for(source, config), origin, || async move {
            let raw = self.load_raw(source, config).await?;
            let max_pixels = config.max_decoded_pixels;
            tokio::task::spawn_blocking(move || RasterImage::decode(&raw.bytes, raw.origin, max_pixels))
                .await
                .map_err(|e| {
                    CaptchaError::invalid_image(Stage::Decode, origin, format!("解码任务异常：{}", e))
                })?
        })
        .await
    }

    /// 裁剪背景图中的拼图条带并保存。
    ///
    /// `output` 为空时按 `{来源名}_cropped_{top}_{height}_{时间戳}` 命名，落在工作目录。
    pub async fn crop_background(
        &self,
        background: &ImageSource,
        band: BrowserBand,
        output: Option<PathBuf>,
    ) -> Result<CroppedBackground, CaptchaError> {
        let config = self.config_snapshot()?;
        let image = self.load_image_with(background, &config).await?;

        run_blocking(move || {
            let scale = ScaleContext::new(
                config.browser_width,
                config.browser_height,
                image.width(),
                image.height(),
            )?;
            let region = scale.crop_region(band)?;
            let cropped = crop_to_region(&image, region)?;

            let path = resolve_output_path(
                &config.work_dir,
                output.as_deref(),
                &cropped_name(image.origin(), region.top, region.height),
            )?;
            image.release();
            cropped.save(&path)?;
            cropped.release();

            log::info!("✂️ 裁剪图已保存: {}", path.display());
            Ok(CroppedBackground { region, path })
        })
        .await
    }

    /// 直接在两张图之间做模板匹配（不裁剪）。
    pub async fn match_sources(
        &self,
        background: &ImageSource,
        puzzle: &ImageSource,
        diagnostic_output: Option<PathBuf>,
    ) -> Result<MatchResult, CaptchaError> {
        let config = self.config_snapshot()?;
        let (background, puzzle) = tokio::try_join!(
            self.load_image_with(background, &config),
            self.load_image_with(puzzle, &config)
        )?;

        let result = run_blocking(move || {
            let diagnostic_path = diagnostic_target(&config, &background, diagnostic_output.as_deref());
            match_template(&background, &puzzle, &config.registration, diagnostic_path.as_deref())
        })
        .await?;

        Ok(result)
    }

    /// 仅返回距离比例（匹配 x / 背景宽度）。
    pub async fn slide_distance(
        &self,
        background: &ImageSource,
        puzzle: &ImageSource,
    ) -> Result<f64, CaptchaError> {
        Ok(self.match_sources(background, puzzle, None).await?.distance_ratio)
    }

    /// 完整识别：加载 -> 裁剪 -> 匹配 -> 浏览器偏移。
    ///
    /// # 示例
    /// ```rust,ignore
    /// use captcha_slider::captcha::{BrowserBand, ImageSource, SliderSolver, SolverConfig};
    ///
    /// # async fn demo() -> Result<(), captcha_slider::captcha::CaptchaError> {
    /// let solver = SliderSolver::new(SolverConfig::default())?;
    /// let offset = solver
    ///     .locate_offset(
    ///         &ImageSource::detect("https://example.com/bg.jpg"),
    ///         &ImageSource::detect("https://example.com/slide.png"),
    ///         BrowserBand::new(50.0, 68.0),
    ///     )
    ///     .await?;
    /// println!("drag {}px", offset.browser_offset_x);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn locate_offset(
        &self,
        background: &ImageSource,
        puzzle: &ImageSource,
        band: BrowserBand,
    ) -> Result<SliderOffset, CaptchaError> {
        let config = self.config_snapshot()?;
        let total_start = Instant::now();
        let min_confidence = config.min_confidence;

        let load_start = Instant::now();
        let (background, puzzle) = tokio::try_join!(
            self.load_image_with(background, &config),
            self.load_image_with(puzzle, &config)
        )?;
        let load_elapsed = load_start.elapsed();

        let (offset, crop_elapsed, match_elapsed) = run_blocking(move || {
            let crop_start = Instant::now();
            let scale = ScaleContext::new(
                config.browser_width,
                config.browser_height,
                background.width(),
                background.height(),
            )?;
            let region = scale.crop_region(band)?;
            let cropped = crop_to_region(&background, region)?;
            background.release();

            if config.keep_cropped {
                keep_cropped_copy(&config, &cropped, region);
            }
            let crop_elapsed = crop_start.elapsed();

            let match_start = Instant::now();
            let diagnostic_path = diagnostic_target(&config, &cropped, None);
            let match_result = match_template(
                &cropped,
                &puzzle,
                &config.registration,
                diagnostic_path.as_deref(),
            )?;
            let browser_offset_x = scale.to_browser_offset(match_result.x(), cropped.width());
            let match_elapsed = match_start.elapsed();

            Ok((
                SliderOffset {
                    browser_offset_x,
                    crop_region: region,
                    match_result,
                },
                crop_elapsed,
                match_elapsed,
            ))
        })
        .await?;

        log::info!(
            "✅ 滑块识别完成 - offset={}px confidence={:.4} load={}ms crop={}ms match={}ms total={}ms",
            offset.browser_offset_x,
            offset.match_result.confidence,
            load_elapsed.as_millis(),
            crop_elapsed.as_millis(),
            match_elapsed.as_millis(),
            total_start.elapsed().as_millis()
        );

        if let Some(threshold) = min_confidence {
            if !offset.match_result.is_trusted(threshold) {
                log::warn!(
                    "⚠️ 匹配置信度 {:.4} 低于阈值 {:.4}",
                    offset.match_result.confidence,
                    threshold
                );
                return Err(CaptchaError::LowConfidence {
                    confidence: offset.match_result.confidence,
                    threshold,
                });
            }
        }

        Ok(offset)
    }

    /// 识别后直接在桌面上回放拖动。
    ///
    /// `handle_center` 为滑块按钮中心的屏幕坐标。
    pub async fn solve_and_drag<D: PointerDriver>(
        &self,
        background: &ImageSource,
        puzzle: &ImageSource,
        band: BrowserBand,
        driver: &mut D,
        handle_center: (i32, i32),
        trajectory: &TrajectoryConfig,
        replay: &ReplayConfig,
    ) -> Result<SliderOffset, CaptchaError> {
        let offset = self.locate_offset(background, puzzle, band).await?;
        let track = synthesize_trajectory_with(
            offset.browser_offset_x as f64,
            trajectory,
            &mut rand::rng(),
        )?;

        log::info!(
            "🖱️ 开始回放拖动 - 距离: {}px 轨迹点: {}",
            offset.browser_offset_x,
            track.len()
        );
        replay_track(driver, handle_center, &track, replay).await?;

        Ok(offset)
    }
}

/// 固定次数、固定间隔的重试；只有 `is_retryable` 的错误才会重试。
pub async fn retry_fixed<T, F, Fut>(
    policy: RetryPolicy,
    label: &str,
    mut operation: F,
) -> Result<T, CaptchaError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CaptchaError>>,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < attempts && err.is_retryable() => {
                log::warn!(
                    "⚠️ {} 失败（第 {}/{} 次，可重试）：{}；{}ms 后重试",
                    label,
                    attempt,
                    attempts,
                    err,
                    policy.delay_ms
                );
                tokio::time::sleep(Duration::from_millis(policy.delay_ms)).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// 只有网络来源存在瞬时失败；本地文件、Base64 与内存字节的结果是确定的，只尝试一次。
fn retry_policy_for(source: &ImageSource, config: &SolverConfig) -> RetryPolicy {
    match source {
        ImageSource::Url(_) => config.retry,
        _ => RetryPolicy {
            attempts: 1,
            ..config.retry
        },
    }
}

async fn run_blocking<T, F>(task: F) -> Result<T, CaptchaError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, CaptchaError> + Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| CaptchaError::match_failure(Stage::Match, format!("图像处理任务异常：{}", e)))?
}

/// 诊断图输出路径；未开启诊断且未显式指定时返回 `None`。
fn diagnostic_target(
    config: &SolverConfig,
    background: &RasterImage,
    requested: Option<&Path>,
) -> Option<PathBuf> {
    if requested.is_none() && !config.save_diagnostics {
        return None;
    }

    match resolve_output_path(&config.work_dir, requested, &match_result_name(background.origin())) {
        Ok(path) => Some(path),
        Err(e) => {
            log::warn!("⚠️ 诊断输出目录不可用（已忽略）：{}", e);
            None
        }
    }
}

fn keep_cropped_copy(config: &SolverConfig, cropped: &RasterImage, region: CropRegion) {
    let saved = resolve_output_path(
        &config.work_dir,
        None,
        &cropped_name(cropped.origin(), region.top, region.height),
    )
    .and_then(|path| cropped.save(&path).map(|_| path));

    match saved {
        Ok(path) => log::debug!("✂️ 裁剪图已保留: {}", path.display()),
        Err(e) => log::warn!("⚠️ 裁剪图保存失败（已忽略）：{}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn new_rejects_invalid_config() {
        let config = SolverConfig {
            browser_width: 0.0,
            ..SolverConfig::default()
        };
        assert!(matches!(SliderSolver::new(config), Err(CaptchaError::Config(_))));
    }

    #[test]
    fn update_config_keeps_previous_value_on_rejection() {
        let solver = SliderSolver::new(SolverConfig::default()).expect("solver init failed");

        let result = solver.set_confidence_threshold(Some(1.5));
        assert!(matches!(result, Err(CaptchaError::Config(_))));
        assert_eq!(solver.config_snapshot().expect("snapshot").min_confidence, None);

        solver
            .set_confidence_threshold(Some(0.4))
            .expect("valid threshold accepted");
        assert_eq!(solver.config_snapshot().expect("snapshot").min_confidence, Some(0.4));
    }

    #[tokio::test]
    async fn retry_fixed_retries_only_retryable_errors() {
        let policy = RetryPolicy {
            attempts: 3,
            delay_ms: 1,
        };

        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<u32, CaptchaError> = retry_fixed(policy, "flaky", || async move {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            if n < 3 {
                Err(CaptchaError::Network("reset".to_string()))
            } else {
                Ok(n)
            }
        })
        .await;
        assert_eq!(result.expect("third attempt succeeds"), 3);

        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<(), CaptchaError> = retry_fixed(policy, "terminal", || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(CaptchaError::Config("bad".to_string()))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<(), CaptchaError> = retry_fixed(policy, "always", || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(CaptchaError::Timeout("slow".to_string()))
        })
        .await;
        assert!(matches!(result, Err(CaptchaError::Timeout(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn missing_file_is_not_retried() {
        let config = SolverConfig {
            retry: RetryPolicy {
                attempts: 3,
                delay_ms: 5_000,
            },
            ..SolverConfig::default()
        };
        let solver = SliderSolver::new(config).expect("solver init failed");

        let started = Instant::now();
        let result = solver
            .load_image(&ImageSource::File(PathBuf::from("/no/such/captcha.png")))
            .await;

        assert!(matches!(
            result,
            Err(CaptchaError::InvalidImage { stage: Stage::Load, ref origin, .. }) if origin == "/no/such/captcha.png"
        ));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn match_sources_reports_missing_background_as_invalid_image() {
        let solver = SliderSolver::new(SolverConfig::default()).expect("solver init failed");

        let err = solver
            .match_sources(
                &ImageSource::File(PathBuf::from("/no/such/bg.png")),
                &ImageSource::File(PathBuf::from("/no/such/slide.png")),
                None,
            )
            .await
            .unwrap_err();

        match err {
            CaptchaError::InvalidImage { stage, origin, .. } => {
                assert_eq!(stage, Stage::Load);
                assert!(origin.starts_with("/no/such/"), "{origin}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn deterministic_sources_are_loaded_once() {
        let config = SolverConfig {
            retry: RetryPolicy {
                attempts: 3,
                delay_ms: 5_000,
            },
            ..SolverConfig::default()
        };
        let solver = SliderSolver::new(config.clone()).expect("solver init failed");
        let garbage = ImageSource::Bytes {
            bytes: b"<html>not an image</html>".to_vec(),
            label: "garbage".to_string(),
        };

        let started = Instant::now();
        let result = solver.load_image(&garbage).await;

        assert!(matches!(result, Err(CaptchaError::InvalidImage { stage: Stage::Load, .. })));
        assert!(started.elapsed() < Duration::from_secs(5));

        assert_eq!(retry_policy_for(&garbage, &config).attempts, 1);
        assert_eq!(
            retry_policy_for(&ImageSource::Url("https://example.com/bg.png".to_string()), &config),
            config.retry
        );
    }
}
