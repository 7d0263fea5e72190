//! # 模板匹配模块
//!
//! ## 设计思路
//!
//! 拼图块与背景缺口的像素内容并不完全相同（缺口通常叠加了阴影或半透明蒙层），
//! 但两者的轮廓一致。因此先把两幅图都变成边缘图，再在边缘图上做归一化互相关。
//!
//! ## 实现思路
//!
//! 1. 尺寸校验：拼图任一维度大于背景直接失败（`imageproc` 在此情况下会 panic）
//! 2. 两幅图分别提取边缘（灰度 -> 高斯 -> Canny）
//! 3. `CrossCorrelationNormalized` 得分面
//! 4. 仅在有限得分中取全局最大值（全零边缘图得分为 NaN）
//! 5. 置信度截断到 `[0, 1]`，计算距离比例
//! 6. 可选：输出诊断图（失败只记警告）
//!
//! 核心不设置置信度阈值，是否信任结果由调用方通过 [`MatchResult::is_trusted`] 决定。

use std::path::Path;
use std::time::Instant;

use imageproc::template_matching::{MatchTemplateMethod, match_template as correlate};
use serde::Serialize;

use super::diagnostics::save_match_diagnostic;
use super::edges::edge_map;
use super::{CaptchaError, RasterImage, RegistrationConfig, Stage};

/// 模板匹配结果。
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MatchResult {
    /// 最佳匹配的左上角坐标（背景图像素）。
    pub location: (u32, u32),
    /// 归一化互相关得分，位于 `[0, 1]`。
    pub confidence: f32,
    /// 横向距离，等于 `location.0`。
    pub distance: u32,
    /// `distance / 背景宽度`。
    pub distance_ratio: f64,
    /// 拼图（模板）尺寸。
    pub template_size: (u32, u32),
}

impl MatchResult {
    pub fn x(&self) -> u32 {
        self.location.0
    }

    pub fn y(&self) -> u32 {
        self.location.1
    }

    pub fn is_trusted(&self, threshold: f32) -> bool {
        self.confidence >= threshold
    }
}

/// 在背景图中定位拼图块。
///
/// `diagnostic_path` 非空时额外输出标注图，输出失败不影响返回值。
pub fn match_template(
    background: &RasterImage,
    puzzle: &RasterImage,
    config: &RegistrationConfig,
    diagnostic_path: Option<&Path>,
) -> Result<MatchResult, CaptchaError> {
    config.validate()?;

    let (bg_width, bg_height) = background.dimensions();
    let (tpl_width, tpl_height) = puzzle.dimensions();
    if tpl_width > bg_width || tpl_height > bg_height {
        return Err(CaptchaError::match_failure(
            Stage::Match,
            format!(
                "拼图尺寸 {}x{}（{}）大于背景尺寸 {}x{}（{}）",
                tpl_width,
                tpl_height,
                puzzle.origin(),
                bg_width,
                bg_height,
                background.origin()
            ),
        ));
    }

    let started = Instant::now();
    let background_edges = edge_map(background, config);
    let puzzle_edges = edge_map(puzzle, config);
    log::debug!("🧭 边缘提取耗时: {:?}", started.elapsed());

    let scores = correlate(
        background_edges.as_gray(),
        puzzle_edges.as_gray(),
        MatchTemplateMethod::CrossCorrelationNormalized,
    );
    drop(background_edges);
    drop(puzzle_edges);

    let mut best: Option<((u32, u32), f32)> = None;
    for (x, y, score) in scores.enumerate_pixels() {
        let value = score[0];
        if !value.is_finite() {
            continue;
        }
        if best.is_none_or(|(_, current)| value > current) {
            best = Some(((x, y), value));
        }
    }
    drop(scores);

    let (location, raw_confidence) = best.unwrap_or(((0, 0), 0.0));
    let confidence = raw_confidence.clamp(0.0, 1.0);
    let result = MatchResult {
        location,
        confidence,
        distance: location.0,
        distance_ratio: location.0 as f64 / bg_width as f64,
        template_size: (tpl_width, tpl_height),
    };

    log::info!(
        "🎯 模板匹配完成 - 置信度: {:.4} 位置: ({}, {}) 距离比例: {:.4} 耗时: {:?}",
        result.confidence,
        location.0,
        location.1,
        result.distance_ratio,
        started.elapsed()
    );

    if let Some(path) = diagnostic_path {
        if let Err(e) = save_match_diagnostic(background, &result, path) {
            log::warn!("⚠️ 诊断图输出失败（已忽略）：{}", e);
        }
    }

    Ok(result)
}
