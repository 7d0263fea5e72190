//! # 诊断输出模块
//!
//! 匹配结果的可视化与中间产物落盘。
//!
//! - 标注图：在背景图上画出匹配框、锚点十字和置信度条。
//! - 旁路 JSON：记录置信度、位置、距离比例等文本信息（图上不渲染文字，避免引入字体资源）。
//! - 输出路径：调用方显式指定，或在工作目录下按 `来源名 + 时间戳` 自动命名。
//!
//! 诊断输出只是调试手段，任何失败都由调用方降级为警告。

use std::path::{Path, PathBuf};

use image::Rgb;
use imageproc::drawing::{draw_cross_mut, draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;
use serde::Serialize;

use super::{CaptchaError, MatchResult, RasterImage};

const BOX_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const ANCHOR_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const BAR_COLOR: Rgb<u8> = Rgb([0, 160, 255]);
const BAR_TRACK_COLOR: Rgb<u8> = Rgb([40, 40, 40]);
const BAR_HEIGHT: u32 = 4;

const SAVABLE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

#[derive(Debug, Serialize)]
struct DiagnosticSidecar<'a> {
    source: &'a str,
    image: String,
    confidence: f32,
    x: u32,
    y: u32,
    distance_ratio: f64,
    template_width: u32,
    template_height: u32,
    created_at: String,
}

/// 解析输出路径并确保父目录存在。
///
/// `requested` 为空时落在 `work_dir/auto_name`；相对路径同样相对于 `work_dir`。
pub fn resolve_output_path(
    work_dir: &Path,
    requested: Option<&Path>,
    auto_name: &str,
) -> Result<PathBuf, CaptchaError> {
    let path = match requested {
        Some(path) if path.is_absolute() => path.to_path_buf(),
        Some(path) => work_dir.join(path),
        None => work_dir.join(auto_name),
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| {
            CaptchaError::FileSystem(format!("无法创建输出目录：{}（{}）", parent.display(), e))
        })?;
    }

    Ok(path)
}

/// `match_result_{来源名}_{毫秒时间戳}.{扩展名}`
pub fn match_result_name(source: &str) -> String {
    let (stem, ext) = stem_and_extension(source);
    format!("match_result_{}_{}.{}", stem, timestamp_millis(), ext)
}

/// `{来源名}_cropped_{top}_{height}_{毫秒时间戳}.{扩展名}`
pub fn cropped_name(source: &str, top: u32, height: u32) -> String {
    let (stem, ext) = stem_and_extension(source);
    format!("{}_cropped_{}_{}_{}.{}", stem, top, height, timestamp_millis(), ext)
}

/// 在背景图副本上绘制匹配结果并保存，同时写出同名 `.json` 旁路文件。
pub fn save_match_diagnostic(
    background: &RasterImage,
    result: &MatchResult,
    path: &Path,
) -> Result<PathBuf, CaptchaError> {
    let mut canvas = background.pixels().clone();
    let (width, height) = canvas.dimensions();
    let (x, y) = result.location;
    let (tw, th) = result.template_size;

    if tw > 0 && th > 0 {
        draw_hollow_rect_mut(&mut canvas, Rect::at(x as i32, y as i32).of_size(tw, th), BOX_COLOR);
        draw_cross_mut(
            &mut canvas,
            ANCHOR_COLOR,
            (x + tw / 2) as i32,
            (y + th / 2) as i32,
        );
    }

    let bar_height = BAR_HEIGHT.min(height);
    let bar_top = (height - bar_height) as i32;
    draw_filled_rect_mut(&mut canvas, Rect::at(0, bar_top).of_size(width, bar_height), BAR_TRACK_COLOR);

    let filled = (result.confidence.clamp(0.0, 1.0) * width as f32).round() as u32;
    if filled > 0 {
        draw_filled_rect_mut(&mut canvas, Rect::at(0, bar_top).of_size(filled, bar_height), BAR_COLOR);
    }

    canvas.save(path).map_err(|e| {
        CaptchaError::FileSystem(format!("保存诊断图失败：{}（{}）", path.display(), e))
    })?;

    let sidecar = DiagnosticSidecar {
        source: background.origin(),
        image: path.display().to_string(),
        confidence: result.confidence,
        x,
        y,
        distance_ratio: result.distance_ratio,
        template_width: tw,
        template_height: th,
        created_at: chrono::Local::now().to_rfc3339(),
    };
    let sidecar_path = path.with_extension("json");
    let json = serde_json::to_string_pretty(&sidecar)
        .map_err(|e| CaptchaError::FileSystem(format!("诊断信息序列化失败：{}", e)))?;
    std::fs::write(&sidecar_path, json).map_err(|e| {
        CaptchaError::FileSystem(format!("写入诊断信息失败：{}（{}）", sidecar_path.display(), e))
    })?;

    log::info!(
        "📝 诊断图已保存: {} (置信度: {:.4}, 位置: ({}, {}))",
        path.display(),
        result.confidence,
        x,
        y
    );

    Ok(path.to_path_buf())
}

fn timestamp_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// 从路径或 URL 中提取安全的文件名主干与可保存的扩展名。
fn stem_and_extension(source: &str) -> (String, &'static str) {
    let last_segment = source
        .split(['?', '#'])
        .next()
        .unwrap_or(source)
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(source);
    let path = Path::new(last_segment);

    let stem: String = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    let stem = if stem.is_empty() { "image".to_string() } else { stem };

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .and_then(|e| SAVABLE_EXTENSIONS.iter().find(|known| **known == e).copied())
        .unwrap_or("png");

    (stem, ext)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    #[test]
    fn auto_names_keep_stem_and_known_extension() {
        let name = match_result_name("https://cdn.example.com/captcha/bg-01.jpg?sig=1");
        assert!(name.starts_with("match_result_bg-01_"));
        assert!(name.ends_with(".jpg"));

        let name = cropped_name("/tmp/background.webp", 81, 162);
        assert!(name.starts_with("background_cropped_81_162_"));
        assert!(name.ends_with(".png"));

        let name = match_result_name("base64");
        assert!(name.starts_with("match_result_base64_"));
    }

    #[test]
    fn resolve_output_path_creates_work_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        let work_dir = dir.path().join("nested").join("tmp");

        let path = resolve_output_path(&work_dir, None, "a.png").expect("resolve");

        assert_eq!(path, work_dir.join("a.png"));
        assert!(work_dir.is_dir());

        let relative = resolve_output_path(&work_dir, Some(Path::new("out/b.png")), "a.png")
            .expect("resolve relative");
        assert_eq!(relative, work_dir.join("out").join("b.png"));
        assert!(work_dir.join("out").is_dir());

        let absolute = dir.path().join("c.png");
        let resolved = resolve_output_path(&work_dir, Some(&absolute), "a.png").expect("resolve");
        assert_eq!(resolved, absolute);
    }

    #[test]
    fn diagnostic_writes_image_and_sidecar() {
        let dir = tempfile::tempdir().expect("tempdir");
        let background =
            RasterImage::new(RgbImage::from_pixel(60, 30, Rgb([200, 200, 200])), "bg.png")
                .expect("non-empty");
        let result = MatchResult {
            location: (10, 5),
            confidence: 0.5,
            distance: 10,
            distance_ratio: 10.0 / 60.0,
            template_size: (12, 12),
        };
        let path = dir.path().join("diag.png");

        save_match_diagnostic(&background, &result, &path).expect("diagnostic saved");

        let annotated = image::open(&path).expect("readable").to_rgb8();
        assert_eq!(annotated.get_pixel(10, 5), &BOX_COLOR);
        assert_eq!(annotated.get_pixel(10, 29), &BAR_COLOR);
        assert_eq!(annotated.get_pixel(59, 29), &BAR_TRACK_COLOR);

        let sidecar = std::fs::read_to_string(path.with_extension("json")).expect("sidecar");
        let value: serde_json::Value = serde_json::from_str(&sidecar).expect("json");
        assert_eq!(value["x"], 10);
        assert_eq!(value["y"], 5);
        assert_eq!(value["confidence"], 0.5);
        assert!(value["distance_ratio"].as_f64().is_some());
        assert_eq!(value["source"], "bg.png");
    }
}
