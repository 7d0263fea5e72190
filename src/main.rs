//! # 滑块验证码求解器：命令行入口
//!
//! 本文件只负责参数解析、日志初始化与结果输出。
//! 业务逻辑分布在各子模块中，详见 `lib.rs` 架构文档。

use std::path::PathBuf;
use std::time::Duration;

use captcha_slider::captcha::{BrowserBand, ImageSource, RetryPolicy, SliderSolver, SolverConfig};
use captcha_slider::error::AppError;
use captcha_slider::trajectory::{
    EnigoDriver, ReplayConfig, TrajectoryConfig, replay_track, synthesize_trajectory_with,
};
use clap::{Args, Parser, Subcommand};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;

#[derive(Parser)]
#[command(name = "captcha-slider")]
#[command(version, about = "Slider CAPTCHA solver: edge template matching + human-like drag tracks", long_about = None)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct GlobalArgs {
    /// Directory for cropped images and diagnostics
    #[arg(long, value_name = "DIR", global = true)]
    work_dir: Option<PathBuf>,

    /// Widget width as displayed in the browser (CSS px)
    #[arg(long, value_name = "PX", global = true)]
    browser_width: Option<f64>,

    /// Widget height as displayed in the browser (CSS px)
    #[arg(long, value_name = "PX", global = true)]
    browser_height: Option<f64>,

    /// Attempts per image load
    #[arg(long, value_name = "N", global = true)]
    retries: Option<u32>,

    /// Delay between load attempts
    #[arg(long, value_name = "MS", global = true)]
    retry_delay_ms: Option<u64>,

    /// Print results (and errors) as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Args)]
struct BandArgs {
    /// Top of the puzzle band in browser pixels
    #[arg(long, value_name = "PX", required_unless_present = "top_em")]
    top: Option<f64>,

    /// Top of the puzzle band in em (multiplied by --font-size)
    #[arg(long, value_name = "EM", requires = "font_size", conflicts_with = "top")]
    top_em: Option<f64>,

    /// Font size of the widget container in px
    #[arg(long, value_name = "PX")]
    font_size: Option<f64>,

    /// Height of the puzzle band in browser pixels
    #[arg(long, value_name = "PX")]
    crop_height: Option<f64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Crop the puzzle band out of a background image
    Crop {
        /// Background image (path, file:// or http(s) URL, data URL)
        background: String,

        #[command(flatten)]
        band: BandArgs,

        /// Output path (relative paths land in the work dir)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Locate the puzzle inside the background (no cropping)
    Match {
        background: String,
        puzzle: String,

        /// Annotated diagnostic image path
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Print the horizontal distance ratio (x / background width)
    Distance { background: String, puzzle: String },

    /// Full pipeline: crop, match and convert to a browser drag offset
    Offset {
        background: String,
        puzzle: String,

        #[command(flatten)]
        band: BandArgs,

        /// Reject matches below this confidence
        #[arg(long, value_name = "0..1")]
        min_confidence: Option<f32>,

        /// Save an annotated match image into the work dir
        #[arg(long)]
        diagnostics: bool,

        /// Keep the cropped background in the work dir
        #[arg(long)]
        keep_cropped: bool,
    },

    /// Synthesize a drag trajectory
    Track {
        /// Distance to drag in pixels
        distance: f64,

        /// Seed for a reproducible track
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Replay a synthesized drag on the local desktop
    Drag {
        /// Distance to drag in pixels
        distance: f64,

        /// Screen x of the slider handle centre (defaults to the current pointer)
        #[arg(long, requires = "y")]
        x: Option<i32>,

        /// Screen y of the slider handle centre
        #[arg(long, requires = "x")]
        y: Option<i32>,

        /// Seconds to wait before pressing
        #[arg(long, default_value_t = 3)]
        countdown: u64,

        #[arg(long)]
        seed: Option<u64>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let json = cli.global.json;

    if let Err(err) = run(cli).await {
        log::error!("❌ [{}] {}", err.code(), err);
        if json {
            match serde_json::to_string(&err) {
                Ok(text) => println!("{}", text),
                Err(e) => eprintln!("{}", e),
            }
        } else {
            eprintln!("错误: {}", err);
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), AppError> {
    let mut config = SolverConfig::default();
    apply_global_args(&mut config, &cli.global);
    let json = cli.global.json;

    match cli.command {
        Commands::Crop {
            background,
            band,
            output,
        } => {
            let solver = SliderSolver::new(config.clone())?;
            let cropped = solver
                .crop_background(
                    &ImageSource::detect(&background),
                    resolve_band(&band, &config),
                    output,
                )
                .await?;
            emit(json, &cropped, || {
                format!(
                    "裁剪完成: {} (top={}, height={})",
                    cropped.path.display(),
                    cropped.region.top,
                    cropped.region.height
                )
            })
        }
        Commands::Match {
            background,
            puzzle,
            output,
        } => {
            let solver = SliderSolver::new(config)?;
            let result = solver
                .match_sources(
                    &ImageSource::detect(&background),
                    &ImageSource::detect(&puzzle),
                    output,
                )
                .await?;
            emit(json, &result, || {
                format!(
                    "匹配位置: ({}, {}) 置信度: {:.4} 距离比例: {:.4}",
                    result.location.0, result.location.1, result.confidence, result.distance_ratio
                )
            })
        }
        Commands::Distance { background, puzzle } => {
            let solver = SliderSolver::new(config)?;
            let ratio = solver
                .slide_distance(&ImageSource::detect(&background), &ImageSource::detect(&puzzle))
                .await?;
            emit(json, &ratio, || format!("{:.6}", ratio))
        }
        Commands::Offset {
            background,
            puzzle,
            band,
            min_confidence,
            diagnostics,
            keep_cropped,
        } => {
            config.min_confidence = min_confidence;
            config.save_diagnostics = diagnostics;
            config.keep_cropped = keep_cropped;
            let band = resolve_band(&band, &config);

            let solver = SliderSolver::new(config)?;
            let offset = solver
                .locate_offset(
                    &ImageSource::detect(&background),
                    &ImageSource::detect(&puzzle),
                    band,
                )
                .await?;
            emit(json, &offset, || {
                format!(
                    "浏览器偏移: {}px (置信度: {:.4})",
                    offset.browser_offset_x, offset.match_result.confidence
                )
            })
        }
        Commands::Track { distance, seed } => {
            let track = synthesize_trajectory_with(
                distance,
                &TrajectoryConfig::default(),
                &mut seeded_rng(seed),
            )?;
            let text = serde_json::to_string_pretty(&track)?;
            println!("{}", text);
            Ok(())
        }
        Commands::Drag {
            distance,
            x,
            y,
            countdown,
            seed,
        } => {
            let track = synthesize_trajectory_with(
                distance,
                &TrajectoryConfig::default(),
                &mut seeded_rng(seed),
            )?;

            let mut driver = EnigoDriver::new()?;
            if countdown > 0 {
                log::info!("⏳ {} 秒后开始拖动，请把指针放到滑块上", countdown);
                tokio::time::sleep(Duration::from_secs(countdown)).await;
            }
            let origin = match (x, y) {
                (Some(x), Some(y)) => (x, y),
                _ => driver.location()?,
            };

            log::info!(
                "🖱️ 开始拖动 - 起点: ({}, {}) 距离: {} 轨迹点: {}",
                origin.0,
                origin.1,
                distance,
                track.len()
            );
            replay_track(&mut driver, origin, &track, &ReplayConfig::default()).await?;
            emit(json, &track.len(), || format!("拖动完成，共 {} 个轨迹点", track.len()))
        }
    }
}

fn apply_global_args(config: &mut SolverConfig, args: &GlobalArgs) {
    if let Some(dir) = &args.work_dir {
        config.work_dir = dir.clone();
    }
    if let Some(width) = args.browser_width {
        config.browser_width = width;
    }
    if let Some(height) = args.browser_height {
        config.browser_height = height;
    }
    config.retry = RetryPolicy {
        attempts: args.retries.unwrap_or(config.retry.attempts),
        delay_ms: args.retry_delay_ms.unwrap_or(config.retry.delay_ms),
    };
}

fn resolve_band(args: &BandArgs, config: &SolverConfig) -> BrowserBand {
    let crop_height = args.crop_height.unwrap_or(config.default_crop_height);
    match (args.top, args.top_em, args.font_size) {
        (_, Some(top_em), Some(font_size)) => BrowserBand::from_em(top_em, font_size, crop_height),
        (Some(top), _, _) => BrowserBand::new(top, crop_height),
        _ => BrowserBand::new(0.0, crop_height),
    }
}

fn seeded_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    }
}

fn emit<T: Serialize>(json: bool, value: &T, text: impl FnOnce() -> String) -> Result<(), AppError> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{}", text());
    }
    Ok(())
}
