//! 轨迹生成与指针回放的集成测试（使用记录型指针驱动，不触碰真实桌面）。

use std::io::Cursor;

use captcha_slider::captcha::{BrowserBand, CaptchaError, ImageSource, SliderSolver, SolverConfig};
use captcha_slider::trajectory::{
    PointerDriver, ReplayConfig, TrackPoint, TrajectoryConfig, replay_track,
    synthesize_trajectory, synthesize_trajectory_with,
};
use image::{ImageFormat, Rgb, RgbImage};
use proptest::prelude::*;
use rand::SeedableRng;
use rand::rngs::StdRng;

#[derive(Default)]
struct RecordingDriver {
    moves: Vec<(i32, i32)>,
    pressed: usize,
    released: usize,
}

impl PointerDriver for RecordingDriver {
    fn move_to(&mut self, x: i32, y: i32) -> Result<(), CaptchaError> {
        self.moves.push((x, y));
        Ok(())
    }

    fn press(&mut self) -> Result<(), CaptchaError> {
        self.pressed += 1;
        Ok(())
    }

    fn release(&mut self) -> Result<(), CaptchaError> {
        self.released += 1;
        Ok(())
    }
}

fn no_pause() -> ReplayConfig {
    ReplayConfig {
        min_pause_ms: 0,
        max_pause_ms: 0,
        ..ReplayConfig::default()
    }
}

fn png_source(image: &RgbImage, label: &str) -> ImageSource {
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .expect("png encoding failed");
    ImageSource::Bytes {
        bytes,
        label: label.to_string(),
    }
}

#[test]
fn track_for_150_px_accelerates_then_settles() {
    let track = synthesize_trajectory(150.0);

    assert_eq!(track[0], TrackPoint { x: 0.0, y: 0.0, t: 0 });
    assert!(track.windows(2).all(|w| w[1].t > w[0].t));

    let main = &track[..track.len() - 3];
    assert_eq!(main[main.len() - 1].x, 150.0);
    assert!(main.windows(2).all(|w| w[1].x >= w[0].x));

    let last = track[track.len() - 1];
    assert!((last.x - 150.0).abs() <= 1.0);
    assert!(last.y.abs() <= 1.0);
}

#[test]
fn custom_config_changes_time_step_and_settle_count() {
    let config = TrajectoryConfig {
        dt_ms: 10,
        settle_points: 5,
        ..TrajectoryConfig::default()
    };
    let track = synthesize_trajectory_with(60.0, &config, &mut StdRng::seed_from_u64(3))
        .expect("valid config");

    assert!(track.iter().all(|p| p.t % 10 == 0));
    let main = &track[..track.len() - 5];
    assert_eq!(main[main.len() - 1].x, 60.0);
}

#[tokio::test]
async fn replay_moves_pointer_relative_to_origin() {
    let track = synthesize_trajectory_with(
        120.0,
        &TrajectoryConfig::default(),
        &mut StdRng::seed_from_u64(11),
    )
    .expect("valid config");
    let mut driver = RecordingDriver::default();

    replay_track(&mut driver, (500, 300), &track, &no_pause())
        .await
        .expect("replay succeeds");

    assert_eq!((driver.pressed, driver.released), (1, 1));
    assert_eq!(driver.moves[0], (500, 300));
    // 起点 + 每个轨迹点 interpolation_steps 次移动
    assert_eq!(driver.moves.len(), 1 + track.len() * 2);

    let (x, y) = driver.moves[driver.moves.len() - 1];
    assert!((x - 620).abs() <= 1, "final x {}", x);
    assert!((y - 300).abs() <= 1, "final y {}", y);
}

#[tokio::test]
async fn solve_and_drag_replays_the_detected_offset() {
    let scene = RgbImage::from_fn(340, 212, |x, y| {
        if (200..230).contains(&x) && (70..100).contains(&y) {
            Rgb([30, 30, 30])
        } else {
            Rgb([170, 170, 170])
        }
    });
    let puzzle = image::imageops::crop_imm(&scene, 194, 64, 42, 42).to_image();
    let dir = tempfile::tempdir().expect("tempdir");
    let solver = SliderSolver::new(SolverConfig {
        work_dir: dir.path().to_path_buf(),
        ..SolverConfig::default()
    })
    .expect("solver init failed");
    let mut driver = RecordingDriver::default();

    let offset = solver
        .solve_and_drag(
            &png_source(&scene, "bg.png"),
            &png_source(&puzzle, "slide.png"),
            BrowserBand::new(40.0, 100.0),
            &mut driver,
            (80, 600),
            &TrajectoryConfig::default(),
            &no_pause(),
        )
        .await
        .expect("solve and drag succeeds");

    // 浏览器尺寸与图片尺寸一致，偏移即匹配 x
    assert_eq!(offset.browser_offset_x, 194);
    assert_eq!(offset.match_result.location, (194, 24));
    assert_eq!((driver.pressed, driver.released), (1, 1));

    let (x, _) = driver.moves[driver.moves.len() - 1];
    assert!((x - (80 + 194)).abs() <= 1, "final x {}", x);
}

proptest! {
    #[test]
    fn tracks_end_near_target_and_never_go_back_in_time(
        distance in 1.0_f64..400.0,
        seed in any::<u64>(),
    ) {
        let track = synthesize_trajectory_with(
            distance,
            &TrajectoryConfig::default(),
            &mut StdRng::seed_from_u64(seed),
        )
        .expect("valid config");

        prop_assert!(track.windows(2).all(|w| w[1].t > w[0].t));
        let last = track[track.len() - 1];
        prop_assert!((last.x - distance).abs() <= 1.0 + 1e-9);
        prop_assert!(track.iter().all(|p| p.y.abs() <= 1.0));
    }
}
