//! # 拖动轨迹生成
//!
//! ## 设计思路
//!
//! 人手拖动滑块的特征是：先加速、接近目标时减速、纵向有轻微抖动、松手前在终点附近微调。
//! 匀速直线的轨迹很容易被风控识别。
//!
//! ## 实现思路
//!
//! 1. 起点 `(0, 0, t=0)`
//! 2. 每个时间步按当前位置选择加速度（`switch_ratio` 之前加速，之后减速）
//! 3. 速度低于下限时重新取 `min_velocity + rand`，保证每步都有前进
//! 4. 位移附加随机量，并截断在目标距离处
//! 5. 到达目标后追加若干微调点
//!
//! 主循环里的横纵坐标取整，微调点保留小数。

use rand::Rng;
use serde::Serialize;

use super::TrajectoryConfig;
use crate::captcha::CaptchaError;

/// 轨迹点：相对起点的累计位移与经过的时间。
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrackPoint {
    pub x: f64,
    pub y: f64,
    /// 距起点的毫秒数。
    pub t: u64,
}

/// 使用默认参数和线程本地随机源生成轨迹。
pub fn synthesize_trajectory(distance: f64) -> Vec<TrackPoint> {
    let config = TrajectoryConfig::default();
    let mut track = Vec::new();
    fill_track(&mut track, distance, &config, &mut rand::rng());
    track
}

/// 使用指定参数和随机源生成轨迹。
pub fn synthesize_trajectory_with<R: Rng + ?Sized>(
    distance: f64,
    config: &TrajectoryConfig,
    rng: &mut R,
) -> Result<Vec<TrackPoint>, CaptchaError> {
    config.validate()?;

    let mut track = Vec::new();
    fill_track(&mut track, distance, config, rng);
    Ok(track)
}

fn fill_track<R: Rng + ?Sized>(
    track: &mut Vec<TrackPoint>,
    distance: f64,
    config: &TrajectoryConfig,
    rng: &mut R,
) {
    let dt = config.dt_ms;
    let mut t = 0_u64;
    track.push(TrackPoint { x: 0.0, y: 0.0, t });

    // 非正或非有限距离：只输出起点与原地微调
    let target = if distance.is_finite() && distance > 0.0 {
        distance
    } else {
        log::debug!("🧭 目标距离无效，输出退化轨迹: {}", distance);
        0.0
    };

    let switch_at = target * config.switch_ratio;
    let mut current = 0.0_f64;
    let mut velocity = 0.0_f64;

    while current < target {
        let acceleration = if current < switch_at {
            config.acceleration
        } else {
            -config.deceleration
        };
        velocity += acceleration * dt as f64 / 1000.0;
        if velocity < config.min_velocity {
            velocity = config.min_velocity + rng.random::<f64>();
        }

        let step = velocity + rng.random::<f64>() * config.step_jitter;
        current = if current + step >= target {
            target
        } else {
            current + step
        };
        t += dt;

        track.push(TrackPoint {
            x: current.round(),
            y: ((rng.random::<f64>() * 2.0 - 1.0) * config.vertical_jitter).round(),
            t,
        });
    }

    for _ in 0..config.settle_points {
        t += dt;
        track.push(TrackPoint {
            x: target + (rng.random::<f64>() * 2.0 - 1.0) * config.settle_jitter,
            y: (rng.random::<f64>() * 2.0 - 1.0) * config.vertical_jitter,
            t,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn assert_track_shape(track: &[TrackPoint], distance: f64, settle_points: usize) {
        assert!(!track.is_empty());
        assert_eq!(track[0], TrackPoint { x: 0.0, y: 0.0, t: 0 });

        for pair in track.windows(2) {
            assert!(pair[1].t > pair[0].t, "time must strictly increase");
        }

        let main = &track[..track.len() - settle_points];
        for pair in main.windows(2) {
            assert!(pair[1].x >= pair[0].x, "x must not go backwards before settling");
        }

        let last = track[track.len() - 1];
        assert!((last.x - distance).abs() <= 1.0 + 1e-9, "terminal x {} vs {}", last.x, distance);
    }

    #[test]
    fn default_track_for_150_px() {
        let track = synthesize_trajectory(150.0);

        assert!(track.len() > 10);
        assert_track_shape(&track, 150.0, 3);
        assert!(track.iter().all(|p| p.t % 16 == 0));
    }

    #[test]
    fn main_loop_points_are_integral_and_settle_points_are_not_rounded() {
        let mut rng = StdRng::seed_from_u64(7);
        let track = synthesize_trajectory_with(80.0, &TrajectoryConfig::default(), &mut rng)
            .expect("default config is valid");

        let (main, settle) = track.split_at(track.len() - 3);
        for point in main {
            assert_eq!(point.x, point.x.round());
            assert!([-1.0, 0.0, 1.0].contains(&point.y));
        }
        assert_eq!(main[main.len() - 1].x, 80.0);
        for point in settle {
            assert!(point.y.abs() <= 1.0);
        }
    }

    #[test]
    fn degenerate_distances_do_not_loop() {
        for distance in [0.0, -20.0, f64::NAN, f64::INFINITY] {
            let track = synthesize_trajectory(distance);
            assert_eq!(track.len(), 1 + 3);
            assert_eq!(track[0].x, 0.0);
            assert!(track.iter().all(|p| p.x.is_finite()));
        }
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = TrajectoryConfig {
            dt_ms: 0,
            ..TrajectoryConfig::default()
        };
        let result = synthesize_trajectory_with(100.0, &config, &mut StdRng::seed_from_u64(1));
        assert!(matches!(result, Err(CaptchaError::Config(_))));
    }

    #[test]
    fn same_seed_gives_same_track() {
        let config = TrajectoryConfig::default();
        let a = synthesize_trajectory_with(120.0, &config, &mut StdRng::seed_from_u64(42))
            .expect("valid config");
        let b = synthesize_trajectory_with(120.0, &config, &mut StdRng::seed_from_u64(42))
            .expect("valid config");
        assert_eq!(a, b);
    }

    proptest! {
        #[test]
        fn track_invariants_hold(distance in 0.5_f64..600.0, seed in any::<u64>()) {
            let mut rng = StdRng::seed_from_u64(seed);
            let track = synthesize_trajectory_with(distance, &TrajectoryConfig::default(), &mut rng)
                .expect("default config is valid");
            assert_track_shape(&track, distance, 3);
        }
    }
}
