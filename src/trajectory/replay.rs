//! # 指针回放
//!
//! ## 设计思路
//!
//! 轨迹生成与真实指针操作解耦：`PointerDriver` 只暴露 移动 / 按下 / 松开 三个动作，
//! 桌面环境用 `enigo` 实现，测试用记录型实现。
//!
//! ## 实现思路
//!
//! 1. 移动到滑块中心并按下
//! 2. 逐点移动（相邻点之间按 `interpolation_steps` 线性插值），每点后随机停顿
//! 3. 无论中途是否出错都会松开按键

use std::time::Duration;

use enigo::{Button, Coordinate, Direction, Enigo, Mouse, Settings};
use rand::Rng;

use super::{ReplayConfig, TrackPoint};
use crate::captcha::CaptchaError;

/// 指针驱动抽象，坐标为屏幕绝对像素。
pub trait PointerDriver {
    fn move_to(&mut self, x: i32, y: i32) -> Result<(), CaptchaError>;
    fn press(&mut self) -> Result<(), CaptchaError>;
    fn release(&mut self) -> Result<(), CaptchaError>;
}

/// 基于 `enigo` 的桌面指针驱动。
pub struct EnigoDriver {
    enigo: Enigo,
}

impl EnigoDriver {
    pub fn new() -> Result<Self, CaptchaError> {
        let enigo = Enigo::new(&Settings::default())
            .map_err(|e| CaptchaError::Replay(format!("初始化输入模拟失败: {}", e)))?;
        Ok(Self { enigo })
    }

    /// 当前指针位置。
    pub fn location(&self) -> Result<(i32, i32), CaptchaError> {
        self.enigo
            .location()
            .map_err(|e| CaptchaError::Replay(format!("读取指针位置失败: {}", e)))
    }
}

impl PointerDriver for EnigoDriver {
    fn move_to(&mut self, x: i32, y: i32) -> Result<(), CaptchaError> {
        self.enigo
            .move_mouse(x, y, Coordinate::Abs)
            .map_err(|e| CaptchaError::Replay(format!("模拟鼠标移动失败: {}", e)))
    }

    fn press(&mut self) -> Result<(), CaptchaError> {
        self.enigo
            .button(Button::Left, Direction::Press)
            .map_err(|e| CaptchaError::Replay(format!("模拟鼠标按下失败: {}", e)))
    }

    fn release(&mut self) -> Result<(), CaptchaError> {
        self.enigo
            .button(Button::Left, Direction::Release)
            .map_err(|e| CaptchaError::Replay(format!("模拟鼠标松开失败: {}", e)))
    }
}

/// 以 `origin` 为起点回放轨迹。
///
/// 按下之后任何一步失败都会先尝试松开，再返回最早的错误。
pub async fn replay_track<D: PointerDriver + ?Sized>(
    driver: &mut D,
    origin: (i32, i32),
    track: &[TrackPoint],
    config: &ReplayConfig,
) -> Result<(), CaptchaError> {
    config.validate()?;

    driver.move_to(origin.0, origin.1)?;
    driver.press()?;

    let outcome = drive_points(driver, origin, track, config).await;
    let released = driver.release();

    if let Err(e) = &outcome {
        log::warn!("⚠️ 拖动回放中断，已松开按键：{}", e);
    }
    outcome.and(released)
}

async fn drive_points<D: PointerDriver + ?Sized>(
    driver: &mut D,
    origin: (i32, i32),
    track: &[TrackPoint],
    config: &ReplayConfig,
) -> Result<(), CaptchaError> {
    let steps = config.interpolation_steps.max(1);
    let mut last = (origin.0 as f64, origin.1 as f64);

    for point in track {
        let target = (origin.0 as f64 + point.x, origin.1 as f64 + point.y);
        for i in 1..=steps {
            let f = i as f64 / steps as f64;
            let x = last.0 + (target.0 - last.0) * f;
            let y = last.1 + (target.1 - last.1) * f;
            driver.move_to(x.round() as i32, y.round() as i32)?;
        }
        last = target;

        let pause = rand::rng().random_range(config.min_pause_ms..=config.max_pause_ms);
        tokio::time::sleep(Duration::from_millis(pause)).await;
    }

    log::debug!("🖱️ 轨迹回放完成 - {} 个点", track.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    enum Action {
        Move(i32, i32),
        Press,
        Release,
    }

    #[derive(Default)]
    struct RecordingDriver {
        actions: Vec<Action>,
        fail_after_moves: Option<usize>,
    }

    impl PointerDriver for RecordingDriver {
        fn move_to(&mut self, x: i32, y: i32) -> Result<(), CaptchaError> {
            let moves = self.actions.iter().filter(|a| matches!(a, Action::Move(..))).count();
            if self.fail_after_moves.is_some_and(|limit| moves >= limit) {
                return Err(CaptchaError::Replay("pointer lost".to_string()));
            }
            self.actions.push(Action::Move(x, y));
            Ok(())
        }

        fn press(&mut self) -> Result<(), CaptchaError> {
            self.actions.push(Action::Press);
            Ok(())
        }

        fn release(&mut self) -> Result<(), CaptchaError> {
            self.actions.push(Action::Release);
            Ok(())
        }
    }

    fn instant() -> ReplayConfig {
        ReplayConfig {
            min_pause_ms: 0,
            max_pause_ms: 0,
            ..ReplayConfig::default()
        }
    }

    #[tokio::test]
    async fn replay_presses_interpolates_and_releases() {
        let mut driver = RecordingDriver::default();
        let track = [
            TrackPoint { x: 0.0, y: 0.0, t: 0 },
            TrackPoint { x: 4.0, y: 2.0, t: 16 },
            TrackPoint { x: 10.0, y: 0.0, t: 32 },
        ];

        replay_track(&mut driver, (100, 50), &track, &instant())
            .await
            .expect("replay succeeds");

        assert_eq!(
            driver.actions,
            vec![
                Action::Move(100, 50),
                Action::Press,
                Action::Move(100, 50),
                Action::Move(100, 50),
                Action::Move(102, 51),
                Action::Move(104, 52),
                Action::Move(107, 51),
                Action::Move(110, 50),
                Action::Release,
            ]
        );
    }

    #[tokio::test]
    async fn replay_releases_even_when_a_move_fails() {
        let mut driver = RecordingDriver {
            fail_after_moves: Some(3),
            ..RecordingDriver::default()
        };
        let track = [
            TrackPoint { x: 5.0, y: 0.0, t: 16 },
            TrackPoint { x: 9.0, y: 1.0, t: 32 },
        ];

        let result = replay_track(&mut driver, (0, 0), &track, &instant()).await;

        assert!(matches!(result, Err(CaptchaError::Replay(_))));
        assert_eq!(driver.actions.last(), Some(&Action::Release));
        assert_eq!(
            driver.actions.iter().filter(|a| **a == Action::Press).count(),
            1
        );
    }

    #[tokio::test]
    async fn invalid_config_fails_before_pressing() {
        let mut driver = RecordingDriver::default();
        let config = ReplayConfig {
            interpolation_steps: 0,
            ..instant()
        };

        let result = replay_track(&mut driver, (0, 0), &[], &config).await;

        assert!(result.is_err());
        assert!(driver.actions.is_empty());
    }
}
