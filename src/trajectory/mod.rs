//! # 拖动轨迹模块（trajectory）
//!
//! 把目标距离转换为带时间戳的拟人轨迹，并通过指针驱动回放。
//!
//! - `synthesizer`：加速 / 减速 / 抖动 / 终点微调
//! - `replay`：`PointerDriver` 抽象与 `enigo` 桌面实现
//! - `config`：运动学与回放参数

mod config;
mod replay;
mod synthesizer;

pub use config::{ReplayConfig, TrajectoryConfig};
pub use replay::{EnigoDriver, PointerDriver, replay_track};
pub use synthesizer::{TrackPoint, synthesize_trajectory, synthesize_trajectory_with};
