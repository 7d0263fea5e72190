//! 轨迹与回放参数
//!
//! 加速度、时间步长、抖动幅度等都是模仿人手拖动的经验值，只作为默认值存在。

use crate::captcha::CaptchaError;

/// 拖动轨迹的运动学参数。
#[derive(Debug, Clone, PartialEq)]
pub struct TrajectoryConfig {
    /// 采样间隔（毫秒）。
    pub dt_ms: u64,
    /// 前段加速度。
    pub acceleration: f64,
    /// 后段减速度（取正值，内部按负加速度使用）。
    pub deceleration: f64,
    /// 由加速切换到减速的位置占总距离的比例。
    pub switch_ratio: f64,
    /// 速度下限；低于该值时重新取 `min_velocity + rand`。
    pub min_velocity: f64,
    /// 每步位移附加的随机量上限。
    pub step_jitter: f64,
    /// 纵向抖动幅度。
    pub vertical_jitter: f64,
    /// 到达终点后的微调点数量。
    pub settle_points: usize,
    /// 微调点的横向抖动幅度。
    pub settle_jitter: f64,
}

impl Default for TrajectoryConfig {
    fn default() -> Self {
        Self {
            dt_ms: 16,
            acceleration: 2.0,
            deceleration: 3.0,
            switch_ratio: 0.7,
            min_velocity: 1.0,
            step_jitter: 0.5,
            vertical_jitter: 1.0,
            settle_points: 3,
            settle_jitter: 1.0,
        }
    }
}

impl TrajectoryConfig {
    pub fn validate(&self) -> Result<(), CaptchaError> {
        if self.dt_ms == 0 {
            return Err(CaptchaError::Config("dt_ms 必须大于 0".to_string()));
        }

        if !self.min_velocity.is_finite() || self.min_velocity <= 0.0 {
            return Err(CaptchaError::Config(format!(
                "min_velocity 必须为正数：{}",
                self.min_velocity
            )));
        }

        if !(0.0..=1.0).contains(&self.switch_ratio) {
            return Err(CaptchaError::Config(format!(
                "switch_ratio 必须位于 [0, 1]：{}",
                self.switch_ratio
            )));
        }

        for (name, value) in [
            ("acceleration", self.acceleration),
            ("deceleration", self.deceleration),
            ("step_jitter", self.step_jitter),
            ("vertical_jitter", self.vertical_jitter),
            ("settle_jitter", self.settle_jitter),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(CaptchaError::Config(format!("{} 必须为非负有限值：{}", name, value)));
            }
        }

        Ok(())
    }
}

/// 指针回放参数。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayConfig {
    /// 相邻轨迹点之间的插值步数。
    pub interpolation_steps: u32,
    /// 每个轨迹点之后的最短停顿（毫秒）。
    pub min_pause_ms: u64,
    /// 每个轨迹点之后的最长停顿（毫秒）。
    pub max_pause_ms: u64,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            interpolation_steps: 2,
            min_pause_ms: 10,
            max_pause_ms: 20,
        }
    }
}

impl ReplayConfig {
    pub fn validate(&self) -> Result<(), CaptchaError> {
        if self.interpolation_steps == 0 {
            return Err(CaptchaError::Config("interpolation_steps 至少为 1".to_string()));
        }

        if self.min_pause_ms > self.max_pause_ms {
            return Err(CaptchaError::Config(format!(
                "停顿区间无效：{}..{}ms",
                self.min_pause_ms, self.max_pause_ms
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(TrajectoryConfig::default().validate().is_ok());
        assert!(ReplayConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_velocity_floor_is_rejected() {
        let config = TrajectoryConfig {
            min_velocity: 0.0,
            ..TrajectoryConfig::default()
        };
        assert!(matches!(config.validate(), Err(CaptchaError::Config(_))));
    }

    #[test]
    fn inverted_pause_range_is_rejected() {
        let config = ReplayConfig {
            min_pause_ms: 30,
            max_pause_ms: 10,
            ..ReplayConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
