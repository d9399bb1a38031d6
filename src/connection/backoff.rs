//! 指数退避：base * multiplier^attempt，封顶 max，可选抖动

use std::time::Duration;

use rand::Rng;

use crate::config::ReconnectSection;

/// 重连退避计数器
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    multiplier: f64,
    jitter: f64,
    attempt: u32,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
            multiplier: 2.0,
            jitter: 0.0,
            attempt: 0,
        }
    }

    pub fn from_config(cfg: &ReconnectSection) -> Self {
        Self::new(
            Duration::from_millis(cfg.base_delay_ms),
            Duration::from_millis(cfg.max_delay_ms),
        )
        .with_multiplier(cfg.multiplier)
        .with_jitter(cfg.jitter)
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier.max(1.0);
        self
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// 已连续失败的次数
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    /// 连接成功后回到初始延迟
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// 当前计数对应的延迟（不含抖动、不推进计数）
    pub fn peek(&self) -> Duration {
        let exp = self.multiplier.powi(self.attempt.min(64) as i32);
        let secs = (self.base.as_secs_f64() * exp).min(self.max.as_secs_f64());
        Duration::from_secs_f64(secs)
    }

    /// 取出下一次等待时长并推进计数
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.peek();
        self.attempt = self.attempt.saturating_add(1);
        if self.jitter > 0.0 {
            let factor = 1.0 - rand::thread_rng().gen_range(0.0..=self.jitter);
            delay.mul_f64(factor)
        } else {
            delay
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::from_config(&ReconnectSection::default())
    }
}
