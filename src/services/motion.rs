//! 动作合成 - 业务能力层
//!
//! 生成鼠标轨迹和按键节奏。这里全部是纯函数：给定起点、目标、文本和随机数发生器，
//! 输出确定的序列，不做任何 I/O。真正的执行由 `HumanInput` 负责。

use std::f64::consts::PI;
use std::time::Duration;

use rand::Rng;
use serde::Deserialize;

use crate::config::HumanizeConfig;
use crate::services::keyboard;

/// 视口坐标中的一个点
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(self, other: Point) -> f64 {
        ((other.x - self.x).powi(2) + (other.y - self.y).powi(2)).sqrt()
    }

    fn lerp(self, other: Point, t: f64) -> Point {
        Point::new(
            self.x + (other.x - self.x) * t,
            self.y + (other.y - self.y) * t,
        )
    }
}

/// 元素的边界框
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x && p.x <= self.x + self.width && p.y >= self.y && p.y <= self.y + self.height
    }
}

/// 轨迹中的一步：先等待 `delay`，再移动到 `point`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathStep {
    pub point: Point,
    pub delay: Duration,
}

/// 一次按键
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keystroke {
    Char(char),
    Backspace,
}

/// 按键序列中的一步：先等待 `delay`，再按下 `key`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyStep {
    pub key: Keystroke,
    pub delay: Duration,
}

impl KeyStep {
    /// 回放按键序列，得到输入框中的最终文本
    pub fn replay(steps: &[KeyStep]) -> String {
        let mut out = String::new();
        for step in steps {
            match step.key {
                Keystroke::Char(c) => out.push(c),
                Keystroke::Backspace => {
                    out.pop();
                }
            }
        }
        out
    }
}

/// 动作合成器
pub struct MotionSynthesizer {
    config: HumanizeConfig,
}

impl MotionSynthesizer {
    pub fn new(config: HumanizeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &HumanizeConfig {
        &self.config
    }

    /// 计算目标内的落点
    ///
    /// 落点从中心沿移动的反方向偏移 `aim_bias` 倍的半宽/半高，并限制在内部边距之内。
    /// 该计算不使用随机数。
    pub fn aim_point(&self, current: Point, target: &BoundingBox) -> Point {
        let center = target.center();
        let dx = center.x - current.x;
        let dy = center.y - current.y;
        let dist = (dx * dx + dy * dy).sqrt();
        let (ux, uy) = if dist > f64::EPSILON {
            (dx / dist, dy / dist)
        } else {
            (0.0, 0.0)
        };

        let bias = self.config.aim_bias;
        let raw = Point::new(
            center.x - ux * bias * target.width / 2.0,
            center.y - uy * bias * target.height / 2.0,
        );
        self.clamp_inside(raw, target)
    }

    fn clamp_inside(&self, p: Point, target: &BoundingBox) -> Point {
        let width = target.width.max(0.0);
        let height = target.height.max(0.0);
        let mx = self.config.interior_margin_px.max(0.0).min(width / 2.0);
        let my = self.config.interior_margin_px.max(0.0).min(height / 2.0);
        Point::new(
            p.x.clamp(target.x + mx, target.x + width - mx),
            p.y.clamp(target.y + my, target.y + height - my),
        )
    }

    /// 生成从 `current` 到目标元素的轨迹
    ///
    /// 第一个点距起点不超过 `start_jitter_px`，最后一个点恰好是 `aim_point`。
    pub fn path_to<R: Rng + ?Sized>(
        &self,
        current: Point,
        target: &BoundingBox,
        rng: &mut R,
    ) -> Vec<PathStep> {
        let end = self.aim_point(current, target);
        let distance = current.distance(end);

        let points = if distance < self.config.linear_threshold_px {
            let steps = ((distance / 4.0).ceil() as usize).max(2);
            self.sample_curve(current, end, steps, rng, |t| current.lerp(end, t))
        } else {
            let control = self.control_point(current, end, distance, rng);
            let steps = ((distance / self.config.step_px.max(1.0)).round() as usize)
                .max(self.config.min_steps)
                .min(self.config.max_steps.max(self.config.min_steps))
                .max(2);
            self.sample_curve(current, end, steps, rng, |t| quadratic(current, control, end, t))
        };

        self.schedule(points, rng)
    }

    /// 在起点和终点连线的中垂方向上随机取控制点
    fn control_point<R: Rng + ?Sized>(
        &self,
        start: Point,
        end: Point,
        distance: f64,
        rng: &mut R,
    ) -> Point {
        let mid = start.lerp(end, 0.5);
        let nx = -(end.y - start.y) / distance;
        let ny = (end.x - start.x) / distance;
        let offset = symmetric(self.config.control_spread, rng) * distance;
        Point::new(mid.x + nx * offset, mid.y + ny * offset)
    }

    fn sample_curve<R, F>(&self, start: Point, end: Point, steps: usize, rng: &mut R, curve: F) -> Vec<Point>
    where
        R: Rng + ?Sized,
        F: Fn(f64) -> Point,
    {
        (0..=steps)
            .map(|i| {
                if i == 0 {
                    let j = self.config.start_jitter_px;
                    Point::new(start.x + symmetric(j, rng), start.y + symmetric(j, rng))
                } else if i == steps {
                    end
                } else {
                    let p = curve(i as f64 / steps as f64);
                    let j = self.config.path_jitter_px;
                    Point::new(p.x + symmetric(j, rng), p.y + symmetric(j, rng))
                }
            })
            .collect()
    }

    /// 分批分配延迟：两端慢、中间快，总时长落在 `traversal_ms` 区间内
    fn schedule<R: Rng + ?Sized>(&self, points: Vec<Point>, rng: &mut R) -> Vec<PathStep> {
        let total_us = self.config.traversal_ms.sample(rng).as_micros() as u64;

        let batch_min = self.config.batch_min.max(1);
        let batch_max = self.config.batch_max.max(batch_min);
        let mut sizes = Vec::new();
        let mut remaining = points.len();
        while remaining > 0 {
            let size = rng.random_range(batch_min..=batch_max).min(remaining);
            sizes.push(size);
            remaining -= size;
        }

        let count = sizes.len();
        let weights: Vec<f64> = (0..count)
            .map(|i| 1.5 - (PI * (i as f64 + 0.5) / count as f64).sin())
            .collect();
        let weight_sum: f64 = weights.iter().sum();

        let mut steps = Vec::with_capacity(points.len());
        let mut points = points.into_iter();
        let mut acc = 0.0;
        let mut elapsed_us = 0u64;
        for (i, size) in sizes.into_iter().enumerate() {
            acc += weights[i];
            let until_us = if i + 1 == count {
                total_us
            } else {
                (total_us as f64 * acc / weight_sum).round() as u64
            };
            let batch_delay = Duration::from_micros(until_us.saturating_sub(elapsed_us));
            elapsed_us = until_us.max(elapsed_us);

            for (j, point) in points.by_ref().take(size).enumerate() {
                let delay = if j == 0 { batch_delay } else { Duration::ZERO };
                steps.push(PathStep { point, delay });
            }
        }
        steps
    }

    /// 生成输入 `text` 的按键序列
    ///
    /// 每个字母或数字有 `mistake_probability` 的概率先按错一个相邻键再退格；
    /// 空格之后有 `space_pause_probability` 的概率多停顿一会儿。
    pub fn type_text<R: Rng + ?Sized>(&self, text: &str, rng: &mut R) -> Vec<KeyStep> {
        let mistake_p = self.config.mistake_probability.clamp(0.0, 1.0);
        let pause_p = self.config.space_pause_probability.clamp(0.0, 1.0);

        let mut steps = Vec::with_capacity(text.len());
        let mut pending_pause = Duration::ZERO;

        for c in text.chars() {
            let mut delay = self.config.keystroke_ms.sample(rng) + std::mem::take(&mut pending_pause);

            if c.is_alphanumeric() && rng.random_bool(mistake_p) {
                steps.push(KeyStep {
                    key: Keystroke::Char(keyboard::neighbor_key(c, rng)),
                    delay,
                });
                steps.push(KeyStep {
                    key: Keystroke::Backspace,
                    delay: self.config.correction_ms.sample(rng),
                });
                delay = self.config.keystroke_ms.sample(rng);
            }

            steps.push(KeyStep {
                key: Keystroke::Char(c),
                delay,
            });

            if c == ' ' && rng.random_bool(pause_p) {
                pending_pause = self.config.space_pause_ms.sample(rng);
            }
        }
        steps
    }
}

fn quadratic(p0: Point, c: Point, p2: Point, t: f64) -> Point {
    let u = 1.0 - t;
    Point::new(
        u * u * p0.x + 2.0 * u * t * c.x + t * t * p2.x,
        u * u * p0.y + 2.0 * u * t * c.y + t * t * p2.y,
    )
}

/// `[-amount, amount]` 内的均匀随机数
fn symmetric<R: Rng + ?Sized>(amount: f64, rng: &mut R) -> f64 {
    if amount > 0.0 {
        rng.random_range(-amount..=amount)
    } else {
        0.0
    }
}
