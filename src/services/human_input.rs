//! 模拟人类输入 - 业务能力层
//!
//! 把 `MotionSynthesizer` 生成的轨迹和按键序列交给 `PageDriver` 执行，
//! 并在点击前重新校验目标元素。

use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::Rng;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::{HumanizeConfig, MsRange};
use crate::error::{AppError, AppResult};
use crate::infrastructure::{PageDriver, Target};
use crate::services::motion::{MotionSynthesizer, Point};

/// 模拟人类输入
pub struct HumanInput {
    driver: Arc<dyn PageDriver>,
    synth: MotionSynthesizer,
    rng: Mutex<StdRng>,
    pointer: Mutex<Point>,
}

impl HumanInput {
    pub fn new(driver: Arc<dyn PageDriver>, config: HumanizeConfig, rng: StdRng) -> Self {
        Self {
            driver,
            synth: MotionSynthesizer::new(config),
            rng: Mutex::new(rng),
            pointer: Mutex::new(Point::default()),
        }
    }

    pub fn driver(&self) -> &Arc<dyn PageDriver> {
        &self.driver
    }

    fn config(&self) -> &HumanizeConfig {
        self.synth.config()
    }

    /// 当前鼠标位置
    pub fn pointer(&self) -> Point {
        *self.pointer.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 在随机数发生器上执行一次计算
    pub fn with_rng<T>(&self, f: impl FnOnce(&mut StdRng) -> T) -> T {
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut rng)
    }

    /// 随机选择 `[0, len)` 内的下标
    pub fn pick_index(&self, len: usize) -> Option<usize> {
        (len > 0).then(|| self.with_rng(|rng| rng.random_range(0..len)))
    }

    /// 在区间内随机停顿
    pub async fn pause(&self, range: MsRange) {
        let delay = self.with_rng(|rng| range.sample(rng));
        if !delay.is_zero() {
            sleep(delay).await;
        }
    }

    /// 移动到目标并点击
    ///
    /// 移动结束后重新校验目标（仍在文档中、可见、在视口内）；校验失败时
    /// 按原选择器重新定位，带退避地重试，全部失败返回 `SynthesisFailure`。
    pub async fn click(&self, target: &Target) -> AppResult<()> {
        let retries = self.config().click_retries;
        let backoff = Duration::from_millis(self.config().click_backoff_ms);

        for attempt in 0..=retries {
            if attempt > 0 {
                debug!("重新定位 {} (第 {}/{} 次重试)", target, attempt, retries);
                sleep(backoff * attempt as u32).await;
            }

            let Some(bbox) = self.driver.bounding_box(target).await? else {
                debug!("未找到元素 {}", target);
                continue;
            };

            let path = {
                let start = self.pointer();
                self.with_rng(|rng| self.synth.path_to(start, &bbox, rng))
            };
            let Some(end) = path.last().map(|step| step.point) else {
                continue;
            };

            for step in &path {
                if !step.delay.is_zero() {
                    sleep(step.delay).await;
                }
                self.driver.move_pointer(step.point).await?;
            }
            *self.pointer.lock().unwrap_or_else(|e| e.into_inner()) = end;

            if !self.driver.is_actionable(target).await? {
                warn!("⚠️ 元素 {} 已失效或不可见，准备重新定位", target);
                continue;
            }

            self.pause(self.config().pre_click_ms).await;
            self.driver.click_at(end).await?;
            return Ok(());
        }

        Err(AppError::SynthesisFailure {
            target: target.to_string(),
            attempts: retries + 1,
        })
    }

    /// 点击输入框后逐键输入文本
    pub async fn type_into(&self, target: &Target, text: &str) -> AppResult<()> {
        self.click(target).await?;
        self.pause(self.config().before_typing_ms).await;

        let steps = self.with_rng(|rng| self.synth.type_text(text, rng));
        for step in steps {
            if !step.delay.is_zero() {
                sleep(step.delay).await;
            }
            self.driver.press_key(step.key).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::motion::{BoundingBox, Keystroke};
    use async_trait::async_trait;
    use rand::SeedableRng;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// 前 `flaky` 次校验失败的驱动
    struct FlakyDriver {
        flaky: usize,
        checks: AtomicUsize,
        clicks: Mutex<Vec<Point>>,
        keys: Mutex<Vec<Keystroke>>,
    }

    impl FlakyDriver {
        fn new(flaky: usize) -> Self {
            Self {
                flaky,
                checks: AtomicUsize::new(0),
                clicks: Mutex::new(Vec::new()),
                keys: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl PageDriver for FlakyDriver {
        async fn count(&self, _selector: &str) -> AppResult<usize> {
            Ok(1)
        }

        async fn bounding_box(&self, _target: &Target) -> AppResult<Option<BoundingBox>> {
            Ok(Some(BoundingBox::new(200.0, 200.0, 100.0, 30.0)))
        }

        async fn is_actionable(&self, _target: &Target) -> AppResult<bool> {
            Ok(self.checks.fetch_add(1, Ordering::SeqCst) >= self.flaky)
        }

        async fn move_pointer(&self, _to: Point) -> AppResult<()> {
            Ok(())
        }

        async fn click_at(&self, at: Point) -> AppResult<()> {
            self.clicks.lock().unwrap().push(at);
            Ok(())
        }

        async fn press_key(&self, key: Keystroke) -> AppResult<()> {
            self.keys.lock().unwrap().push(key);
            Ok(())
        }
    }

    fn input(driver: Arc<FlakyDriver>) -> HumanInput {
        HumanInput::new(driver, HumanizeConfig::instant(), StdRng::seed_from_u64(42))
    }

    #[tokio::test(start_paused = true)]
    async fn test_click_retries_after_stale_target() {
        let driver = Arc::new(FlakyDriver::new(2));
        let human = input(driver.clone());

        human.click(&Target::first(".choice")).await.unwrap();

        assert_eq!(driver.checks.load(Ordering::SeqCst), 3);
        let clicks = driver.clicks.lock().unwrap();
        assert_eq!(clicks.len(), 1);
        assert!(BoundingBox::new(200.0, 200.0, 100.0, 30.0).contains(clicks[0]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_click_gives_up_with_synthesis_failure() {
        let driver = Arc::new(FlakyDriver::new(usize::MAX));
        let human = input(driver.clone());

        let err = human.click(&Target::first("#next-btn")).await.unwrap_err();
        assert!(matches!(err, AppError::SynthesisFailure { attempts: 4, .. }));
        assert!(driver.clicks.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_type_into_sends_every_keystroke() {
        let driver = Arc::new(FlakyDriver::new(0));
        let human = input(driver.clone());

        human.type_into(&Target::first("#choice"), "leasant").await.unwrap();

        let keys = driver.keys.lock().unwrap();
        let steps: Vec<_> = keys
            .iter()
            .map(|k| crate::services::motion::KeyStep {
                key: *k,
                delay: Duration::ZERO,
            })
            .collect();
        assert_eq!(crate::services::motion::KeyStep::replay(&steps), "leasant");
    }

    #[test]
    fn test_pick_index_empty() {
        let human = input(Arc::new(FlakyDriver::new(0)));
        assert_eq!(human.pick_index(0), None);
        assert!(human.pick_index(4).unwrap() < 4);
    }
}
