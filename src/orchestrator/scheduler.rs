//! 轮询调度器 - 编排层
//!
//! ## 职责
//!
//! 1. **定时触发**：按固定（启动时随机抖动过的）间隔触发，启动后立即触发一次
//! 2. **防重入**：用 `try_lock_owned` 抢占会话状态，抢不到说明上一轮还没结束，直接丢弃本次触发
//! 3. **停止**：收到结束题型或外部停止信号后不再触发，等待进行中的一轮结束

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::models::{SessionState, SessionStats};
use crate::workflow::{CycleOutcome, QuestionFlow};

/// 一轮处理独占的会话数据
#[derive(Debug, Default)]
pub struct SessionCore {
    pub state: SessionState,
    pub stats: SessionStats,
}

/// 轮询调度器
pub struct Scheduler {
    flow: Arc<QuestionFlow>,
    core: Arc<Mutex<SessionCore>>,
    skipped: Arc<AtomicUsize>,
    period: Duration,
    stop: watch::Sender<bool>,
}

/// 轮询间隔：基础值加上 `[0, jitter]` 的随机抖动，启动时确定一次
pub fn jittered_period<R: Rng + ?Sized>(base_ms: u64, jitter_ms: u64, rng: &mut R) -> Duration {
    Duration::from_millis(base_ms + rng.random_range(0..=jitter_ms))
}

impl Scheduler {
    pub fn new(flow: Arc<QuestionFlow>, period: Duration) -> Self {
        let (stop, _) = watch::channel(false);
        Self {
            flow,
            core: Arc::new(Mutex::new(SessionCore::default())),
            skipped: Arc::new(AtomicUsize::new(0)),
            period,
            stop,
        }
    }

    /// 停止信号的发送端（Ctrl-C 处理等外部调用方使用）
    pub fn stop_handle(&self) -> watch::Sender<bool> {
        self.stop.clone()
    }

    pub fn is_stopped(&self) -> bool {
        *self.stop.borrow()
    }

    pub fn skipped_ticks(&self) -> usize {
        self.skipped.load(Ordering::SeqCst)
    }

    /// 触发一次
    ///
    /// 上一轮仍在进行时直接丢弃，返回 `None`；否则在后台开始新的一轮。
    pub fn tick(&self) -> Option<JoinHandle<CycleOutcome>> {
        let guard = match self.core.clone().try_lock_owned() {
            Ok(guard) => guard,
            Err(_) => {
                self.skipped.fetch_add(1, Ordering::SeqCst);
                debug!("上一轮尚未结束，跳过本次触发");
                return None;
            }
        };

        let flow = self.flow.clone();
        let stop = self.stop.clone();
        Some(tokio::spawn(async move {
            let mut guard = guard;
            let SessionCore { state, stats } = &mut *guard;
            let outcome = match flow.run(state, stats).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    stats.failed_cycles += 1;
                    error!("[第 {} 轮] ❌ 处理失败: {}", stats.cycles, e);
                    CycleOutcome::Continue
                }
            };
            if outcome == CycleOutcome::Terminate {
                info!("🛑 会话结束，停止轮询");
                stop.send_replace(true);
            }
            outcome
        }))
    }

    /// 运行轮询循环，直到会话结束或收到停止信号
    ///
    /// 返回前等待进行中的一轮结束，返回最终统计。
    pub async fn run(&self) -> SessionStats {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut stop_rx = self.stop.subscribe();

        info!("🔁 开始轮询，间隔 {}ms", self.period.as_millis());
        loop {
            let stopped = *stop_rx.borrow_and_update();
            if stopped {
                break;
            }
            tokio::select! {
                biased;
                changed = stop_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    // tick 只负责启动，不等待本轮结束
                    let _ = self.tick();
                }
            }
        }

        // 等待进行中的一轮结束
        let core = self.core.lock().await;
        let mut stats = core.stats.clone();
        stats.skipped_ticks = self.skipped_ticks();
        stats
    }
}
