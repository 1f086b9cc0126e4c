//! 集成测试共用的内存替身：页面、LLM、存储

#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::SeedableRng;

use quiz_autopilot::config::{Config, HumanizeConfig};
use quiz_autopilot::error::{AppError, AppResult};
use quiz_autopilot::infrastructure::{PageDriver, Target};
use quiz_autopilot::models::ProbeSignals;
use quiz_autopilot::services::{
    AnswerCache, BoundingBox, HumanInput, KeyStep, Keystroke, MemoryStore, Oracle, OracleClient,
    OracleConstraints, PageProbe, Point,
};
use quiz_autopilot::workflow::QuestionFlow;

/// 内存中的页面：同时充当探测和驱动
pub struct FakePage {
    pub signals: Mutex<ProbeSignals>,
    pub correct: Mutex<Option<String>>,
    pub word_form: Mutex<Option<String>>,
    /// 不可操作的选项下标
    pub detached: Mutex<HashSet<usize>>,
    pub probe_delay: Duration,
    pub probe_calls: AtomicUsize,
    pub clicks: Mutex<Vec<Target>>,
    pub keys: Mutex<Vec<Keystroke>>,
    last_checked: Mutex<Option<Target>>,
}

impl FakePage {
    pub fn new(signals: ProbeSignals) -> Arc<Self> {
        Self::with_delay(signals, Duration::ZERO)
    }

    pub fn with_delay(signals: ProbeSignals, probe_delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            signals: Mutex::new(signals),
            correct: Mutex::new(None),
            word_form: Mutex::new(None),
            detached: Mutex::new(HashSet::new()),
            probe_delay,
            probe_calls: AtomicUsize::new(0),
            clicks: Mutex::new(Vec::new()),
            keys: Mutex::new(Vec::new()),
            last_checked: Mutex::new(None),
        })
    }

    pub fn show(&self, signals: ProbeSignals) {
        *self.signals.lock().unwrap() = signals;
    }

    pub fn clicked(&self) -> Vec<Target> {
        self.clicks.lock().unwrap().clone()
    }

    pub fn typed(&self) -> String {
        let steps: Vec<KeyStep> = self
            .keys
            .lock()
            .unwrap()
            .iter()
            .map(|key| KeyStep {
                key: *key,
                delay: Duration::ZERO,
            })
            .collect();
        KeyStep::replay(&steps)
    }

    pub fn probe_calls(&self) -> usize {
        self.probe_calls.load(Ordering::SeqCst)
    }

    fn choice_count(&self) -> usize {
        self.signals.lock().unwrap().choices.len()
    }
}

#[async_trait]
impl PageProbe for FakePage {
    async fn signals(&self) -> AppResult<ProbeSignals> {
        self.probe_calls.fetch_add(1, Ordering::SeqCst);
        if !self.probe_delay.is_zero() {
            tokio::time::sleep(self.probe_delay).await;
        }
        Ok(self.signals.lock().unwrap().clone())
    }

    async fn correct_choice(&self) -> AppResult<Option<String>> {
        Ok(self.correct.lock().unwrap().clone())
    }

    async fn word_form(&self) -> AppResult<Option<String>> {
        Ok(self.word_form.lock().unwrap().clone())
    }
}

#[async_trait]
impl PageDriver for FakePage {
    async fn count(&self, selector: &str) -> AppResult<usize> {
        if selector == ".choice" {
            Ok(self.choice_count())
        } else {
            Ok(1)
        }
    }

    async fn bounding_box(&self, target: &Target) -> AppResult<Option<BoundingBox>> {
        if target.selector == ".choice" {
            if target.index >= self.choice_count() {
                return Ok(None);
            }
            let y = 100.0 + 60.0 * target.index as f64;
            return Ok(Some(BoundingBox::new(100.0, y, 240.0, 40.0)));
        }
        Ok(Some(BoundingBox::new(500.0, 600.0, 120.0, 40.0)))
    }

    async fn is_actionable(&self, target: &Target) -> AppResult<bool> {
        *self.last_checked.lock().unwrap() = Some(target.clone());
        let detached = target.selector == ".choice"
            && self.detached.lock().unwrap().contains(&target.index);
        Ok(!detached)
    }

    async fn move_pointer(&self, _to: Point) -> AppResult<()> {
        Ok(())
    }

    async fn click_at(&self, _at: Point) -> AppResult<()> {
        if let Some(target) = self.last_checked.lock().unwrap().clone() {
            self.clicks.lock().unwrap().push(target);
        }
        Ok(())
    }

    async fn press_key(&self, key: Keystroke) -> AppResult<()> {
        self.keys.lock().unwrap().push(key);
        Ok(())
    }
}

/// 按顺序返回预设响应的 LLM
pub struct ScriptedOracle {
    replies: Mutex<VecDeque<AppResult<String>>>,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedOracle {
    pub fn new(replies: Vec<&str>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into_iter().map(|r| Ok(r.to_string())).collect()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(VecDeque::new()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl Oracle for ScriptedOracle {
    async fn request(&self, prompt: &str, _constraints: &OracleConstraints) -> AppResult<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(AppError::oracle_transport("scripted", "connection refused")))
    }

    async fn ready(&self) -> AppResult<()> {
        Ok(())
    }
}

/// 组装好的一套测试环境
pub struct Harness {
    pub page: Arc<FakePage>,
    pub oracle: Arc<ScriptedOracle>,
    pub store: Arc<MemoryStore>,
    pub cache: Arc<AnswerCache>,
    pub flow: Arc<QuestionFlow>,
}

pub fn test_config() -> Config {
    Config {
        humanize: HumanizeConfig::instant(),
        terminal_grace_ms: 0,
        ..Config::default()
    }
}

pub fn harness(page: Arc<FakePage>, oracle: Arc<ScriptedOracle>) -> Harness {
    harness_with_store(page, oracle, Arc::new(MemoryStore::new()))
}

pub fn harness_with_store(
    page: Arc<FakePage>,
    oracle: Arc<ScriptedOracle>,
    store: Arc<MemoryStore>,
) -> Harness {
    let config = test_config();
    let cache = Arc::new(AnswerCache::start(store.clone()));
    let input = Arc::new(HumanInput::new(
        page.clone(),
        config.humanize.clone(),
        StdRng::seed_from_u64(11),
    ));
    let client = Arc::new(OracleClient::new(
        oracle.clone(),
        cache.clone(),
        StdRng::seed_from_u64(12),
    ));
    let flow = Arc::new(
        QuestionFlow::new(page.clone(), input, cache.clone(), client, &config).unwrap(),
    );
    Harness {
        page,
        oracle,
        store,
        cache,
        flow,
    }
}

// ========== 页面信号构造 ==========

pub fn choice_question(text: &str, choices: &[&str]) -> ProbeSignals {
    ProbeSignals {
        question_text: Some(text.to_string()),
        choices: choices.iter().map(|c| c.to_string()).collect(),
        ..ProbeSignals::default()
    }
}

pub fn practice(in_known_territory: bool) -> ProbeSignals {
    ProbeSignals {
        question_text: Some("pleasant".to_string()),
        choices: vec!["agreeable".into(), "gloomy".into()],
        practice_marker: true,
        known_territory_marker: in_known_territory,
        ..ProbeSignals::default()
    }
}

pub fn fill_blank(text: &str, hint: &str, blank_length: usize, first_letter: &str) -> ProbeSignals {
    ProbeSignals {
        question_text: Some(text.to_string()),
        answer_input: true,
        hint: Some(hint.to_string()),
        blank_length: Some(blank_length),
        first_letter: Some(first_letter.to_string()),
        ..ProbeSignals::default()
    }
}

pub fn terminal() -> ProbeSignals {
    ProbeSignals {
        terminal_marker: true,
        ..ProbeSignals::default()
    }
}
