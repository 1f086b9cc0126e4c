use std::path::Path;
use std::time::Duration;

use rand::Rng;
use serde::Deserialize;

use crate::error::AppResult;

/// 程序配置文件
#[derive(Clone, Debug)]
pub struct Config {
    /// 浏览器调试端口
    pub browser_debug_port: u16,
    /// 是否自行启动浏览器（否则连接到调试端口）
    pub launch_browser: bool,
    /// 浏览器可执行文件路径（启动模式下可选）
    pub chrome_executable: Option<String>,
    /// 目标URL
    pub target_url: String,
    /// 答案缓存文件
    pub results_file: String,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    /// 输出日志文件
    pub output_log_file: String,
    /// 行为参数文件（TOML，可选）
    pub humanize_config_path: Option<String>,
    // --- 登录配置 ---
    pub username: Option<String>,
    pub password: Option<String>,
    // --- LLM 配置 ---
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
    /// LLM 就绪检查的超时时间（秒）
    pub oracle_ready_timeout_secs: u64,
    // --- 轮询配置 ---
    pub poll_base_ms: u64,
    pub poll_jitter_ms: u64,
    /// 点击结束按钮后的等待时间
    pub terminal_grace_ms: u64,
    /// 等待第一道题出现的超时时间（秒）
    pub first_question_timeout_secs: u64,
    /// 行为参数
    pub humanize: HumanizeConfig,
    /// 页面选择器
    pub selectors: Selectors,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            browser_debug_port: 9222,
            launch_browser: false,
            chrome_executable: None,
            target_url: "https://membean.com/login".to_string(),
            results_file: "results.json".to_string(),
            verbose_logging: false,
            output_log_file: "session_log.txt".to_string(),
            humanize_config_path: None,
            username: None,
            password: None,
            llm_api_key: String::new(),
            llm_api_base_url: "https://api.openai.com/v1".to_string(),
            llm_model_name: "gpt-4o-mini".to_string(),
            oracle_ready_timeout_secs: 30,
            poll_base_ms: 2000,
            poll_jitter_ms: 500,
            terminal_grace_ms: 3000,
            first_question_timeout_secs: 30,
            humanize: HumanizeConfig::default(),
            selectors: Selectors::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            browser_debug_port: std::env::var("BROWSER_DEBUG_PORT").ok().and_then(|v| v.parse().ok()).unwrap_or(default.browser_debug_port),
            launch_browser: std::env::var("LAUNCH_BROWSER").ok().and_then(|v| v.parse().ok()).unwrap_or(default.launch_browser),
            chrome_executable: std::env::var("CHROME_EXECUTABLE").ok().or(default.chrome_executable),
            target_url: std::env::var("TARGET_URL").unwrap_or(default.target_url),
            results_file: std::env::var("RESULTS_FILE").unwrap_or(default.results_file),
            verbose_logging: std::env::var("VERBOSE_LOGGING").ok().and_then(|v| v.parse().ok()).unwrap_or(default.verbose_logging),
            output_log_file: std::env::var("OUTPUT_LOG_FILE").unwrap_or(default.output_log_file),
            humanize_config_path: std::env::var("HUMANIZE_CONFIG").ok().or(default.humanize_config_path),
            username: std::env::var("QUIZ_USERNAME").ok().or(default.username),
            password: std::env::var("QUIZ_PASSWORD").ok().or(default.password),
            llm_api_key: std::env::var("LLM_API_KEY").or_else(|_| std::env::var("OPENAI_API_KEY")).unwrap_or(default.llm_api_key),
            llm_api_base_url: std::env::var("LLM_API_BASE_URL").unwrap_or(default.llm_api_base_url),
            llm_model_name: std::env::var("LLM_MODEL_NAME").unwrap_or(default.llm_model_name),
            oracle_ready_timeout_secs: std::env::var("ORACLE_READY_TIMEOUT_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.oracle_ready_timeout_secs),
            poll_base_ms: std::env::var("POLL_BASE_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.poll_base_ms),
            poll_jitter_ms: std::env::var("POLL_JITTER_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.poll_jitter_ms),
            terminal_grace_ms: std::env::var("TERMINAL_GRACE_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.terminal_grace_ms),
            first_question_timeout_secs: std::env::var("FIRST_QUESTION_TIMEOUT_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.first_question_timeout_secs),
            humanize: default.humanize,
            selectors: default.selectors,
        }
    }

    /// 从 TOML 文件加载行为参数和选择器（如果配置了路径）
    pub fn load_overrides(mut self) -> AppResult<Self> {
        if let Some(path) = self.humanize_config_path.clone() {
            let file = OverrideFile::load(Path::new(&path))?;
            self.humanize = file.humanize;
            self.selectors = file.selectors;
        }
        Ok(self)
    }

    pub fn oracle_ready_timeout(&self) -> Duration {
        Duration::from_secs(self.oracle_ready_timeout_secs)
    }

    pub fn terminal_grace(&self) -> Duration {
        Duration::from_millis(self.terminal_grace_ms)
    }

    pub fn first_question_timeout(&self) -> Duration {
        Duration::from_secs(self.first_question_timeout_secs)
    }
}

/// TOML 覆盖文件的结构
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct OverrideFile {
    humanize: HumanizeConfig,
    selectors: Selectors,
}

impl OverrideFile {
    fn load(path: &Path) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }
}

/// 毫秒区间 `[min, max]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct MsRange {
    pub min: u64,
    pub max: u64,
}

impl MsRange {
    pub const fn new(min: u64, max: u64) -> Self {
        Self { min, max }
    }

    /// 在区间内均匀取值
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let (lo, hi) = if self.min <= self.max {
            (self.min, self.max)
        } else {
            (self.max, self.min)
        };
        Duration::from_millis(rng.random_range(lo..=hi))
    }
}

/// 模拟人类操作的行为参数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HumanizeConfig {
    /// 位移小于该值时使用直线插值
    pub linear_threshold_px: f64,
    /// 落点向移动反方向偏移的比例（相对半宽/半高）
    pub aim_bias: f64,
    /// 目标内部保留的边距
    pub interior_margin_px: f64,
    /// 起点抖动上限
    pub start_jitter_px: f64,
    /// 路径中间点抖动上限
    pub path_jitter_px: f64,
    /// 贝塞尔控制点的横向偏移比例（相对距离）
    pub control_spread: f64,
    /// 相邻路径点的大致间距
    pub step_px: f64,
    pub min_steps: usize,
    pub max_steps: usize,
    /// 每批移动的点数
    pub batch_min: usize,
    pub batch_max: usize,
    /// 整段移动的总耗时
    pub traversal_ms: MsRange,
    /// 每个字符打错一次的概率
    pub mistake_probability: f64,
    /// 空格后额外停顿的概率
    pub space_pause_probability: f64,
    pub keystroke_ms: MsRange,
    pub correction_ms: MsRange,
    pub space_pause_ms: MsRange,
    /// 移动到位后点击前的停顿
    pub pre_click_ms: MsRange,
    /// 点击失败后重新定位元素的次数
    pub click_retries: usize,
    pub click_backoff_ms: u64,
    // --- 题型相关的停顿 ---
    pub practice_pre_ms: MsRange,
    pub practice_gap_ms: MsRange,
    pub image_choice_ms: MsRange,
    pub oracle_think_ms: MsRange,
    pub before_typing_ms: MsRange,
}

impl Default for HumanizeConfig {
    fn default() -> Self {
        Self {
            linear_threshold_px: 20.0,
            aim_bias: 0.25,
            interior_margin_px: 3.0,
            start_jitter_px: 1.5,
            path_jitter_px: 2.0,
            control_spread: 0.3,
            step_px: 14.0,
            min_steps: 12,
            max_steps: 48,
            batch_min: 2,
            batch_max: 4,
            traversal_ms: MsRange::new(400, 950),
            mistake_probability: 0.04,
            space_pause_probability: 0.3,
            keystroke_ms: MsRange::new(50, 150),
            correction_ms: MsRange::new(150, 350),
            space_pause_ms: MsRange::new(250, 700),
            pre_click_ms: MsRange::new(100, 300),
            click_retries: 3,
            click_backoff_ms: 200,
            practice_pre_ms: MsRange::new(1500, 2500),
            practice_gap_ms: MsRange::new(800, 1500),
            image_choice_ms: MsRange::new(1000, 2500),
            oracle_think_ms: MsRange::new(2000, 5000),
            before_typing_ms: MsRange::new(500, 1000),
        }
    }
}

impl HumanizeConfig {
    /// 所有停顿都为零的参数，测试用
    pub fn instant() -> Self {
        let zero = MsRange::new(0, 0);
        Self {
            traversal_ms: zero,
            keystroke_ms: zero,
            correction_ms: zero,
            space_pause_ms: zero,
            pre_click_ms: zero,
            click_backoff_ms: 0,
            practice_pre_ms: zero,
            practice_gap_ms: zero,
            image_choice_ms: zero,
            oracle_think_ms: zero,
            before_typing_ms: zero,
            ..Self::default()
        }
    }
}

/// 页面选择器
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Selectors {
    pub question: String,
    pub choice: String,
    pub correct_choice: String,
    pub question_image: String,
    pub next_button: String,
    pub answer_box: String,
    pub answer_input: String,
    pub hint: String,
    pub first_letter: String,
    pub word_form: String,
    pub known_territory: String,
    pub stop_prompt: String,
    pub stop_button: String,
    pub login_username: String,
    pub login_password: String,
    pub login_button: String,
    pub start_training: String,
    /// 图片题的题干正则
    pub image_question_pattern: String,
}

impl Default for Selectors {
    fn default() -> Self {
        Self {
            question: "#single-question".to_string(),
            choice: ".choice".to_string(),
            correct_choice: ".choice.correct".to_string(),
            question_image: "#single-question img, .question-image img".to_string(),
            next_button: "#next-btn".to_string(),
            answer_box: "#answer-box".to_string(),
            answer_input: "#choice".to_string(),
            hint: ".hint, #answer-box .clue".to_string(),
            first_letter: ".first-letter, #answer-box .letter".to_string(),
            word_form: "h1.wordform".to_string(),
            known_territory: ".ikt, .in-known-territory".to_string(),
            stop_prompt: ".stop-prompt, #session-complete".to_string(),
            stop_button: "#stop-btn, .stop-prompt button".to_string(),
            login_username: "#username".to_string(),
            login_password: "#password".to_string(),
            login_button: "#login > div:nth-child(4) > button".to_string(),
            start_training: "#startTrainingBtn".to_string(),
            image_question_pattern: r"(?i)\b(image|picture|photo|illustration|shown)\b".to_string(),
        }
    }
}
