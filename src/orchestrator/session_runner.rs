//! 会话运行器 - 编排层
//!
//! ## 职责
//!
//! 本模块是整个应用的入口，负责答题会话的启动、运行和收尾。
//!
//! ## 核心功能
//!
//! 1. **应用初始化**：连接（或启动）浏览器、创建 JsExecutor 和各项能力
//! 2. **会话引导**：可选登录 → 点击开始训练 → 等待第一道题 → 检查 LLM 就绪
//! 3. **轮询运行**：交给 `Scheduler`，Ctrl-C 时停止触发
//! 4. **资源收尾**：等待缓存写完、输出统计、释放浏览器

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chromiumoxide::Browser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::time::{sleep, Instant};
use tracing::{error, info, warn};

use crate::browser;
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::infrastructure::{JsExecutor, PageDriver, Target};
use crate::orchestrator::scheduler::{jittered_period, Scheduler};
use crate::services::{
    AnswerCache, DomProbe, HumanInput, JsonFileStore, LlmService, OracleClient,
};
use crate::utils::logging;
use crate::workflow::QuestionFlow;

/// 查找元素时的轮询间隔
const ELEMENT_POLL: Duration = Duration::from_millis(500);

/// 应用主结构
pub struct App {
    config: Config,
    browser: Browser,
    launched: bool,
    cache: Arc<AnswerCache>,
    scheduler: Scheduler,
}

impl App {
    /// 初始化应用并完成会话引导
    pub async fn initialize(config: Config) -> Result<Self> {
        logging::log_startup(&config);

        // 连接浏览器
        let (browser, page) = if config.launch_browser {
            browser::launch_browser(&config).await?
        } else {
            browser::connect_to_browser_and_page(config.browser_debug_port, &config.target_url)
                .await?
        };
        let launched = config.launch_browser;

        // 创建 JsExecutor（持有 page）
        let executor = Arc::new(JsExecutor::new(page));

        // 答案缓存
        let store = Arc::new(JsonFileStore::new(&config.results_file));
        store.ensure_exists().await?;
        let cache = Arc::new(AnswerCache::start(store));

        let input = Arc::new(HumanInput::new(
            executor.clone(),
            config.humanize.clone(),
            StdRng::from_os_rng(),
        ));
        let probe = Arc::new(DomProbe::new(executor.clone(), config.selectors.clone()));
        let oracle = Arc::new(OracleClient::new(
            Arc::new(LlmService::new(&config)),
            cache.clone(),
            StdRng::from_os_rng(),
        ));

        bootstrap(&config, &executor, &input).await?;
        oracle.wait_ready(config.oracle_ready_timeout()).await?;

        let flow = Arc::new(QuestionFlow::new(probe, input, cache.clone(), oracle, &config)?);
        let period = jittered_period(
            config.poll_base_ms,
            config.poll_jitter_ms,
            &mut StdRng::from_os_rng(),
        );
        let scheduler = Scheduler::new(flow, period);

        Ok(Self {
            config,
            browser,
            launched,
            cache,
            scheduler,
        })
    }

    /// 运行应用主逻辑
    pub async fn run(mut self) -> Result<()> {
        // Ctrl-C：停止触发新的一轮
        let stop = self.scheduler.stop_handle();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("\n⏹️ 收到中断信号，正在安全退出...");
                stop.send_replace(true);
            }
        });

        let stats = self.scheduler.run().await;

        info!("💾 等待缓存写入完成...");
        self.cache.shutdown().await;

        logging::print_final_stats(&stats, &self.config.output_log_file);

        if self.launched {
            if let Err(e) = self.browser.close().await {
                warn!("⚠️ 关闭浏览器失败: {}", e);
            }
        }
        Ok(())
    }
}

/// 会话引导：登录 → 开始训练 → 等待第一道题
async fn bootstrap(config: &Config, executor: &JsExecutor, input: &HumanInput) -> AppResult<()> {
    let selectors = &config.selectors;

    if let (Some(username), Some(password)) = (&config.username, &config.password) {
        info!("🔑 正在登录...");
        if !wait_for_element(executor, &selectors.login_username, config.first_question_timeout()).await? {
            return Err(AppError::Fatal(format!(
                "未找到登录输入框: {}",
                selectors.login_username
            )));
        }
        input
            .type_into(&Target::first(&selectors.login_username), username)
            .await?;
        input
            .type_into(&Target::first(&selectors.login_password), password)
            .await?;
        if executor.count(&selectors.login_button).await? == 0 {
            return Err(AppError::Fatal(format!(
                "未找到登录按钮: {}",
                selectors.login_button
            )));
        }
        input.click(&Target::first(&selectors.login_button)).await?;
        if let Err(e) = executor.wait_for_navigation().await {
            warn!("⚠️ 等待登录跳转失败: {}", e);
        }
        info!("✓ 登录完成");
    }

    if wait_for_element(executor, &selectors.start_training, config.first_question_timeout()).await? {
        input.pause(config.humanize.practice_pre_ms).await;
        input.click(&Target::first(&selectors.start_training)).await?;
        info!("✓ 已点击开始训练");
    } else {
        warn!("⚠️ 未找到开始训练按钮，假设已在训练中");
    }

    info!("⏳ 等待第一道题...");
    if !wait_for_element(executor, &selectors.question, config.first_question_timeout()).await? {
        error!("❌ {} 秒内没有出现题目", config.first_question_timeout_secs);
        return Err(AppError::Fatal("未找到第一道题".to_string()));
    }
    info!("✓ 第一道题已出现");
    Ok(())
}

/// 在超时时间内轮询等待元素出现
async fn wait_for_element(
    driver: &dyn PageDriver,
    selector: &str,
    timeout: Duration,
) -> AppResult<bool> {
    let deadline = Instant::now() + timeout;
    loop {
        match driver.count(selector).await {
            Ok(n) if n > 0 => return Ok(true),
            Ok(_) => {}
            Err(e) => warn!("⚠️ 查询元素 {} 失败: {}", selector, e),
        }
        if Instant::now() >= deadline {
            return Ok(false);
        }
        sleep(ELEMENT_POLL).await;
    }
}
