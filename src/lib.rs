//! # Quiz Autopilot
//!
//! 一个在自适应单词测验网站上自动答题的 Rust 应用程序
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有稀缺资源（Page），只暴露能力
//! - `JsExecutor` - 唯一的 page owner，提供 eval() 和输入事件能力
//! - `PageDriver` - 读取元素位置、注入鼠标键盘事件的抽象
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"
//! - `MotionSynthesizer` / `HumanInput` - 模拟人类的鼠标轨迹和按键节奏
//! - `DomProbe` - 读取页面信号
//! - `AnswerCache` - 去重的答案缓存，单一写入任务
//! - `OracleClient` / `LlmService` - LLM 推断、校验、重试和随机兜底
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一轮"的完整处理流程
//! - `Classifier` - 规则表识别题型
//! - `QuestionFlow` - 按题型分派处理
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/scheduler` - 抖动间隔轮询，防重入
//! - `orchestrator/session_runner` - 启动引导、运行和收尾
//!
//! ## 模块结构

pub mod browser;
pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use browser::{connect_to_browser_and_page, launch_browser};
pub use config::Config;
pub use error::{AppError, AppResult};
pub use infrastructure::JsExecutor;
pub use models::{Question, QuestionType, SessionState};
pub use orchestrator::{App, Scheduler};
pub use workflow::{CycleOutcome, QuestionFlow};
