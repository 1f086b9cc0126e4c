//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责会话的生命周期和轮询调度，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `session_runner` - 会话运行器
//! - 管理应用生命周期（初始化、运行、清理）
//! - 管理浏览器资源（Browser、JsExecutor）
//! - 完成登录、开始训练、等待第一道题
//! - 处理 Ctrl-C，等待缓存写完
//! - 输出最终统计信息
//!
//! ### `scheduler` - 轮询调度器
//! - 抖动过的固定间隔触发
//! - 防重入：上一轮未结束时丢弃触发
//! - 独占会话状态（SessionState / SessionStats）
//!
//! ## 层次关系
//!
//! ```text
//! session_runner (一次会话)
//!     ↓
//! scheduler (每次触发)
//!     ↓
//! workflow::QuestionFlow (一轮：识别 + 处理)
//!     ↓
//! services (能力层：probe / input / cache / oracle)
//!     ↓
//! infrastructure (基础设施：JsExecutor)
//! ```
//!
//! ## 设计原则
//!
//! 1. **单一职责**：session_runner 管生命周期，scheduler 管节奏
//! 2. **资源隔离**：只有编排层持有 Browser
//! 3. **向下依赖**：编排层 → workflow → services → infrastructure
//! 4. **无业务逻辑**：只做调度和统计，不做具体题型判断

pub mod scheduler;
pub mod session_runner;

// 重新导出主要类型
pub use scheduler::{jittered_period, Scheduler, SessionCore};
pub use session_runner::App;
