use anyhow::Result;
/// 日志工具模块
///
/// 提供日志初始化、格式化和输出的辅助函数
use std::fs::{self, OpenOptions};
use std::sync::Mutex;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::Config;
use crate::models::SessionStats;

/// 初始化日志：终端输出 + 追加写入日志文件
///
/// `RUST_LOG` 优先；未设置时按 `verbose` 选择 `debug` 或 `info`。
pub fn init(verbose: bool, log_file_path: &str) -> Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file_path)?;

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .with(
            fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(Mutex::new(file)),
        )
        .try_init()?;
    Ok(())
}

/// 初始化日志文件
///
/// # 参数
/// - `log_file_path`: 日志文件路径
pub fn init_log_file(log_file_path: &str) -> Result<()> {
    let log_header = format!(
        "{}\n答题会话日志 - {}\n{}\n\n",
        "=".repeat(60),
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        "=".repeat(60)
    );
    fs::write(log_file_path, log_header)?;
    Ok(())
}

/// 记录程序启动信息
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 自动答题模式");
    info!("🌐 目标页面: {}", config.target_url);
    info!("🤖 LLM 模型: {}", config.llm_model_name);
    info!(
        "⏱️ 轮询间隔: {}ms + 0~{}ms",
        config.poll_base_ms, config.poll_jitter_ms
    );
    info!("💾 答案缓存: {}", config.results_file);
    info!("{}", "=".repeat(60));
}

/// 打印最终统计信息
///
/// # 参数
/// - `stats`: 会话统计
/// - `log_file_path`: 日志文件路径
pub fn print_final_stats(stats: &SessionStats, log_file_path: &str) {
    info!("\n{}", "=".repeat(60));
    info!("📊 会话结束统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!(
        "🔁 轮次: {} (跳过 {}，失败 {})",
        stats.cycles, stats.skipped_ticks, stats.failed_cycles
    );
    info!(
        "📋 练习 {} / 填空 {} / 图片 {} / 选择 {} / 未知 {}",
        stats.practice, stats.fill_blank, stats.image_choice, stats.choice, stats.unknown
    );
    info!(
        "✅ 缓存命中 {} / 页面答案 {} / LLM {} / 随机 {}",
        stats.cache_hits, stats.page_revealed, stats.oracle_answers, stats.fallbacks
    );
    info!("{}", "=".repeat(60));
    info!("\n日志已保存至: {}", log_file_path);
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
