use anyhow::Result;
use quiz_autopilot::utils::logging;
use quiz_autopilot::{App, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // 加载配置
    let config = Config::from_env().load_overrides()?;

    // 初始化日志
    logging::init_log_file(&config.output_log_file)?;
    logging::init(config.verbose_logging, &config.output_log_file)?;

    // 初始化并运行应用
    App::initialize(config).await?.run().await?;

    Ok(())
}
