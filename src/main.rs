use anyhow::Result;
use lens_ocr_service::utils::logging;
use lens_ocr_service::{App, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // 加载配置
    let config = Config::load()?;

    // 初始化日志
    logging::init(&config.log_level);

    // 初始化并运行应用
    App::initialize(config).await?.run().await?;

    Ok(())
}
