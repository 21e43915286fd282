/// 日志工具模块
///
/// 提供日志初始化和格式化输出的辅助函数
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

/// 初始化日志
///
/// 优先使用 `RUST_LOG`，未设置时使用配置中的日志级别
pub fn init(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("lens_ocr_service={},tower_http=warn", level)));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// 记录程序启动信息
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - Lens OCR 服务");
    info!(
        "📊 worker 数量: 图片翻译 {} / 文字识别 {}",
        config.max_workers_images, config.max_workers_text
    );
    info!("⏱️ 结果保留: {} 秒", config.results_ttl_secs);
    info!(
        "🌐 浏览器空闲回收: {} 秒 | 后台 worker: {}",
        config.chrome_idle_secs,
        if config.enable_background_workers { "启动时" } else { "首次提交时" }
    );
    match &config.cookie_json_url {
        Some(url) => info!("🍪 远程 Cookie: {}", truncate_text(url, 60)),
        None => info!("🍪 远程 Cookie: 未配置"),
    }
    info!("{}", "=".repeat(60));
}

/// 截断长文本用于日志显示
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("短文本", 10), "短文本");
        assert_eq!(truncate_text("abcdef", 3), "abc...");
    }
}
