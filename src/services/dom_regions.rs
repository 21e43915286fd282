//! 渲染页面中的 OCR 片段提取
//!
//! 上游把每一行识别结果渲染成一个带 `aria-label` 的 div，
//! 位置写在 `style` 里，形如 `top: calc(12.5% + 3px)`，百分比相对于原图尺寸。
//! 类名和属性约定都可能随上游改版失效，相关常量集中在本文件。

use std::collections::HashMap;
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use crate::browser::AutomatedBrowser;
use crate::error::AppResult;
use crate::models::region::{format_angle, pixel_style};
use crate::models::{Bounds, BoundingPoly, RawGeometry, TextRegion};

/// 出现即代表识别结果已渲染
pub const MARKER_SELECTOR: &str = "div.lv6PAb";

/// 读取所有候选片段
pub const FRAGMENT_QUERY_SCRIPT: &str = r#"
(() => Array.from(document.querySelectorAll("div[class*='lv6PAb'][aria-label]")).map(n => ({
    label: n.getAttribute("aria-label") || "",
    style: n.getAttribute("style") || "",
    lineIndex: n.getAttribute("data-line-index") || ""
})))()
"#;

/// DOM 中的一个片段
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DomFragment {
    pub label: String,
    pub style: String,
    pub line_index: String,
}

/// 样式解析器，正则只编译一次
struct StyleParser {
    calc: Regex,
    rotate: Regex,
}

impl StyleParser {
    fn new() -> AppResult<Self> {
        Ok(Self {
            calc: Regex::new(r"calc\(([\d.]+)%\s*([+-])\s*([\d.]+)px\)")?,
            rotate: Regex::new(r"rotate\(([-\d.]+)deg\)")?,
        })
    }

    /// `calc(P% ± Npx)` 换算为像素，无法识别时为 0
    fn calc(&self, value: &str, dim: f64) -> f64 {
        let Some(caps) = self.calc.captures(value) else {
            return 0.0;
        };
        let pct: f64 = caps[1].parse().unwrap_or(0.0);
        let offset: f64 = caps[3].parse().unwrap_or(0.0);
        let base = dim * pct / 100.0;
        if &caps[2] == "-" {
            base - offset
        } else {
            base + offset
        }
    }

    fn rotation(&self, style: &str) -> f64 {
        self.rotate
            .captures(style)
            .and_then(|caps| caps[1].parse().ok())
            .unwrap_or(0.0)
    }

    /// 片段转为文字区域，不符合约定的片段返回 `None`
    fn region(&self, fragment: &DomFragment, width: f64, height: f64) -> Option<TextRegion> {
        if fragment.line_index.trim().is_empty() {
            return None;
        }
        let text = fragment.label.trim();
        if text.is_empty() || !fragment.style.contains("calc(") {
            return None;
        }

        let kv = style_properties(&fragment.style);
        let prop = |name: &str| kv.get(name).cloned().unwrap_or_default();
        let (top_str, left_str) = (prop("top"), prop("left"));
        let (width_str, height_str) = (prop("width"), prop("height"));

        let top = self.calc(&top_str, height);
        let left = self.calc(&left_str, width);
        let wid = self.calc(&width_str, width);
        let hei = self.calc(&height_str, height);
        let rotate = self.rotation(&fragment.style);

        let bounds = Bounds {
            left: left as i64,
            right: (left + wid) as i64,
            top: top as i64,
            bottom: (top + hei) as i64,
        };
        Some(TextRegion {
            description: text.to_string(),
            bounding_poly: BoundingPoly::from_bounds(bounds),
            rotate,
            style: pixel_style(
                top as i64,
                left as i64,
                wid as i64,
                hei as i64,
                format_angle(rotate),
            ),
            raw: Some(RawGeometry {
                raw_style: fragment.style.clone(),
                top_str,
                left_str,
                width_str,
                height_str,
            }),
        })
    }
}

/// `a: b; c: d` 形式的样式拆成键值对
fn style_properties(style: &str) -> HashMap<String, String> {
    style
        .split(';')
        .filter_map(|part| part.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect()
}

/// 片段列表转为文字区域，保持 DOM 顺序
pub fn fragments_to_regions(
    fragments: &[DomFragment],
    width: u32,
    height: u32,
) -> AppResult<Vec<TextRegion>> {
    let parser = StyleParser::new()?;
    Ok(fragments
        .iter()
        .filter_map(|f| parser.region(f, width as f64, height as f64))
        .collect())
}

/// 在已导航到结果页的浏览器中提取文字区域
pub async fn extract_regions(
    browser: &dyn AutomatedBrowser,
    width: u32,
    height: u32,
    timeout: Duration,
) -> AppResult<Vec<TextRegion>> {
    browser.wait_for_visible(MARKER_SELECTOR, timeout).await?;
    let value = browser.evaluate(FRAGMENT_QUERY_SCRIPT).await?;
    let fragments: Vec<DomFragment> = serde_json::from_value(value)?;
    debug!("页面中共有 {} 个候选片段", fragments.len());
    fragments_to_regions(&fragments, width, height)
}
