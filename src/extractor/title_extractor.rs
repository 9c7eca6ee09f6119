//! 标题提取器
//! 从HTML body中单次正则提取第一个title标签内文

use once_cell::sync::Lazy;
use regex::Regex;

static TITLE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)<title[^>]*>([^<]+)</title>"#).unwrap()
});

/// 标题提取工具
pub struct TitleExtractor;

impl TitleExtractor {
    /// 提取第一个title标签的内文（trim后），无title返回空字符串
    pub fn extract(body: &str) -> String {
        TITLE_REGEX
            .captures(body)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_default()
    }
}
