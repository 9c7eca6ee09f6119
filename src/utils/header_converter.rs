//! Header格式转换工具
//! 将响应头转换为用于匹配的原始文本块

use reqwest::header::HeaderMap;

/// Header转换工具
pub struct HeaderConverter;

impl HeaderConverter {
    /// 将HeaderMap展平为"Key: Value\n"格式的原始文本块
    /// 同名Header的多个值以", "连接为一行
    pub fn to_raw_text(header_map: &HeaderMap) -> String {
        let mut raw = String::new();

        for key in header_map.keys() {
            let values: Vec<&str> = header_map
                .get_all(key)
                .iter()
                .filter_map(|v| v.to_str().ok())
                .collect();

            raw.push_str(key.as_str());
            raw.push_str(": ");
            raw.push_str(&values.join(", "));
            raw.push('\n');
        }

        raw
    }
}
