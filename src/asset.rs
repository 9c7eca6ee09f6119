//! HTTP资产数据模型
//! 匹配流程消费的已抓取响应，匹配结果（技术名列表）也回写到这里

use crate::extractor::TitleExtractor;
use crate::rule::model::Location;

/// 已抓取的HTTP资产
#[derive(Debug, Clone, Default)]
pub struct HttpAsset {
    pub url: String,
    pub status_code: u16,
    // 原始响应头字符串（用于匹配）
    pub raw_headers: String,
    pub body: String,
    // 从body中提取的title
    pub title: String,
    // 已识别的技术名列表（大小写不敏感去重）
    pub technologies: Vec<String>,
}

impl HttpAsset {
    /// 创建资产并自动从body提取title
    pub fn new(url: String, status_code: u16, raw_headers: String, body: String) -> Self {
        let title = TitleExtractor::extract(&body);
        Self {
            url,
            status_code,
            raw_headers,
            body,
            title,
            technologies: Vec::new(),
        }
    }

    /// 根据location获取匹配数据
    pub fn field(&self, location: Location) -> &str {
        match location {
            Location::Title => &self.title,
            Location::Header => &self.raw_headers,
            Location::Body => &self.body,
        }
    }

    /// 追加技术名（大小写不敏感去重）
    pub fn add_technology(&mut self, name: &str) {
        let lower = name.to_lowercase();
        let exists = self
            .technologies
            .iter()
            .any(|tech| tech.to_lowercase() == lower);
        if !exists {
            self.technologies.push(name.to_string());
        }
    }
}
