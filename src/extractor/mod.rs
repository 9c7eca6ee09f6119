//! 提取模块：从原始响应中派生匹配字段
pub mod title_extractor;

pub use self::title_extractor::TitleExtractor;
