//! # rswebfinger
//!
//! 两阶段Web指纹识别引擎：
//! 规则加载后从条件树提取字面量，构建title/header/body三套Aho-Corasick自动机做候选预筛选，
//! 再对候选指纹的布尔条件树做完整短路求值（contains/正则/变量提取/主动探测）。
//! 预筛选保证无漏报：无法提取字面量的指纹进入兜底集合，每次匹配全量求值。
//!
//! ## 使用示例
//!
//! ```no_run
//! use rswebfinger::{init_webfinger, detect_asset, HttpAsset};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // 从默认规则目录加载指纹并初始化全局检测器
//!     init_webfinger().await?;
//!
//!     let mut asset = HttpAsset::new(
//!         "http://example.com".to_string(),
//!         200,
//!         "Server: nginx/1.18\n".to_string(),
//!         "<html><title>Welcome</title></html>".to_string(),
//!     );
//!     let matched = detect_asset(&mut asset).await?;
//!     for fingerprint in &matched {
//!         println!("{}", fingerprint.name);
//!     }
//!     println!("技术列表: {:?}", asset.technologies);
//!     Ok(())
//! }
//! ```

pub mod asset;
pub mod compiler;
pub mod config;
pub mod detector;
pub mod error;
pub mod extractor;
pub mod rule;
pub mod utils;

// 导出常用接口
pub use asset::HttpAsset;
pub use compiler::{IndexBuilder, MatchIndex};
pub use config::{ConfigManager, CustomConfigBuilder, GlobalConfig, DEFAULT_USER_AGENT};
pub use detector::{
    detect_asset, get_global_detector, init_webfinger, init_webfinger_with_config,
    init_webfinger_with_fingerprints, reload_webfinger, FingerDetector,
};
pub use error::{RswebfingerError, RwfResult};
pub use rule::{Condition, Fingerprint, LeafCondition, Location, Logic, MatchType, Rule, RuleLoader};
