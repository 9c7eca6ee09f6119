//! 指纹模块：负责指纹的加载与数据模型定义
pub mod model;
pub mod loader;

// 导出核心接口
pub use self::model::{Condition, Fingerprint, LeafCondition, Location, Logic, MatchType, Rule};
pub use self::loader::RuleLoader;
