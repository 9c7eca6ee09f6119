//! 检测模块：候选筛选、规则求值与全局检测器管理
pub mod detector;
pub mod evaluator;
pub mod global;

// 导出核心接口
pub use self::detector::FingerDetector;
pub use self::evaluator::{MatchContext, RuleEvaluator};
pub use self::global::{
    detect_asset, get_global_detector, init_webfinger, init_webfinger_with_config,
    init_webfinger_with_fingerprints, reload_webfinger,
};
