//! 全局检测器管理
//! 持有进程级检测器快照，支持初始化后原子替换；
//! 重载期间在途的匹配继续使用旧快照，互不干扰

use std::sync::{Arc, PoisonError, RwLock};

use once_cell::sync::Lazy;
use tracing::debug;

use crate::asset::HttpAsset;
use crate::config::{ConfigManager, GlobalConfig};
use crate::detector::detector::FingerDetector;
use crate::error::{RswebfingerError, RwfResult};
use crate::rule::Fingerprint;

// 全局检测器快照
static GLOBAL_DETECTOR: Lazy<RwLock<Option<Arc<FingerDetector>>>> =
    Lazy::new(|| RwLock::new(None));

/// 用默认配置初始化全局检测器（从默认规则目录加载）
pub async fn init_webfinger() -> RwfResult<()> {
    init_webfinger_with_config(ConfigManager::get_default()).await
}

/// 用自定义配置初始化全局检测器
pub async fn init_webfinger_with_config(config: GlobalConfig) -> RwfResult<()> {
    let detector = FingerDetector::from_dir(config).await?;
    publish(detector);
    Ok(())
}

/// 用内存指纹列表初始化全局检测器（自定义加载或测试场景）
pub fn init_webfinger_with_fingerprints(
    fingerprints: Vec<Fingerprint>,
    config: GlobalConfig,
) -> RwfResult<()> {
    let detector = FingerDetector::new(fingerprints, config)?;
    publish(detector);
    Ok(())
}

/// 重新加载规则目录并原子替换全局快照
pub async fn reload_webfinger() -> RwfResult<()> {
    let config = get_global_detector()?.config().clone();
    let detector = FingerDetector::from_dir(config).await?;
    publish(detector);
    debug!("全局检测器已重载");
    Ok(())
}

/// 获取当前全局检测器快照
pub fn get_global_detector() -> RwfResult<Arc<FingerDetector>> {
    GLOBAL_DETECTOR
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
        .ok_or(RswebfingerError::DetectorNotInitialized)
}

/// 便捷接口：用全局检测器检测资产
pub async fn detect_asset(asset: &mut HttpAsset) -> RwfResult<Vec<Arc<Fingerprint>>> {
    let detector = get_global_detector()?;
    Ok(detector.detect(asset).await)
}

fn publish(detector: FingerDetector) {
    let mut guard = GLOBAL_DETECTOR
        .write()
        .unwrap_or_else(PoisonError::into_inner);
    *guard = Some(Arc::new(detector));
}
