//! 指纹加载管理器
//! 负责从本地目录加载YAML指纹文件

use std::path::Path;
use serde::Deserialize;
use tracing::{debug, warn};
use walkdir::WalkDir;

use super::model::Fingerprint;
use crate::error::{RswebfingerError, RwfResult};

/// 带fingerprint顶层键包装的文档格式
#[derive(Debug, Deserialize)]
struct FingerprintDoc {
    fingerprint: Fingerprint,
}

/// 指纹加载管理器
pub struct RuleLoader;

impl RuleLoader {
    /// 从目录递归加载所有YAML指纹文件
    /// 单个文件损坏仅告警跳过，不影响其余指纹加载
    pub async fn load_dir(dir: &Path) -> RwfResult<Vec<Fingerprint>> {
        if !dir.is_dir() {
            return Err(RswebfingerError::FingerLoadError(format!(
                "指纹目录不存在：{}",
                dir.display()
            )));
        }

        let mut fingerprints = Vec::new();
        let mut skipped = 0usize;

        for entry in WalkDir::new(dir).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let is_yaml = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"))
                .unwrap_or(false);
            if !is_yaml {
                continue;
            }

            let content = match tokio::fs::read_to_string(path).await {
                Ok(content) => content,
                Err(e) => {
                    warn!("指纹文件读取失败，已跳过：{}，错误：{}", path.display(), e);
                    skipped += 1;
                    continue;
                }
            };

            match Self::parse_str(&content) {
                Ok(mut fingerprint) => {
                    // 无id的指纹文件以文件名作为id
                    if fingerprint.id.is_empty() {
                        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                            fingerprint.id = stem.to_string();
                        }
                    }
                    fingerprints.push(fingerprint);
                }
                Err(e) => {
                    warn!("指纹文件解析失败，已跳过：{}，错误：{}", path.display(), e);
                    skipped += 1;
                }
            }
        }

        debug!("指纹加载完成，成功{}个，跳过{}个", fingerprints.len(), skipped);
        Ok(fingerprints)
    }

    /// 解析单个指纹文档（兼容bare与fingerprint:包装两种格式）
    pub fn parse_str(content: &str) -> RwfResult<Fingerprint> {
        if let Ok(doc) = serde_yaml::from_str::<FingerprintDoc>(content) {
            return Ok(doc.fingerprint);
        }
        let fingerprint: Fingerprint = serde_yaml::from_str(content)?;
        Ok(fingerprint)
    }
}
