//! 检测器核心
//! 组合AC预筛选与规则求值：先用索引收缩候选集合，再对候选指纹完整求值，
//! 命中指纹的技术名回写到资产

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tracing::debug;

use crate::asset::HttpAsset;
use crate::compiler::{IndexBuilder, MatchIndex};
use crate::config::GlobalConfig;
use crate::detector::evaluator::RuleEvaluator;
use crate::error::RwfResult;
use crate::rule::{Fingerprint, RuleLoader};

/// 指纹检测器
pub struct FingerDetector {
    index: Arc<MatchIndex>,
    config: GlobalConfig,
    // 主动探测共享客户端（连接池复用）
    client: Client,
}

impl FingerDetector {
    /// 从内存指纹列表创建检测器
    pub fn new(fingerprints: Vec<Fingerprint>, config: GlobalConfig) -> RwfResult<Self> {
        let index = Arc::new(IndexBuilder::build(fingerprints));
        let client = Client::builder()
            .timeout(Duration::from_secs(config.http_timeout))
            .build()?;
        Ok(Self {
            index,
            config,
            client,
        })
    }

    /// 从规则目录加载指纹并创建检测器
    pub async fn from_dir(config: GlobalConfig) -> RwfResult<Self> {
        let fingerprints = RuleLoader::load_dir(&config.rule_dir).await?;
        Self::new(fingerprints, config)
    }

    /// 匹配资产，返回命中的指纹（不修改资产）
    pub async fn match_asset(&self, asset: &HttpAsset) -> Vec<Arc<Fingerprint>> {
        let candidates = self
            .index
            .candidates(&asset.title, &asset.raw_headers, &asset.body);
        debug!(
            "资产[{}]候选指纹{}个（库内共{}个）",
            asset.url,
            candidates.len(),
            self.index.fingerprint_count()
        );

        let evaluator = RuleEvaluator::new(&self.client, &self.config);
        let mut matched = Vec::new();
        for fingerprint in candidates {
            if evaluator.evaluate(&fingerprint, asset).await {
                matched.push(fingerprint);
            }
        }
        matched
    }

    /// 检测资产并把命中指纹的技术名回写到资产
    pub async fn detect(&self, asset: &mut HttpAsset) -> Vec<Arc<Fingerprint>> {
        let matched = self.match_asset(asset).await;
        for fingerprint in &matched {
            asset.add_technology(&fingerprint.name);
        }
        matched
    }

    /// 当前检测器使用的匹配索引
    pub fn index(&self) -> Arc<MatchIndex> {
        Arc::clone(&self.index)
    }

    pub fn config(&self) -> &GlobalConfig {
        &self.config
    }
}
