//! 匹配索引构建器
//! 聚合全部指纹的可提取字面量，构建title/header/body三套AC自动机；
//! 任一规则无法提取的指纹进入兜底集合，每次匹配都全量求值

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use aho_corasick::AhoCorasick;
use tracing::{debug, error, warn};

use super::pattern::{PatternExtractor, PatternInfo};
use crate::rule::model::{Fingerprint, Location};

/// 单个location的字面量索引
#[derive(Debug)]
pub struct LocationIndex {
    automaton: AhoCorasick,
    // 与自动机pattern id平行：同一字面量可能归属多个(指纹id, 规则索引)
    owners: Vec<Vec<(String, usize)>>,
}

impl LocationIndex {
    /// 多模式匹配输入文本，收集命中字面量归属的指纹id
    fn collect_hits(&self, text: &str, hits: &mut HashSet<String>) {
        for mat in self.automaton.find_overlapping_iter(text) {
            for (fingerprint_id, _rule_index) in &self.owners[mat.pattern().as_usize()] {
                hits.insert(fingerprint_id.clone());
            }
        }
    }

    pub fn pattern_count(&self) -> usize {
        self.owners.len()
    }
}

/// 字面量汇聚池（按location独立，先到先得去重+多归属记录）
#[derive(Debug, Default)]
struct LocationPool {
    literals: Vec<String>,
    index_of: HashMap<String, usize>,
    owners: Vec<Vec<(String, usize)>>,
}

impl LocationPool {
    fn insert(&mut self, info: PatternInfo) {
        let idx = match self.index_of.get(&info.pattern) {
            Some(&idx) => idx,
            None => {
                let idx = self.literals.len();
                self.literals.push(info.pattern.clone());
                self.owners.push(Vec::new());
                self.index_of.insert(info.pattern, idx);
                idx
            }
        };
        // 相同字面量只进一次自动机，但每个归属指纹都必须可回溯
        let owner = (info.fingerprint_id, info.rule_index);
        if !self.owners[idx].contains(&owner) {
            self.owners[idx].push(owner);
        }
    }

    fn build(self, location: Location) -> Option<LocationIndex> {
        if self.literals.is_empty() {
            return None;
        }
        match AhoCorasick::new(&self.literals) {
            Ok(automaton) => Some(LocationIndex {
                automaton,
                owners: self.owners,
            }),
            Err(e) => {
                // 降级：该location自动机缺失，其余location与兜底集合仍然可用
                error!("构建{} AC自动机失败：{}", location.as_str(), e);
                None
            }
        }
    }
}

/// 匹配索引：构建后只读共享，重建整体替换
#[derive(Debug)]
pub struct MatchIndex {
    title: Option<LocationIndex>,
    header: Option<LocationIndex>,
    body: Option<LocationIndex>,
    // 无法提取字面量的指纹id，每次匹配都全量求值
    always_evaluate: Vec<String>,
    // 指纹id -> 指纹
    fingerprint_map: HashMap<String, Arc<Fingerprint>>,
}

impl MatchIndex {
    /// 候选指纹选择：三路AC预筛选命中并集 + 兜底集合，按指纹id去重
    /// 空字段视为不命中，不构成错误
    pub fn candidates(&self, title: &str, header: &str, body: &str) -> Vec<Arc<Fingerprint>> {
        let mut hit_ids = HashSet::new();

        if let Some(index) = &self.title {
            index.collect_hits(title, &mut hit_ids);
        }
        if let Some(index) = &self.header {
            index.collect_hits(header, &mut hit_ids);
        }
        if let Some(index) = &self.body {
            index.collect_hits(body, &mut hit_ids);
        }

        for fingerprint_id in &self.always_evaluate {
            hit_ids.insert(fingerprint_id.clone());
        }

        hit_ids
            .into_iter()
            .filter_map(|id| self.fingerprint_map.get(&id).cloned())
            .collect()
    }

    /// 按id获取指纹
    pub fn get(&self, fingerprint_id: &str) -> Option<Arc<Fingerprint>> {
        self.fingerprint_map.get(fingerprint_id).cloned()
    }

    /// 指纹总数
    pub fn fingerprint_count(&self) -> usize {
        self.fingerprint_map.len()
    }

    /// 兜底全量求值的指纹id列表
    pub fn always_evaluate_ids(&self) -> &[String] {
        &self.always_evaluate
    }
}

/// 匹配索引构建器（一次性批量构建，重建从零开始）
pub struct IndexBuilder;

impl IndexBuilder {
    /// 从指纹列表构建匹配索引
    pub fn build(fingerprints: Vec<Fingerprint>) -> MatchIndex {
        let start = Instant::now();

        let mut title_pool = LocationPool::default();
        let mut header_pool = LocationPool::default();
        let mut body_pool = LocationPool::default();
        let mut always_evaluate = Vec::new();
        let mut fingerprint_map = HashMap::new();

        for fingerprint in fingerprints {
            let fingerprint = Arc::new(fingerprint);
            if fingerprint_map
                .insert(fingerprint.id.clone(), Arc::clone(&fingerprint))
                .is_some()
            {
                warn!("指纹id重复，后加载的覆盖先加载的：{}", fingerprint.id);
            }

            // 任一规则无法提取字面量，整个指纹进兜底集合
            let mut rule_patterns = Vec::new();
            let mut all_rules_extractable = !fingerprint.rules.is_empty();
            for (rule_index, rule) in fingerprint.rules.iter().enumerate() {
                match PatternExtractor::extract_rule(rule, &fingerprint.id, rule_index) {
                    Some(patterns) => rule_patterns.extend(patterns),
                    None => {
                        all_rules_extractable = false;
                        break;
                    }
                }
            }

            if !all_rules_extractable {
                always_evaluate.push(fingerprint.id.clone());
                continue;
            }

            for info in rule_patterns {
                match info.location {
                    Location::Title => title_pool.insert(info),
                    Location::Header => header_pool.insert(info),
                    Location::Body => body_pool.insert(info),
                }
            }
        }

        let index = MatchIndex {
            title: title_pool.build(Location::Title),
            header: header_pool.build(Location::Header),
            body: body_pool.build(Location::Body),
            always_evaluate,
            fingerprint_map,
        };

        debug!(
            "匹配索引构建完成，耗时{:?}：指纹{}个，兜底{}个，字面量 title={} header={} body={}",
            start.elapsed(),
            index.fingerprint_count(),
            index.always_evaluate.len(),
            index.title.as_ref().map(LocationIndex::pattern_count).unwrap_or(0),
            index.header.as_ref().map(LocationIndex::pattern_count).unwrap_or(0),
            index.body.as_ref().map(LocationIndex::pattern_count).unwrap_or(0),
        );

        index
    }
}
