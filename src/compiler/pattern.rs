//! 模式提取器
//! 从规则条件树中推导字面量集合：字面量命中是规则可能匹配的必要条件，
//! 提取结果用于AC自动机预筛选；无法提取的规则必须每次全量求值

use std::collections::HashSet;

use crate::rule::model::{Condition, LeafCondition, Location, Logic, MatchType, Rule};

/// 条件树最大递归深度（指纹为用户编写，嵌套深度不受格式约束）
pub const MAX_CONDITION_DEPTH: usize = 64;

/// 提取出的字面量信息（派生数据，非用户编写）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternInfo {
    pub pattern: String,
    // title, header, body
    pub location: Location,
    // 归属指纹id
    pub fingerprint_id: String,
    // 归属规则索引
    pub rule_index: usize,
}

/// 模式提取器
pub struct PatternExtractor;

impl PatternExtractor {
    /// 从单条规则提取字面量集合
    /// 返回None表示该规则无法提取字面量（inextricable），只能全量求值
    pub fn extract_rule(
        rule: &Rule,
        fingerprint_id: &str,
        rule_index: usize,
    ) -> Option<Vec<PatternInfo>> {
        let patterns =
            Self::extract_group(&rule.conditions, rule.logic, fingerprint_id, rule_index, 0)?;
        if patterns.is_empty() {
            return None;
        }
        Some(patterns)
    }

    /// 递归提取条件组的字面量贡献
    /// 子组无贡献按空贡献处理（不构成失败），规则级失败只由叶子整体决定；
    /// 深度超限返回None，整条规则按inextricable处理
    fn extract_group(
        conditions: &[Condition],
        logic: Logic,
        fingerprint_id: &str,
        rule_index: usize,
        depth: usize,
    ) -> Option<Vec<PatternInfo>> {
        if depth > MAX_CONDITION_DEPTH {
            return None;
        }

        let mut all_patterns = Vec::new();
        for condition in conditions {
            match condition {
                Condition::Group {
                    logic: sub_logic,
                    conditions: sub_conditions,
                } => {
                    let nested = Self::extract_group(
                        sub_conditions,
                        *sub_logic,
                        fingerprint_id,
                        rule_index,
                        depth + 1,
                    )?;
                    all_patterns.extend(nested);
                }
                Condition::Leaf(leaf) => {
                    if let Some(info) = Self::extract_leaf(leaf, fingerprint_id, rule_index) {
                        all_patterns.push(info);
                    }
                }
            }
        }

        if all_patterns.is_empty() {
            // 空贡献，由上层决定整条规则是否inextricable
            return Some(all_patterns);
        }

        match logic {
            // OR逻辑：规则匹配时组内至少一个条件成立，全部字面量并集保留（去重）
            Logic::Or => Some(Self::deduplicate(all_patterns)),
            Logic::And => {
                // AND组内若存在OR子组，必须保留全部字面量：
                // OR子组整体被AND要求成立，其贡献的字面量至少出现一个
                if Self::has_or_group(conditions) {
                    Some(all_patterns)
                } else {
                    // 纯AND链：任一contains字面量都必然出现，选最具区分度的一个
                    Self::select_best(all_patterns).map(|best| vec![best])
                }
            }
        }
    }

    /// 叶子条件贡献：仅非空pattern的contains条件参与提取
    fn extract_leaf(
        leaf: &LeafCondition,
        fingerprint_id: &str,
        rule_index: usize,
    ) -> Option<PatternInfo> {
        if leaf.match_type != MatchType::Contains || leaf.pattern.is_empty() {
            return None;
        }
        let location = leaf.location?;
        Some(PatternInfo {
            pattern: leaf.pattern.clone(),
            location,
            fingerprint_id: fingerprint_id.to_string(),
            rule_index,
        })
    }

    /// 递归检查条件列表中是否包含OR逻辑的条件组
    fn has_or_group(conditions: &[Condition]) -> bool {
        conditions.iter().any(|condition| match condition {
            Condition::Group { logic, conditions } => {
                *logic == Logic::Or || Self::has_or_group(conditions)
            }
            Condition::Leaf(_) => false,
        })
    }

    /// 去重（key为location+pattern）
    fn deduplicate(patterns: Vec<PatternInfo>) -> Vec<PatternInfo> {
        let mut seen = HashSet::new();
        patterns
            .into_iter()
            .filter(|p| seen.insert((p.location, p.pattern.clone())))
            .collect()
    }

    /// 选择最佳字面量（用于纯AND链）
    /// 优先级 title > header > body，同优先级取最长
    fn select_best(patterns: Vec<PatternInfo>) -> Option<PatternInfo> {
        fn priority(location: Location) -> u8 {
            match location {
                Location::Title => 3,
                Location::Header => 2,
                Location::Body => 1,
            }
        }
        patterns
            .into_iter()
            .max_by_key(|p| (priority(p.location), p.pattern.len()))
    }
}
