//! 指纹数据模型定义
//! 仅存储指纹数据，无任何业务逻辑，支持反序列化

use serde::Deserialize;

/// 条件组合逻辑
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum Logic {
    #[serde(rename = "AND")]
    And,
    #[serde(rename = "OR")]
    Or,
}

/// 匹配数据位置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Location {
    Title,
    Header,
    Body,
}

impl Location {
    pub fn as_str(&self) -> &'static str {
        match self {
            Location::Title => "title",
            Location::Header => "header",
            Location::Body => "body",
        }
    }
}

/// 匹配类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    Contains,
    NotContains,
    Regex,
    Extract,
    Active,
}

/// 指纹定义
#[derive(Debug, Clone, Deserialize)]
pub struct Fingerprint {
    pub name: String,
    #[serde(default)]
    pub id: String,
    // 关联 POC
    #[serde(default)]
    pub tags: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub parent_category: String,
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub rules: Vec<Rule>,
}

/// 规则定义（规则之间为OR关系）
#[derive(Debug, Clone, Deserialize)]
pub struct Rule {
    // AND 或 OR
    pub logic: Logic,
    pub conditions: Vec<Condition>,
}

/// 条件定义：普通条件（Leaf）或嵌套条件组（Group），结构上互斥
/// 判定不变量：logic非空且location为空 => Group，否则为Leaf
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "RawCondition")]
pub enum Condition {
    /// 嵌套条件组（无限嵌套）
    Group {
        logic: Logic,
        conditions: Vec<Condition>,
    },
    /// 普通条件
    Leaf(LeafCondition),
}

/// 普通条件字段
#[derive(Debug, Clone)]
pub struct LeafCondition {
    // active类型可缺省location
    pub location: Option<Location>,
    pub match_type: MatchType,
    pub pattern: String,
    // extract的捕获组索引
    pub group: usize,
    // extract的变量名
    pub save_as: Option<String>,
    // active的固定请求路径
    pub path: Option<String>,
    // active的变量模板路径（{{var}}占位符）
    pub dynamic_path: Option<String>,
    // active的HTTP方法，缺省GET
    pub method: Option<String>,
    // extract/active的验证子条件（AND组合）
    pub conditions: Vec<Condition>,
}

/// YAML原始条件（扁平字段，反序列化后做构造期校验）
#[derive(Debug, Clone, Deserialize)]
struct RawCondition {
    #[serde(default)]
    location: Option<Location>,
    #[serde(default)]
    match_type: Option<MatchType>,
    #[serde(default)]
    pattern: Option<String>,
    #[serde(default)]
    group: usize,
    #[serde(default)]
    save_as: Option<String>,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    dynamic_path: Option<String>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    logic: Option<Logic>,
    #[serde(default)]
    conditions: Vec<Condition>,
}

impl TryFrom<RawCondition> for Condition {
    type Error = String;

    fn try_from(raw: RawCondition) -> Result<Self, Self::Error> {
        // 嵌套条件组：logic非空且location为空
        if raw.logic.is_some() && raw.location.is_none() && raw.match_type.is_none() {
            if raw.pattern.is_some() || raw.path.is_some() || raw.dynamic_path.is_some() {
                return Err("条件组不允许填充pattern/path/dynamic_path字段".to_string());
            }
            if raw.conditions.is_empty() {
                return Err("条件组缺少conditions字段".to_string());
            }
            return Ok(Condition::Group {
                logic: raw.logic.unwrap(),
                conditions: raw.conditions,
            });
        }

        // 两种形态的必填字段同时出现，属于歧义条件
        if raw.logic.is_some() && (raw.location.is_some() || raw.match_type.is_some()) {
            return Err("条件同时填充了条件组字段与普通条件字段".to_string());
        }

        // 普通条件
        let Some(match_type) = raw.match_type else {
            return Err("普通条件缺少match_type字段".to_string());
        };

        match match_type {
            MatchType::Contains | MatchType::NotContains | MatchType::Regex => {
                if raw.location.is_none() {
                    return Err(format!("{:?}条件缺少location字段", match_type));
                }
            }
            MatchType::Extract => {
                if raw.location.is_none() {
                    return Err("extract条件缺少location字段".to_string());
                }
                if raw.save_as.as_deref().unwrap_or("").is_empty() {
                    return Err("extract条件缺少save_as字段".to_string());
                }
            }
            MatchType::Active => {
                if raw.path.as_deref().unwrap_or("").is_empty()
                    && raw.dynamic_path.as_deref().unwrap_or("").is_empty()
                {
                    return Err("active条件缺少path或dynamic_path字段".to_string());
                }
            }
        }

        Ok(Condition::Leaf(LeafCondition {
            location: raw.location,
            match_type,
            pattern: raw.pattern.unwrap_or_default(),
            group: raw.group,
            save_as: raw.save_as,
            path: raw.path,
            dynamic_path: raw.dynamic_path,
            method: raw.method,
            conditions: raw.conditions,
        }))
    }
}
