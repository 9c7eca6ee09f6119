//! 规则求值器
//! 对候选指纹的条件树做完整短路求值，支持正则匹配、变量提取与主动HTTP探测

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use regex::Regex;
use reqwest::Client;
use tracing::warn;
use url::{Position, Url};

use crate::asset::HttpAsset;
use crate::compiler::MAX_CONDITION_DEPTH;
use crate::config::GlobalConfig;
use crate::error::{RswebfingerError, RwfResult};
use crate::rule::model::{Condition, Fingerprint, LeafCondition, Logic, MatchType, Rule};
use crate::utils::HeaderConverter;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// 匹配上下文（单次指纹求值内有效，不跨资产、不跨指纹共享）
#[derive(Debug, Default)]
pub struct MatchContext {
    // 变量存储（规则之间不共享，逐规则重置）
    variables: HashMap<String, String>,
    // 响应缓存（key为请求URL），避免同一次求值内重复探测
    responses: HashMap<String, Arc<HttpAsset>>,
}

/// 规则求值器
pub struct RuleEvaluator<'a> {
    client: &'a Client,
    config: &'a GlobalConfig,
}

impl<'a> RuleEvaluator<'a> {
    pub fn new(client: &'a Client, config: &'a GlobalConfig) -> Self {
        Self { client, config }
    }

    /// 求值整个指纹：规则之间为OR关系，任一规则匹配即成功
    /// 单条规则的求值错误（无效正则、探测失败等）记录日志并按不匹配处理，
    /// 不影响后续规则与其他指纹
    pub async fn evaluate(&self, fingerprint: &Fingerprint, asset: &HttpAsset) -> bool {
        let mut ctx = MatchContext::default();

        for (rule_index, rule) in fingerprint.rules.iter().enumerate() {
            // 每条规则独立变量作用域
            ctx.variables.clear();
            match self.evaluate_rule(rule, &mut ctx, asset).await {
                Ok(true) => return true,
                Ok(false) => {}
                Err(e) => {
                    warn!(
                        "指纹[{}]规则{}求值失败，按不匹配处理：{}",
                        fingerprint.name, rule_index, e
                    );
                }
            }
        }

        false
    }

    async fn evaluate_rule(
        &self,
        rule: &Rule,
        ctx: &mut MatchContext,
        asset: &HttpAsset,
    ) -> RwfResult<bool> {
        self.evaluate_conditions(rule.logic, &rule.conditions, ctx, asset, 0)
            .await
    }

    /// 按logic短路求值条件列表：AND遇false即停，OR遇true即停，每层嵌套都成立
    fn evaluate_conditions<'b>(
        &'b self,
        logic: Logic,
        conditions: &'b [Condition],
        ctx: &'b mut MatchContext,
        response: &'b HttpAsset,
        depth: usize,
    ) -> BoxFuture<'b, RwfResult<bool>> {
        Box::pin(async move {
            match logic {
                Logic::And => {
                    for condition in conditions {
                        if !self.evaluate_condition(condition, ctx, response, depth).await? {
                            return Ok(false);
                        }
                    }
                    Ok(true)
                }
                Logic::Or => {
                    for condition in conditions {
                        if self.evaluate_condition(condition, ctx, response, depth).await? {
                            return Ok(true);
                        }
                    }
                    Ok(false)
                }
            }
        })
    }

    /// 求值单个条件（递归处理嵌套条件组）
    /// 深度上限在此统一检查：条件组与extract/active子条件链的每步递归都经过这里
    fn evaluate_condition<'b>(
        &'b self,
        condition: &'b Condition,
        ctx: &'b mut MatchContext,
        response: &'b HttpAsset,
        depth: usize,
    ) -> BoxFuture<'b, RwfResult<bool>> {
        Box::pin(async move {
            if depth > MAX_CONDITION_DEPTH {
                return Err(RswebfingerError::DepthExceeded(depth));
            }

            match condition {
                Condition::Group { logic, conditions } => {
                    self.evaluate_conditions(*logic, conditions, ctx, response, depth + 1)
                        .await
                }
                Condition::Leaf(leaf) => self.evaluate_leaf(leaf, ctx, response, depth).await,
            }
        })
    }

    async fn evaluate_leaf(
        &self,
        leaf: &LeafCondition,
        ctx: &mut MatchContext,
        response: &HttpAsset,
        depth: usize,
    ) -> RwfResult<bool> {
        match leaf.match_type {
            MatchType::Contains => Ok(Self::match_contains(leaf, response)),
            MatchType::NotContains => Ok(Self::match_not_contains(leaf, response)),
            MatchType::Regex => Self::match_regex(leaf, response),
            MatchType::Extract => self.match_extract(leaf, ctx, response, depth).await,
            MatchType::Active => self.match_active(leaf, ctx, response, depth).await,
        }
    }

    /// 根据location取匹配数据，active等无location的条件返回空串
    fn leaf_data<'b>(leaf: &LeafCondition, response: &'b HttpAsset) -> &'b str {
        leaf.location.map(|loc| response.field(loc)).unwrap_or("")
    }

    /// 字符串包含匹配：数据为空视为不包含
    fn match_contains(leaf: &LeafCondition, response: &HttpAsset) -> bool {
        let data = Self::leaf_data(leaf, response);
        if data.is_empty() {
            return false;
        }
        data.contains(&leaf.pattern)
    }

    /// 字符串不包含匹配：数据为空视为不包含（返回true，与contains不对称）
    fn match_not_contains(leaf: &LeafCondition, response: &HttpAsset) -> bool {
        let data = Self::leaf_data(leaf, response);
        if data.is_empty() {
            return true;
        }
        !data.contains(&leaf.pattern)
    }

    /// 正则匹配：无效pattern是该次求值的硬错误，不得静默按false处理
    fn match_regex(leaf: &LeafCondition, response: &HttpAsset) -> RwfResult<bool> {
        let data = Self::leaf_data(leaf, response);
        if data.is_empty() {
            return Ok(false);
        }
        let regex = Regex::new(&leaf.pattern)?;
        Ok(regex.is_match(data))
    }

    /// 正则提取并保存变量，再对基础资产求值验证子条件（AND组合）
    async fn match_extract(
        &self,
        leaf: &LeafCondition,
        ctx: &mut MatchContext,
        response: &HttpAsset,
        depth: usize,
    ) -> RwfResult<bool> {
        let data = Self::leaf_data(leaf, response);
        if data.is_empty() {
            return Ok(false);
        }

        let regex = Regex::new(&leaf.pattern)?;
        let Some(captures) = regex.captures(data) else {
            return Ok(false);
        };
        // 捕获组不存在视为未匹配，无副作用
        let Some(matched) = captures.get(leaf.group) else {
            return Ok(false);
        };

        if let Some(save_as) = &leaf.save_as {
            ctx.variables
                .insert(save_as.clone(), matched.as_str().to_string());
        }

        for sub_condition in &leaf.conditions {
            if !self
                .evaluate_condition(sub_condition, ctx, response, depth + 1)
                .await?
            {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// 主动发送HTTP探测请求
    /// 同一URL的响应在本次求值内缓存复用；传输层失败作为错误向上传播
    async fn match_active(
        &self,
        leaf: &LeafCondition,
        ctx: &mut MatchContext,
        base_response: &HttpAsset,
        depth: usize,
    ) -> RwfResult<bool> {
        // 确定请求URL：dynamic_path优先（{{var}}占位符替换），否则固定path
        let path = match (&leaf.dynamic_path, &leaf.path) {
            (Some(dynamic_path), _) if !dynamic_path.is_empty() => {
                Self::replace_variables(dynamic_path, &ctx.variables)
            }
            (_, Some(path)) if !path.is_empty() => path.clone(),
            _ => {
                return Err(RswebfingerError::InvalidInput(
                    "active条件缺少path或dynamic_path字段".to_string(),
                ));
            }
        };
        let request_url = format!("{}{}", Self::base_url(&base_response.url)?, path);

        // 命中缓存则复用响应
        let fetched = match ctx.responses.get(&request_url).cloned() {
            Some(cached) => cached,
            None => {
                let method = leaf.method.as_deref().unwrap_or("GET");
                let fetched = Arc::new(self.send_probe(method, &request_url).await?);
                ctx.responses
                    .insert(request_url.clone(), Arc::clone(&fetched));
                fetched
            }
        };

        // 无验证子条件时，2xx状态码即成功
        if leaf.conditions.is_empty() {
            return Ok((200..300).contains(&fetched.status_code));
        }

        // 验证子条件针对探测到的响应求值（AND组合），而非原始资产
        for sub_condition in &leaf.conditions {
            if !self
                .evaluate_condition(sub_condition, ctx, &fetched, depth + 1)
                .await?
            {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// 发送一次受限超时的探测请求并转换为合成资产
    /// 超时在客户端构建时统一设置；重定向策略为reqwest默认（最多10跳）
    async fn send_probe(&self, method: &str, request_url: &str) -> RwfResult<HttpAsset> {
        let method = reqwest::Method::from_bytes(method.as_bytes())
            .map_err(|_| RswebfingerError::InvalidInput(format!("无效HTTP方法：{}", method)))?;

        let response = self
            .client
            .request(method, request_url)
            .header(reqwest::header::USER_AGENT, &self.config.user_agent)
            .send()
            .await?;

        let status_code = response.status().as_u16();
        let raw_headers = HeaderConverter::to_raw_text(response.headers());
        let body = response.text().await?;

        Ok(HttpAsset::new(
            request_url.to_string(),
            status_code,
            raw_headers,
            body,
        ))
    }

    /// 替换模板中的{{var}}占位符
    fn replace_variables(template: &str, variables: &HashMap<String, String>) -> String {
        let mut result = template.to_string();
        for (key, value) in variables {
            let placeholder = format!("{{{{{}}}}}", key);
            result = result.replace(&placeholder, value);
        }
        result
    }

    /// 取基础URL（scheme://host[:port]）
    fn base_url(full_url: &str) -> RwfResult<String> {
        let parsed = Url::parse(full_url)?;
        Ok(parsed[..Position::BeforePath].to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigManager;
    use crate::rule::model::Location;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn leaf(location: Location, match_type: MatchType, pattern: &str) -> Condition {
        Condition::Leaf(LeafCondition {
            location: Some(location),
            match_type,
            pattern: pattern.to_string(),
            group: 0,
            save_as: None,
            path: None,
            dynamic_path: None,
            method: None,
            conditions: Vec::new(),
        })
    }

    fn active_leaf(path: Option<&str>, dynamic_path: Option<&str>, sub: Vec<Condition>) -> Condition {
        Condition::Leaf(LeafCondition {
            location: None,
            match_type: MatchType::Active,
            pattern: String::new(),
            group: 0,
            save_as: None,
            path: path.map(str::to_string),
            dynamic_path: dynamic_path.map(str::to_string),
            method: None,
            conditions: sub,
        })
    }

    fn fingerprint(name: &str, rules: Vec<Rule>) -> Fingerprint {
        Fingerprint {
            name: name.to_string(),
            id: name.to_string(),
            tags: String::new(),
            category: String::new(),
            parent_category: String::new(),
            company: String::new(),
            rules,
        }
    }

    fn asset(url: &str, raw_headers: &str, body: &str) -> HttpAsset {
        HttpAsset::new(url.to_string(), 200, raw_headers.to_string(), body.to_string())
    }

    async fn run(fingerprint: &Fingerprint, asset: &HttpAsset) -> bool {
        let config = ConfigManager::get_default();
        let client = Client::new();
        RuleEvaluator::new(&client, &config)
            .evaluate(fingerprint, asset)
            .await
    }

    #[tokio::test]
    async fn test_contains_matches_header() {
        // 场景A：AND(header contains "Server: nginx")
        let finger = fingerprint(
            "nginx",
            vec![Rule {
                logic: Logic::And,
                conditions: vec![leaf(Location::Header, MatchType::Contains, "Server: nginx")],
            }],
        );
        let asset = asset("http://t", "Server: nginx/1.18\n", "");
        assert!(run(&finger, &asset).await);
    }

    #[tokio::test]
    async fn test_empty_field_asymmetry() {
        // 空字段：contains恒为false，not_contains恒为true
        let contains_title = fingerprint(
            "c",
            vec![Rule {
                logic: Logic::And,
                conditions: vec![leaf(Location::Title, MatchType::Contains, "x")],
            }],
        );
        let not_contains_title = fingerprint(
            "nc",
            vec![Rule {
                logic: Logic::And,
                conditions: vec![leaf(Location::Title, MatchType::NotContains, "x")],
            }],
        );
        let no_title = asset("http://t", "Server: a\n", "no html title here");
        assert!(!run(&contains_title, &no_title).await);
        assert!(run(&not_contains_title, &no_title).await);
    }

    #[tokio::test]
    async fn test_nested_or_branch() {
        // 场景B：OR(title contains "Router X",
        //          AND(header contains "Vendor: Y", header not_contains "deprecated"))
        let finger = fingerprint(
            "router-x",
            vec![Rule {
                logic: Logic::Or,
                conditions: vec![
                    leaf(Location::Title, MatchType::Contains, "Router X"),
                    Condition::Group {
                        logic: Logic::And,
                        conditions: vec![
                            leaf(Location::Header, MatchType::Contains, "Vendor: Y"),
                            leaf(Location::Header, MatchType::NotContains, "deprecated"),
                        ],
                    },
                ],
            }],
        );
        let asset = asset("http://t", "Vendor: Y\n", "");
        assert!(asset.title.is_empty());
        assert!(run(&finger, &asset).await);
    }

    #[tokio::test]
    async fn test_invalid_regex_contained_as_unmatched() {
        // 场景C：无效正则是该规则的硬错误，按不匹配处理且不波及其他规则
        let finger = fingerprint(
            "bad-regex",
            vec![
                Rule {
                    logic: Logic::And,
                    conditions: vec![leaf(Location::Body, MatchType::Regex, "([unclosed")],
                },
                Rule {
                    logic: Logic::And,
                    conditions: vec![leaf(Location::Body, MatchType::Contains, "fallback-marker")],
                },
            ],
        );
        let miss = asset("http://t", "", "nothing");
        assert!(!run(&finger, &miss).await);

        // 后续规则不受前一条规则错误影响
        let hit = asset("http://t", "", "has fallback-marker inside");
        assert!(run(&finger, &hit).await);
    }

    #[tokio::test]
    async fn test_regex_and_extract() {
        let extract = Condition::Leaf(LeafCondition {
            location: Some(Location::Header),
            match_type: MatchType::Extract,
            pattern: r"X-Version: (\d+\.\d+)".to_string(),
            group: 1,
            save_as: Some("ver".to_string()),
            path: None,
            dynamic_path: None,
            method: None,
            // 验证子条件针对基础资产求值
            conditions: vec![leaf(Location::Body, MatchType::Contains, "console")],
        });
        let finger = fingerprint(
            "versioned",
            vec![Rule {
                logic: Logic::And,
                conditions: vec![
                    leaf(Location::Header, MatchType::Regex, r"X-Version: \d+"),
                    extract,
                ],
            }],
        );
        let asset = asset("http://t", "X-Version: 3.14\n", "admin console");
        assert!(run(&finger, &asset).await);
    }

    #[tokio::test]
    async fn test_extract_missing_group_is_false() {
        let extract = Condition::Leaf(LeafCondition {
            location: Some(Location::Body),
            match_type: MatchType::Extract,
            pattern: "plain".to_string(),
            group: 5, // 不存在的捕获组
            save_as: Some("v".to_string()),
            path: None,
            dynamic_path: None,
            method: None,
            conditions: Vec::new(),
        });
        let finger = fingerprint(
            "f",
            vec![Rule {
                logic: Logic::And,
                conditions: vec![extract],
            }],
        );
        let asset = asset("http://t", "", "plain body");
        assert!(!run(&finger, &asset).await);
    }

    #[tokio::test]
    async fn test_active_probe_2xx() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/admin/login"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let finger = fingerprint(
            "probe-2xx",
            vec![Rule {
                logic: Logic::And,
                conditions: vec![active_leaf(Some("/admin/login"), None, Vec::new())],
            }],
        );
        let asset = asset(&format!("{}/index.html", server.uri()), "", "");
        assert!(run(&finger, &asset).await);
    }

    #[tokio::test]
    async fn test_active_probe_verifies_fetched_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/version"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<title>Panel</title> build 7.2"),
            )
            .mount(&server)
            .await;

        // 验证子条件针对探测响应求值，而非原始资产
        let finger = fingerprint(
            "probe-verify",
            vec![Rule {
                logic: Logic::And,
                conditions: vec![active_leaf(
                    Some("/version"),
                    None,
                    vec![
                        leaf(Location::Body, MatchType::Contains, "build 7.2"),
                        leaf(Location::Title, MatchType::Contains, "Panel"),
                    ],
                )],
            }],
        );
        // 原始资产的body不含build标记
        let asset = asset(&server.uri(), "", "unrelated body");
        assert!(run(&finger, &asset).await);
    }

    #[tokio::test]
    async fn test_active_probe_cached_within_evaluation() {
        let server = MockServer::start().await;
        // 相同URL只允许真正请求一次
        Mock::given(method("GET"))
            .and(path("/status"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok-marker"))
            .expect(1)
            .mount(&server)
            .await;

        let finger = fingerprint(
            "probe-cache",
            vec![Rule {
                logic: Logic::And,
                conditions: vec![
                    active_leaf(Some("/status"), None, Vec::new()),
                    active_leaf(
                        Some("/status"),
                        None,
                        vec![leaf(Location::Body, MatchType::Contains, "ok-marker")],
                    ),
                ],
            }],
        );
        let asset = asset(&server.uri(), "", "");
        assert!(run(&finger, &asset).await);
        server.verify().await;
    }

    #[tokio::test]
    async fn test_and_short_circuit_skips_probe() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/never"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        // AND首个条件为false，后续active条件不得发出请求
        let finger = fingerprint(
            "short-circuit",
            vec![Rule {
                logic: Logic::And,
                conditions: vec![
                    leaf(Location::Body, MatchType::Contains, "absent"),
                    active_leaf(Some("/never"), None, Vec::new()),
                ],
            }],
        );
        let asset = asset(&server.uri(), "", "something else");
        assert!(!run(&finger, &asset).await);
        server.verify().await;
    }

    #[tokio::test]
    async fn test_dynamic_path_variable_substitution() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/3.14/health"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let extract = Condition::Leaf(LeafCondition {
            location: Some(Location::Header),
            match_type: MatchType::Extract,
            pattern: r"X-Api: (\d+\.\d+)".to_string(),
            group: 1,
            save_as: Some("api_ver".to_string()),
            path: None,
            dynamic_path: None,
            method: None,
            conditions: Vec::new(),
        });
        let finger = fingerprint(
            "dynamic",
            vec![Rule {
                logic: Logic::And,
                conditions: vec![
                    extract,
                    active_leaf(None, Some("/api/{{api_ver}}/health"), Vec::new()),
                ],
            }],
        );
        let asset = asset(&server.uri(), "X-Api: 3.14\n", "");
        assert!(run(&finger, &asset).await);
    }

    #[tokio::test]
    async fn test_variables_do_not_leak_across_rules() {
        let server = MockServer::start().await;
        // 若变量泄漏到规则2，替换后的路径/check-42会被请求并命中
        Mock::given(method("GET"))
            .and(path("/check-42"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let extract = Condition::Leaf(LeafCondition {
            location: Some(Location::Body),
            match_type: MatchType::Extract,
            pattern: r"version (\d+)".to_string(),
            group: 1,
            save_as: Some("ver".to_string()),
            path: None,
            dynamic_path: None,
            method: None,
            conditions: Vec::new(),
        });
        let finger = fingerprint(
            "scope-isolation",
            vec![
                // 规则1：提取成功但整条规则失败
                Rule {
                    logic: Logic::And,
                    conditions: vec![extract, leaf(Location::Body, MatchType::Contains, "absent")],
                },
                // 规则2：dynamic_path中的{{ver}}必须保持未替换，探测落空
                Rule {
                    logic: Logic::And,
                    conditions: vec![active_leaf(None, Some("/check-{{ver}}"), Vec::new())],
                },
            ],
        );
        let asset = asset(&server.uri(), "", "version 42 here");
        assert!(!run(&finger, &asset).await);
        server.verify().await;
    }

    #[tokio::test]
    async fn test_leaf_chain_depth_cap_contained() {
        // 超深的extract子条件链必须以DepthExceeded错误控制在规则级，
        // 而不是无限递归；链上每个extract都能匹配，深度是唯一失败原因
        let mut condition = leaf(Location::Body, MatchType::Contains, "vvv");
        for _ in 0..(MAX_CONDITION_DEPTH * 4) {
            condition = Condition::Leaf(LeafCondition {
                location: Some(Location::Body),
                match_type: MatchType::Extract,
                pattern: "v".to_string(),
                group: 0,
                save_as: Some("x".to_string()),
                path: None,
                dynamic_path: None,
                method: None,
                conditions: vec![condition],
            });
        }
        let finger = fingerprint(
            "deep-leaf-chain",
            vec![Rule {
                logic: Logic::And,
                conditions: vec![condition],
            }],
        );
        let asset = asset("http://t", "", "vvv");
        assert!(!run(&finger, &asset).await);
    }

    #[tokio::test]
    async fn test_group_depth_cap_contained() {
        // 超深的嵌套条件组同样受深度上限约束：叶子本可命中，超限按不匹配处理
        let mut condition = leaf(Location::Body, MatchType::Contains, "vvv");
        for _ in 0..(MAX_CONDITION_DEPTH * 4) {
            condition = Condition::Group {
                logic: Logic::And,
                conditions: vec![condition],
            };
        }
        let finger = fingerprint(
            "deep-group-chain",
            vec![Rule {
                logic: Logic::And,
                conditions: vec![condition],
            }],
        );
        let asset = asset("http://t", "", "vvv");
        assert!(!run(&finger, &asset).await);
    }

    #[tokio::test]
    async fn test_https_scheme_accepted_by_probe_client() {
        // https目标必须进入真实连接阶段（此处为连接拒绝），
        // 而不是被缺失TLS后端的连接器以scheme直接拒绝
        let client = Client::new();
        let err = client
            .get("https://127.0.0.1:1/x")
            .send()
            .await
            .unwrap_err();
        assert!(!format!("{:?}", err).contains("scheme is not http"));
    }

    #[tokio::test]
    async fn test_probe_transport_failure_contained() {
        // 目标端口不可达：探测错误被控制在规则级，按不匹配处理
        let finger = fingerprint(
            "unreachable",
            vec![Rule {
                logic: Logic::And,
                conditions: vec![active_leaf(Some("/x"), None, Vec::new())],
            }],
        );
        let asset = asset("http://127.0.0.1:1", "", "");
        assert!(!run(&finger, &asset).await);
    }
}
