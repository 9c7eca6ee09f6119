//! 全局错误类型定义

use thiserror::Error;
use regex::Error as RegexError;
use serde_yaml::Error as YamlError;
use std::io::Error as IoError;
use url::ParseError as UrlParseError;

#[derive(Error, Debug)]
pub enum RswebfingerError {
    // 指纹相关错误
    #[error("指纹加载失败：{0}")]
    FingerLoadError(String),

    // 匹配相关错误
    #[error("正则编译失败：{0}")]
    RegexCompileError(#[from] RegexError),
    #[error("检测器未初始化")]
    DetectorNotInitialized,
    #[error("条件嵌套深度超过上限：{0}")]
    DepthExceeded(usize),

    // 网络相关错误
    #[error("主动探测请求失败：{0}")]
    HttpError(#[from] reqwest::Error),

    // 序列化/反序列化错误
    #[error("YAML解析失败：{0}")]
    YamlError(#[from] YamlError),

    // 基础错误
    #[error("IO操作失败：{0}")]
    IoError(#[from] IoError),
    #[error("URL解析失败：{0}")]
    UrlError(#[from] UrlParseError),
    #[error("无效输入：{0}")]
    InvalidInput(String),
}

// 全局Result类型
pub type RwfResult<T> = Result<T, RswebfingerError>;
