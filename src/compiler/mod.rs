//! 编译模块：从规则树提取字面量并构建AC匹配索引
pub mod pattern;
pub mod compiler;

pub use self::pattern::{PatternExtractor, PatternInfo, MAX_CONDITION_DEPTH};
pub use self::compiler::{IndexBuilder, LocationIndex, MatchIndex};
