//! 回复解析
//!
//! Oracle 的自由文本回复用一组有序的解析策略处理，第一个成功的策略生效。
//! 这种解析本身是启发式的，可能取到无关数字，调用方需要自行校验范围。

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};

/// 解析策略
pub trait Extractor<T>: Send + Sync {
    fn name(&self) -> &str;
    fn extract(&self, text: &str) -> Option<T>;
}

/// 基于正则表达式的解析策略
pub struct PatternExtractor<T> {
    name: &'static str,
    regex: Regex,
    convert: fn(&Captures<'_>) -> Option<T>,
}

impl<T> PatternExtractor<T> {
    pub fn new(
        name: &'static str,
        pattern: &str,
        convert: fn(&Captures<'_>) -> Option<T>,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            name,
            regex: Regex::new(pattern)?,
            convert,
        })
    }
}

impl<T> Extractor<T> for PatternExtractor<T> {
    fn name(&self) -> &str {
        self.name
    }

    fn extract(&self, text: &str) -> Option<T> {
        self.regex.captures_iter(text).find_map(|caps| (self.convert)(&caps))
    }
}

/// 有序的解析策略链
pub struct ExtractorChain<T> {
    extractors: Vec<Box<dyn Extractor<T>>>,
}

impl<T> Default for ExtractorChain<T> {
    fn default() -> Self {
        Self { extractors: Vec::new() }
    }
}

impl<T> ExtractorChain<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, extractor: impl Extractor<T> + 'static) -> Self {
        self.extractors.push(Box::new(extractor));
        self
    }

    /// 追加一个正则策略，模式无效时记录错误并跳过
    pub fn with_pattern(self, name: &'static str, pattern: &str, convert: fn(&Captures<'_>) -> Option<T>) -> Self
    where
        T: 'static,
    {
        match PatternExtractor::new(name, pattern, convert) {
            Ok(extractor) => self.with(extractor),
            Err(e) => {
                tracing::error!("❌ 无效的解析模式 {}: {}", name, e);
                self
            }
        }
    }

    /// 依次尝试，返回第一个成功的结果
    pub fn first_match(&self, text: &str) -> Option<T> {
        self.extractors.iter().find_map(|extractor| {
            let value = extractor.extract(text)?;
            tracing::trace!("解析策略 {} 命中", extractor.name());
            Some(value)
        })
    }

    pub fn len(&self) -> usize {
        self.extractors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extractors.is_empty()
    }
}

fn first_f64(caps: &Captures<'_>) -> Option<f64> {
    caps.get(1)?.as_str().parse().ok()
}

fn first_u32(caps: &Captures<'_>) -> Option<u32> {
    caps.get(1)?.as_str().parse().ok().filter(|n| *n > 0)
}

fn names(caps: &Captures<'_>) -> Option<Vec<String>> {
    let list = split_names(caps.get(1)?.as_str());
    (!list.is_empty()).then_some(list)
}

const NUMBER: &str = r"(\d+(?:\.\d+)?)";

static SCORE_CHAIN: LazyLock<ExtractorChain<f64>> = LazyLock::new(|| {
    ExtractorChain::new()
        .with_pattern("总分", &format!(r"总分\s*[：:]\s*{NUMBER}"), first_f64)
        .with_pattern("总得分", &format!(r"总得分\s*[：:]\s*{NUMBER}"), first_f64)
        .with_pattern("total", &format!(r"(?i)\btotal(?:\s+score)?\s*[：:]\s*{NUMBER}"), first_f64)
        .with_pattern("得分", &format!(r"得分\s*[：:]\s*{NUMBER}"), first_f64)
        .with_pattern("分数", &format!(r"分数\s*[：:]\s*{NUMBER}"), first_f64)
        .with_pattern("score", &format!(r"(?i)\bscore\s*[：:]\s*{NUMBER}"), first_f64)
        .with_pattern("N分", &format!(r"{NUMBER}\s*分"), first_f64)
        .with_pattern("N points", &format!(r"(?i){NUMBER}\s*points?\b"), first_f64)
});

static QUESTION_COUNT_CHAIN: LazyLock<ExtractorChain<u32>> = LazyLock::new(|| {
    ExtractorChain::new()
        .with_pattern("题目总数", r"题目总数\s*[：:]\s*(\d+)", first_u32)
        .with_pattern("共N题", r"共\s*(\d+)\s*(?:道)?题", first_u32)
        .with_pattern("total questions", r"(?i)total\s+questions?\s*[：:]\s*(\d+)", first_u32)
});

static STUDENT_NAMES_CHAIN: LazyLock<ExtractorChain<Vec<String>>> = LazyLock::new(|| {
    ExtractorChain::new()
        .with_pattern("学生信息", r"学生信息\s*[：:]\s*([^\n]+)", names)
        .with_pattern("学生姓名", r"学生姓名\s*[：:]\s*([^\n]+)", names)
        .with_pattern("students", r"(?i)students?\s*[：:]\s*([^\n]+)", names)
});

static MAX_SCORE_LINE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?im)^\s*(?:第\s*(\d+)\s*题|Q\s*(\d+))\s*[：:]\s*(\d+(?:\.\d+)?)\s*(?:分|points?)?").ok()
});

/// 提取分数（"总分：N"、"得分：N"、"N分"、"N points" 等）
pub fn extract_score(text: &str) -> Option<f64> {
    SCORE_CHAIN.first_match(text)
}

/// 提取题目总数
pub fn extract_question_count(text: &str) -> Option<u32> {
    QUESTION_COUNT_CHAIN.first_match(text)
}

/// 提取学生姓名列表
pub fn extract_student_names(text: &str) -> Option<Vec<String>> {
    STUDENT_NAMES_CHAIN.first_match(text)
}

/// 提取每题满分（"第n题：m分" 或 "Qn: m"）
pub fn extract_max_scores(text: &str) -> BTreeMap<u32, f64> {
    let Some(regex) = MAX_SCORE_LINE.as_ref() else {
        return BTreeMap::new();
    };
    regex
        .captures_iter(text)
        .filter_map(|caps| {
            let question = caps.get(1).or_else(|| caps.get(2))?.as_str().parse().ok()?;
            let max = caps.get(3)?.as_str().parse().ok()?;
            Some((question, max))
        })
        .collect()
}

/// 拆分学生姓名
///
/// 支持 `,`、`，`、`、`、`;`、`；` 分隔，去掉空项和"无"之类的占位值。
pub fn split_names(raw: &str) -> Vec<String> {
    raw.split([',', '，', '、', ';', '；'])
        .map(|s| s.trim().trim_matches(|c| c == '[' || c == ']' || c == '“' || c == '”' || c == '"'))
        .map(str::trim)
        .filter(|s| !s.is_empty() && !matches!(*s, "无" | "未知" | "无法识别" | "none" | "None" | "N/A"))
        .map(str::to_string)
        .collect()
}
