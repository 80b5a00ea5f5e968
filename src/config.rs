use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{AppResult, ConfigError};

/// 未填写密钥时的占位符
const API_KEY_PLACEHOLDER: &str = "请在此处输入您的API密钥";

/// 程序配置
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Oracle（推理服务）配置
    pub oracle: OracleConfig,
    /// 批改流程配置
    pub grading: GradingConfig,
}

/// Oracle 配置
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    /// 单次回复最大 token 数
    pub max_tokens: u32,
    pub temperature: f32,
    /// 最大尝试次数（含第一次）
    pub max_retries: u32,
    /// 重试基础等待时间（毫秒）
    pub retry_base_delay_ms: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://openrouter.ai/api/v1".to_string(),
            model: "google/gemini-2.5-flash-lite-preview-06-17".to_string(),
            max_tokens: 50_000,
            temperature: 0.7,
            max_retries: 3,
            retry_base_delay_ms: 1_000,
        }
    }
}

impl OracleConfig {
    /// 校验配置
    pub fn validate(&self) -> Result<(), ConfigError> {
        let key = self.api_key.trim();
        if key.is_empty() {
            return Err(ConfigError::MissingApiKey);
        }
        if key == API_KEY_PLACEHOLDER || key == "your_api_key_here" {
            return Err(ConfigError::PlaceholderApiKey);
        }
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }
}

/// 批改流程配置
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GradingConfig {
    /// 每批最多题目数（上限 10）
    pub batch_size: usize,
    /// 同时进行的 Oracle 调用数
    pub max_concurrency: usize,
    /// 文档渲染的最大页数
    pub page_cap: usize,
    /// 单张图片大小预算（字节）
    pub image_budget_bytes: usize,
    /// 重新压缩时的最低 JPEG 质量
    pub min_jpeg_quality: u8,
    /// 得分率达到该值时跳过知识点挖掘
    pub near_perfect_ratio: f64,
    pub enable_rubric_stage: bool,
    pub enable_annotation_stage: bool,
    pub enable_knowledge_stage: bool,
    /// 视觉阶段是否请 Oracle 转写图像内容
    pub vision_transcribe: bool,
    /// 是否显示详细日志
    pub verbose_logging: bool,
}

impl Default for GradingConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            max_concurrency: 3,
            page_cap: 20,
            image_budget_bytes: 3 * 1024 * 1024,
            min_jpeg_quality: 20,
            near_perfect_ratio: 0.95,
            enable_rubric_stage: true,
            enable_annotation_stage: true,
            enable_knowledge_stage: true,
            vision_transcribe: true,
            verbose_logging: false,
        }
    }
}

impl Config {
    /// 从环境变量加载配置（启动时读取一次）
    pub fn from_env() -> Self {
        Self::default().apply_env()
    }

    /// 从 TOML 文件加载配置，环境变量优先
    pub fn from_toml_file(path: &Path) -> AppResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::FileReadFailed {
            path: path.display().to_string(),
            source,
        })?;
        let config: Config = toml::from_str(&content).map_err(|source| ConfigError::TomlParseFailed {
            path: path.display().to_string(),
            source,
        })?;
        Ok(config.apply_env())
    }

    /// 用环境变量覆盖已有配置
    pub fn apply_env(mut self) -> Self {
        if let Some(key) = ["ORACLE_API_KEY", "OPENROUTER_API_KEY", "OPENAI_API_KEY"]
            .iter()
            .find_map(|name| std::env::var(name).ok().filter(|v| !v.trim().is_empty()))
        {
            self.oracle.api_key = key;
        }
        if let Ok(url) = std::env::var("ORACLE_BASE_URL") {
            self.oracle.base_url = url;
        }
        if let Ok(model) = std::env::var("ORACLE_MODEL") {
            self.oracle.model = model;
        }
        override_from_env("ORACLE_MAX_TOKENS", &mut self.oracle.max_tokens);
        override_from_env("ORACLE_TEMPERATURE", &mut self.oracle.temperature);
        override_from_env("ORACLE_MAX_RETRIES", &mut self.oracle.max_retries);
        override_from_env("ORACLE_RETRY_DELAY_MS", &mut self.oracle.retry_base_delay_ms);

        override_from_env("GRADING_BATCH_SIZE", &mut self.grading.batch_size);
        override_from_env("GRADING_MAX_CONCURRENCY", &mut self.grading.max_concurrency);
        override_from_env("GRADING_PAGE_CAP", &mut self.grading.page_cap);
        override_from_env("GRADING_IMAGE_BUDGET_BYTES", &mut self.grading.image_budget_bytes);
        override_from_env("VERBOSE_LOGGING", &mut self.grading.verbose_logging);
        self
    }
}

/// 读取并解析单个环境变量，不存在时返回 `Ok(None)`
pub fn parse_env<T: FromStr>(var_name: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(var_name) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::EnvVarParseFailed {
                var_name: var_name.to_string(),
                value,
                expected_type: std::any::type_name::<T>().to_string(),
            }),
        Err(_) => Ok(None),
    }
}

fn override_from_env<T: FromStr>(var_name: &str, target: &mut T) {
    match parse_env::<T>(var_name) {
        Ok(Some(value)) => *target = value,
        Ok(None) => {}
        Err(e) => warn!("⚠️ {}，保留默认值", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.grading.batch_size, 10);
        assert_eq!(config.grading.max_concurrency, 3);
        assert_eq!(config.grading.page_cap, 20);
        assert_eq!(config.oracle.max_retries, 3);
    }

    #[test]
    fn test_missing_or_placeholder_key_is_invalid() {
        let mut oracle = OracleConfig::default();
        assert!(matches!(oracle.validate(), Err(ConfigError::MissingApiKey)));

        oracle.api_key = API_KEY_PLACEHOLDER.to_string();
        assert!(matches!(oracle.validate(), Err(ConfigError::PlaceholderApiKey)));

        oracle.api_key = "sk-test".to_string();
        assert!(oracle.is_valid());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [grading]
            batch_size = 5

            [oracle]
            model = "test-model"
            "#,
        )
        .unwrap();
        assert_eq!(config.grading.batch_size, 5);
        assert_eq!(config.grading.max_concurrency, 3);
        assert_eq!(config.oracle.model, "test-model");
        assert_eq!(config.oracle.retry_base_delay_ms, 1_000);
    }

    #[test]
    fn test_parse_env_reports_bad_value() {
        std::env::set_var("BATCH_GRADING_TEST_BAD_NUMBER", "abc");
        let result = parse_env::<usize>("BATCH_GRADING_TEST_BAD_NUMBER");
        assert!(matches!(result, Err(ConfigError::EnvVarParseFailed { .. })));
        std::env::remove_var("BATCH_GRADING_TEST_BAD_NUMBER");

        assert!(matches!(parse_env::<usize>("BATCH_GRADING_TEST_UNSET"), Ok(None)));
    }
}
