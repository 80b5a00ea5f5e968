use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use thiserror::Error;

/// 错误文本中独立出现的 HTTP 状态码
static STATUS_CODE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?:^|[^0-9.])(401|403|408|429|500|502|503|504)(?:$|[^0-9])").ok());

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 输入校验错误（作业不会启动）
    #[error("输入校验失败: {0}")]
    Validation(#[from] ValidationError),
    /// Oracle 调用错误
    #[error("Oracle错误: {0}")]
    Oracle(#[from] OracleError),
    /// 文件读取错误
    #[error("文件错误: {0}")]
    Ingest(#[from] IngestError),
    /// 结构分析无法进行
    #[error("结构分析错误: {0}")]
    Structure(#[from] StructureError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
}

/// 输入校验错误
#[derive(Debug, Error)]
pub enum ValidationError {
    /// 没有提交任何文件
    #[error("没有提交任何文件")]
    NoDocuments,
    /// 缺少学生答案文件
    #[error("至少需要一个学生答案文件")]
    MissingAnswerDocument,
    /// 文件元信息数量与文件数量不一致
    #[error("文件元信息数量 ({meta}) 与文件数量 ({paths}) 不一致")]
    MetaLengthMismatch { paths: usize, meta: usize },
}

/// Oracle 调用错误
///
/// 由传输层在边界处分类一次，重试策略只看这里的分类。
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OracleError {
    /// 认证失败（401 类），不可重试
    #[error("认证失败: {message}")]
    Auth { message: String },
    /// 请求频率限制（429 类）
    #[error("请求频率限制: {message}")]
    RateLimited { message: String },
    /// 服务端错误（5xx 类）
    #[error("服务器错误 ({status:?}): {message}")]
    Server { status: Option<u16>, message: String },
    /// 请求超时
    #[error("请求超时: {message}")]
    Timeout { message: String },
    /// 返回内容为空
    #[error("Oracle 返回内容为空")]
    EmptyResponse,
    /// 其他网络错误
    #[error("网络请求失败: {message}")]
    Transport { message: String },
    /// 请求构建失败
    #[error("请求构建失败: {message}")]
    RequestBuild { message: String },
    /// 配置无效，未发起网络请求
    #[error("Oracle 未配置: {reason}")]
    NotConfigured { reason: String },
}

impl OracleError {
    /// 根据 API 返回的错误类型和错误码分类
    ///
    /// 两者都无法识别时退回到错误文本分类。
    pub fn from_api_fields(error_type: Option<&str>, code: Option<&str>, message: impl Into<String>) -> Self {
        let message = message.into();
        let field = |value: Option<&str>| value.map(str::to_ascii_lowercase).unwrap_or_default();
        let (error_type, code) = (field(error_type), field(code));

        match (error_type.as_str(), code.as_str()) {
            ("authentication_error" | "permission_error", _)
            | (_, "invalid_api_key" | "invalid_authentication" | "unauthorized") => OracleError::Auth { message },
            // 额度耗尽，重试无效
            ("insufficient_quota", _) | (_, "insufficient_quota") => OracleError::Auth { message },
            ("rate_limit_error" | "requests" | "tokens", _) | (_, "rate_limit_exceeded") => {
                OracleError::RateLimited { message }
            }
            ("server_error" | "api_error" | "overloaded_error", _) | (_, "server_error") => OracleError::Server {
                status: None,
                message,
            },
            ("timeout", _) | (_, "timeout") => OracleError::Timeout { message },
            _ => Self::classify(message),
        }
    }

    /// 根据 HTTP 状态码分类
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 | 403 => OracleError::Auth { message },
            408 => OracleError::Timeout { message },
            429 => OracleError::RateLimited { message },
            500..=599 => OracleError::Server {
                status: Some(status),
                message,
            },
            _ => OracleError::Transport { message },
        }
    }

    /// 根据错误文本分类
    ///
    /// 只有错误文本可用时使用。状态码必须是独立的数字，"4010 tokens" 不算 401。
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();

        if let Some(status) = STATUS_CODE
            .as_ref()
            .and_then(|re| re.captures(&lower))
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<u16>().ok())
        {
            return Self::from_status(status, message);
        }
        if lower.contains("unauthorized") || lower.contains("invalid api key") {
            return OracleError::Auth { message };
        }
        if lower.contains("rate_limit") || lower.contains("rate limit") {
            return OracleError::RateLimited { message };
        }
        if lower.contains("internal server error") || lower.contains("bad gateway") {
            return OracleError::Server {
                status: None,
                message,
            };
        }
        if lower.contains("timeout") || lower.contains("timed out") {
            return OracleError::Timeout { message };
        }
        OracleError::Transport { message }
    }

    /// 是否可以重试
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            OracleError::Auth { .. } | OracleError::RequestBuild { .. } | OracleError::NotConfigured { .. }
        )
    }

    /// 第 `attempt` 次（从 0 开始）失败后的等待时间
    ///
    /// 频率限制使用指数退避，其余可重试错误使用线性退避。
    pub fn backoff(&self, base: Duration, attempt: u32) -> Duration {
        match self {
            OracleError::RateLimited { .. } => base.saturating_mul(2u32.saturating_pow(attempt)),
            _ => base.saturating_mul(attempt.saturating_add(1)),
        }
    }
}

/// 文件读取错误
#[derive(Debug, Error)]
pub enum IngestError {
    /// 文件不存在
    #[error("文件不存在: {path}")]
    NotFound { path: String },
    /// 读取文件失败
    #[error("读取文件失败 ({path}): {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// 渲染和文本提取都失败
    #[error("无法渲染或提取文本 ({path}): {reason}")]
    RenderFailed { path: String, reason: String },
}

/// 结构分析错误
#[derive(Debug, Error)]
pub enum StructureError {
    /// 没有任何可分析的内容
    #[error("没有成功读取任何文件内容 (文件数: {documents})")]
    NoContent { documents: usize },
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 环境变量解析失败
    #[error("环境变量 {var_name} 解析失败: 值 '{value}' 无法转换为 {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
    /// 未配置 API 密钥
    #[error("未配置 API 密钥 (ORACLE_API_KEY / OPENROUTER_API_KEY / OPENAI_API_KEY)")]
    MissingApiKey,
    /// API 密钥仍是占位符
    #[error("API 密钥仍是占位符，请替换为真实密钥")]
    PlaceholderApiKey,
    /// 配置文件读取失败
    #[error("读取配置文件失败 ({path}): {source}")]
    FileReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// TOML 解析失败
    #[error("TOML解析失败 ({path}): {source}")]
    TomlParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

// ========== 便捷方法 ==========

impl AppError {
    /// 是否为输入校验错误
    pub fn is_validation(&self) -> bool {
        matches!(self, AppError::Validation(_))
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_by_status_text() {
        assert!(matches!(
            OracleError::classify("HTTP status 401 Unauthorized"),
            OracleError::Auth { .. }
        ));
        assert!(matches!(
            OracleError::classify("rate_limit_exceeded"),
            OracleError::RateLimited { .. }
        ));
        assert!(matches!(
            OracleError::classify("upstream returned 503"),
            OracleError::Server { status: Some(503), .. }
        ));
        assert!(matches!(
            OracleError::classify("request timed out"),
            OracleError::Timeout { .. }
        ));
        assert!(matches!(
            OracleError::classify("connection reset by peer"),
            OracleError::Transport { .. }
        ));
    }

    #[test]
    fn test_numbers_inside_larger_numbers_are_not_status_codes() {
        assert!(matches!(
            OracleError::classify("maximum context is 4010 tokens"),
            OracleError::Transport { .. }
        ));
        assert!(matches!(
            OracleError::classify("requested 15003 tokens"),
            OracleError::Transport { .. }
        ));
        assert!(matches!(
            OracleError::classify("status: 429"),
            OracleError::RateLimited { .. }
        ));
    }

    #[test]
    fn test_api_fields_take_priority_over_text() {
        // 文本里的数字不影响分类
        let kind = OracleError::from_api_fields(
            Some("invalid_request_error"),
            Some("rate_limit_exceeded"),
            "Limit 4010 tokens per min",
        );
        assert!(matches!(kind, OracleError::RateLimited { .. }));

        let kind = OracleError::from_api_fields(Some("invalid_request_error"), Some("invalid_api_key"), "bad key 503");
        assert!(matches!(kind, OracleError::Auth { .. }));
        assert!(!kind.is_retryable());

        let kind = OracleError::from_api_fields(Some("insufficient_quota"), None, "quota");
        assert!(!kind.is_retryable());

        let kind = OracleError::from_api_fields(Some("server_error"), None, "oops");
        assert!(matches!(kind, OracleError::Server { status: None, .. }));

        // 字段缺失时退回文本分类
        let kind = OracleError::from_api_fields(None, None, "upstream 502 bad gateway");
        assert!(matches!(kind, OracleError::Server { status: Some(502), .. }));
    }

    #[test]
    fn test_from_status() {
        assert!(matches!(OracleError::from_status(401, ""), OracleError::Auth { .. }));
        assert!(matches!(OracleError::from_status(429, ""), OracleError::RateLimited { .. }));
        assert!(matches!(
            OracleError::from_status(504, ""),
            OracleError::Server { status: Some(504), .. }
        ));
        assert!(matches!(OracleError::from_status(400, ""), OracleError::Transport { .. }));
    }

    #[test]
    fn test_auth_is_not_retryable() {
        let auth = OracleError::Auth {
            message: "401".into(),
        };
        assert!(!auth.is_retryable());
        assert!(OracleError::EmptyResponse.is_retryable());
        assert!(OracleError::Server {
            status: Some(500),
            message: String::new()
        }
        .is_retryable());
    }

    #[test]
    fn test_backoff_shapes() {
        let base = Duration::from_millis(100);
        let rate = OracleError::RateLimited {
            message: String::new(),
        };
        assert_eq!(rate.backoff(base, 0), Duration::from_millis(100));
        assert_eq!(rate.backoff(base, 1), Duration::from_millis(200));
        assert_eq!(rate.backoff(base, 2), Duration::from_millis(400));

        let server = OracleError::Server {
            status: Some(502),
            message: String::new(),
        };
        assert_eq!(server.backoff(base, 0), Duration::from_millis(100));
        assert_eq!(server.backoff(base, 1), Duration::from_millis(200));
        assert_eq!(server.backoff(base, 2), Duration::from_millis(300));
    }
}
