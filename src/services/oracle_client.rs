//! Oracle 客户端 - 业务能力层
//!
//! 在传输层之上加入配置校验和重试策略：
//! - 认证失败：立即返回，不重试
//! - 频率限制：指数退避 `base * 2^attempt`
//! - 服务端错误、网络错误、空回复：线性退避 `base * (attempt + 1)`
//!
//! 重试用尽后返回 [`OracleFailure`] 值而不是 panic，调用方据此降级。

use std::fmt;
use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::config::OracleConfig;
use crate::error::OracleError;
use crate::infrastructure::{OracleReply, OracleRequest, OracleTransport};
use crate::models::ContentBlock;

/// 一次调用最终失败的结果
#[derive(Debug, Clone, PartialEq)]
pub struct OracleFailure {
    pub kind: OracleError,
    /// 实际发起的请求次数（配置无效时为 0）
    pub attempts: u32,
}

impl OracleFailure {
    /// 面向用户的诊断信息
    pub fn diagnostic(&self) -> String {
        match &self.kind {
            OracleError::Auth { .. } => {
                "API认证失败，请检查 API 密钥是否正确、是否已过期".to_string()
            }
            OracleError::NotConfigured { reason } => format!("API 未正确配置: {}", reason),
            OracleError::RequestBuild { message } => format!("请求构建失败: {}", message),
            other => format!("API调用失败（已尝试 {} 次）: {}", self.attempts, other),
        }
    }
}

impl fmt::Display for OracleFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.diagnostic())
    }
}

impl std::error::Error for OracleFailure {}

/// Oracle 客户端
///
/// 无内部可变状态，可以在多个任务间共享。
#[derive(Clone)]
pub struct OracleClient {
    transport: Arc<dyn OracleTransport>,
    config: OracleConfig,
}

impl OracleClient {
    pub fn new(transport: Arc<dyn OracleTransport>, config: OracleConfig) -> Self {
        Self { transport, config }
    }

    pub fn config(&self) -> &OracleConfig {
        &self.config
    }

    /// 调用 Oracle
    ///
    /// # 参数
    /// - `prompt`: 用户提示词
    /// - `blocks`: 随请求附带的内容块
    /// - `system_message`: 系统消息（可选）
    ///
    /// # 返回
    /// 成功时返回解析后的回复；失败时返回分类后的失败值
    pub async fn call(
        &self,
        prompt: &str,
        blocks: &[ContentBlock],
        system_message: Option<&str>,
    ) -> Result<OracleReply, OracleFailure> {
        // 配置无效时不发起网络请求
        if let Err(e) = self.config.validate() {
            warn!("⚠️ Oracle 配置无效，跳过调用: {}", e);
            return Err(OracleFailure {
                kind: OracleError::NotConfigured { reason: e.to_string() },
                attempts: 0,
            });
        }

        let max_attempts = self.config.max_retries.max(1);
        let base_delay = self.config.retry_base_delay();
        let request = OracleRequest::new(prompt, blocks, system_message);

        let mut attempts = 0;
        loop {
            let outcome = match self.transport.complete(&request).await {
                Ok(reply) if !reply.is_blank() => Ok(reply),
                Ok(_) => Err(OracleError::EmptyResponse),
                Err(e) => Err(e),
            };
            attempts += 1;

            let err = match outcome {
                Ok(reply) => {
                    debug!("Oracle 调用成功（第 {} 次尝试）", attempts);
                    return Ok(reply);
                }
                Err(e) => e,
            };

            if !err.is_retryable() {
                error!("❌ Oracle 调用失败，不可重试: {}", err);
                return Err(OracleFailure { kind: err, attempts });
            }
            if attempts >= max_attempts {
                error!("❌ Oracle 调用失败，已重试 {} 次: {}", attempts, err);
                return Err(OracleFailure { kind: err, attempts });
            }

            let delay = err.backoff(base_delay, attempts - 1);
            warn!(
                "⚠️ Oracle 调用失败 (第 {} / {} 次尝试): {}，{:?} 后重试",
                attempts, max_attempts, err, delay
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// 调用 Oracle 并取文本形式的回复
    pub async fn call_text(
        &self,
        prompt: &str,
        blocks: &[ContentBlock],
        system_message: Option<&str>,
    ) -> Result<String, OracleFailure> {
        self.call(prompt, blocks, system_message)
            .await
            .map(OracleReply::into_text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_oracle_config, FakeTransport};

    fn client(transport: Arc<FakeTransport>, max_retries: u32) -> OracleClient {
        let mut config = test_oracle_config();
        config.max_retries = max_retries;
        OracleClient::new(transport, config)
    }

    #[tokio::test]
    async fn test_retryable_error_uses_exactly_max_attempts() {
        let transport = Arc::new(FakeTransport::failing(OracleError::Server {
            status: Some(503),
            message: "503".into(),
        }));
        let failure = client(transport.clone(), 3).call("p", &[], None).await.unwrap_err();

        assert_eq!(failure.attempts, 3);
        assert_eq!(transport.calls(), 3);
        assert!(matches!(failure.kind, OracleError::Server { .. }));
    }

    #[tokio::test]
    async fn test_auth_error_is_attempted_once() {
        let transport = Arc::new(FakeTransport::failing(OracleError::Auth {
            message: "401".into(),
        }));
        let failure = client(transport.clone(), 5).call("p", &[], None).await.unwrap_err();

        assert_eq!(transport.calls(), 1);
        assert_eq!(failure.attempts, 1);
        assert!(failure.diagnostic().contains("API认证失败"));
    }

    #[tokio::test]
    async fn test_blank_reply_is_retried() {
        let transport = Arc::new(FakeTransport::scripted(vec![
            Ok(OracleReply::Text("  ".into())),
            Err(OracleError::RateLimited { message: "429".into() }),
            Ok(OracleReply::Text("总分：8分".into())),
        ]));
        let reply = client(transport.clone(), 3).call_text("p", &[], None).await.unwrap();

        assert_eq!(reply, "总分：8分");
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test]
    async fn test_invalid_config_skips_network() {
        let transport = Arc::new(FakeTransport::replying("ok"));
        let mut config = test_oracle_config();
        config.api_key = String::new();
        let failure = OracleClient::new(transport.clone(), config)
            .call("p", &[], None)
            .await
            .unwrap_err();

        assert_eq!(transport.calls(), 0);
        assert_eq!(failure.attempts, 0);
        assert!(matches!(failure.kind, OracleError::NotConfigured { .. }));
    }
}
