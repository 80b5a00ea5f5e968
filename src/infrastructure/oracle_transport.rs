//! Oracle 传输层
//!
//! 只负责"发一次请求、拿一次回复"，重试和退避由 [`crate::services::OracleClient`] 负责。
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行 API 调用
//! - 兼容 OpenAI API 的服务（如 OpenRouter, Gemini, Doubao 等）

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestMessageContentPartImage,
        ChatCompletionRequestMessageContentPartText, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, ChatCompletionRequestUserMessageContent,
        ChatCompletionRequestUserMessageContentPart, CreateChatCompletionRequestArgs, ImageDetail,
        ImageUrl,
    },
    Client,
};
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::OracleConfig;
use crate::error::OracleError;
use crate::models::ContentBlock;

/// 一次 Oracle 请求
#[derive(Debug, Clone, Copy)]
pub struct OracleRequest<'a> {
    pub system_message: Option<&'a str>,
    pub prompt: &'a str,
    /// 随请求附带的内容块（图像块作为 Vision 输入，文本块追加到提示词后）
    pub blocks: &'a [ContentBlock],
}

impl<'a> OracleRequest<'a> {
    pub fn new(prompt: &'a str, blocks: &'a [ContentBlock], system_message: Option<&'a str>) -> Self {
        Self {
            system_message,
            prompt,
            blocks,
        }
    }

    /// 提示词 + 文本块
    pub fn user_text(&self) -> String {
        let texts: Vec<&str> = self
            .blocks
            .iter()
            .filter(|b| !b.is_image())
            .map(|b| b.payload.as_str())
            .collect();
        if texts.is_empty() {
            self.prompt.to_string()
        } else {
            format!("{}\n\n{}", self.prompt, texts.join("\n\n"))
        }
    }

    /// 图像块的 data URL 列表
    pub fn image_urls(&self) -> Vec<String> {
        self.blocks.iter().filter_map(|b| b.data_url()).collect()
    }
}

/// Oracle 回复
///
/// 在传输层边界解析一次，之后不再检查原始形态。
#[derive(Debug, Clone, PartialEq)]
pub enum OracleReply {
    Text(String),
    Structured(Value),
}

impl OracleReply {
    /// 从原始回复文本构造
    ///
    /// 整体是 JSON 对象（允许包在 ```json 代码块中）时解析为 `Structured`。
    pub fn from_text(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let trimmed = raw.trim();
        let candidate = strip_code_fence(trimmed);
        if candidate.starts_with('{') {
            if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(candidate) {
                return OracleReply::Structured(value);
            }
        }
        OracleReply::Text(trimmed.to_string())
    }

    /// 文本形式（结构化回复序列化为 JSON 文本）
    pub fn into_text(self) -> String {
        match self {
            OracleReply::Text(text) => text,
            OracleReply::Structured(value) => {
                serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string())
            }
        }
    }

    pub fn as_structured(&self) -> Option<&Value> {
        match self {
            OracleReply::Structured(value) => Some(value),
            OracleReply::Text(_) => None,
        }
    }

    pub fn is_blank(&self) -> bool {
        match self {
            OracleReply::Text(text) => text.trim().is_empty(),
            OracleReply::Structured(value) => value.as_object().is_some_and(|o| o.is_empty()),
        }
    }
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Oracle 传输接口
///
/// 实现方只做一次调用，并把失败分类为 [`OracleError`]。
#[async_trait]
pub trait OracleTransport: Send + Sync {
    async fn complete(&self, request: &OracleRequest<'_>) -> Result<OracleReply, OracleError>;
}

/// 基于 async-openai 的传输实现
pub struct OpenAiTransport {
    client: Client<OpenAIConfig>,
    model_name: String,
    max_tokens: u32,
    temperature: f32,
}

impl OpenAiTransport {
    /// 创建新的传输实例
    pub fn new(config: &OracleConfig) -> Self {
        // 配置 OpenAI 客户端（兼容 OpenAI API 的服务）
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.api_key)
            .with_api_base(&config.base_url);

        Self {
            client: Client::with_config(openai_config),
            model_name: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }

    fn build_messages(&self, request: &OracleRequest<'_>) -> Result<Vec<ChatCompletionRequestMessage>, OracleError> {
        let mut messages = Vec::new();

        if let Some(sys_msg) = request.system_message {
            let system_msg = ChatCompletionRequestSystemMessageArgs::default()
                .content(sys_msg)
                .build()
                .map_err(request_build_error)?;
            messages.push(ChatCompletionRequestMessage::System(system_msg));
        }

        let user_text = request.user_text();
        let img_urls = request.image_urls();

        let user_msg = if img_urls.is_empty() {
            ChatCompletionRequestUserMessageArgs::default()
                .content(user_text)
                .build()
                .map_err(request_build_error)?
        } else {
            // 使用 Vision API：文本在前，图片依次追加
            let mut content_parts = vec![ChatCompletionRequestUserMessageContentPart::Text(
                ChatCompletionRequestMessageContentPartText { text: user_text },
            )];
            for url in img_urls {
                content_parts.push(ChatCompletionRequestUserMessageContentPart::ImageUrl(
                    ChatCompletionRequestMessageContentPartImage {
                        image_url: ImageUrl {
                            url,
                            detail: Some(ImageDetail::Auto),
                        },
                    },
                ));
            }
            debug!("使用 Vision API，包含 {} 张图片", content_parts.len() - 1);

            ChatCompletionRequestUserMessageArgs::default()
                .content(ChatCompletionRequestUserMessageContent::Array(content_parts))
                .build()
                .map_err(request_build_error)?
        };

        messages.push(ChatCompletionRequestMessage::User(user_msg));
        Ok(messages)
    }
}

/// 把 async-openai 的错误归类
///
/// 优先使用 API 错误对象的 `type` / `code` 字段和 HTTP 状态，只有都拿不到时才看错误文本。
fn classify_openai_error(err: &OpenAIError) -> OracleError {
    match err {
        OpenAIError::ApiError(api) => {
            OracleError::from_api_fields(api.r#type.as_deref(), api.code.as_deref(), api.to_string())
        }
        OpenAIError::Reqwest(e) if e.is_timeout() => OracleError::Timeout { message: e.to_string() },
        OpenAIError::Reqwest(e) => match e.status() {
            Some(status) => OracleError::from_status(status.as_u16(), e.to_string()),
            None => OracleError::Transport { message: e.to_string() },
        },
        OpenAIError::InvalidArgument(message) => OracleError::RequestBuild {
            message: message.clone(),
        },
        other => OracleError::classify(other.to_string()),
    }
}

fn request_build_error(e: impl std::fmt::Display) -> OracleError {
    OracleError::RequestBuild {
        message: e.to_string(),
    }
}

#[async_trait]
impl OracleTransport for OpenAiTransport {
    async fn complete(&self, request: &OracleRequest<'_>) -> Result<OracleReply, OracleError> {
        debug!("调用 Oracle API，模型: {}", self.model_name);

        let messages = self.build_messages(request)?;
        let chat_request = CreateChatCompletionRequestArgs::default()
            .model(&self.model_name)
            .messages(messages)
            .temperature(self.temperature)
            .max_tokens(self.max_tokens)
            .build()
            .map_err(request_build_error)?;

        let response = self.client.chat().create(chat_request).await.map_err(|e| {
            warn!("Oracle API 调用失败: {}", e);
            classify_openai_error(&e)
        })?;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .unwrap_or_default();

        let reply = OracleReply::from_text(content);
        if reply.is_blank() {
            return Err(OracleError::EmptyResponse);
        }
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_reply_is_structured() {
        let reply = OracleReply::from_text("```json\n{\"total_questions\": 4}\n```");
        assert_eq!(
            reply.as_structured().and_then(|v| v["total_questions"].as_u64()),
            Some(4)
        );
    }

    #[test]
    fn test_plain_reply_stays_text() {
        let reply = OracleReply::from_text("  题目总数：4  ");
        assert_eq!(reply, OracleReply::Text("题目总数：4".to_string()));
        assert!(OracleReply::from_text("   ").is_blank());
        // 数组不是对象，按文本处理
        assert!(matches!(OracleReply::from_text("[1, 2]"), OracleReply::Text(_)));
    }

    fn api_error(error_type: Option<&str>, code: Option<&str>, message: &str) -> OpenAIError {
        OpenAIError::ApiError(async_openai::error::ApiError {
            message: message.to_string(),
            r#type: error_type.map(str::to_string),
            param: None,
            code: code.map(str::to_string),
        })
    }

    #[test]
    fn test_api_error_fields_decide_the_category() {
        let err = api_error(
            Some("tokens"),
            Some("rate_limit_exceeded"),
            "Rate limit reached: Limit 4010, Used 4000",
        );
        assert!(matches!(classify_openai_error(&err), OracleError::RateLimited { .. }));

        let err = api_error(Some("invalid_request_error"), Some("invalid_api_key"), "Incorrect API key");
        assert!(matches!(classify_openai_error(&err), OracleError::Auth { .. }));

        // 5xx 的错误对象没有字段，按正文分类
        let err = api_error(None, None, "502 Bad Gateway");
        assert!(matches!(
            classify_openai_error(&err),
            OracleError::Server { status: Some(502), .. }
        ));

        let err = OpenAIError::InvalidArgument("missing model".to_string());
        assert!(!classify_openai_error(&err).is_retryable());
    }

    #[test]
    fn test_request_joins_text_blocks() {
        let blocks = vec![
            ContentBlock::text("doc_1", "第一段"),
            ContentBlock::image("doc_1", "image/png", "AAAA"),
        ];
        let request = OracleRequest::new("请批改", &blocks, None);
        assert_eq!(request.user_text(), "请批改\n\n第一段");
        assert_eq!(request.image_urls(), vec!["data:image/png;base64,AAAA".to_string()]);
    }
}
