//! LLM 服务 - 业务能力层
//!
//! 只负责"LLM 回答"能力，不关心流程
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行 API 调用
//! - 支持自定义 API 端点和模型
//! - 兼容 OpenAI API 的服务（如 Azure, Gemini, Doubao 等）

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::services::oracle_client::{Oracle, OracleConstraints, PromptKind};

/// 选择题的系统提示
const CHOICE_SYSTEM_MESSAGE: &str = "You are an assistant that provides concise answers. \
     Reply with exactly one of the allowed options and nothing else.";

/// 填空题的系统提示
const BLANK_SYSTEM_MESSAGE: &str = "Your goal is to guess a single word based on the given length, \
     first letter, and hint word. Provide only the word as the answer.";

/// LLM 服务
///
/// 职责：
/// - 调用 LLM API 回答单个提示词
/// - 按提示词类型选择系统消息
/// - 不校验响应内容（由 `OracleClient` 负责）
pub struct LlmService {
    client: Client<OpenAIConfig>,
    model_name: String,
    max_tokens: u32,
}

impl LlmService {
    /// 创建新的 LLM 服务
    pub fn new(config: &Config) -> Self {
        // 配置 OpenAI 客户端（兼容 OpenAI API 的服务）
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.llm_api_key)
            .with_api_base(&config.llm_api_base_url);

        let client = Client::with_config(openai_config);

        Self {
            client,
            model_name: config.llm_model_name.clone(),
            max_tokens: 16,
        }
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    fn transport_error(&self, e: impl std::fmt::Display) -> AppError {
        AppError::oracle_transport(&self.model_name, e)
    }

    /// 通用的 LLM 调用函数
    ///
    /// 温度固定为 0，返回去掉首尾空白的文本。
    pub async fn send_to_llm(&self, user_message: &str, system_message: &str) -> AppResult<String> {
        debug!("调用 LLM API，模型: {}", self.model_name);

        let system_msg = ChatCompletionRequestSystemMessageArgs::default()
            .content(system_message)
            .build()
            .map_err(|e| self.transport_error(e))?;
        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(user_message)
            .build()
            .map_err(|e| self.transport_error(e))?;

        let messages = vec![
            ChatCompletionRequestMessage::System(system_msg),
            ChatCompletionRequestMessage::User(user_msg),
        ];

        // 构建请求
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model_name)
            .messages(messages)
            .temperature(0.0)
            .max_tokens(self.max_tokens)
            .build()
            .map_err(|e| self.transport_error(e))?;

        // 调用 API
        let response = self.client.chat().create(request).await.map_err(|e| {
            warn!("LLM API 调用失败: {}", e);
            self.transport_error(e)
        })?;

        // 提取响应内容
        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| self.transport_error("LLM 返回内容为空"))?;

        debug!("LLM 响应: {:?}", content);
        Ok(content.trim().to_string())
    }
}

#[async_trait]
impl Oracle for LlmService {
    async fn request(&self, prompt: &str, constraints: &OracleConstraints) -> AppResult<String> {
        let system_message = match constraints.kind {
            PromptKind::MultipleChoice => CHOICE_SYSTEM_MESSAGE,
            PromptKind::FillBlank => BLANK_SYSTEM_MESSAGE,
        };
        self.send_to_llm(prompt, system_message).await
    }

    async fn ready(&self) -> AppResult<()> {
        if self.model_name.trim().is_empty() {
            return Err(AppError::Config("未配置 LLM 模型名称".to_string()));
        }
        self.send_to_llm("Reply with the single word: ready", CHOICE_SYSTEM_MESSAGE)
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::oracle_client::choice_constraints;

    /// 创建测试用的 LlmService（读取环境变量中的 API 配置）
    fn create_test_service() -> LlmService {
        LlmService::new(&Config::from_env())
    }

    #[test]
    fn test_new_uses_configured_model() {
        let config = Config {
            llm_model_name: "gpt-4o-mini".to_string(),
            ..Config::default()
        };
        let service = LlmService::new(&config);
        assert_eq!(service.model_name(), "gpt-4o-mini");
        assert_eq!(service.max_tokens, 16);
    }

    #[tokio::test]
    async fn test_ready_rejects_empty_model_name() {
        let config = Config {
            llm_model_name: "  ".to_string(),
            ..Config::default()
        };
        let service = LlmService::new(&config);
        assert!(matches!(service.ready().await, Err(AppError::Config(_))));
    }

    /// 测试 LLM API 连接性
    ///
    /// 运行方式：
    /// ```bash
    /// LLM_API_KEY=... cargo test test_llm_choice_request -- --ignored --nocapture
    /// ```
    #[tokio::test]
    #[ignore]
    async fn test_llm_choice_request() {
        let _ = tracing_subscriber::fmt::try_init();

        let service = create_test_service();
        let prompt = "Question: Choose the synonym of happy | Answer options: A) sad, B) glad, C) angry | Answer (respond with only the letter A, B, C or 'Unknown'):";

        match service.request(prompt, &choice_constraints(3)).await {
            Ok(response) => {
                println!("\n========== LLM 响应 ==========");
                println!("{}", response);
                println!("==============================\n");
                assert!(!response.is_empty());
            }
            Err(e) => panic!("LLM 调用失败: {}", e),
        }
    }
}
