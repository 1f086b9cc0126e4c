use thiserror::Error;

/// 应用程序错误类型
///
/// 除 `Fatal` 外，所有错误都会在单轮处理的边界被捕获并记录，不会终止轮询。
#[derive(Debug, Error)]
pub enum AppError {
    /// 预期的页面元素不存在（正常的否定结果，仅记录）
    #[error("页面元素缺失: {what}")]
    ProbeMiss { what: String },

    /// 没有任何分类规则命中
    #[error("无法识别题型: {detail}")]
    ClassificationAmbiguous { detail: String },

    /// LLM 返回内容不在约束集合内
    #[error("LLM 返回无效响应: {response:?}")]
    OracleInvalidResponse { response: String },

    /// LLM 调用失败
    #[error("LLM 调用失败 (模型: {model}): {message}")]
    OracleTransport { model: String, message: String },

    /// 缓存文件无法解析
    #[error("缓存文件损坏 ({path}): {message}")]
    PersistenceCorrupt { path: String, message: String },

    /// 多次重试后仍无法操作目标元素
    #[error("模拟操作失败 ({target}): 已尝试 {attempts} 次")]
    SynthesisFailure { target: String, attempts: usize },

    /// 启动阶段的致命错误，进程必须退出
    #[error("致命错误: {0}")]
    Fatal(String),

    /// 输入事件构建失败
    #[error("输入事件构建失败: {0}")]
    Dispatch(String),

    /// 配置错误
    #[error("配置错误: {0}")]
    Config(String),

    /// 浏览器相关错误
    #[error("浏览器错误: {0}")]
    Browser(#[from] chromiumoxide::error::CdpError),

    /// JSON 解析失败
    #[error("JSON解析失败: {0}")]
    Json(#[from] serde_json::Error),

    /// 文件读写失败
    #[error("文件错误: {0}")]
    Io(#[from] std::io::Error),
}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        AppError::Config(err.to_string())
    }
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建元素缺失错误
    pub fn probe_miss(what: impl Into<String>) -> Self {
        AppError::ProbeMiss { what: what.into() }
    }

    /// 创建 LLM 调用失败错误
    pub fn oracle_transport(model: impl Into<String>, message: impl std::fmt::Display) -> Self {
        AppError::OracleTransport {
            model: model.into(),
            message: message.to_string(),
        }
    }

    /// 创建 LLM 无效响应错误
    pub fn oracle_invalid(response: impl Into<String>) -> Self {
        AppError::OracleInvalidResponse {
            response: response.into(),
        }
    }

    /// 创建缓存损坏错误
    pub fn persistence_corrupt(path: impl Into<String>, message: impl std::fmt::Display) -> Self {
        AppError::PersistenceCorrupt {
            path: path.into(),
            message: message.to_string(),
        }
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
