use serde::{Deserialize, Serialize};

/// 生成题目的归一化键：合并空白并转为小写
///
/// 缓存查找与去重都以此为准。
pub fn normalize_key(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// 题型（不带数据），用于日志和已处理集合的分组
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuestionKind {
    Terminal,
    Practice,
    ImageChoice,
    FillBlank,
    Choice,
    Unknown,
}

impl QuestionKind {
    /// 获取题型名称
    pub fn name(self) -> &'static str {
        match self {
            QuestionKind::Terminal => "结束提示",
            QuestionKind::Practice => "练习题",
            QuestionKind::ImageChoice => "图片题",
            QuestionKind::FillBlank => "填空题",
            QuestionKind::Choice => "选择题",
            QuestionKind::Unknown => "未知",
        }
    }
}

impl std::fmt::Display for QuestionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// 分类结果：题型及其附带信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuestionType {
    Terminal,
    Practice {
        in_known_territory: bool,
    },
    ImageChoice,
    FillBlank {
        hint: Option<String>,
        blank_length: Option<usize>,
        first_letter: Option<char>,
    },
    Choice {
        hint: Option<String>,
    },
    /// 无法识别时，原样转发上一次的 IKT 标记
    Unknown {
        in_known_territory: bool,
    },
}

impl QuestionType {
    pub fn kind(&self) -> QuestionKind {
        match self {
            QuestionType::Terminal => QuestionKind::Terminal,
            QuestionType::Practice { .. } => QuestionKind::Practice,
            QuestionType::ImageChoice => QuestionKind::ImageChoice,
            QuestionType::FillBlank { .. } => QuestionKind::FillBlank,
            QuestionType::Choice { .. } => QuestionKind::Choice,
            QuestionType::Unknown { .. } => QuestionKind::Unknown,
        }
    }
}

/// 页面探测得到的原始信号
///
/// 每次读取都是某一时刻的快照，两次读取之间页面可能已经变化。
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProbeSignals {
    pub question_text: Option<String>,
    pub choices: Vec<String>,
    pub has_image: bool,
    pub practice_marker: bool,
    pub known_territory_marker: bool,
    pub answer_input: bool,
    pub hint: Option<String>,
    pub blank_length: Option<usize>,
    pub first_letter: Option<String>,
    pub terminal_marker: bool,
}

/// 当前轮次的题目（每次轮询重新构建）
#[derive(Debug, Clone)]
pub struct Question {
    pub text: String,
    pub key: String,
    pub choices: Vec<String>,
    pub question_type: QuestionType,
}

impl Question {
    pub fn new(text: impl Into<String>, choices: Vec<String>, question_type: QuestionType) -> Self {
        let text = text.into();
        Self {
            key: normalize_key(&text),
            text,
            choices,
            question_type,
        }
    }

    /// 根据探测信号和分类结果构建题目
    pub fn from_signals(signals: &ProbeSignals, question_type: QuestionType) -> Self {
        Self::new(
            signals.question_text.clone().unwrap_or_default(),
            signals.choices.clone(),
            question_type,
        )
    }

    pub fn kind(&self) -> QuestionKind {
        self.question_type.kind()
    }

    pub fn hint(&self) -> Option<&str> {
        match &self.question_type {
            QuestionType::FillBlank { hint, .. } | QuestionType::Choice { hint } => hint.as_deref(),
            _ => None,
        }
    }

    pub fn blank_length(&self) -> Option<usize> {
        match &self.question_type {
            QuestionType::FillBlank { blank_length, .. } => *blank_length,
            _ => None,
        }
    }

    pub fn first_letter(&self) -> Option<char> {
        match &self.question_type {
            QuestionType::FillBlank { first_letter, .. } => *first_letter,
            _ => None,
        }
    }

    /// 按文本（忽略大小写和空白差异）查找选项在页面上的下标
    pub fn choice_index(&self, answer: &str) -> Option<usize> {
        let wanted = normalize_key(answer);
        if wanted.is_empty() {
            return None;
        }
        self.choices.iter().position(|c| normalize_key(c) == wanted)
    }

    /// 有文本的选项：(页面下标, 文本)
    ///
    /// `choices` 与页面上的 `.choice` 元素一一对应，空文本也占一个位置。
    pub fn labeled_choices(&self) -> (Vec<usize>, Vec<String>) {
        self.choices
            .iter()
            .enumerate()
            .filter(|(_, text)| !text.trim().is_empty())
            .map(|(index, text)| (index, text.clone()))
            .unzip()
    }
}

/// 持久化的答案记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub question: String,
    #[serde(default)]
    pub choices: Vec<String>,
    pub answer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_letter: Option<String>,
}

impl CacheEntry {
    pub fn key(&self) -> String {
        normalize_key(&self.question)
    }
}

/// 等待写入缓存的任务
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveTask {
    pub question: String,
    pub choices: Vec<String>,
    pub answer: String,
    pub first_letter: Option<String>,
}

impl SaveTask {
    pub fn new(question: impl Into<String>, choices: Vec<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            choices,
            answer: answer.into(),
            first_letter: None,
        }
    }

    pub fn with_first_letter(mut self, first_letter: Option<char>) -> Self {
        self.first_letter = first_letter.map(|c| c.to_string());
        self
    }

    pub fn key(&self) -> String {
        normalize_key(&self.question)
    }
}

impl From<SaveTask> for CacheEntry {
    fn from(task: SaveTask) -> Self {
        Self {
            question: task.question,
            choices: task.choices,
            answer: task.answer,
            first_letter: task.first_letter,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_key_collapses_whitespace_and_case() {
        assert_eq!(
            normalize_key("  Choose the   SYNONYM\n of X "),
            "choose the synonym of x"
        );
    }

    #[test]
    fn test_cache_entry_json_shape() {
        let entry: CacheEntry = SaveTask::new("Q", vec!["a".into()], "a")
            .with_first_letter(Some('p'))
            .into();
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["firstLetter"], "p");

        let without: CacheEntry = SaveTask::new("Q", vec![], "a").into();
        let json = serde_json::to_value(&without).unwrap();
        assert!(json.get("firstLetter").is_none());
    }

    #[test]
    fn test_choice_index_ignores_case_and_spacing() {
        let q = Question::new(
            "Q",
            vec!["Happy".into(), "very  sad".into()],
            QuestionType::Choice { hint: None },
        );
        assert_eq!(q.choice_index("VERY SAD"), Some(1));
        assert_eq!(q.choice_index("angry"), None);
    }

    #[test]
    fn test_empty_choices_keep_their_page_position() {
        let q = Question::new(
            "Q",
            vec!["".into(), "bright".into(), " ".into(), "dim".into()],
            QuestionType::Choice { hint: None },
        );
        assert_eq!(q.choice_index("dim"), Some(3));
        assert_eq!(q.choice_index(""), None);

        let (positions, texts) = q.labeled_choices();
        assert_eq!(positions, vec![1, 3]);
        assert_eq!(texts, vec!["bright".to_string(), "dim".to_string()]);
    }

    #[test]
    fn test_probe_signals_tolerate_missing_fields() {
        let signals: ProbeSignals =
            serde_json::from_str(r#"{"questionText": "Q", "answerInput": true}"#).unwrap();
        assert_eq!(signals.question_text.as_deref(), Some("Q"));
        assert!(signals.answer_input);
        assert!(signals.choices.is_empty());
    }
}
