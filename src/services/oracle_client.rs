//! 答案推断服务 - 业务能力层
//!
//! 通过 LLM 推断答案，并负责校验、重试和随机兜底。
//! 选择题的每一个最终结果（无论来自 LLM 还是随机）都会写入答案缓存。

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::Rng;
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult};
use crate::models::SaveTask;
use crate::services::answer_cache::AnswerCache;
use crate::services::keyboard;

/// 选择题回答"不知道"时的固定文本
pub const UNKNOWN: &str = "Unknown";

/// 提示词类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    MultipleChoice,
    FillBlank,
}

/// 对 LLM 响应的约束
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleConstraints {
    pub kind: PromptKind,
    /// 允许的响应集合（填空题为空，表示任意单词）
    pub allowed: Vec<String>,
}

/// LLM 能力
#[async_trait]
pub trait Oracle: Send + Sync {
    async fn request(&self, prompt: &str, constraints: &OracleConstraints) -> AppResult<String>;

    /// 就绪检查
    async fn ready(&self) -> AppResult<()>;
}

/// 答案来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerSource {
    Oracle,
    Fallback,
}

/// 选择题推断结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChoiceAnswer {
    pub index: usize,
    pub letter: char,
    pub answer: String,
    pub source: AnswerSource,
}

/// 填空题推断结果（已去掉页面上显示的首字母）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlankAnswer {
    pub text: String,
    pub word: Option<String>,
    pub source: AnswerSource,
}

/// 选择题响应的解析结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChoiceVerdict {
    Letter(usize),
    Unknown,
}

/// 选项字母 A、B、C…
pub fn letters_for(count: usize) -> Vec<char> {
    (b'A'..=b'Z').take(count).map(char::from).collect()
}

/// 选择题的约束集合：n 个字母加上 "Unknown"
pub fn choice_constraints(count: usize) -> OracleConstraints {
    let mut allowed: Vec<String> = letters_for(count).into_iter().map(String::from).collect();
    allowed.push(UNKNOWN.to_string());
    OracleConstraints {
        kind: PromptKind::MultipleChoice,
        allowed,
    }
}

/// 构建选择题提示词
pub fn build_choice_prompt(question: &str, choices: &[String]) -> String {
    let letters = letters_for(choices.len());
    let options = choices
        .iter()
        .zip(&letters)
        .map(|(choice, letter)| format!("{}) {}", letter, choice))
        .collect::<Vec<_>>()
        .join(", ");
    let letter_list = letters
        .iter()
        .map(char::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "Question: {} | Answer options: {} | Answer (respond with only the letter {} or '{}'):",
        question, options, letter_list, UNKNOWN
    )
}

/// 校验选择题响应：必须恰好是约束集合中的一项
///
/// 只容忍首尾空白、大小写以及一个结尾的 `.` 或 `)`。
pub fn parse_choice_response(raw: &str, count: usize) -> AppResult<ChoiceVerdict> {
    let cleaned = raw.trim();
    let cleaned = cleaned
        .strip_suffix('.')
        .or_else(|| cleaned.strip_suffix(')'))
        .unwrap_or(cleaned)
        .trim();

    if cleaned.eq_ignore_ascii_case(UNKNOWN) {
        return Ok(ChoiceVerdict::Unknown);
    }

    let mut chars = cleaned.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => letters_for(count)
            .iter()
            .position(|l| l.eq_ignore_ascii_case(&c))
            .map(ChoiceVerdict::Letter)
            .ok_or_else(|| AppError::oracle_invalid(raw)),
        _ => Err(AppError::oracle_invalid(raw)),
    }
}

/// 构建填空题提示词
pub fn build_blank_prompt(hint: &str, blank_length: Option<usize>, first_letter: Option<char>) -> String {
    let length = blank_length
        .map(|n| format!("{}-letter ", n))
        .unwrap_or_default();
    let start = first_letter
        .map(|c| format!(" that starts with '{}' and", c))
        .unwrap_or_else(|| " that".to_string());
    format!(
        "What is a {}word{} means something similar to '{}'? Respond with only the word.",
        length, start, hint
    )
}

/// 校验填空题响应：单个字母单词，以指定字母开头，长度与空格一致
pub fn parse_blank_response(
    raw: &str,
    blank_length: Option<usize>,
    first_letter: Option<char>,
) -> AppResult<String> {
    let word = raw
        .trim()
        .trim_end_matches(['.', '!', ',', ';'])
        .trim_matches(['"', '\''])
        .trim();

    let valid = !word.is_empty()
        && word.chars().all(|c| c.is_ascii_alphabetic())
        && first_letter.is_none_or(|f| {
            word.chars()
                .next()
                .is_some_and(|c| c.eq_ignore_ascii_case(&f))
        })
        && blank_length.is_none_or(|n| word.chars().count() == n);

    if valid {
        Ok(word.to_lowercase())
    } else {
        Err(AppError::oracle_invalid(raw))
    }
}

/// 去掉页面上已经显示的首字母
pub fn strip_first_letter(word: &str) -> String {
    word.chars().skip(1).collect()
}

/// 答案推断客户端
pub struct OracleClient {
    oracle: Arc<dyn Oracle>,
    cache: Arc<AnswerCache>,
    rng: Mutex<StdRng>,
    /// 选择题最多请求次数（首次 + 重试一次）
    max_attempts: usize,
    /// 缺少空格长度时兜底字符串的长度
    default_blank_length: usize,
}

impl OracleClient {
    pub fn new(oracle: Arc<dyn Oracle>, cache: Arc<AnswerCache>, rng: StdRng) -> Self {
        Self {
            oracle,
            cache,
            rng: Mutex::new(rng),
            max_attempts: 2,
            default_blank_length: 7,
        }
    }

    /// 在限定时间内等待 LLM 就绪，超时视为致命错误
    pub async fn wait_ready(&self, timeout: Duration) -> AppResult<()> {
        info!("⏳ 等待 LLM 服务就绪...");
        match tokio::time::timeout(timeout, self.oracle.ready()).await {
            Ok(Ok(())) => {
                info!("✓ LLM 服务已就绪");
                Ok(())
            }
            Ok(Err(e)) => Err(AppError::Fatal(format!("LLM 服务不可用: {}", e))),
            Err(_) => Err(AppError::Fatal(format!(
                "LLM 服务在 {} 秒内未就绪",
                timeout.as_secs()
            ))),
        }
    }

    fn random_index(&self, len: usize) -> usize {
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        rng.random_range(0..len)
    }

    /// 推断选择题答案
    ///
    /// 响应无效或调用失败时重试一次；仍失败（或 LLM 回答 Unknown）则随机选择。
    pub async fn resolve_choice(&self, question: &str, choices: &[String]) -> AppResult<ChoiceAnswer> {
        if choices.is_empty() {
            return Err(AppError::probe_miss("选项列表为空"));
        }
        let choices = &choices[..choices.len().min(26)];
        let letters = letters_for(choices.len());
        let prompt = build_choice_prompt(question, choices);
        let constraints = choice_constraints(choices.len());
        debug!("发送给 LLM: {}", prompt);

        let mut resolved = None;
        for attempt in 1..=self.max_attempts {
            let outcome = match self.oracle.request(&prompt, &constraints).await {
                Ok(raw) => parse_choice_response(&raw, choices.len()),
                Err(e) => Err(e),
            };
            match outcome {
                Ok(ChoiceVerdict::Letter(index)) => {
                    resolved = Some(index);
                    break;
                }
                Ok(ChoiceVerdict::Unknown) => {
                    info!("🤷 LLM 表示不知道答案");
                    break;
                }
                Err(e) => warn!(
                    "⚠️ LLM 推断失败 (第 {}/{} 次): {}",
                    attempt, self.max_attempts, e
                ),
            }
        }

        let (index, source) = match resolved {
            Some(index) => (index, AnswerSource::Oracle),
            None => {
                let index = self.random_index(choices.len());
                warn!("🎲 使用随机选项 {}", letters[index]);
                (index, AnswerSource::Fallback)
            }
        };

        let answer = ChoiceAnswer {
            index,
            letter: letters[index],
            answer: choices[index].clone(),
            source,
        };
        info!("✓ 选择 {}) {}", answer.letter, answer.answer);

        self.cache
            .save(SaveTask::new(question, choices.to_vec(), answer.answer.clone()));
        Ok(answer)
    }

    /// 推断填空题答案
    ///
    /// 返回的文本不含首字母，长度为 `blank_length - 1`；LLM 失败时用键盘连续键簇兜底。
    pub async fn resolve_blank(
        &self,
        hint: &str,
        blank_length: Option<usize>,
        first_letter: Option<char>,
    ) -> BlankAnswer {
        let prompt = build_blank_prompt(hint, blank_length, first_letter);
        let constraints = OracleConstraints {
            kind: PromptKind::FillBlank,
            allowed: Vec::new(),
        };
        debug!("发送给 LLM: {}", prompt);

        let outcome = match self.oracle.request(&prompt, &constraints).await {
            Ok(raw) => parse_blank_response(&raw, blank_length, first_letter),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(word) => {
                let text = if first_letter.is_some() {
                    strip_first_letter(&word)
                } else {
                    word.clone()
                };
                info!("✓ LLM 给出单词: {}", word);
                BlankAnswer {
                    text,
                    word: Some(word),
                    source: AnswerSource::Oracle,
                }
            }
            Err(e) => {
                warn!("⚠️ 填空推断失败，使用随机键簇: {}", e);
                let total = blank_length.unwrap_or(self.default_blank_length);
                let len = if first_letter.is_some() {
                    total.saturating_sub(1)
                } else {
                    total
                };
                let text = {
                    let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
                    keyboard::cluster_word(len, &mut *rng)
                };
                BlankAnswer {
                    text,
                    word: None,
                    source: AnswerSource::Fallback,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::answer_cache::MemoryStore;
    use rand::SeedableRng;
    use std::collections::VecDeque;

    /// 按顺序返回预设响应的 LLM
    struct ScriptedOracle {
        replies: Mutex<VecDeque<AppResult<String>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedOracle {
        fn new(replies: Vec<AppResult<String>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Oracle for ScriptedOracle {
        async fn request(&self, prompt: &str, _constraints: &OracleConstraints) -> AppResult<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(AppError::oracle_transport("test", "no more replies")))
        }

        async fn ready(&self) -> AppResult<()> {
            Ok(())
        }
    }

    fn client(oracle: Arc<ScriptedOracle>) -> (OracleClient, Arc<MemoryStore>, Arc<AnswerCache>) {
        let store = Arc::new(MemoryStore::new());
        let cache = Arc::new(AnswerCache::start(store.clone()));
        let client = OracleClient::new(oracle, cache.clone(), StdRng::seed_from_u64(17));
        (client, store, cache)
    }

    fn choices(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("choice {i}")).collect()
    }

    #[test]
    fn test_constraint_set_has_n_letters_plus_unknown() {
        for n in 2..=5 {
            let constraints = choice_constraints(n);
            assert_eq!(constraints.allowed.len(), n + 1);
            assert_eq!(constraints.allowed.last().unwrap(), UNKNOWN);

            let prompt = build_choice_prompt("Q", &choices(n));
            let last = letters_for(n)[n - 1];
            assert!(prompt.contains(&format!("{}) choice {}", last, n - 1)));
            let outside = char::from(b'A' + n as u8);
            assert!(!prompt.contains(&format!("{})", outside)));
        }
    }

    #[test]
    fn test_parse_choice_response_closed_set() {
        assert_eq!(parse_choice_response("B", 4).unwrap(), ChoiceVerdict::Letter(1));
        assert_eq!(parse_choice_response(" c. ", 4).unwrap(), ChoiceVerdict::Letter(2));
        assert_eq!(parse_choice_response("unknown", 4).unwrap(), ChoiceVerdict::Unknown);
        assert!(parse_choice_response("E", 4).is_err());
        assert!(parse_choice_response("The answer is B", 4).is_err());
        assert!(parse_choice_response("", 4).is_err());
        assert!(parse_choice_response("AB", 4).is_err());
    }

    #[tokio::test]
    async fn test_valid_answer_is_cached() {
        let oracle = ScriptedOracle::new(vec![Ok("B".into())]);
        let (client, store, cache) = client(oracle.clone());

        let answer = client.resolve_choice("Q: choose", &choices(4)).await.unwrap();
        assert_eq!(answer.index, 1);
        assert_eq!(answer.source, AnswerSource::Oracle);
        assert_eq!(oracle.calls(), 1);

        cache.flush().await;
        let entries = store.snapshot();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].answer, "choice 1");
    }

    #[tokio::test]
    async fn test_invalid_then_valid_retries_once() {
        let oracle = ScriptedOracle::new(vec![Ok("Z".into()), Ok("A".into())]);
        let (client, _, _) = client(oracle.clone());

        let answer = client.resolve_choice("Q", &choices(3)).await.unwrap();
        assert_eq!(answer.index, 0);
        assert_eq!(answer.source, AnswerSource::Oracle);
        assert_eq!(oracle.calls(), 2);
    }

    #[tokio::test]
    async fn test_invalid_twice_falls_back_to_random_member() {
        for n in 2..=5 {
            let oracle = ScriptedOracle::new(vec![
                Ok("maybe".into()),
                Err(AppError::oracle_transport("test", "connection reset")),
                Ok("A".into()),
            ]);
            let (client, store, cache) = client(oracle.clone());

            let answer = client.resolve_choice("Q", &choices(n)).await.unwrap();
            assert_eq!(oracle.calls(), 2);
            assert_eq!(answer.source, AnswerSource::Fallback);
            assert!(answer.index < n);
            assert_eq!(answer.answer, choices(n)[answer.index]);

            // 随机结果同样写入缓存
            cache.flush().await;
            assert_eq!(store.snapshot()[0].answer, answer.answer);
        }
    }

    #[tokio::test]
    async fn test_unknown_goes_straight_to_fallback() {
        let oracle = ScriptedOracle::new(vec![Ok("Unknown".into()), Ok("A".into())]);
        let (client, _, _) = client(oracle.clone());

        let answer = client.resolve_choice("Q", &choices(4)).await.unwrap();
        assert_eq!(oracle.calls(), 1);
        assert_eq!(answer.source, AnswerSource::Fallback);
    }

    #[tokio::test]
    async fn test_blank_answer_strips_first_letter() {
        let oracle = ScriptedOracle::new(vec![Ok("Cheerful.".into())]);
        let (client, _, _) = client(oracle.clone());

        let answer = client.resolve_blank("happy", Some(8), Some('c')).await;
        assert_eq!(answer.text, "heerful");
        assert_eq!(answer.word.as_deref(), Some("cheerful"));
        assert_eq!(answer.source, AnswerSource::Oracle);
        assert!(oracle.prompts.lock().unwrap()[0].contains("8-letter word that starts with 'c'"));
    }

    #[tokio::test]
    async fn test_blank_length_is_always_blank_minus_one() {
        let replies: Vec<AppResult<String>> = vec![
            Ok("glad".into()),      // 长度不符
            Ok("joyful".into()),    // 首字母不符
            Ok("two words".into()), // 不是单个单词
            Err(AppError::oracle_transport("test", "timeout")),
            Ok("pleased".into()), // 合法
        ];
        let oracle = ScriptedOracle::new(replies);
        let (client, _, _) = client(oracle);

        for _ in 0..5 {
            let answer = client.resolve_blank("happy", Some(7), Some('p')).await;
            assert_eq!(answer.text.chars().count(), 6);
        }
    }

    #[test]
    fn test_parse_blank_response_rules() {
        assert_eq!(parse_blank_response(" Pleased ", Some(7), Some('p')).unwrap(), "pleased");
        assert!(parse_blank_response("pleased", Some(6), Some('p')).is_err());
        assert!(parse_blank_response("pleased", Some(7), Some('x')).is_err());
        assert!(parse_blank_response("pl3ased", Some(7), Some('p')).is_err());
        assert_eq!(parse_blank_response("glad", None, None).unwrap(), "glad");
    }
}
