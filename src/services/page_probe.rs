//! 页面探测 - 业务能力层
//!
//! 只负责"读取页面"能力：题干、选项和各种题型标记。
//! 每次读取都是独立快照，不保证多次读取之间的一致性。

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::config::Selectors;
use crate::error::AppResult;
use crate::infrastructure::JsExecutor;
use crate::models::ProbeSignals;

#[async_trait]
pub trait PageProbe: Send + Sync {
    /// 读取分类所需的全部信号
    async fn signals(&self) -> AppResult<ProbeSignals>;

    /// 页面上被标记为正确的选项文本
    async fn correct_choice(&self) -> AppResult<Option<String>>;

    /// 练习题展示的单词
    async fn word_form(&self) -> AppResult<Option<String>>;
}

/// 去掉答题后追加在题干末尾的判定文字，并合并空白
pub fn clean_question_text(raw: &str) -> Option<String> {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    let trimmed = collapsed
        .strip_suffix(" Correct!")
        .or_else(|| collapsed.strip_suffix(" Incorrect!"))
        .unwrap_or(&collapsed)
        .trim()
        .to_string();
    (!trimmed.is_empty()).then_some(trimmed)
}

/// 基于 DOM 的页面探测
pub struct DomProbe {
    executor: Arc<JsExecutor>,
    selectors: Selectors,
}

/// 单个文本读取的返回结构
#[derive(Debug, Deserialize)]
struct TextProbe {
    text: Option<String>,
}

impl DomProbe {
    pub fn new(executor: Arc<JsExecutor>, selectors: Selectors) -> Self {
        Self {
            executor,
            selectors,
        }
    }

    async fn read_text(&self, selector: &str) -> AppResult<Option<String>> {
        let js_code = format!(
            r#"
            (() => {{
                const el = document.querySelector({});
                return {{ text: el ? el.textContent.replace(/\s+/g, ' ').trim() : null }};
            }})()
            "#,
            serde_json::to_string(selector)?
        );
        let probe: TextProbe = self.executor.eval_as(js_code).await?;
        Ok(probe.text.filter(|t| !t.is_empty()))
    }

    fn signals_script(&self) -> AppResult<String> {
        let s = &self.selectors;
        Ok(format!(
            r#"
            (() => {{
                const q = (sel) => document.querySelector(sel);
                const clean = (el) => el ? el.textContent.replace(/\s+/g, ' ').trim() : null;
                const question = q({question});
                const box = q({answer_box});
                const input = q({answer_input});
                const firstLetter = clean(q({first_letter}));
                let blankLength = null;
                const declared = box && (box.getAttribute('data-length') || (input && input.getAttribute('data-length')));
                if (declared && !isNaN(parseInt(declared, 10))) {{
                    blankLength = parseInt(declared, 10);
                }} else if (input && input.maxLength > 0) {{
                    blankLength = input.maxLength + (firstLetter ? 1 : 0);
                }}
                return {{
                    questionText: clean(question),
                    choices: Array.from(document.querySelectorAll({choice})).map(clean),
                    hasImage: !!q({question_image}),
                    practiceMarker: !!q({next_button}),
                    knownTerritoryMarker: !!q({known_territory}),
                    answerInput: !!box,
                    hint: clean(q({hint})),
                    blankLength: blankLength,
                    firstLetter: firstLetter,
                    terminalMarker: !!q({stop_prompt}),
                }};
            }})()
            "#,
            question = serde_json::to_string(&s.question)?,
            answer_box = serde_json::to_string(&s.answer_box)?,
            answer_input = serde_json::to_string(&s.answer_input)?,
            first_letter = serde_json::to_string(&s.first_letter)?,
            choice = serde_json::to_string(&s.choice)?,
            question_image = serde_json::to_string(&s.question_image)?,
            next_button = serde_json::to_string(&s.next_button)?,
            known_territory = serde_json::to_string(&s.known_territory)?,
            hint = serde_json::to_string(&s.hint)?,
            stop_prompt = serde_json::to_string(&s.stop_prompt)?,
        ))
    }
}

#[async_trait]
impl PageProbe for DomProbe {
    /// `choices` 保留页面上每一个 `.choice`（包括空文本），下标与 DOM 一致
    async fn signals(&self) -> AppResult<ProbeSignals> {
        let mut signals: ProbeSignals = self.executor.eval_as(self.signals_script()?).await?;
        signals.question_text = signals
            .question_text
            .as_deref()
            .and_then(clean_question_text);
        debug!(
            "页面信号: 题干={:?}, 选项数={}, 练习={}, 填空={}, 结束={}",
            signals.question_text,
            signals.choices.iter().filter(|c| !c.is_empty()).count(),
            signals.practice_marker,
            signals.answer_input,
            signals.terminal_marker
        );
        Ok(signals)
    }

    async fn correct_choice(&self) -> AppResult<Option<String>> {
        self.read_text(&self.selectors.correct_choice).await
    }

    async fn word_form(&self) -> AppResult<Option<String>> {
        self.read_text(&self.selectors.word_form).await
    }
}
