//! 题目处理流程 - 流程层
//!
//! 核心职责：定义"一轮"的完整处理流程
//!
//! 流程顺序：
//! 1. 读取页面信号 → 识别题型
//! 2. 按题型分派到对应的处理函数
//! 3. 更新会话状态（上一轮题型、练习单词、IKT 标记、已处理集合）

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::{Config, HumanizeConfig, Selectors};
use crate::error::{AppError, AppResult};
use crate::infrastructure::Target;
use crate::models::{normalize_key, Question, QuestionKind, QuestionType, SaveTask, SessionState, SessionStats};
use crate::services::oracle_client::{strip_first_letter, AnswerSource};
use crate::services::{AnswerCache, HumanInput, OracleClient, PageProbe};
use crate::workflow::classifier::Classifier;

/// 一轮处理之后调度器应该做什么
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// 继续轮询
    Continue,
    /// 会话结束，停止轮询
    Terminate,
}

/// 题目处理流程
///
/// - 编排完整的单轮处理流程
/// - 决定何时查缓存、何时读页面答案、何时问 LLM
/// - 不持有会话状态（由调用方传入）
/// - 只依赖业务能力（services）
pub struct QuestionFlow {
    probe: Arc<dyn PageProbe>,
    input: Arc<HumanInput>,
    cache: Arc<AnswerCache>,
    oracle: Arc<OracleClient>,
    classifier: Classifier,
    selectors: Selectors,
    humanize: HumanizeConfig,
    terminal_grace: Duration,
}

impl QuestionFlow {
    /// 创建新的题目处理流程
    pub fn new(
        probe: Arc<dyn PageProbe>,
        input: Arc<HumanInput>,
        cache: Arc<AnswerCache>,
        oracle: Arc<OracleClient>,
        config: &Config,
    ) -> AppResult<Self> {
        Ok(Self {
            probe,
            input,
            cache,
            oracle,
            classifier: Classifier::new(&config.selectors.image_question_pattern)?,
            selectors: config.selectors.clone(),
            humanize: config.humanize.clone(),
            terminal_grace: config.terminal_grace(),
        })
    }

    /// 执行一轮：识别题型并处理
    pub async fn run(
        &self,
        state: &mut SessionState,
        stats: &mut SessionStats,
    ) -> AppResult<CycleOutcome> {
        stats.cycles += 1;
        let cycle = stats.cycles;

        let signals = self.probe.signals().await?;
        let question_type = self
            .classifier
            .classify(&signals, state.last_in_known_territory);
        let question = Question::from_signals(&signals, question_type);
        let kind = question.kind();
        stats.count_kind(kind);

        if kind != QuestionKind::Unknown {
            info!("[第 {} 轮] 📋 {}", cycle, kind);
        }

        let result = match &question.question_type {
            QuestionType::Terminal => return Ok(self.handle_terminal(cycle).await),
            QuestionType::Practice { in_known_territory } => {
                self.handle_practice(cycle, &question, *in_known_territory, state)
                    .await
            }
            QuestionType::FillBlank { .. } => {
                self.handle_fill_blank(cycle, &question, state, stats).await
            }
            QuestionType::ImageChoice => self.handle_image_choice(cycle, &question, state).await,
            QuestionType::Choice { .. } => {
                self.handle_choice(cycle, &question, state, stats).await
            }
            QuestionType::Unknown { in_known_territory } => {
                state.last_in_known_territory = *in_known_territory;
                debug!(
                    "[第 {} 轮] {}",
                    cycle,
                    AppError::ClassificationAmbiguous {
                        detail: format!("题干={:?}", signals.question_text)
                    }
                );
                Ok(())
            }
        };

        state.finish_cycle(kind);
        result.map(|_| CycleOutcome::Continue)
    }

    // ========== 各题型处理 ==========

    /// 结束提示：点击结束按钮，等待一段时间后停止
    async fn handle_terminal(&self, cycle: usize) -> CycleOutcome {
        info!("[第 {} 轮] 🏁 检测到结束提示，点击结束按钮", cycle);
        if let Err(e) = self
            .input
            .click(&Target::first(&self.selectors.stop_button))
            .await
        {
            warn!("[第 {} 轮] ⚠️ 点击结束按钮失败: {}", cycle, e);
        }
        sleep(self.terminal_grace).await;
        CycleOutcome::Terminate
    }

    /// 练习题：依次点击仍在页面上的选项，记录单词，点击下一题
    async fn handle_practice(
        &self,
        cycle: usize,
        question: &Question,
        in_known_territory: bool,
        state: &mut SessionState,
    ) -> AppResult<()> {
        state.last_in_known_territory = in_known_territory;

        let already_done =
            !question.key.is_empty() && state.is_processed(QuestionKind::Practice, &question.key);
        if already_done {
            debug!("[第 {} 轮] 练习题已点击过选项，直接进入下一题", cycle);
        } else {
            if !question.key.is_empty() {
                state.mark_processed(QuestionKind::Practice, &question.key);
            }
            self.input.pause(self.humanize.practice_pre_ms).await;
            self.click_all_choices(cycle).await?;
        }

        let word_form = match self.probe.word_form().await {
            Ok(word) => word,
            Err(e) => {
                warn!("[第 {} 轮] ⚠️ 读取练习单词失败: {}", cycle, e);
                None
            }
        };
        match &word_form {
            Some(word) => info!("[第 {} 轮] 📖 单词: {}", cycle, word),
            None => debug!("[第 {} 轮] 页面上没有练习单词", cycle),
        }
        state.record_practice(word_form, in_known_territory);

        self.input.pause(self.humanize.practice_pre_ms).await;
        self.input
            .click(&Target::first(&self.selectors.next_button))
            .await?;
        info!("[第 {} 轮] ➡️ 已点击下一题", cycle);
        Ok(())
    }

    async fn click_all_choices(&self, cycle: usize) -> AppResult<()> {
        let count = self.input.driver().count(&self.selectors.choice).await?;
        for index in 0..count {
            let target = Target::new(&self.selectors.choice, index);
            if !self.input.driver().is_actionable(&target).await? {
                debug!("[第 {} 轮] 选项 {} 已脱离页面，跳过", cycle, target);
                continue;
            }
            match self.input.click(&target).await {
                Ok(()) => debug!("[第 {} 轮] 已点击选项 {}", cycle, index + 1),
                Err(e) => warn!("[第 {} 轮] ⚠️ 点击选项失败: {}", cycle, e),
            }
            self.input.pause(self.humanize.practice_gap_ms).await;
        }
        Ok(())
    }

    /// 填空题：IKT 练习单词 → 缓存 → LLM，最后逐键输入
    async fn handle_fill_blank(
        &self,
        cycle: usize,
        question: &Question,
        state: &mut SessionState,
        stats: &mut SessionStats,
    ) -> AppResult<()> {
        let hint = question.hint().map(str::to_string);
        let source_text = if question.text.is_empty() {
            hint.clone().unwrap_or_default()
        } else {
            question.text.clone()
        };
        let key = normalize_key(&source_text);

        if !key.is_empty() && state.is_processed(QuestionKind::FillBlank, &key) {
            debug!("[第 {} 轮] 填空题已处理，跳过", cycle);
            return Ok(());
        }

        let first_letter = question.first_letter();
        let blank_length = question.blank_length();

        let text = match (state.follows_known_practice(), state.last_word_form.as_deref()) {
            (true, Some(word)) => {
                info!("[第 {} 轮] 🧠 使用上一道练习题的单词: {}", cycle, word);
                strip_first_letter(word)
            }
            _ => match self.cache.lookup(&source_text).await {
                Some(answer) => {
                    info!("[第 {} 轮] ✓ 缓存命中: {}", cycle, answer);
                    stats.cache_hits += 1;
                    if first_letter.is_some() {
                        strip_first_letter(&answer)
                    } else {
                        answer
                    }
                }
                None => {
                    self.input.pause(self.humanize.oracle_think_ms).await;
                    let clue = hint.as_deref().unwrap_or(&source_text);
                    let answer = self.oracle.resolve_blank(clue, blank_length, first_letter).await;
                    self.count_source(answer.source, stats);
                    if let Some(word) = &answer.word {
                        self.cache.save(
                            SaveTask::new(&source_text, Vec::new(), word.clone())
                                .with_first_letter(first_letter),
                        );
                    }
                    answer.text
                }
            },
        };

        if !key.is_empty() {
            state.mark_processed(QuestionKind::FillBlank, &key);
        }

        info!("[第 {} 轮] ⌨️ 输入: {}", cycle, text);
        self.input
            .type_into(&Target::first(&self.selectors.answer_input), &text)
            .await
    }

    /// 图片题：随机点击一个选项，每道题只处理一次
    async fn handle_image_choice(
        &self,
        cycle: usize,
        question: &Question,
        state: &mut SessionState,
    ) -> AppResult<()> {
        if state.is_processed(QuestionKind::ImageChoice, &question.key) {
            debug!("[第 {} 轮] 图片题已处理，跳过", cycle);
            return Ok(());
        }

        self.input.pause(self.humanize.image_choice_ms).await;
        let count = self.input.driver().count(&self.selectors.choice).await?;
        let index = self
            .input
            .pick_index(count)
            .ok_or_else(|| AppError::probe_miss(&self.selectors.choice))?;
        state.mark_processed(QuestionKind::ImageChoice, &question.key);

        info!("[第 {} 轮] 🖼️ 随机选择第 {} 个选项", cycle, index + 1);
        self.input
            .click(&Target::new(&self.selectors.choice, index))
            .await
    }

    /// 选择题：缓存 → 页面已显示的正确答案 → LLM
    async fn handle_choice(
        &self,
        cycle: usize,
        question: &Question,
        state: &mut SessionState,
        stats: &mut SessionStats,
    ) -> AppResult<()> {
        let (positions, labels) = question.labeled_choices();
        if labels.is_empty() {
            return Err(AppError::probe_miss(&self.selectors.choice));
        }
        info!("[第 {} 轮] 题干: {}", cycle, crate::utils::logging::truncate_text(&question.text, 80));

        if let Some(answer) = self.cache.lookup(&question.text).await {
            match question.choice_index(&answer) {
                Some(index) => {
                    info!("[第 {} 轮] ✓ 缓存命中: {}", cycle, answer);
                    stats.cache_hits += 1;
                    return self.click_choice(index).await;
                }
                None => warn!("[第 {} 轮] ⚠️ 缓存答案不在当前选项中: {}", cycle, answer),
            }
        }

        if state.is_processed(QuestionKind::Choice, &question.key) {
            debug!("[第 {} 轮] 选择题正在处理，跳过", cycle);
            return Ok(());
        }

        state.mark_processed(QuestionKind::Choice, &question.key);
        let result = self
            .answer_choice(cycle, question, &positions, &labels, stats)
            .await;
        state.unmark_processed(QuestionKind::Choice, &question.key);
        result
    }

    async fn answer_choice(
        &self,
        cycle: usize,
        question: &Question,
        positions: &[usize],
        labels: &[String],
        stats: &mut SessionStats,
    ) -> AppResult<()> {
        let revealed = match self.probe.correct_choice().await {
            Ok(revealed) => revealed,
            Err(e) => {
                debug!("[第 {} 轮] 读取页面正确答案失败: {}", cycle, e);
                None
            }
        };
        if let Some(index) = revealed.as_deref().and_then(|c| question.choice_index(c)) {
            let answer = question.choices[index].clone();
            info!("[第 {} 轮] 👀 页面显示正确答案: {}", cycle, answer);
            stats.page_revealed += 1;
            self.cache
                .save(SaveTask::new(&question.text, labels.to_vec(), answer));
            return self.click_choice(index).await;
        }

        self.input.pause(self.humanize.oracle_think_ms).await;
        let answer = self
            .oracle
            .resolve_choice(&question.text, labels)
            .await?;
        self.count_source(answer.source, stats);
        let index = positions
            .get(answer.index)
            .copied()
            .ok_or_else(|| AppError::probe_miss(&self.selectors.choice))?;
        self.click_choice(index).await
    }

    async fn click_choice(&self, index: usize) -> AppResult<()> {
        self.input
            .click(&Target::new(&self.selectors.choice, index))
            .await
    }

    fn count_source(&self, source: AnswerSource, stats: &mut SessionStats) {
        match source {
            AnswerSource::Oracle => stats.oracle_answers += 1,
            AnswerSource::Fallback => stats.fallbacks += 1,
        }
    }
}
