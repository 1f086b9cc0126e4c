//! 会话状态
//!
//! 跨轮次保留的信息，只由编排层修改。

use std::collections::{HashMap, HashSet};

use crate::models::question::QuestionKind;

/// 会话状态
#[derive(Debug, Default)]
pub struct SessionState {
    /// 上一轮（已识别）的题型
    pub last_kind: Option<QuestionKind>,
    /// 最近一次练习题展示的单词
    pub last_word_form: Option<String>,
    /// 最近一次的 IKT 标记
    pub last_in_known_territory: bool,
    processed: HashMap<QuestionKind, HashSet<String>>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_processed(&self, kind: QuestionKind, key: &str) -> bool {
        self.processed
            .get(&kind)
            .is_some_and(|keys| keys.contains(key))
    }

    /// 标记为已处理，返回是否为新标记
    pub fn mark_processed(&mut self, kind: QuestionKind, key: &str) -> bool {
        self.processed
            .entry(kind)
            .or_default()
            .insert(key.to_string())
    }

    pub fn unmark_processed(&mut self, kind: QuestionKind, key: &str) {
        if let Some(keys) = self.processed.get_mut(&kind) {
            keys.remove(key);
        }
    }

    /// 上一轮是否为带 IKT 标记的练习题
    pub fn follows_known_practice(&self) -> bool {
        self.last_kind == Some(QuestionKind::Practice) && self.last_in_known_territory
    }

    /// 记录练习题结束时捕获的信息
    pub fn record_practice(&mut self, word_form: Option<String>, in_known_territory: bool) {
        self.last_word_form = word_form;
        self.last_in_known_territory = in_known_territory;
    }

    /// 一轮结束时更新题型；未知题型不覆盖上一轮的信息
    pub fn finish_cycle(&mut self, kind: QuestionKind) {
        if kind != QuestionKind::Unknown {
            self.last_kind = Some(kind);
        }
    }
}

/// 会话统计
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SessionStats {
    pub cycles: usize,
    pub skipped_ticks: usize,
    pub failed_cycles: usize,
    pub practice: usize,
    pub fill_blank: usize,
    pub image_choice: usize,
    pub choice: usize,
    pub unknown: usize,
    pub cache_hits: usize,
    pub page_revealed: usize,
    pub oracle_answers: usize,
    pub fallbacks: usize,
}

impl SessionStats {
    pub fn count_kind(&mut self, kind: QuestionKind) {
        match kind {
            QuestionKind::Practice => self.practice += 1,
            QuestionKind::FillBlank => self.fill_blank += 1,
            QuestionKind::ImageChoice => self.image_choice += 1,
            QuestionKind::Choice => self.choice += 1,
            QuestionKind::Unknown => self.unknown += 1,
            QuestionKind::Terminal => {}
        }
    }
}
