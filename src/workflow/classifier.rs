//! 题型识别 - 流程层
//!
//! 按固定优先级的规则表把页面信号映射为 `QuestionType`，第一个命中的规则生效。
//!
//! | 优先级 | 条件 | 题型 |
//! |---|---|---|
//! | 1 | 结束标记 | Terminal |
//! | 2 | 练习标记 或 IKT 标记 | Practice |
//! | 3 | 题干匹配图片题正则 且 有图片 | ImageChoice |
//! | 4 | 有填空输入框 | FillBlank |
//! | 5 | 能读到题干 | Choice |
//! | 6 | 其它 | Unknown |

use regex::Regex;

use crate::error::{AppError, AppResult};
use crate::models::{ProbeSignals, QuestionType};

/// 单条规则的输入
pub struct RuleInput<'a> {
    pub signals: &'a ProbeSignals,
    pub image_pattern: &'a Regex,
    /// 上一次记录的 IKT 标记
    pub last_in_known_territory: bool,
}

/// 规则：判定条件 + 题型构造
struct Rule {
    name: &'static str,
    matches: fn(&RuleInput) -> bool,
    build: fn(&RuleInput) -> QuestionType,
}

pub fn is_terminal(input: &RuleInput) -> bool {
    input.signals.terminal_marker
}

pub fn is_practice(input: &RuleInput) -> bool {
    input.signals.practice_marker || input.signals.known_territory_marker
}

pub fn is_image_choice(input: &RuleInput) -> bool {
    input.signals.has_image
        && input
            .signals
            .question_text
            .as_deref()
            .is_some_and(|text| input.image_pattern.is_match(text))
}

pub fn is_fill_blank(input: &RuleInput) -> bool {
    input.signals.answer_input
}

pub fn is_choice(input: &RuleInput) -> bool {
    input
        .signals
        .question_text
        .as_deref()
        .is_some_and(|text| !text.trim().is_empty())
}

fn first_letter(signals: &ProbeSignals) -> Option<char> {
    signals
        .first_letter
        .as_deref()
        .and_then(|s| s.trim().chars().next())
}

const RULES: &[Rule] = &[
    Rule {
        name: "terminal",
        matches: is_terminal,
        build: |_| QuestionType::Terminal,
    },
    Rule {
        name: "practice",
        matches: is_practice,
        build: |input| QuestionType::Practice {
            in_known_territory: input.signals.known_territory_marker,
        },
    },
    Rule {
        name: "image_choice",
        matches: is_image_choice,
        build: |_| QuestionType::ImageChoice,
    },
    Rule {
        name: "fill_blank",
        matches: is_fill_blank,
        build: |input| QuestionType::FillBlank {
            hint: input.signals.hint.clone(),
            blank_length: input.signals.blank_length,
            first_letter: first_letter(input.signals),
        },
    },
    Rule {
        name: "choice",
        matches: is_choice,
        build: |input| QuestionType::Choice {
            hint: input.signals.hint.clone(),
        },
    },
];

/// 题型识别器
pub struct Classifier {
    image_pattern: Regex,
}

impl Classifier {
    pub fn new(image_question_pattern: &str) -> AppResult<Self> {
        let image_pattern = Regex::new(image_question_pattern)
            .map_err(|e| AppError::Config(format!("图片题正则无效: {}", e)))?;
        Ok(Self { image_pattern })
    }

    /// 识别题型；没有规则命中时返回 `Unknown` 并转发上一次的 IKT 标记
    pub fn classify(&self, signals: &ProbeSignals, last_in_known_territory: bool) -> QuestionType {
        let input = RuleInput {
            signals,
            image_pattern: &self.image_pattern,
            last_in_known_territory,
        };
        RULES
            .iter()
            .find(|rule| (rule.matches)(&input))
            .map(|rule| {
                tracing::debug!("命中规则: {}", rule.name);
                (rule.build)(&input)
            })
            .unwrap_or(QuestionType::Unknown {
                in_known_territory: input.last_in_known_territory,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Selectors;

    fn classifier() -> Classifier {
        Classifier::new(&Selectors::default().image_question_pattern).unwrap()
    }

    fn question(text: &str) -> ProbeSignals {
        ProbeSignals {
            question_text: Some(text.to_string()),
            choices: vec!["a".into(), "b".into()],
            ..ProbeSignals::default()
        }
    }

    #[test]
    fn test_terminal_beats_everything() {
        let signals = ProbeSignals {
            terminal_marker: true,
            practice_marker: true,
            answer_input: true,
            ..question("Which image shows X?")
        };
        assert_eq!(classifier().classify(&signals, false), QuestionType::Terminal);
    }

    #[test]
    fn test_ikt_marker_alone_means_practice() {
        let signals = ProbeSignals {
            known_territory_marker: true,
            ..ProbeSignals::default()
        };
        assert_eq!(
            classifier().classify(&signals, false),
            QuestionType::Practice {
                in_known_territory: true
            }
        );

        let signals = ProbeSignals {
            practice_marker: true,
            ..question("pleasant")
        };
        assert_eq!(
            classifier().classify(&signals, true),
            QuestionType::Practice {
                in_known_territory: false
            }
        );
    }

    #[test]
    fn test_image_choice_needs_both_text_and_image() {
        let c = classifier();
        let with_image = ProbeSignals {
            has_image: true,
            ..question("Which picture best fits the word?")
        };
        assert_eq!(c.classify(&with_image, false), QuestionType::ImageChoice);

        // 题干提到图片但页面没有图片
        let without_image = question("Which picture best fits the word?");
        assert_eq!(
            c.classify(&without_image, false),
            QuestionType::Choice { hint: None }
        );

        // 有图片但题干不是图片题
        let unrelated = ProbeSignals {
            has_image: true,
            ..question("Choose the synonym of X")
        };
        assert_eq!(
            c.classify(&unrelated, false),
            QuestionType::Choice { hint: None }
        );
    }

    #[test]
    fn test_fill_blank_carries_metadata() {
        let signals = ProbeSignals {
            answer_input: true,
            hint: Some("happy".into()),
            blank_length: Some(7),
            first_letter: Some(" p".into()),
            ..question("Type the word")
        };
        assert_eq!(
            classifier().classify(&signals, false),
            QuestionType::FillBlank {
                hint: Some("happy".into()),
                blank_length: Some(7),
                first_letter: Some('p'),
            }
        );
    }

    #[test]
    fn test_unknown_forwards_last_ikt_flag() {
        let c = classifier();
        assert_eq!(
            c.classify(&ProbeSignals::default(), true),
            QuestionType::Unknown {
                in_known_territory: true
            }
        );
        assert_eq!(
            c.classify(&question("   "), false),
            QuestionType::Unknown {
                in_known_territory: false
            }
        );
    }

    #[test]
    fn test_individual_predicates() {
        let re = Regex::new(&Selectors::default().image_question_pattern).unwrap();
        let signals = ProbeSignals {
            has_image: true,
            ..question("Which photo matches?")
        };
        let input = RuleInput {
            signals: &signals,
            image_pattern: &re,
            last_in_known_territory: false,
        };
        assert!(!is_terminal(&input));
        assert!(!is_practice(&input));
        assert!(is_image_choice(&input));
        assert!(!is_fill_blank(&input));
        assert!(is_choice(&input));
    }

    #[test]
    fn test_invalid_pattern_is_config_error() {
        assert!(matches!(Classifier::new("("), Err(AppError::Config(_))));
    }
}
