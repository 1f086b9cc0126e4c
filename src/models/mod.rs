pub mod question;
pub mod session;

pub use question::{
    normalize_key, CacheEntry, ProbeSignals, Question, QuestionKind, QuestionType, SaveTask,
};
pub use session::{SessionState, SessionStats};
