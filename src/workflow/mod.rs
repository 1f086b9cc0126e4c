pub mod classifier;
pub mod question_flow;

pub use classifier::Classifier;
pub use question_flow::{CycleOutcome, QuestionFlow};
