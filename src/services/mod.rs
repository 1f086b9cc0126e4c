pub mod answer_cache;
pub mod human_input;
pub mod keyboard;
pub mod llm_service;
pub mod motion;
pub mod oracle_client;
pub mod page_probe;

pub use answer_cache::{AnswerCache, CacheStore, JsonFileStore, MemoryStore};
pub use human_input::HumanInput;
pub use llm_service::LlmService;
pub use motion::{BoundingBox, KeyStep, Keystroke, MotionSynthesizer, PathStep, Point};
pub use oracle_client::{Oracle, OracleClient, OracleConstraints, PromptKind};
pub use page_probe::{DomProbe, PageProbe};
