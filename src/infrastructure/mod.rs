//! 基础设施层
//!
//! 持有稀缺资源（Page），只暴露能力

pub mod js_executor;
pub mod page_driver;

pub use js_executor::JsExecutor;
pub use page_driver::{PageDriver, Target};
