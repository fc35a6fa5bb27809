//! 核心层：错误类型、运行上下文与编排器

pub mod context;
pub mod error;
pub mod orchestrator;

pub use context::RunContext;
pub use error::PipelineError;
pub use orchestrator::{create_llm_from_config, Orchestrator};
