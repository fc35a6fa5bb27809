//! 数据模型层：阶段间强类型契约与本轮落地文档集

pub mod grounding;
pub mod schema;

pub use grounding::GroundingStore;
pub use schema::{
    Article, BriefReport, Citation, DraftBundle, Feedback, HistoryEntry, Priority, RetrievedDoc,
    SearchHit, Verdict,
};
