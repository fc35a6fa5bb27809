//! 持久化层：用户画像与历史日志（每用户 JSON 文件）

pub mod history;
pub mod profile;

pub use history::HistoryStore;
pub use profile::{ConstraintSet, Profile, ProfileStore};
