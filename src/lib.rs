//! Magpie - 个性化新闻简报智能体
//!
//! 把一组主题变成一期事实落地的个性化简报：并发检索源文档、
//! 起草带引用的摘要、审计草稿并在有界预算内自我纠错。
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型、运行上下文、编排器
//! - **delivery**: 报告渲染与投递通道
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）
//! - **pipeline**: 起草 ⇄ 审计的有界重试循环
//! - **report**: 数据模型与本轮落地文档集
//! - **retrieval**: 候选发现与有界并发抓取
//! - **store**: 画像与历史的文件持久化

pub mod config;
pub mod core;
pub mod delivery;
pub mod llm;
pub mod observability;
pub mod pipeline;
pub mod report;
pub mod retrieval;
pub mod store;

pub use crate::core::{Orchestrator, PipelineError, RunContext};
