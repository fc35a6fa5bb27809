//! 投递层：报告渲染与投递通道抽象

pub mod html;
pub mod outbox;

use async_trait::async_trait;

use crate::report::BriefReport;
use crate::store::Profile;

pub use html::format_report_html;
pub use outbox::OutboxDelivery;

/// 投递通道：消费完成的报告；返回 Ok(false) 或 Err 都表示投递失败，
/// 但不影响 PipelineResult 的有效性（由调用方决定是否记入历史）
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    async fn send(&self, report: &BriefReport, profile: &Profile) -> anyhow::Result<bool>;
}
