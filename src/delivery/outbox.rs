//! 文件投递通道：渲染 HTML 写入发件目录
//!
//! 真实邮件通道实现同一 trait 即可替换；投递失败不影响报告本身的有效性。

use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;

use crate::delivery::{format_report_html, DeliveryChannel};
use crate::report::BriefReport;
use crate::store::Profile;

/// 把 `<report_id>.html` 写进发件目录
#[derive(Debug)]
pub struct OutboxDelivery {
    dir: PathBuf,
}

impl OutboxDelivery {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl DeliveryChannel for OutboxDelivery {
    async fn send(&self, report: &BriefReport, profile: &Profile) -> anyhow::Result<bool> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("create outbox dir {}", self.dir.display()))?;
        let path = self.dir.join(format!("{}.html", report.report_id));
        std::fs::write(&path, format_report_html(report))
            .with_context(|| format!("write report {}", path.display()))?;
        tracing::info!(
            report_id = %report.report_id,
            recipient = %profile.delivery_email,
            path = %path.display(),
            "report written to outbox"
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::Priority;
    use chrono::Utc;

    #[tokio::test]
    async fn test_outbox_writes_report_file() {
        let dir = tempfile::tempdir().unwrap();
        let channel = OutboxDelivery::new(dir.path());
        let report = BriefReport {
            report_id: "r1".into(),
            user_id: "u1".into(),
            generated_at: Utc::now(),
            executive_summary: "s".into(),
            articles: vec![crate::report::Article {
                title: "t".into(),
                summary: "s".into(),
                key_insights: vec![],
                citations: vec![],
                priority: Priority::Low,
                relevance: "r".into(),
                url: "https://example.com".into(),
                source: "example.com".into(),
            }],
            topics_covered: vec![],
            verified: true,
            attempts: 1,
            open_issues: vec![],
        };
        let profile = Profile::new("u1", "Ada", "CTO", "Initech", "fintech", vec![], "a@b.test");

        assert!(channel.send(&report, &profile).await.unwrap());
        assert!(dir.path().join("r1.html").exists());
    }
}
