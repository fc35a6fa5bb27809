//! 报告数据模型：检索文档、引用、草稿、裁决与最终简报
//!
//! 各阶段之间的强类型契约：Writer 产出 DraftBundle，Auditor 产出 Verdict，
//! 循环结束后组装为 BriefReport。引用不变量（每篇文章 ≥1 条引用、
//! source_url 必须命中本轮成功抓取的文档）由 drafter / auditor 分别执行。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 文章优先级（与生成端约定小写序列化）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
}

impl Priority {
    /// 宽松解析：生成端可能输出任意大小写（"HIGH" / "High" / "high"）
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "critical" => Some(Self::Critical),
            "high" => Some(Self::High),
            "medium" => Some(Self::Medium),
            "low" => Some(Self::Low),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

/// SearchProvider 返回的候选（仅 URL 与元信息，不含正文）
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchHit {
    pub url: String,
    pub title: String,
    pub snippet: String,
    /// 展示域名（如 bloomberg.com）
    pub source: String,
}

/// 一次抓取的结果；失败也产出一条记录（success=false），不会中断批次
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetrievedDoc {
    /// 产出该候选的主题
    pub topic: String,
    /// 该主题内的搜索名次（0 起）
    pub rank: usize,
    pub url: String,
    pub title: String,
    pub text: String,
    pub source: String,
    pub fetched_at: DateTime<Utc>,
    pub success: bool,
    pub error: Option<String>,
}

impl RetrievedDoc {
    /// 抓取失败时的占位记录
    pub fn failed(topic: &str, rank: usize, url: &str, error: impl Into<String>) -> Self {
        Self {
            topic: topic.to_string(),
            rank,
            url: url.to_string(),
            title: String::new(),
            text: String::new(),
            source: String::new(),
            fetched_at: Utc::now(),
            success: false,
            error: Some(error.into()),
        }
    }
}

/// 引用：将一条断言锚定到本轮抓取的某篇文档
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Citation {
    pub claim: String,
    /// 来源原文的直接引文
    pub quote: String,
    pub source_url: String,
    pub source_title: String,
}

impl Citation {
    /// 四个字段是否都非空（完整性检查）
    pub fn is_complete(&self) -> bool {
        !self.claim.trim().is_empty()
            && !self.quote.trim().is_empty()
            && !self.source_url.trim().is_empty()
            && !self.source_title.trim().is_empty()
    }
}

/// 草稿中的一篇文章；进入 DraftBundle 前必须至少有 1 条引用
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    pub summary: String,
    pub key_insights: Vec<String>,
    pub citations: Vec<Citation>,
    pub priority: Priority,
    /// 为什么与该用户相关
    pub relevance: String,
    pub url: String,
    pub source: String,
}

/// Writer 一次尝试的完整产出；每次重试整体重建，不做跨尝试合并
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DraftBundle {
    pub executive_summary: String,
    pub articles: Vec<Article>,
}

/// Auditor 对单篇文章的裁决（每篇文章每次尝试恰好产出一条）
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Verdict {
    pub article_title: String,
    pub verified: bool,
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub missing_citations: Vec<String>,
    /// 给 Writer 的人类可读反馈（未通过时拼入下一轮提示）
    pub feedback: String,
    #[serde(default)]
    pub retry_suggested: bool,
}

impl Verdict {
    /// 本地确定性检查直接拒绝时使用，不经过 LLM
    pub fn rejected(title: &str, issues: Vec<String>, missing: Vec<String>) -> Self {
        let feedback = if issues.is_empty() {
            "Citations incomplete or ungrounded; rewrite with complete, grounded citations.".to_string()
        } else {
            issues.join(" ")
        };
        Self {
            article_title: title.to_string(),
            verified: false,
            issues,
            missing_citations: missing,
            feedback,
            retry_suggested: true,
        }
    }
}

/// 最终简报：校验通过或预算耗尽后的产物，连同尝试次数与遗留问题一并交付
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BriefReport {
    pub report_id: String,
    pub user_id: String,
    pub generated_at: DateTime<Utc>,
    pub executive_summary: String,
    pub articles: Vec<Article>,
    pub topics_covered: Vec<String>,
    /// 是否全部文章通过审计
    pub verified: bool,
    /// 实际消耗的起草次数（1 起）
    pub attempts: usize,
    /// verified=false 时保留的审计问题，交付时透明展示
    #[serde(default)]
    pub open_issues: Vec<String>,
}

/// 历史日志中的一条（供下一轮去重与选题参考）
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub report_id: String,
    pub report_date: DateTime<Utc>,
    pub urls: Vec<String>,
    pub topics: Vec<String>,
    pub verified: bool,
}

impl HistoryEntry {
    pub fn from_report(report: &BriefReport) -> Self {
        Self {
            report_id: report.report_id.clone(),
            report_date: report.generated_at,
            urls: report.articles.iter().map(|a| a.url.clone()).collect(),
            topics: report.topics_covered.clone(),
            verified: report.verified,
        }
    }
}

/// 用户对一期简报的反馈（1-5 星与若干结构化偏好）
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Feedback {
    pub report_id: String,
    pub user_id: String,
    /// 1-5 星
    pub rating: u8,
    pub comment: Option<String>,
    #[serde(default)]
    pub liked_topics: Vec<String>,
    #[serde(default)]
    pub disliked_topics: Vec<String>,
    #[serde(default)]
    pub missing_topics: Vec<String>,
    #[serde(default)]
    pub too_long: bool,
    #[serde(default)]
    pub too_short: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_parse_case_insensitive() {
        assert_eq!(Priority::parse("HIGH"), Some(Priority::High));
        assert_eq!(Priority::parse(" critical "), Some(Priority::Critical));
        assert_eq!(Priority::parse("urgent"), None);
    }

    #[test]
    fn test_citation_completeness() {
        let full = Citation {
            claim: "Revenue grew 25%".into(),
            quote: "quarterly revenue of $1.5B, up 25%".into(),
            source_url: "https://example.com/q4".into(),
            source_title: "Q4 Earnings".into(),
        };
        assert!(full.is_complete());

        let missing_quote = Citation {
            quote: "  ".into(),
            ..full
        };
        assert!(!missing_quote.is_complete());
    }

    #[test]
    fn test_history_entry_collects_urls() {
        let report = BriefReport {
            report_id: "r1".into(),
            user_id: "u1".into(),
            generated_at: Utc::now(),
            executive_summary: "s".into(),
            articles: vec![Article {
                title: "t".into(),
                summary: "s".into(),
                key_insights: vec![],
                citations: vec![],
                priority: Priority::Medium,
                relevance: "r".into(),
                url: "https://example.com/a".into(),
                source: "example.com".into(),
            }],
            topics_covered: vec!["ai".into()],
            verified: true,
            attempts: 1,
            open_issues: vec![],
        };
        let entry = HistoryEntry::from_report(&report);
        assert_eq!(entry.urls, vec!["https://example.com/a"]);
        assert_eq!(entry.topics, vec!["ai"]);
    }
}
