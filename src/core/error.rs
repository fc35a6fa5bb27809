//! 流水线错误类型
//!
//! 与 VerificationLoop 配合：MalformedDraft / EmptyDraft 在预算内自环重试，
//! NoCandidates / NoGrounding / MissingProfile 属于前置条件失败，直接上抛。

use thiserror::Error;

/// 简报流水线的错误（检索、起草、存储、配置）
#[derive(Error, Debug)]
pub enum PipelineError {
    /// 所有主题的搜索都没有返回候选 URL，无从抓取
    #[error("Search returned no candidate URLs for any topic")]
    NoCandidates,

    /// 候选抓取后没有任何成功文档，起草缺少落地材料
    #[error("No grounding documents were fetched successfully")]
    NoGrounding,

    /// 生成端输出无法解析为草稿结构（可在预算内重试）
    #[error("Draft output failed structural parsing: {0}")]
    MalformedDraft(String),

    /// 所有文章都因缺引用被丢弃（可在预算内重试）
    #[error("All {skipped} drafted articles were dropped for missing citations")]
    EmptyDraft { skipped: usize },

    /// 用户画像不存在，流水线无法启动
    #[error("No profile found for user: {0}")]
    MissingProfile(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Store error: {0}")]
    Store(#[from] anyhow::Error),

    #[error("Config error: {0}")]
    Config(String),
}

impl PipelineError {
    /// 起草阶段错误（在重试预算内自环，而不是上抛）
    pub fn is_draft_error(&self) -> bool {
        matches!(self, Self::MalformedDraft(_) | Self::EmptyDraft { .. })
    }

    /// 起草错误对应的纠正性反馈（注入下一轮提示，替代 auditor 反馈）
    pub fn corrective_feedback(&self) -> String {
        match self {
            Self::MalformedDraft(detail) => format!(
                "PREVIOUS ATTEMPT FAILED\n\nYour last output was not valid JSON ({detail}).\n\
                 Output ONLY one JSON object matching the requested structure. \
                 Escape quotes and newlines inside strings. No markdown, no commentary."
            ),
            Self::EmptyDraft { skipped } => format!(
                "PREVIOUS ATTEMPT REJECTED\n\nAll {skipped} articles were dropped because they \
                 carried no citations. Every article MUST include at least one citation with \
                 claim, quote, source_url and source_title taken from the provided documents."
            ),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_draft_errors_are_retryable() {
        assert!(PipelineError::MalformedDraft("eof".into()).is_draft_error());
        assert!(PipelineError::EmptyDraft { skipped: 3 }.is_draft_error());
        assert!(!PipelineError::NoCandidates.is_draft_error());
        assert!(!PipelineError::NoGrounding.is_draft_error());
    }

    #[test]
    fn test_corrective_feedback_mentions_cause() {
        let fb = PipelineError::MalformedDraft("expected value at line 3".into())
            .corrective_feedback();
        assert!(fb.contains("valid JSON"));
        assert!(fb.contains("line 3"));

        let fb = PipelineError::EmptyDraft { skipped: 2 }.corrective_feedback();
        assert!(fb.contains("2 articles"));
        assert!(fb.contains("citation"));
    }
}
