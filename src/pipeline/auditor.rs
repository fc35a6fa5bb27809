//! 审计器：逐篇校验草稿的引用质量
//!
//! 两段式：先跑本地确定性规则（完整性、落地、数字断言），不过则直接拒绝、
//! 不花 LLM 调用；过了再做一次 LLM 判断（引文是否支撑断言、优先级是否合理）。
//! 报告级通过 = 所有文章的裁决都通过；未通过文章的反馈拼接后作为下一轮输入。

use std::sync::Arc;

use regex::Regex;
use serde::Deserialize;

use crate::core::{PipelineError, RunContext};
use crate::llm::{LlmClient, Message};
use crate::pipeline::{extract_json_object, strip_code_fences};
use crate::report::{Article, DraftBundle, GroundingStore, Verdict};

const AUDITOR_INSTRUCTION: &str = "\
You are the verification auditor for an executive news briefing, the quality gate \
before anything reaches the reader.

Checklist for each article:
- Do major factual claims have citations?
- Do the quotes genuinely support the claims?
- Is the priority level justified by the content?

Quality standards (balanced approach):
- Specific facts and numbers must trace to a direct citation
- General statements and industry context need no separate citation
- Analysis and recommendations may be derived from already-cited facts
- Paraphrased quotes are acceptable if they capture the essence accurately

Respond ONLY with one JSON object, no markdown, no commentary.";

/// 数字断言规则的严格度（开放问题的显式化：作为策略参数而非固定算法）
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Strictness {
    /// 摘要与要点中的数字 token 都必须出现在某条引用里
    Strict,
    /// 仅要点适用数字规则（默认）
    Balanced,
    /// 关闭数字规则，只查完整性与落地
    Lenient,
}

impl Strictness {
    /// 宽松解析配置字符串；未知取 Balanced
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "strict" => Self::Strict,
            "lenient" => Self::Lenient,
            "balanced" => Self::Balanced,
            other => {
                if !other.is_empty() {
                    tracing::warn!(strictness = %other, "unknown strictness, using balanced");
                }
                Self::Balanced
            }
        }
    }
}

/// 本地确定性检查的结果
struct LocalCheck {
    issues: Vec<String>,
    missing: Vec<String>,
}

/// 引用策略：完整性与落地恒查；数字断言规则由 strictness 控制。
///
/// 数字 token 定义：正则 `[0-9][0-9.,%]*` 的极大匹配、长度 ≥2。
/// 一般性陈述与推导分析不含数字 token，因而无需专属引用。
pub struct CitationPolicy {
    strictness: Strictness,
    numeric: Regex,
}

impl CitationPolicy {
    pub fn new(strictness: Strictness) -> Self {
        Self {
            strictness,
            numeric: Regex::new(r"[0-9][0-9.,%]*").unwrap(),
        }
    }

    fn numeric_tokens<'a>(&self, text: &'a str) -> Vec<&'a str> {
        self.numeric
            .find_iter(text)
            .map(|m| m.as_str())
            .filter(|t| t.len() >= 2)
            .collect()
    }

    /// 数字 token 是否被文章的某条引用（claim 或 quote）覆盖
    fn token_cited(article: &Article, token: &str) -> bool {
        article
            .citations
            .iter()
            .any(|c| c.claim.contains(token) || c.quote.contains(token))
    }

    fn check(&self, article: &Article, grounding: &GroundingStore) -> LocalCheck {
        let mut issues = Vec::new();
        let mut missing = Vec::new();

        if article.citations.is_empty() {
            issues.push("Article has no citations.".to_string());
        }
        for (i, citation) in article.citations.iter().enumerate() {
            if !citation.is_complete() {
                issues.push(format!(
                    "Citation {} is incomplete (claim, quote, source_url and source_title are all required).",
                    i + 1
                ));
            } else if !grounding.contains(&citation.source_url) {
                issues.push(format!(
                    "Citation {} references {} which is not among the documents fetched this run.",
                    i + 1,
                    citation.source_url
                ));
            }
        }

        let mut texts: Vec<&str> = Vec::new();
        match self.strictness {
            Strictness::Strict => {
                texts.push(article.summary.as_str());
                texts.extend(article.key_insights.iter().map(String::as_str));
            }
            Strictness::Balanced => {
                texts.extend(article.key_insights.iter().map(String::as_str));
            }
            Strictness::Lenient => {}
        }
        for text in texts {
            for token in self.numeric_tokens(text) {
                if !Self::token_cited(article, token) {
                    missing.push(format!("\"{}\" (numeric claim in: {})", token, text));
                }
            }
        }
        if !missing.is_empty() {
            issues.push(format!(
                "{} numeric claims lack a supporting citation.",
                missing.len()
            ));
        }

        LocalCheck { issues, missing }
    }
}

/// 审计器 LLM 裁决的线格式
#[derive(Debug, Deserialize)]
struct VerdictWire {
    is_verified: bool,
    #[serde(default)]
    issues_found: Vec<String>,
    #[serde(default)]
    missing_citations: Vec<String>,
    #[serde(default)]
    feedback: String,
    #[serde(default)]
    retry_suggested: bool,
}

/// 审计器：本地规则 + 每篇一次 LLM 判断
pub struct VerificationAuditor {
    llm: Arc<dyn LlmClient>,
    policy: CitationPolicy,
}

impl VerificationAuditor {
    pub fn new(llm: Arc<dyn LlmClient>, policy: CitationPolicy) -> Self {
        Self { llm, policy }
    }

    /// 逐篇裁决；每篇每次尝试恰好产出一条 Verdict
    pub async fn verify(
        &self,
        ctx: &RunContext,
        bundle: &DraftBundle,
        grounding: &GroundingStore,
    ) -> Result<Vec<Verdict>, PipelineError> {
        let mut verdicts = Vec::with_capacity(bundle.articles.len());

        for article in &bundle.articles {
            let local = self.policy.check(article, grounding);
            if !local.issues.is_empty() {
                tracing::info!(
                    run_id = %ctx.run_id,
                    attempt = ctx.attempt,
                    title = %article.title,
                    issues = local.issues.len(),
                    "article rejected by local citation checks"
                );
                verdicts.push(Verdict::rejected(&article.title, local.issues, local.missing));
                continue;
            }

            verdicts.push(self.judge(ctx, article).await?);
        }

        Ok(verdicts)
    }

    /// 本地规则都过之后的 LLM 判断
    async fn judge(&self, ctx: &RunContext, article: &Article) -> Result<Verdict, PipelineError> {
        let prompt = build_judge_prompt(article);
        let raw = self
            .llm
            .complete(&[Message::system(AUDITOR_INSTRUCTION), Message::user(prompt)])
            .await
            .map_err(PipelineError::Llm)?;

        // 裁决解析失败按拒绝处理而不是崩溃：预算已为重试兜底，未审计内容不放行
        match parse_verdict(&raw) {
            Some(wire) => Ok(Verdict {
                article_title: article.title.clone(),
                verified: wire.is_verified,
                issues: wire.issues_found,
                missing_citations: wire.missing_citations,
                feedback: wire.feedback,
                retry_suggested: wire.retry_suggested,
            }),
            None => {
                tracing::warn!(
                    run_id = %ctx.run_id,
                    attempt = ctx.attempt,
                    title = %article.title,
                    "auditor verdict unparseable, rejecting conservatively"
                );
                Ok(Verdict {
                    article_title: article.title.clone(),
                    verified: false,
                    issues: vec!["Auditor verdict could not be parsed.".to_string()],
                    missing_citations: vec![],
                    feedback: "The audit of this article was inconclusive. Rewrite it with \
                               complete citations (claim, quote, source_url, source_title) \
                               drawn directly from the provided documents."
                        .to_string(),
                    retry_suggested: true,
                })
            }
        }
    }

    /// 报告级聚合：全部通过才算通过；否则拼接未通过文章的反馈作为下一轮输入
    pub fn report_verified(verdicts: &[Verdict]) -> (bool, String) {
        if verdicts.iter().all(|v| v.verified) {
            return (true, "All articles verified successfully.".to_string());
        }
        let mut parts = Vec::new();
        for v in verdicts.iter().filter(|v| !v.verified) {
            parts.push(format!(
                "Article: {}\nIssues: {}\nMissing citations: {}\nFeedback: {}",
                v.article_title,
                v.issues.join("; "),
                v.missing_citations.join("; "),
                v.feedback,
            ));
        }
        (false, parts.join("\n\n"))
    }
}

fn build_judge_prompt(article: &Article) -> String {
    let mut prompt = format!(
        "Verify this article for citation quality:\n\nTitle: {}\nSummary: {}\nPriority: {}\n\nKey insights:\n",
        article.title,
        article.summary,
        article.priority.as_str(),
    );
    for insight in &article.key_insights {
        prompt.push_str(&format!("- {}\n", insight));
    }
    prompt.push_str("\nCitations:\n");
    for (i, c) in article.citations.iter().enumerate() {
        prompt.push_str(&format!(
            "Citation {}:\n- Claim: {}\n- Quote: \"{}\"\n- Source: {}\n- URL: {}\n",
            i + 1,
            c.claim,
            c.quote,
            c.source_title,
            c.source_url,
        ));
    }
    prompt.push_str(
        "\nDo the quotes support the claims, and is the priority justified?\n\
         Respond in this JSON format:\n\
         {\"is_verified\": true or false, \"issues_found\": [\"...\"], \
         \"missing_citations\": [\"...\"], \"feedback\": \"detailed feedback for the writer\", \
         \"retry_suggested\": true or false}\n",
    );
    prompt
}

/// 与起草侧相同的解析纪律：去围栏 → 严格解析 → 一次大括号提取回退
fn parse_verdict(raw: &str) -> Option<VerdictWire> {
    let cleaned = strip_code_fences(raw);
    if let Ok(wire) = serde_json::from_str::<VerdictWire>(cleaned) {
        return Some(wire);
    }
    extract_json_object(cleaned).and_then(|candidate| serde_json::from_str(candidate).ok())
}
