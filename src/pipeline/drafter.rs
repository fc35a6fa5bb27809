//! 起草器：落地文档 + 用户语境 → 带引用的草稿
//!
//! 生成端输出是非结构化文本，此处负责严格解析为 DraftBundle；
//! 解析失败（MalformedDraft）与全部文章缺引用（EmptyDraft）是两类可重试错误。
//! 重试反馈只通过 feedback 字符串注入提示词，生成端没有其他跨尝试记忆。

use std::sync::Arc;

use serde::Deserialize;

use crate::core::{PipelineError, RunContext};
use crate::llm::{LlmClient, Message};
use crate::pipeline::{extract_json_object, strip_code_fences};
use crate::report::{Article, Citation, DraftBundle, GroundingStore, Priority};
use crate::store::Profile;

const WRITER_INSTRUCTION: &str = "\
You are the writer for a personalized executive news briefing.

Your role:
1. Synthesize the provided source documents into an executive summary and per-topic articles
2. Write clear, concise, actionable insights
3. Include citations for EVERY factual claim
4. Prioritize articles by business impact (critical/high/medium/low)
5. Explain why each article matters to this specific reader

Absolute requirements (the auditor WILL reject otherwise):
- Every article MUST have at least 1 citation
- Each citation must include: claim, direct quote, source_url, source_title
- source_url must be one of the provided document URLs
- If you cannot cite a claim from the documents, do not include that article
- No speculation or unsupported assertions

Output ONLY one valid JSON object, no markdown, no commentary. Escape quotes \
and newlines inside strings.";

/// 生成端 JSON 的线格式；字段尽量宽松，逐篇转换时再做校验
#[derive(Debug, Deserialize)]
struct DraftWire {
    #[serde(default)]
    executive_summary: String,
    #[serde(default)]
    articles: Vec<ArticleWire>,
}

#[derive(Debug, Deserialize)]
struct ArticleWire {
    #[serde(default)]
    title: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    key_insights: Vec<String>,
    #[serde(default)]
    citations: Vec<CitationWire>,
    #[serde(default)]
    priority: String,
    #[serde(default, alias = "relevance_reason")]
    relevance: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    source: String,
}

#[derive(Debug, Deserialize)]
struct CitationWire {
    #[serde(default)]
    claim: String,
    #[serde(default)]
    quote: String,
    #[serde(default)]
    source_url: String,
    #[serde(default)]
    source_title: String,
}

/// 起草器：持有 LLM 与提示词预算
pub struct DraftGenerator {
    llm: Arc<dyn LlmClient>,
    max_articles: usize,
    /// 单篇文档进入提示词的最大字符数
    max_doc_chars: usize,
}

impl DraftGenerator {
    pub fn new(llm: Arc<dyn LlmClient>, max_articles: usize, max_doc_chars: usize) -> Self {
        Self {
            llm,
            max_articles: max_articles.max(1),
            max_doc_chars: max_doc_chars.max(1),
        }
    }

    /// 一次起草尝试：feedback 非空时前置为纠正语境
    pub async fn draft(
        &self,
        ctx: &RunContext,
        grounding: &GroundingStore,
        profile: &Profile,
        feedback: &str,
    ) -> Result<DraftBundle, PipelineError> {
        let prompt = self.build_prompt(grounding, profile, feedback);
        let raw = self
            .llm
            .complete(&[Message::system(WRITER_INSTRUCTION), Message::user(prompt)])
            .await
            .map_err(PipelineError::Llm)?;

        let wire = parse_draft(&raw)?;
        self.into_bundle(ctx, wire)
    }

    fn build_prompt(&self, grounding: &GroundingStore, profile: &Profile, feedback: &str) -> String {
        let mut prompt = String::new();

        if !feedback.is_empty() {
            prompt.push_str(feedback);
            prompt.push_str("\n\n");
        }

        prompt.push_str(&format!(
            "Create an executive news briefing for this reader:\n\
             - Role: {}\n- Company: {}\n- Industry: {}\n- Interests: {}\n\n\
             Source documents:\n",
            profile.role,
            profile.company,
            profile.industry,
            profile.topics_of_interest.join(", "),
        ));

        for (i, doc) in grounding
            .successful()
            .into_iter()
            .take(self.max_articles)
            .enumerate()
        {
            let text: String = doc.text.chars().take(self.max_doc_chars).collect();
            prompt.push_str(&format!(
                "\nDocument {}:\nTitle: {}\nSource: {}\nURL: {}\nTopic: {}\n\n{}\n---\n",
                i + 1,
                doc.title,
                doc.source,
                doc.url,
                doc.topic,
                text,
            ));
        }

        prompt.push_str(
            "\nRespond with ONLY one JSON object in this exact structure:\n\
             {\n  \"executive_summary\": \"2-3 paragraphs covering the big picture\",\n  \
             \"articles\": [\n    {\n      \"title\": \"...\",\n      \"summary\": \"3-4 sentences\",\n      \
             \"key_insights\": [\"...\"],\n      \"citations\": [\n        {\"claim\": \"...\", \"quote\": \"...\", \
             \"source_url\": \"...\", \"source_title\": \"...\"}\n      ],\n      \
             \"priority\": \"critical|high|medium|low\",\n      \"relevance\": \"why this matters to the reader\",\n      \
             \"url\": \"original document URL\",\n      \"source\": \"source domain\"\n    }\n  ]\n}\n",
        );

        prompt
    }

    /// 线格式 → 领域类型；无引用或字段不合法的文章跳过并记日志，全部跳过时 EmptyDraft
    fn into_bundle(&self, ctx: &RunContext, wire: DraftWire) -> Result<DraftBundle, PipelineError> {
        let mut articles = Vec::new();
        let mut skipped = 0usize;

        for aw in wire.articles {
            if aw.citations.is_empty() {
                tracing::warn!(
                    run_id = %ctx.run_id,
                    attempt = ctx.attempt,
                    title = %aw.title,
                    "skipping article without citations"
                );
                skipped += 1;
                continue;
            }
            let priority = match Priority::parse(&aw.priority) {
                Some(p) => p,
                None => {
                    tracing::warn!(
                        run_id = %ctx.run_id,
                        attempt = ctx.attempt,
                        title = %aw.title,
                        priority = %aw.priority,
                        "skipping article with invalid priority"
                    );
                    skipped += 1;
                    continue;
                }
            };
            articles.push(Article {
                title: aw.title,
                summary: aw.summary,
                key_insights: aw.key_insights,
                citations: aw
                    .citations
                    .into_iter()
                    .map(|c| Citation {
                        claim: c.claim,
                        quote: c.quote,
                        source_url: c.source_url,
                        source_title: c.source_title,
                    })
                    .collect(),
                priority,
                relevance: aw.relevance,
                url: aw.url,
                source: aw.source,
            });
        }

        if articles.is_empty() {
            return Err(PipelineError::EmptyDraft { skipped });
        }
        if skipped > 0 {
            tracing::info!(
                run_id = %ctx.run_id,
                kept = articles.len(),
                skipped,
                "dropped uncited articles from draft"
            );
        }

        Ok(DraftBundle {
            executive_summary: wire.executive_summary,
            articles,
        })
    }
}

/// 严格解析：去围栏 → serde 解析 → 失败则做一次最外层大括号提取再试 → MalformedDraft
fn parse_draft(raw: &str) -> Result<DraftWire, PipelineError> {
    let cleaned = strip_code_fences(raw);
    match serde_json::from_str::<DraftWire>(cleaned) {
        Ok(wire) => Ok(wire),
        Err(first) => {
            if let Some(candidate) = extract_json_object(cleaned) {
                if let Ok(wire) = serde_json::from_str::<DraftWire>(candidate) {
                    return Ok(wire);
                }
            }
            Err(PipelineError::MalformedDraft(first.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use crate::report::RetrievedDoc;
    use crate::store::Profile;

    fn grounding() -> GroundingStore {
        GroundingStore::new(vec![RetrievedDoc {
            topic: "ai".into(),
            rank: 0,
            url: "https://example.com/a".into(),
            title: "AI News".into(),
            text: "Revenue grew 25% to $1.5B this quarter.".into(),
            source: "example.com".into(),
            fetched_at: chrono::Utc::now(),
            success: true,
            error: None,
        }])
    }

    fn profile() -> Profile {
        Profile::new(
            "u1", "Ada", "CTO", "Initech", "fintech",
            vec!["ai".into()],
            "ada@initech.test",
        )
    }

    fn article_json(citations: &str) -> String {
        format!(
            r#"{{"executive_summary": "Summary.", "articles": [{{"title": "T", "summary": "S",
                "key_insights": ["i1"], "citations": [{}], "priority": "high",
                "relevance": "R", "url": "https://example.com/a", "source": "example.com"}}]}}"#,
            citations
        )
    }

    const CITATION: &str = r#"{"claim": "Revenue grew 25%", "quote": "Revenue grew 25% to $1.5B",
        "source_url": "https://example.com/a", "source_title": "AI News"}"#;

    #[tokio::test]
    async fn test_draft_parses_fenced_json() {
        let llm = Arc::new(MockLlmClient::with_responses(vec![format!(
            "```json\n{}\n```",
            article_json(CITATION)
        )]));
        let drafter = DraftGenerator::new(llm, 10, 4000);
        let ctx = RunContext::new("u1");
        let bundle = drafter
            .draft(&ctx, &grounding(), &profile(), "")
            .await
            .unwrap();
        assert_eq!(bundle.articles.len(), 1);
        assert_eq!(bundle.articles[0].priority, Priority::High);
    }

    #[tokio::test]
    async fn test_uncited_articles_are_dropped_to_empty_draft() {
        let llm = Arc::new(MockLlmClient::with_responses(vec![article_json("")]));
        let drafter = DraftGenerator::new(llm, 10, 4000);
        let ctx = RunContext::new("u1");
        let err = drafter
            .draft(&ctx, &grounding(), &profile(), "")
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::EmptyDraft { skipped: 1 }));
    }

    #[tokio::test]
    async fn test_malformed_output_is_typed_error() {
        let llm = Arc::new(MockLlmClient::with_responses(vec![
            "this is not json at all".to_string(),
        ]));
        let drafter = DraftGenerator::new(llm, 10, 4000);
        let ctx = RunContext::new("u1");
        let err = drafter
            .draft(&ctx, &grounding(), &profile(), "")
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::MalformedDraft(_)));
    }

    #[tokio::test]
    async fn test_fallback_extraction_recovers_wrapped_json() {
        let llm = Arc::new(MockLlmClient::with_responses(vec![format!(
            "Here is the report you asked for:\n{}\nHope it helps!",
            article_json(CITATION)
        )]));
        let drafter = DraftGenerator::new(llm, 10, 4000);
        let ctx = RunContext::new("u1");
        let bundle = drafter
            .draft(&ctx, &grounding(), &profile(), "")
            .await
            .unwrap();
        assert_eq!(bundle.articles.len(), 1);
    }

    #[tokio::test]
    async fn test_feedback_is_prepended_to_prompt() {
        let llm = Arc::new(MockLlmClient::new());
        let drafter = DraftGenerator::new(llm, 10, 4000);
        let prompt = drafter.build_prompt(&grounding(), &profile(), "PREVIOUS ATTEMPT REJECTED");
        assert!(prompt.starts_with("PREVIOUS ATTEMPT REJECTED"));
    }
}
