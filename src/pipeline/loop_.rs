//! 校验循环：起草 ⇄ 审计的有界重试状态机
//!
//! 状态：DRAFTING → VERIFYING → {VERIFIED | REJECTED → DRAFTING}。
//! 起草错误（MalformedDraft / EmptyDraft）在 DRAFTING 上自环，消耗同一份预算，
//! 反馈换成错误专属的纠正语；最后一次尝试上的起草错误升级为致命。
//! 预算耗尽的拒绝不是错误：返回 verified=false 的结果与遗留问题。
//! 保证：至多 max_retries + 1 次起草尝试。

use crate::core::{PipelineError, RunContext};
use crate::pipeline::{DraftGenerator, VerificationAuditor};
use crate::report::{DraftBundle, GroundingStore, Verdict};
use crate::store::Profile;

/// 循环的终态：通过，或预算耗尽后的未通过结果
#[derive(Debug)]
pub struct LoopOutcome {
    pub bundle: DraftBundle,
    pub verified: bool,
    /// 实际消耗的起草尝试数（1 起）
    pub attempts: usize,
    /// 未通过时保留的审计问题（交付时透明展示）
    pub open_issues: Vec<String>,
}

/// 有界重试控制器；每轮反馈是一次性计算的不可变值，整体覆盖、从不累积
pub struct VerificationLoop {
    drafter: DraftGenerator,
    auditor: VerificationAuditor,
    max_retries: usize,
}

impl VerificationLoop {
    pub fn new(drafter: DraftGenerator, auditor: VerificationAuditor, max_retries: usize) -> Self {
        Self {
            drafter,
            auditor,
            max_retries,
        }
    }

    pub async fn run(
        &self,
        ctx: &RunContext,
        grounding: &GroundingStore,
        profile: &Profile,
    ) -> Result<LoopOutcome, PipelineError> {
        let mut attempt = 0usize;
        let mut feedback = String::new();

        loop {
            let ctx = ctx.for_attempt(attempt + 1);
            tracing::info!(
                run_id = %ctx.run_id,
                attempt = attempt + 1,
                budget = self.max_retries + 1,
                "drafting attempt"
            );

            let bundle = match self.drafter.draft(&ctx, grounding, profile, &feedback).await {
                Ok(bundle) => bundle,
                Err(e) if e.is_draft_error() => {
                    tracing::warn!(run_id = %ctx.run_id, attempt = attempt + 1, error = %e, "draft attempt failed");
                    if attempt >= self.max_retries {
                        return Err(e);
                    }
                    feedback = e.corrective_feedback();
                    attempt += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };

            tracing::info!(
                run_id = %ctx.run_id,
                attempt = attempt + 1,
                articles = bundle.articles.len(),
                "auditing draft"
            );
            let verdicts = self.auditor.verify(&ctx, &bundle, grounding).await?;
            let (verified, summary) = VerificationAuditor::report_verified(&verdicts);

            if verified {
                tracing::info!(run_id = %ctx.run_id, attempt = attempt + 1, "report verified");
                return Ok(LoopOutcome {
                    bundle,
                    verified: true,
                    attempts: attempt + 1,
                    open_issues: Vec::new(),
                });
            }

            tracing::warn!(
                run_id = %ctx.run_id,
                attempt = attempt + 1,
                "verification rejected draft"
            );

            if attempt >= self.max_retries {
                tracing::warn!(
                    run_id = %ctx.run_id,
                    "retry budget exhausted, returning unverified report"
                );
                return Ok(LoopOutcome {
                    open_issues: open_issues(&verdicts),
                    bundle,
                    verified: false,
                    attempts: attempt + 1,
                });
            }

            feedback = rejection_feedback(&summary);
            attempt += 1;
        }
    }
}

/// 未通过文章的问题清单（标题 + 反馈）
fn open_issues(verdicts: &[Verdict]) -> Vec<String> {
    verdicts
        .iter()
        .filter(|v| !v.verified)
        .map(|v| format!("{}: {}", v.article_title, v.feedback))
        .collect()
}

/// 审计拒绝后的下一轮纠正语境（每轮整体覆盖上一轮）
fn rejection_feedback(summary: &str) -> String {
    format!(
        "PREVIOUS ATTEMPT REJECTED\n\nVerification issues:\n{}\n\n\
         Fix all missing citations, ensure every claim has a direct quote and source, \
         and double-check that quotes support the claims. Be more conservative with assertions.",
        summary
    )
}
