//! 编排器：一次简报运行的主控
//!
//! 阶段：画像加载 → 历史快照（排除集）→ 检索落地 → 起草/审计循环 → 投递 → 历史追加。
//! 画像/历史在运行开始读一次、结束写一次；同一用户并发运行不做保证。

use std::collections::HashSet;
use std::sync::Arc;

use serde::Deserialize;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::core::{PipelineError, RunContext};
use crate::delivery::{DeliveryChannel, OutboxDelivery};
use crate::llm::{create_deepseek_client, LlmClient, Message, MockLlmClient, OpenAiClient};
use crate::pipeline::{
    CitationPolicy, DraftGenerator, Strictness, VerificationAuditor, VerificationLoop,
};
use crate::report::{BriefReport, Feedback, GroundingStore};
use crate::retrieval::{CseSearchProvider, DocFetcher, HttpFetcher, RetrievalLayer, SearchProvider};
use crate::store::{ConstraintSet, HistoryStore, Profile, ProfileStore};

/// 根据配置与环境变量选择 LLM 后端（DeepSeek / OpenAI 兼容 / Mock）
pub fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    let provider = cfg.llm.provider.to_lowercase();
    // 有 DeepSeek Key 或（配置为 deepseek 且仅有 OpenAI Key 时也走 DeepSeek 兼容端点）
    let use_deepseek = std::env::var("DEEPSEEK_API_KEY").is_ok()
        || (provider == "deepseek" && std::env::var("OPENAI_API_KEY").is_ok());
    let use_openai = std::env::var("OPENAI_API_KEY").is_ok() && provider != "deepseek";

    if use_deepseek {
        let model = cfg
            .llm
            .deepseek
            .model
            .clone()
            .unwrap_or_else(|| cfg.llm.model.clone());
        tracing::info!("Using DeepSeek LLM ({})", model);
        Arc::new(create_deepseek_client(Some(&model)))
    } else if use_openai {
        let model = cfg
            .llm
            .openai
            .model
            .clone()
            .unwrap_or_else(|| "gpt-4o-mini".to_string());
        let base = cfg.llm.base_url.as_deref();
        tracing::info!("Using OpenAI LLM ({})", model);
        Arc::new(OpenAiClient::new(
            base,
            &model,
            std::env::var("OPENAI_API_KEY").ok().as_deref(),
        ))
    } else {
        tracing::warn!("No API key set or provider unknown, using Mock LLM");
        Arc::new(MockLlmClient::new())
    }
}

/// 反馈约束抽取的线格式（LLM 输出）
#[derive(Debug, Deserialize)]
struct ConstraintExtraction {
    #[serde(default)]
    add_to_interests: Vec<String>,
    #[serde(default)]
    add_to_exclusions: Vec<String>,
    #[serde(default)]
    length_preference: Option<String>,
    #[serde(default)]
    notes: Vec<String>,
    #[serde(default)]
    summary: String,
}

/// 编排器：持有全部协作方，驱动一次完整运行
pub struct Orchestrator {
    cfg: AppConfig,
    profiles: ProfileStore,
    history: HistoryStore,
    llm: Arc<dyn LlmClient>,
    retrieval: RetrievalLayer,
    pipeline: VerificationLoop,
    delivery: Arc<dyn DeliveryChannel>,
}

impl Orchestrator {
    /// 从配置装配真实协作方（CSE 搜索、HTTP 抓取、发件目录投递）。
    /// 搜索凭据缺失属于启动前的外部依赖失败，直接报错而不是跑到一半。
    pub fn from_config(cfg: AppConfig) -> Result<Self, PipelineError> {
        let provider = CseSearchProvider::from_env(cfg.search.days_back).ok_or_else(|| {
            PipelineError::Config(
                "GOOGLE_SEARCH_API_KEY / GOOGLE_SEARCH_ENGINE_ID are not set".to_string(),
            )
        })?;
        let fetcher = HttpFetcher::new(
            cfg.fetch.timeout_secs,
            cfg.fetch.retry_count,
            cfg.fetch.retry_delay_ms,
            cfg.fetch.max_doc_chars,
        );
        let llm = create_llm_from_config(&cfg);
        let delivery = Arc::new(OutboxDelivery::new(cfg.outbox_dir()));
        Ok(Self::with_components(
            cfg,
            llm,
            Arc::new(provider),
            Arc::new(fetcher),
            delivery,
        ))
    }

    /// 注入协作方的装配入口（测试与自定义通道用）
    pub fn with_components(
        cfg: AppConfig,
        llm: Arc<dyn LlmClient>,
        provider: Arc<dyn SearchProvider>,
        fetcher: Arc<dyn DocFetcher>,
        delivery: Arc<dyn DeliveryChannel>,
    ) -> Self {
        let profiles = ProfileStore::new(cfg.profiles_dir());
        let history = HistoryStore::new(cfg.history_dir());
        let retrieval = RetrievalLayer::new(provider, fetcher, cfg.fetch.max_workers);
        let drafter = DraftGenerator::new(
            llm.clone(),
            cfg.app.max_articles_per_report,
            cfg.fetch.max_doc_chars,
        );
        let auditor = VerificationAuditor::new(
            llm.clone(),
            CitationPolicy::new(Strictness::parse(&cfg.verify.strictness)),
        );
        let pipeline = VerificationLoop::new(drafter, auditor, cfg.verify.max_retries);
        Self {
            cfg,
            profiles,
            history,
            llm,
            retrieval,
            pipeline,
            delivery,
        }
    }

    /// 生成一期简报；deliver=false 时跳过投递与历史追加
    pub async fn generate_report(
        &self,
        user_id: &str,
        deliver: bool,
    ) -> Result<BriefReport, PipelineError> {
        let mut profile = self
            .profiles
            .load(user_id)?
            .ok_or_else(|| PipelineError::MissingProfile(user_id.to_string()))?;

        let ctx = RunContext::new(user_id);
        tracing::info!(run_id = %ctx.run_id, user_id, "briefing run started");

        // 历史快照：时间窗内已推送过的 URL 进排除集
        let entries = self
            .history
            .recent_entries(user_id, self.cfg.app.history_window_days)?;
        let excluded_urls: HashSet<String> =
            entries.iter().flat_map(|e| e.urls.iter().cloned()).collect();
        tracing::info!(
            run_id = %ctx.run_id,
            history_entries = entries.len(),
            excluded_urls = excluded_urls.len(),
            "history snapshot loaded"
        );

        let topics = profile.priority_topics();
        let docs = self
            .retrieval
            .retrieve(
                &ctx,
                &topics,
                &profile.search_context(),
                &excluded_urls,
                self.cfg.search.per_topic_limit,
            )
            .await?;

        let grounding = GroundingStore::new(docs);
        if grounding.successful_count() == 0 {
            return Err(PipelineError::NoGrounding);
        }

        let outcome = self.pipeline.run(&ctx, &grounding, &profile).await?;

        let (prompt_tokens, completion_tokens, total_tokens) = self.llm.token_usage();
        tracing::info!(
            run_id = %ctx.run_id,
            prompt_tokens,
            completion_tokens,
            total_tokens,
            "cumulative token usage"
        );

        let topics_covered = covered_topics(&topics, &outcome.bundle);
        let report = BriefReport {
            report_id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            generated_at: chrono::Utc::now(),
            executive_summary: outcome.bundle.executive_summary,
            articles: outcome.bundle.articles,
            topics_covered,
            verified: outcome.verified,
            attempts: outcome.attempts,
            open_issues: outcome.open_issues,
        };
        tracing::info!(
            run_id = %ctx.run_id,
            report_id = %report.report_id,
            verified = report.verified,
            attempts = report.attempts,
            articles = report.articles.len(),
            "briefing assembled"
        );

        if deliver {
            match self.delivery.send(&report, &profile).await {
                Ok(true) => {
                    self.history.append(user_id, &report)?;
                    tracing::info!(run_id = %ctx.run_id, "report delivered and recorded");
                }
                Ok(false) => {
                    tracing::warn!(run_id = %ctx.run_id, "delivery declined, report kept");
                }
                Err(e) => {
                    // 投递失败不作废报告，也不记入历史
                    tracing::warn!(run_id = %ctx.run_id, error = %e, "delivery failed, report kept");
                }
            }
        }

        // save 仅为盖 updated_at（记录最近一次运行触达过画像）
        self.profiles.save(&mut profile)?;

        Ok(report)
    }

    /// 处理一条用户反馈：LLM 抽取约束 → 显式合并策略 → 落盘画像
    pub async fn process_feedback(&self, feedback: &Feedback) -> Result<String, PipelineError> {
        let mut profile = self
            .profiles
            .load(&feedback.user_id)?
            .ok_or_else(|| PipelineError::MissingProfile(feedback.user_id.clone()))?;

        let prompt = build_feedback_prompt(feedback);
        let raw = self
            .llm
            .complete(&[Message::user(prompt)])
            .await
            .map_err(PipelineError::Llm)?;
        let extraction = parse_extraction(&raw)?;

        let mut interests = extraction.add_to_interests.clone();
        interests.extend(feedback.liked_topics.clone());
        interests.extend(feedback.missing_topics.clone());
        let mut exclusions = extraction.add_to_exclusions.clone();
        exclusions.extend(feedback.disliked_topics.clone());

        merge_topics(&mut profile.topics_of_interest, interests);
        merge_topics(&mut profile.excluded_topics, exclusions.clone());

        let length_preference = extraction.length_preference.or(if feedback.too_long {
            Some("shorter".to_string())
        } else if feedback.too_short {
            Some("longer".to_string())
        } else {
            None
        });
        profile.constraints.merge(ConstraintSet {
            length_preference,
            last_feedback_rating: Some(feedback.rating),
            feedback_count: profile.constraints.feedback_count + 1,
            emphasized_topics: extraction.add_to_interests,
            avoided_topics: exclusions,
            notes: extraction.notes,
        });

        self.profiles.save(&mut profile)?;

        let summary = if extraction.summary.is_empty() {
            "Feedback processed.".to_string()
        } else {
            extraction.summary
        };
        tracing::info!(
            user_id = %feedback.user_id,
            report_id = %feedback.report_id,
            rating = feedback.rating,
            "feedback merged into profile"
        );
        Ok(summary)
    }

    /// 创建新画像
    pub fn create_profile(&self, profile: Profile) -> Result<Profile, PipelineError> {
        Ok(self.profiles.create(profile)?)
    }
}

/// 哪些检索主题出现在了成稿里（标题或摘要包含主题词，忽略大小写）
fn covered_topics(topics: &[String], bundle: &crate::report::DraftBundle) -> Vec<String> {
    topics
        .iter()
        .filter(|topic| {
            let t = topic.to_lowercase();
            bundle.articles.iter().any(|a| {
                a.title.to_lowercase().contains(&t) || a.summary.to_lowercase().contains(&t)
            })
        })
        .cloned()
        .collect()
}

/// 主题列表的追加去重（忽略大小写比较）
fn merge_topics(dst: &mut Vec<String>, src: Vec<String>) {
    for topic in src {
        let topic = topic.trim().to_string();
        if topic.is_empty() {
            continue;
        }
        if !dst.iter().any(|t| t.eq_ignore_ascii_case(&topic)) {
            dst.push(topic);
        }
    }
}

fn build_feedback_prompt(feedback: &Feedback) -> String {
    format!(
        "Analyze this reader feedback on a news briefing and extract actionable constraints:\n\n\
         Rating: {}/5 stars\nComment: {}\nLiked topics: {}\nDisliked topics: {}\n\
         Missing topics: {}\nToo long: {}\nToo short: {}\n\n\
         Respond with ONLY one JSON object:\n\
         {{\"add_to_interests\": [\"...\"], \"add_to_exclusions\": [\"...\"], \
         \"length_preference\": \"shorter|same|longer\", \"notes\": [\"...\"], \
         \"summary\": \"brief summary of what was learned\"}}\n",
        feedback.rating,
        feedback.comment.as_deref().unwrap_or("none"),
        feedback.liked_topics.join(", "),
        feedback.disliked_topics.join(", "),
        feedback.missing_topics.join(", "),
        feedback.too_long,
        feedback.too_short,
    )
}

/// 与草稿解析相同的纪律：严格解析 + 一次大括号提取回退
fn parse_extraction(raw: &str) -> Result<ConstraintExtraction, PipelineError> {
    let cleaned = crate::pipeline::strip_code_fences(raw);
    match serde_json::from_str::<ConstraintExtraction>(cleaned) {
        Ok(e) => Ok(e),
        Err(first) => crate::pipeline::extract_json_object(cleaned)
            .and_then(|candidate| serde_json::from_str(candidate).ok())
            .ok_or_else(|| PipelineError::MalformedDraft(first.to_string())),
    }
}
