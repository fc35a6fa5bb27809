//! 编排器集成测试：画像 → 历史快照 → 检索 → 循环 → 投递 → 历史追加的完整链路
//!
//! 数据目录指向 tempdir，协作方全部注入内存实现。

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use magpie::config::AppConfig;
use magpie::delivery::DeliveryChannel;
use magpie::llm::MockLlmClient;
use magpie::report::{BriefReport, Feedback, RetrievedDoc, SearchHit};
use magpie::retrieval::{DocFetcher, SearchProvider};
use magpie::store::Profile;
use magpie::{Orchestrator, PipelineError};

struct MapProvider {
    hits: HashMap<String, Vec<SearchHit>>,
}

#[async_trait]
impl SearchProvider for MapProvider {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, String> {
        let topic = query.split(' ').next().unwrap_or("");
        Ok(self
            .hits
            .get(topic)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .take(limit)
            .collect())
    }
}

struct OkFetcher;

#[async_trait]
impl DocFetcher for OkFetcher {
    async fn fetch(&self, hit: &SearchHit, topic: &str, rank: usize) -> RetrievedDoc {
        RetrievedDoc {
            topic: topic.to_string(),
            rank,
            url: hit.url.clone(),
            title: hit.title.clone(),
            text: "Revenue grew 25% to $1.5B this quarter.".to_string(),
            source: hit.source.clone(),
            fetched_at: chrono::Utc::now(),
            success: true,
            error: None,
        }
    }
}

/// 全失败的抓取器：触发 NoGrounding 路径
struct FailingFetcher;

#[async_trait]
impl DocFetcher for FailingFetcher {
    async fn fetch(&self, hit: &SearchHit, topic: &str, rank: usize) -> RetrievedDoc {
        RetrievedDoc::failed(topic, rank, &hit.url, "connection refused")
    }
}

struct RecordingDelivery {
    sent: AtomicUsize,
}

#[async_trait]
impl DeliveryChannel for RecordingDelivery {
    async fn send(&self, _report: &BriefReport, _profile: &Profile) -> anyhow::Result<bool> {
        self.sent.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }
}

fn hit(url: &str) -> SearchHit {
    SearchHit {
        url: url.to_string(),
        title: format!("Title for {}", url),
        snippet: "snippet".to_string(),
        source: "example.com".to_string(),
    }
}

fn test_config(data_dir: &std::path::Path) -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.app.data_dir = Some(data_dir.to_path_buf());
    cfg.verify.max_retries = 1;
    cfg
}

fn good_draft(url: &str) -> String {
    format!(
        r#"{{"executive_summary": "Strong quarter for ai.",
            "articles": [{{
              "title": "ai growth continues",
              "summary": "Revenue climbed sharply across the ai sector.",
              "key_insights": ["Revenue grew 25% to $1.5B"],
              "citations": [{{"claim": "Revenue grew 25%", "quote": "Revenue grew 25% to $1.5B",
                "source_url": "{}", "source_title": "Title"}}],
              "priority": "high",
              "relevance": "Core interest.",
              "url": "{}", "source": "example.com"}}]}}"#,
        url, url
    )
}

fn verdict_ok() -> String {
    r#"{"is_verified": true, "issues_found": [], "missing_citations": [],
        "feedback": "looks good", "retry_suggested": false}"#
        .to_string()
}

fn orchestrator_with(
    cfg: AppConfig,
    llm: Arc<MockLlmClient>,
    hits: HashMap<String, Vec<SearchHit>>,
    delivery: Arc<RecordingDelivery>,
) -> Orchestrator {
    Orchestrator::with_components(
        cfg,
        llm,
        Arc::new(MapProvider { hits }),
        Arc::new(OkFetcher),
        delivery,
    )
}

#[tokio::test]
async fn test_generate_report_end_to_end_with_delivery_and_history() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config(dir.path());

    let mut hits = HashMap::new();
    hits.insert("ai".to_string(), vec![hit("https://a.com/1")]);
    let llm = Arc::new(MockLlmClient::with_responses(vec![
        good_draft("https://a.com/1"),
        verdict_ok(),
    ]));
    let delivery = Arc::new(RecordingDelivery {
        sent: AtomicUsize::new(0),
    });
    let orchestrator = orchestrator_with(cfg, llm, hits, delivery.clone());

    orchestrator
        .create_profile(Profile::new(
            "u1",
            "Ada",
            "CTO",
            "Initech",
            "fintech",
            vec!["ai".into()],
            "ada@initech.test",
        ))
        .unwrap();

    let report = orchestrator.generate_report("u1", true).await.unwrap();

    assert!(report.verified);
    assert_eq!(report.attempts, 1);
    assert_eq!(report.articles.len(), 1);
    assert_eq!(report.topics_covered, vec!["ai"]);
    assert_eq!(delivery.sent.load(Ordering::SeqCst), 1);

    // 投递成功后写入历史
    let history = magpie::store::HistoryStore::new(dir.path().join("history"));
    let entries = history.recent_entries("u1", 30).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].urls, vec!["https://a.com/1"]);
}

#[tokio::test]
async fn test_history_urls_feed_exclusion_next_run() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config(dir.path());

    // 每次搜索都只会给同一个 URL；第二轮它已进历史，应触发 NoCandidates
    let mut hits = HashMap::new();
    hits.insert("ai".to_string(), vec![hit("https://a.com/1")]);
    let llm = Arc::new(MockLlmClient::with_responses(vec![
        good_draft("https://a.com/1"),
        verdict_ok(),
    ]));
    let delivery = Arc::new(RecordingDelivery {
        sent: AtomicUsize::new(0),
    });
    let orchestrator = orchestrator_with(cfg, llm, hits, delivery);

    orchestrator
        .create_profile(Profile::new(
            "u1",
            "Ada",
            "CTO",
            "Initech",
            "fintech",
            vec!["ai".into()],
            "ada@initech.test",
        ))
        .unwrap();

    orchestrator.generate_report("u1", true).await.unwrap();
    let err = orchestrator.generate_report("u1", true).await.unwrap_err();
    assert!(matches!(err, PipelineError::NoCandidates));
}

#[tokio::test]
async fn test_missing_profile_is_fatal_before_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config(dir.path());
    let llm = Arc::new(MockLlmClient::new());
    let delivery = Arc::new(RecordingDelivery {
        sent: AtomicUsize::new(0),
    });
    let orchestrator = orchestrator_with(cfg, llm.clone(), HashMap::new(), delivery);

    let err = orchestrator.generate_report("ghost", true).await.unwrap_err();
    assert!(matches!(err, PipelineError::MissingProfile(_)));
    assert_eq!(llm.calls(), 0);
}

#[tokio::test]
async fn test_all_fetches_failed_is_no_grounding() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config(dir.path());
    let mut hits = HashMap::new();
    hits.insert("ai".to_string(), vec![hit("https://a.com/1")]);
    let llm = Arc::new(MockLlmClient::new());
    let delivery = Arc::new(RecordingDelivery {
        sent: AtomicUsize::new(0),
    });
    let orchestrator = Orchestrator::with_components(
        cfg,
        llm.clone(),
        Arc::new(MapProvider { hits }),
        Arc::new(FailingFetcher),
        delivery,
    );

    orchestrator
        .create_profile(Profile::new(
            "u1",
            "Ada",
            "CTO",
            "Initech",
            "fintech",
            vec!["ai".into()],
            "ada@initech.test",
        ))
        .unwrap();

    let err = orchestrator.generate_report("u1", true).await.unwrap_err();
    assert!(matches!(err, PipelineError::NoGrounding));
    // 落地失败发生在循环开始之前，没有任何 LLM 调用
    assert_eq!(llm.calls(), 0);
}

#[tokio::test]
async fn test_process_feedback_merges_constraints() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config(dir.path());
    let llm = Arc::new(MockLlmClient::with_responses(vec![
        r#"{"add_to_interests": ["robotics"], "add_to_exclusions": ["crypto"],
            "length_preference": "shorter", "notes": ["prefers charts"],
            "summary": "Reader wants robotics, less crypto."}"#
            .to_string(),
    ]));
    let delivery = Arc::new(RecordingDelivery {
        sent: AtomicUsize::new(0),
    });
    let orchestrator = orchestrator_with(cfg, llm, HashMap::new(), delivery);

    orchestrator
        .create_profile(Profile::new(
            "u1",
            "Ada",
            "CTO",
            "Initech",
            "fintech",
            vec!["ai".into()],
            "ada@initech.test",
        ))
        .unwrap();

    let feedback = Feedback {
        report_id: "r1".into(),
        user_id: "u1".into(),
        rating: 4,
        comment: Some("more robotics please".into()),
        liked_topics: vec!["ai".into()],
        disliked_topics: vec!["crypto".into()],
        missing_topics: vec![],
        too_long: true,
        too_short: false,
    };
    let summary = orchestrator.process_feedback(&feedback).await.unwrap();
    assert!(summary.contains("robotics"));

    let store = magpie::store::ProfileStore::new(dir.path().join("user_profiles"));
    let profile = store.load("u1").unwrap().unwrap();
    assert!(profile.topics_of_interest.contains(&"robotics".to_string()));
    assert!(profile.excluded_topics.contains(&"crypto".to_string()));
    assert_eq!(profile.constraints.length_preference.as_deref(), Some("shorter"));
    assert_eq!(profile.constraints.last_feedback_rating, Some(4));
    assert_eq!(profile.constraints.feedback_count, 1);
    assert!(profile.constraints.notes.contains(&"prefers charts".to_string()));
    // 学得的回避主题影响下一轮的检索主题
    assert!(!profile.priority_topics().contains(&"crypto".to_string()));
}
