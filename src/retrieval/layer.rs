//! 检索层：候选发现 → 去重过滤 → 有界并发抓取
//!
//! 顺序保证：结果按（主题顺序，主题内搜索名次）排列，URL 去重先见先得，
//! 与各抓取任务的完成先后无关（join_all 按输入序收集）。
//! 单篇抓取失败记为 success=false 的文档，不中断批次；
//! 仅当所有主题都搜不到候选时返回 NoCandidates。

use std::collections::HashSet;
use std::sync::Arc;

use futures_util::future::join_all;
use tokio::sync::Semaphore;

use crate::core::{PipelineError, RunContext};
use crate::report::{RetrievedDoc, SearchHit};
use crate::retrieval::{DocFetcher, SearchProvider};

/// 一个待抓取候选：产出它的主题与主题内名次
struct Candidate {
    topic: String,
    rank: usize,
    hit: SearchHit,
}

/// 检索层：SearchProvider 发现候选，DocFetcher 并发抓正文
pub struct RetrievalLayer {
    provider: Arc<dyn SearchProvider>,
    fetcher: Arc<dyn DocFetcher>,
    max_workers: usize,
}

impl RetrievalLayer {
    pub fn new(
        provider: Arc<dyn SearchProvider>,
        fetcher: Arc<dyn DocFetcher>,
        max_workers: usize,
    ) -> Self {
        Self {
            provider,
            fetcher,
            max_workers: max_workers.max(1),
        }
    }

    /// 确定性的查询构造：主题 + 用户语境（角色/行业），不经过 LLM
    fn build_query(topic: &str, audience: &str) -> String {
        let audience = audience.trim();
        if audience.is_empty() {
            format!("{} latest news", topic)
        } else {
            format!("{} news for {}", topic, audience)
        }
    }

    /// 检索入口：按主题搜索候选、过滤排除集、URL 去重，然后有界并发抓取正文。
    ///
    /// 搜索阶段单主题失败只记日志；全部主题都无候选时返回 NoCandidates（发生在任何抓取之前）。
    pub async fn retrieve(
        &self,
        ctx: &RunContext,
        topics: &[String],
        audience: &str,
        excluded_urls: &HashSet<String>,
        per_topic_limit: usize,
    ) -> Result<Vec<RetrievedDoc>, PipelineError> {
        let mut candidates: Vec<Candidate> = Vec::new();
        let mut seen_urls: HashSet<String> = HashSet::new();

        for topic in topics {
            let query = Self::build_query(topic, audience);
            let hits = match self.provider.search(&query, per_topic_limit).await {
                Ok(hits) => hits,
                Err(e) => {
                    tracing::warn!(run_id = %ctx.run_id, topic = %topic, error = %e, "search failed for topic");
                    continue;
                }
            };

            let mut rank = 0;
            for hit in hits {
                if excluded_urls.contains(&hit.url) {
                    continue;
                }
                // URL 去重：跨主题先见先得
                if !seen_urls.insert(hit.url.clone()) {
                    continue;
                }
                candidates.push(Candidate {
                    topic: topic.clone(),
                    rank,
                    hit,
                });
                rank += 1;
            }
        }

        if candidates.is_empty() {
            return Err(PipelineError::NoCandidates);
        }

        tracing::info!(
            run_id = %ctx.run_id,
            candidates = candidates.len(),
            workers = self.max_workers,
            "fetching candidate documents"
        );

        let semaphore = Arc::new(Semaphore::new(self.max_workers));
        let fetches = candidates.iter().map(|c| {
            let semaphore = Arc::clone(&semaphore);
            let fetcher = Arc::clone(&self.fetcher);
            async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
                fetcher.fetch(&c.hit, &c.topic, c.rank).await
            }
        });
        let docs = join_all(fetches).await;

        let failed = docs.iter().filter(|d| !d.success).count();
        tracing::info!(
            run_id = %ctx.run_id,
            fetched = docs.len() - failed,
            failed,
            "retrieval complete"
        );

        Ok(docs)
    }
}
