//! 搜索候选发现：Google Custom Search JSON API
//!
//! 只返回 URL 与元信息（title/snippet/displayLink），不抓正文；正文由 fetcher 单独抓取。

use async_trait::async_trait;
use serde::Deserialize;

use crate::report::SearchHit;

const CSE_ENDPOINT: &str = "https://www.googleapis.com/customsearch/v1";
/// Custom Search API 单次请求上限
const CSE_MAX_PER_REQUEST: usize = 10;

/// 候选发现的抽象：给定查询串返回至多 limit 条候选
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, String>;
}

/// Google Custom Search JSON API 响应（仅取用到的字段）
#[derive(Debug, Deserialize)]
struct CseResponse {
    #[serde(default)]
    items: Vec<CseItem>,
}

#[derive(Debug, Deserialize)]
struct CseItem {
    #[serde(default)]
    link: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    snippet: String,
    #[serde(rename = "displayLink", default)]
    display_link: String,
}

/// Google Custom Search 客户端；dateRestrict 限定近 N 天的新闻
pub struct CseSearchProvider {
    client: reqwest::Client,
    api_key: String,
    engine_id: String,
    days_back: u32,
}

impl CseSearchProvider {
    pub fn new(api_key: impl Into<String>, engine_id: impl Into<String>, days_back: u32) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            engine_id: engine_id.into(),
            days_back,
        }
    }

    /// 从环境变量 GOOGLE_SEARCH_API_KEY / GOOGLE_SEARCH_ENGINE_ID 创建；缺失时返回 None
    pub fn from_env(days_back: u32) -> Option<Self> {
        let api_key = std::env::var("GOOGLE_SEARCH_API_KEY").ok()?;
        let engine_id = std::env::var("GOOGLE_SEARCH_ENGINE_ID").ok()?;
        if api_key.is_empty() || engine_id.is_empty() {
            return None;
        }
        Some(Self::new(api_key, engine_id, days_back))
    }
}

#[async_trait]
impl SearchProvider for CseSearchProvider {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, String> {
        let num = limit.min(CSE_MAX_PER_REQUEST).max(1).to_string();
        let date_restrict = format!("d{}", self.days_back);

        let response = self
            .client
            .get(CSE_ENDPOINT)
            .query(&[
                ("key", self.api_key.as_str()),
                ("cx", self.engine_id.as_str()),
                ("q", query),
                ("num", num.as_str()),
                ("dateRestrict", date_restrict.as_str()),
            ])
            .send()
            .await
            .map_err(|e| format!("Search request failed: {}", e))?;

        if !response.status().is_success() {
            return Err(format!("Search API error: HTTP {}", response.status()));
        }

        let body: CseResponse = response
            .json()
            .await
            .map_err(|e| format!("Search response parse failed: {}", e))?;

        Ok(body
            .items
            .into_iter()
            .filter(|item| !item.link.is_empty())
            .map(|item| SearchHit {
                url: item.link,
                title: item.title,
                snippet: item.snippet,
                source: item.display_link,
            })
            .collect())
    }
}
