//! 正文抓取：超时、有限重试、HTML→可读文本
//!
//! 抓取失败不抛错：重试耗尽后返回 success=false 的占位文档，由调用方决定取舍。
//! 对 HTML 响应使用 html2text 提取可读文本，去除标签与脚本。

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use html2text::from_read;

use crate::report::{RetrievedDoc, SearchHit};

/// 正文抓取的抽象；失败编码在 RetrievedDoc 上，按契约不抛错
#[async_trait]
pub trait DocFetcher: Send + Sync {
    async fn fetch(&self, hit: &SearchHit, topic: &str, rank: usize) -> RetrievedDoc;
}

/// 简易去除 HTML 标签（html2text 失败时的回退）
fn strip_html_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    let mut prev_whitespace = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => {
                let is_whitespace = c.is_whitespace();
                if is_whitespace && prev_whitespace {
                    continue;
                }
                prev_whitespace = is_whitespace;
                out.push(if is_whitespace { ' ' } else { c });
            }
            _ => {}
        }
    }
    out.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string()
}

/// 判断内容是否像 HTML（需提取可读文本）
fn looks_like_html(s: &str) -> bool {
    let s = s.trim_start();
    s.starts_with("<!")
        || s.starts_with("<html")
        || s.starts_with("<HTML")
        || (s.len() > 20
            && s.contains('<')
            && (s.contains("</") || s.contains("<meta") || s.contains("<head") || s.contains("<title")))
}

/// 从 URL 中提取 host（不含端口后的路径）
pub(crate) fn extract_domain(url: &str) -> Option<String> {
    let url = url.trim();
    let url = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))?;
    let host = url.split('/').next()?;
    let host = host.split(':').next()?;
    Some(host.to_lowercase())
}

/// HTTP 抓取器：超时、固定次数重试（带间隔）、截断
pub struct HttpFetcher {
    client: reqwest::Client,
    retry_count: usize,
    retry_delay: Duration,
    max_doc_chars: usize,
}

impl HttpFetcher {
    pub fn new(
        timeout_secs: u64,
        retry_count: usize,
        retry_delay_ms: u64,
        max_doc_chars: usize,
    ) -> Self {
        // 使用现代浏览器 UA 与常用请求头，避免被站点识别为低版本或爬虫
        const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(USER_AGENT)
            .default_headers({
                use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE};
                let mut h = reqwest::header::HeaderMap::new();
                h.insert(
                    ACCEPT,
                    "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"
                        .parse()
                        .unwrap(),
                );
                h.insert(ACCEPT_LANGUAGE, "en-US,en;q=0.9,zh-CN;q=0.8".parse().unwrap());
                h
            })
            .build()
            .unwrap_or_default();
        Self {
            client,
            retry_count,
            retry_delay: Duration::from_millis(retry_delay_ms),
            max_doc_chars,
        }
    }

    /// 将 HTML 转为可读文本（去除 script/style 等）
    fn html_to_text(&self, html: &str) -> String {
        match from_read(html.as_bytes(), 120) {
            Ok(text) if !text.trim().is_empty() => text,
            _ => strip_html_tags(html),
        }
    }

    async fn fetch_once(&self, url: &str) -> Result<String, String> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| format!("Request failed: {}", e))?;
        if !resp.status().is_success() {
            return Err(format!("HTTP {}", resp.status()));
        }
        let mut body = resp.text().await.map_err(|e| format!("Read body: {}", e))?;

        // 去除 BOM，避免 HTML 检测失败
        if body.starts_with('\u{FEFF}') {
            body = body[1..].to_string();
        }

        let body = if looks_like_html(&body) {
            self.html_to_text(&body)
        } else {
            body
        };

        let len = body.chars().count();
        if len > self.max_doc_chars {
            Ok(body.chars().take(self.max_doc_chars).collect::<String>() + "\n...[truncated]")
        } else {
            Ok(body)
        }
    }
}

#[async_trait]
impl DocFetcher for HttpFetcher {
    async fn fetch(&self, hit: &SearchHit, topic: &str, rank: usize) -> RetrievedDoc {
        let mut last_error = String::new();
        for attempt in 0..=self.retry_count {
            match self.fetch_once(&hit.url).await {
                Ok(text) => {
                    let source = if hit.source.is_empty() {
                        extract_domain(&hit.url).unwrap_or_default()
                    } else {
                        hit.source.clone()
                    };
                    return RetrievedDoc {
                        topic: topic.to_string(),
                        rank,
                        url: hit.url.clone(),
                        title: hit.title.clone(),
                        text,
                        source,
                        fetched_at: Utc::now(),
                        success: true,
                        error: None,
                    };
                }
                Err(e) => {
                    last_error = e;
                    if attempt < self.retry_count {
                        tracing::debug!(url = %hit.url, attempt, error = %last_error, "fetch retry");
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
            }
        }
        tracing::warn!(url = %hit.url, error = %last_error, "fetch failed after retries");
        RetrievedDoc::failed(topic, rank, &hit.url, last_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_domain() {
        assert_eq!(
            extract_domain("https://www.Bloomberg.com/news/x"),
            Some("www.bloomberg.com".to_string())
        );
        assert_eq!(
            extract_domain("http://example.com:8080/a"),
            Some("example.com".to_string())
        );
        assert_eq!(extract_domain("ftp://example.com"), None);
    }

    #[test]
    fn test_looks_like_html() {
        assert!(looks_like_html("<!DOCTYPE html><html>..."));
        assert!(looks_like_html(
            "   <html lang=\"en\"><head><title>x</title></head></html>"
        ));
        assert!(!looks_like_html("plain text body with no markup"));
    }

    #[test]
    fn test_strip_html_tags_collapses_whitespace() {
        let out = strip_html_tags("<p>hello   <b>world</b></p>");
        assert_eq!(out, "hello world");
    }
}
