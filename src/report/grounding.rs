//! 落地文档集：一次流水线运行内成功/失败抓取结果的只读集合
//!
//! 检索完成后构建，之后不再变更；auditor 用它校验引用 URL 是否命中本轮文档。

use std::collections::HashMap;

use crate::report::RetrievedDoc;

/// 本轮运行的文档集合；构建后只读
#[derive(Debug)]
pub struct GroundingStore {
    docs: Vec<RetrievedDoc>,
    /// url -> docs 下标（仅成功文档），用于引用校验
    by_url: HashMap<String, usize>,
}

impl GroundingStore {
    pub fn new(docs: Vec<RetrievedDoc>) -> Self {
        let mut by_url = HashMap::new();
        for (i, doc) in docs.iter().enumerate() {
            if doc.success {
                by_url.entry(doc.url.clone()).or_insert(i);
            }
        }
        Self { docs, by_url }
    }

    /// 全部文档（含失败记录），保持检索层的确定性顺序
    pub fn all(&self) -> &[RetrievedDoc] {
        &self.docs
    }

    /// 仅成功抓取的文档
    pub fn successful(&self) -> Vec<&RetrievedDoc> {
        self.docs.iter().filter(|d| d.success).collect()
    }

    /// 引用的 source_url 是否命中本轮成功文档
    pub fn contains(&self, url: &str) -> bool {
        self.by_url.contains_key(url)
    }

    pub fn get(&self, url: &str) -> Option<&RetrievedDoc> {
        self.by_url.get(url).map(|&i| &self.docs[i])
    }

    pub fn successful_count(&self) -> usize {
        self.by_url.len()
    }

    pub fn failed_count(&self) -> usize {
        self.docs.iter().filter(|d| !d.success).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok_doc(url: &str) -> RetrievedDoc {
        RetrievedDoc {
            topic: "ai".into(),
            rank: 0,
            url: url.into(),
            title: "t".into(),
            text: "body".into(),
            source: "example.com".into(),
            fetched_at: chrono::Utc::now(),
            success: true,
            error: None,
        }
    }

    #[test]
    fn test_failed_docs_are_not_grounding() {
        let docs = vec![
            ok_doc("https://example.com/a"),
            RetrievedDoc::failed("ai", 1, "https://example.com/b", "timeout"),
        ];
        let store = GroundingStore::new(docs);
        assert!(store.contains("https://example.com/a"));
        assert!(!store.contains("https://example.com/b"));
        assert_eq!(store.successful_count(), 1);
        assert_eq!(store.failed_count(), 1);
        assert_eq!(store.all().len(), 2);
    }

    #[test]
    fn test_get_returns_doc_body() {
        let store = GroundingStore::new(vec![ok_doc("https://example.com/a")]);
        assert_eq!(store.get("https://example.com/a").unwrap().text, "body");
        assert!(store.get("https://example.com/x").is_none());
    }
}
