//! 检索层：候选发现（SearchProvider）、正文抓取（DocFetcher）与有界并发编排

pub mod fetcher;
pub mod layer;
pub mod provider;

pub use fetcher::{DocFetcher, HttpFetcher};
pub use layer::RetrievalLayer;
pub use provider::{CseSearchProvider, SearchProvider};
