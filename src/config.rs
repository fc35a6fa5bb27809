//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `MAGPIE__*` 覆盖（双下划线表示嵌套，如 `MAGPIE__VERIFY__MAX_RETRIES=3`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub search: SearchSection,
    #[serde(default)]
    pub fetch: FetchSection,
    #[serde(default)]
    pub verify: VerifySection,
    #[serde(default)]
    pub delivery: DeliverySection,
}

/// [app] 段：应用名、数据目录、报告规模
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
    pub name: Option<String>,
    /// 画像与历史的根目录，未设置时用 ./data
    pub data_dir: Option<PathBuf>,
    /// 单期报告最多覆盖的文档数
    #[serde(default = "default_max_articles")]
    pub max_articles_per_report: usize,
    /// 历史快照的时间窗（天），喂给 URL 排除集
    #[serde(default = "default_history_window_days")]
    pub history_window_days: i64,
}

fn default_max_articles() -> usize {
    10
}

fn default_history_window_days() -> i64 {
    30
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            data_dir: None,
            max_articles_per_report: default_max_articles(),
            history_window_days: default_history_window_days(),
        }
    }
}

/// [llm] 段：后端选择
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// 后端：deepseek / openai；优先级由 API Key 与 provider 共同决定
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    #[serde(default)]
    pub deepseek: LlmDeepSeekSection,
    #[serde(default)]
    pub openai: LlmOpenAiSection,
}

fn default_provider() -> String {
    "deepseek".to_string()
}

fn default_model() -> String {
    "deepseek-chat".to_string()
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            deepseek: LlmDeepSeekSection::default(),
            openai: LlmOpenAiSection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LlmDeepSeekSection {
    pub model: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LlmOpenAiSection {
    pub model: Option<String>,
}

/// [search] 段：候选发现（API Key 走环境变量 GOOGLE_SEARCH_API_KEY / GOOGLE_SEARCH_ENGINE_ID）
#[derive(Debug, Clone, Deserialize)]
pub struct SearchSection {
    /// 每主题候选上限
    #[serde(default = "default_per_topic_limit")]
    pub per_topic_limit: usize,
    /// 只要近 N 天的结果（dateRestrict）
    #[serde(default = "default_days_back")]
    pub days_back: u32,
}

fn default_per_topic_limit() -> usize {
    5
}

fn default_days_back() -> u32 {
    7
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            per_topic_limit: default_per_topic_limit(),
            days_back: default_days_back(),
        }
    }
}

/// [fetch] 段：正文抓取的超时、重试与并发
#[derive(Debug, Clone, Deserialize)]
pub struct FetchSection {
    #[serde(default = "default_fetch_timeout_secs")]
    pub timeout_secs: u64,
    /// 首次之外的重试次数
    #[serde(default = "default_retry_count")]
    pub retry_count: usize,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// 抓取工作池并发上限
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// 单篇正文保留的最大字符数
    #[serde(default = "default_max_doc_chars")]
    pub max_doc_chars: usize,
}

fn default_fetch_timeout_secs() -> u64 {
    10
}

fn default_retry_count() -> usize {
    2
}

fn default_retry_delay_ms() -> u64 {
    2000
}

fn default_max_workers() -> usize {
    5
}

fn default_max_doc_chars() -> usize {
    8000
}

impl Default for FetchSection {
    fn default() -> Self {
        Self {
            timeout_secs: default_fetch_timeout_secs(),
            retry_count: default_retry_count(),
            retry_delay_ms: default_retry_delay_ms(),
            max_workers: default_max_workers(),
            max_doc_chars: default_max_doc_chars(),
        }
    }
}

/// [verify] 段：重试预算与引用策略
#[derive(Debug, Clone, Deserialize)]
pub struct VerifySection {
    /// 首次之外允许的额外起草尝试数
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    /// 数字断言规则：strict / balanced / lenient
    #[serde(default = "default_strictness")]
    pub strictness: String,
}

fn default_max_retries() -> usize {
    2
}

fn default_strictness() -> String {
    "balanced".to_string()
}

impl Default for VerifySection {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            strictness: default_strictness(),
        }
    }
}

/// [delivery] 段：发件目录
#[derive(Debug, Clone, Deserialize, Default)]
pub struct DeliverySection {
    /// 未设置时用 <data_dir>/outbox
    pub outbox_dir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app: AppSection::default(),
            llm: LlmSection::default(),
            search: SearchSection::default(),
            fetch: FetchSection::default(),
            verify: VerifySection::default(),
            delivery: DeliverySection::default(),
        }
    }
}

impl AppConfig {
    /// 数据根目录（默认 ./data）
    pub fn data_dir(&self) -> PathBuf {
        self.app
            .data_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("data"))
    }

    pub fn profiles_dir(&self) -> PathBuf {
        self.data_dir().join("user_profiles")
    }

    pub fn history_dir(&self) -> PathBuf {
        self.data_dir().join("history")
    }

    pub fn outbox_dir(&self) -> PathBuf {
        self.delivery
            .outbox_dir
            .clone()
            .unwrap_or_else(|| self.data_dir().join("outbox"))
    }
}

/// 从 config 目录加载配置，环境变量 MAGPIE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 MAGPIE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("MAGPIE")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.verify.max_retries, 2);
        assert_eq!(cfg.verify.strictness, "balanced");
        assert_eq!(cfg.fetch.max_workers, 5);
        assert_eq!(cfg.fetch.retry_count, 2);
        assert_eq!(cfg.search.per_topic_limit, 5);
        assert_eq!(cfg.app.max_articles_per_report, 10);
    }

    #[test]
    fn test_derived_dirs() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.profiles_dir(), PathBuf::from("data/user_profiles"));
        assert_eq!(cfg.outbox_dir(), PathBuf::from("data/outbox"));

        let mut custom = AppConfig::default();
        custom.delivery.outbox_dir = Some(PathBuf::from("/tmp/out"));
        assert_eq!(custom.outbox_dir(), PathBuf::from("/tmp/out"));
    }
}
