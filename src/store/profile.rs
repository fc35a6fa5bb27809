//! 用户画像：个性化输入与反馈学得的约束
//!
//! 每用户一个 JSON 文件。约束不再是松散字典，而是显式结构 ConstraintSet，
//! 合并策略写在 merge 上：标量后写覆盖，列表追加去重。

use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 从反馈学得的约束；merge 策略见方法文档
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConstraintSet {
    /// 篇幅偏好：shorter / same / longer
    #[serde(default)]
    pub length_preference: Option<String>,
    #[serde(default)]
    pub last_feedback_rating: Option<u8>,
    #[serde(default)]
    pub feedback_count: u32,
    /// 希望加强覆盖的主题
    #[serde(default)]
    pub emphasized_topics: Vec<String>,
    /// 希望少出现的主题
    #[serde(default)]
    pub avoided_topics: Vec<String>,
    /// 其他自由文本偏好
    #[serde(default)]
    pub notes: Vec<String>,
}

/// 目标列表里没有的元素才追加，保持原有顺序
fn append_dedup(dst: &mut Vec<String>, src: Vec<String>) {
    for item in src {
        let item = item.trim().to_string();
        if !item.is_empty() && !dst.contains(&item) {
            dst.push(item);
        }
    }
}

impl ConstraintSet {
    /// 合并一次约束更新。
    ///
    /// 策略：标量字段后写覆盖（update 有值才覆盖，feedback_count 取非零新值）；
    /// 列表字段追加去重，从不清空。
    pub fn merge(&mut self, update: ConstraintSet) {
        if update.length_preference.is_some() {
            self.length_preference = update.length_preference;
        }
        if update.last_feedback_rating.is_some() {
            self.last_feedback_rating = update.last_feedback_rating;
        }
        if update.feedback_count != 0 {
            self.feedback_count = update.feedback_count;
        }
        append_dedup(&mut self.emphasized_topics, update.emphasized_topics);
        append_dedup(&mut self.avoided_topics, update.avoided_topics);
        append_dedup(&mut self.notes, update.notes);
    }
}

/// 用户画像
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: String,
    pub name: String,
    pub role: String,
    pub company: String,
    pub industry: String,
    pub topics_of_interest: Vec<String>,
    #[serde(default)]
    pub excluded_topics: Vec<String>,
    #[serde(default)]
    pub preferred_sources: Vec<String>,
    #[serde(default)]
    pub excluded_sources: Vec<String>,
    pub delivery_email: String,
    #[serde(default)]
    pub cc_emails: Vec<String>,
    #[serde(default)]
    pub constraints: ConstraintSet,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    pub fn new(
        user_id: impl Into<String>,
        name: impl Into<String>,
        role: impl Into<String>,
        company: impl Into<String>,
        industry: impl Into<String>,
        topics_of_interest: Vec<String>,
        delivery_email: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            user_id: user_id.into(),
            name: name.into(),
            role: role.into(),
            company: company.into(),
            industry: industry.into(),
            topics_of_interest,
            excluded_topics: Vec::new(),
            preferred_sources: Vec::new(),
            excluded_sources: Vec::new(),
            delivery_email: delivery_email.into(),
            cc_emails: Vec::new(),
            constraints: ConstraintSet::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// 本轮实际检索的主题：兴趣列表剔除显式排除与反馈学得的回避项
    pub fn priority_topics(&self) -> Vec<String> {
        self.topics_of_interest
            .iter()
            .filter(|t| {
                !self.excluded_topics.contains(t) && !self.constraints.avoided_topics.contains(t)
            })
            .cloned()
            .collect()
    }

    /// 查询构造用的受众语境（角色 + 行业）
    pub fn search_context(&self) -> String {
        format!("{} {}", self.role, self.industry).trim().to_string()
    }
}

/// 画像存储：目录下每用户一个 `<user_id>.json`
#[derive(Debug)]
pub struct ProfileStore {
    dir: PathBuf,
}

impl ProfileStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn profile_path(&self, user_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", user_id))
    }

    /// 加载画像；文件不存在返回 None
    pub fn load(&self, user_id: &str) -> anyhow::Result<Option<Profile>> {
        let path = self.profile_path(user_id);
        if !path.exists() {
            return Ok(None);
        }
        let data = std::fs::read_to_string(&path)
            .with_context(|| format!("read profile {}", path.display()))?;
        let profile = serde_json::from_str(&data)
            .with_context(|| format!("parse profile {}", path.display()))?;
        Ok(Some(profile))
    }

    /// 保存画像（盖 updated_at 时间戳）；父目录不存在时自动创建
    pub fn save(&self, profile: &mut Profile) -> anyhow::Result<()> {
        profile.updated_at = Utc::now();
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("create profile dir {}", self.dir.display()))?;
        let path = self.profile_path(&profile.user_id);
        std::fs::write(&path, serde_json::to_string_pretty(profile)?)
            .with_context(|| format!("write profile {}", path.display()))?;
        Ok(())
    }

    /// 创建并落盘新画像
    pub fn create(&self, mut profile: Profile) -> anyhow::Result<Profile> {
        self.save(&mut profile)?;
        Ok(profile)
    }

    /// 已有画像的用户 ID 列表
    pub fn list(&self) -> anyhow::Result<Vec<String>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    ids.push(stem.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Profile {
        Profile::new(
            "u1",
            "Ada",
            "CTO",
            "Initech",
            "fintech",
            vec!["ai".into(), "chips".into(), "crypto".into()],
            "ada@initech.test",
        )
    }

    #[test]
    fn test_constraint_merge_scalars_last_write_wins() {
        let mut base = ConstraintSet {
            length_preference: Some("same".into()),
            last_feedback_rating: Some(3),
            feedback_count: 2,
            ..Default::default()
        };
        base.merge(ConstraintSet {
            length_preference: Some("shorter".into()),
            feedback_count: 3,
            ..Default::default()
        });
        assert_eq!(base.length_preference.as_deref(), Some("shorter"));
        // update 未携带的标量保留旧值
        assert_eq!(base.last_feedback_rating, Some(3));
        assert_eq!(base.feedback_count, 3);
    }

    #[test]
    fn test_constraint_merge_lists_append_dedup() {
        let mut base = ConstraintSet {
            avoided_topics: vec!["crypto".into()],
            ..Default::default()
        };
        base.merge(ConstraintSet {
            avoided_topics: vec!["crypto".into(), "memes".into(), "  ".into()],
            emphasized_topics: vec!["ai".into()],
            ..Default::default()
        });
        assert_eq!(base.avoided_topics, vec!["crypto", "memes"]);
        assert_eq!(base.emphasized_topics, vec!["ai"]);
    }

    #[test]
    fn test_priority_topics_filters_exclusions() {
        let mut profile = sample();
        profile.excluded_topics.push("chips".into());
        profile.constraints.avoided_topics.push("crypto".into());
        assert_eq!(profile.priority_topics(), vec!["ai"]);
    }

    #[test]
    fn test_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProfileStore::new(dir.path());
        assert!(store.load("u1").unwrap().is_none());

        let mut profile = sample();
        store.save(&mut profile).unwrap();

        let loaded = store.load("u1").unwrap().unwrap();
        assert_eq!(loaded.name, "Ada");
        assert_eq!(loaded.topics_of_interest.len(), 3);
        assert_eq!(store.list().unwrap(), vec!["u1"]);
    }
}
