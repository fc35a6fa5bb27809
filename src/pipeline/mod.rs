//! 合成流水线：起草（DraftGenerator）⇄ 审计（VerificationAuditor），由 VerificationLoop 驱动

pub mod auditor;
pub mod drafter;
pub mod loop_;

pub use auditor::{CitationPolicy, Strictness, VerificationAuditor};
pub use drafter::DraftGenerator;
pub use loop_::{LoopOutcome, VerificationLoop};

/// 去掉包裹 JSON 的 markdown 代码围栏（```json ... ``` 或 ``` ... ```）
pub(crate) fn strip_code_fences(raw: &str) -> &str {
    let mut s = raw.trim();
    if let Some(rest) = s.strip_prefix("```json") {
        s = rest;
    } else if let Some(rest) = s.strip_prefix("```") {
        s = rest;
    }
    if let Some(rest) = s.strip_suffix("```") {
        s = rest;
    }
    s.trim()
}

/// 严格解析失败后的唯一回退：取最外层 `{`..`}` 区间再试一次。
/// 除此之外不做任何局部修复；两次都失败由调用方给出类型化错误。
pub(crate) fn extract_json_object(s: &str) -> Option<&str> {
    let start = s.find('{')?;
    let end = s.rfind('}')?;
    if end > start {
        Some(&s[start..=end])
    } else {
        None
    }
}
