//! 简报的 HTML 渲染
//!
//! 渲染执行摘要、逐篇文章（优先级徽章、要点、引用与来源链接）。
//! 未通过审计的报告带醒目的告知条与遗留问题清单，交付时保持透明。

use crate::report::BriefReport;

const STYLE: &str = "\
body { font-family: 'Segoe UI', Tahoma, sans-serif; line-height: 1.6; color: #333; max-width: 800px; margin: 0 auto; padding: 20px; }
.header { background: #4a5fc1; color: white; padding: 24px; border-radius: 8px; margin-bottom: 24px; }
.header h1 { margin: 0; font-size: 26px; }
.summary { background: #f8f9fa; padding: 16px; border-left: 4px solid #4a5fc1; margin-bottom: 24px; border-radius: 4px; }
.unverified { background: #fff3cd; border: 1px solid #ffc107; padding: 12px; border-radius: 4px; margin-bottom: 24px; }
.article { margin-bottom: 24px; padding: 16px; border: 1px solid #e0e0e0; border-radius: 6px; }
.article h2 { color: #4a5fc1; margin-top: 0; }
.priority { display: inline-block; padding: 3px 10px; border-radius: 12px; font-size: 12px; font-weight: bold; color: white; }
.priority-critical { background: #dc3545; }
.priority-high { background: #fd7e14; }
.priority-medium { background: #b8a11c; }
.priority-low { background: #6c757d; }
.citation { margin: 8px 0; padding: 8px; background: #f8f9fa; border-left: 3px solid #4a5fc1; font-size: 14px; }
.footer { margin-top: 32px; padding: 16px; text-align: center; color: #6c757d; font-size: 13px; }
a { color: #4a5fc1; text-decoration: none; }";

/// 最小 HTML 转义（正文来自外部站点与生成端，不可信）
fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

pub fn format_report_html(report: &BriefReport) -> String {
    let mut html = format!(
        "<html>\n<head>\n<style>\n{}\n</style>\n</head>\n<body>\n\
         <div class=\"header\">\n<h1>Your Briefing</h1>\n<p>{}</p>\n</div>\n",
        STYLE,
        report.generated_at.format("%A, %B %d, %Y"),
    );

    if !report.verified {
        html.push_str(
            "<div class=\"unverified\">\n<strong>Note:</strong> this report could not be fully \
             verified within the retry budget. Remaining issues:\n<ul>\n",
        );
        for issue in &report.open_issues {
            html.push_str(&format!("<li>{}</li>\n", escape(issue)));
        }
        html.push_str("</ul>\n</div>\n");
    }

    html.push_str(&format!(
        "<div class=\"summary\">\n<h2>Executive Summary</h2>\n<p>{}</p>\n\
         <p>{} articles | Topics: {} | Attempts: {}</p>\n</div>\n",
        escape(&report.executive_summary),
        report.articles.len(),
        escape(&report.topics_covered.join(", ")),
        report.attempts,
    ));

    for article in &report.articles {
        html.push_str(&format!(
            "<div class=\"article\">\n\
             <span class=\"priority priority-{p}\">{P}</span>\n\
             <h2>{title}</h2>\n\
             <p><strong>Why this matters:</strong> {relevance}</p>\n\
             <p>{summary}</p>\n<ul>\n",
            p = article.priority.as_str(),
            P = article.priority.as_str().to_uppercase(),
            title = escape(&article.title),
            relevance = escape(&article.relevance),
            summary = escape(&article.summary),
        ));
        for insight in &article.key_insights {
            html.push_str(&format!("<li>{}</li>\n", escape(insight)));
        }
        html.push_str("</ul>\n<div><strong>Sources:</strong>\n");
        for (i, citation) in article.citations.iter().enumerate() {
            html.push_str(&format!(
                "<div class=\"citation\">\n<strong>[{}]</strong> {}<br>\n<em>\"{}\"</em><br>\n\
                 <a href=\"{}\">{}</a>\n</div>\n",
                i + 1,
                escape(&citation.claim),
                escape(&citation.quote),
                escape(&citation.source_url),
                escape(&citation.source_title),
            ));
        }
        html.push_str(&format!(
            "</div>\n<p><a href=\"{}\">Read full article</a></p>\n</div>\n",
            escape(&article.url)
        ));
    }

    html.push_str(&format!(
        "<div class=\"footer\">\n<p>Report ID: {}</p>\n</div>\n</body>\n</html>\n",
        escape(&report.report_id)
    ));

    html
}
