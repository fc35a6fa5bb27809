//! Magpie - 个性化新闻简报智能体
//!
//! 入口：初始化日志、加载配置，按子命令生成简报或处理反馈。

use anyhow::Context;
use magpie::config::{load_config, AppConfig};
use magpie::report::Feedback;
use magpie::store::{Profile, ProfileStore};
use magpie::{observability, Orchestrator};

fn usage() -> ! {
    eprintln!(
        "Usage:\n  magpie generate <user_id> [--no-deliver]\n  \
         magpie feedback <report_id> <user_id> <rating 1-5> [comment]\n  \
         magpie create-profile <user_id> <name> <role> <company> <industry> <email> <topic>..."
    );
    std::process::exit(2);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let cfg = load_config(None).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });

    let args: Vec<String> = std::env::args().collect();
    match args.get(1).map(String::as_str) {
        Some("generate") => {
            let user_id = match args.get(2) {
                Some(id) if !id.starts_with("--") => id.clone(),
                _ => usage(),
            };
            let deliver = !args.iter().any(|a| a == "--no-deliver");

            let orchestrator = Orchestrator::from_config(cfg)?;
            let report = orchestrator
                .generate_report(&user_id, deliver)
                .await
                .context("report generation failed")?;

            println!(
                "Report {} generated for {}: {} articles, verified={}, attempts={}",
                report.report_id,
                report.user_id,
                report.articles.len(),
                report.verified,
                report.attempts,
            );
            if !report.verified {
                println!("Open issues:");
                for issue in &report.open_issues {
                    println!("  - {}", issue);
                }
            }
        }
        Some("feedback") => {
            let (report_id, user_id, rating) = match (args.get(2), args.get(3), args.get(4)) {
                (Some(r), Some(u), Some(s)) => (r.clone(), u.clone(), s.clone()),
                _ => usage(),
            };
            let rating: u8 = rating.parse().context("rating must be 1-5")?;
            if !(1..=5).contains(&rating) {
                anyhow::bail!("rating must be 1-5");
            }
            let feedback = Feedback {
                report_id,
                user_id,
                rating,
                comment: args.get(5).cloned(),
                liked_topics: vec![],
                disliked_topics: vec![],
                missing_topics: vec![],
                too_long: false,
                too_short: false,
            };

            let orchestrator = Orchestrator::from_config(cfg)?;
            let summary = orchestrator
                .process_feedback(&feedback)
                .await
                .context("feedback processing failed")?;
            println!("{}", summary);
        }
        Some("create-profile") => {
            if args.len() < 9 {
                usage();
            }
            let topics: Vec<String> = args[8..].to_vec();
            let profile = Profile::new(
                args[2].clone(),
                args[3].clone(),
                args[4].clone(),
                args[5].clone(),
                args[6].clone(),
                topics,
                args[7].clone(),
            );

            // 建画像只需要存储，不要求搜索/LLM 凭据已就绪
            let store = ProfileStore::new(cfg.profiles_dir());
            let profile = store.create(profile).context("profile creation failed")?;
            println!(
                "Profile created for {} ({} topics)",
                profile.user_id,
                profile.topics_of_interest.len()
            );
        }
        _ => usage(),
    }

    Ok(())
}
