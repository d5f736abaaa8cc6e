//! Bloom - AI 辅导系统控制台入口
//!
//! 初始化日志与存储，恢复或新建会话，然后进入逐行对话循环。
//! 命令：/quit 退出，/abandon 放弃当前会话并新开。

use std::io::Write;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use bloom::cache::ContentCache;
use bloom::config::load_config;
use bloom::llm::{create_image_client_from_config, create_llm_from_config};
use bloom::store::{self, SessionStore};
use bloom::tutor::{ReadinessClassifier, TutorEngine, TutorOptions, TutorService};
use bloom::TutorError;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 日志：默认 info，可通过 RUST_LOG 覆盖
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .with(fmt::layer())
        .init();

    let cfg = load_config(None).context("Failed to load config")?;

    let pool = store::connect(&cfg.app.db_path)
        .await
        .context("Failed to open database")?;
    let session_store = SessionStore::new(pool.clone());
    session_store
        .init_tables()
        .await
        .context("Failed to init session tables")?;
    let cache = Arc::new(ContentCache::new(pool, cfg.images.max_bytes));
    cache
        .init_tables()
        .await
        .context("Failed to init cache tables")?;

    let llm = create_llm_from_config(&cfg);
    let images = create_image_client_from_config(&cfg);

    let engine = TutorEngine::new(
        Arc::clone(&llm),
        ReadinessClassifier::new(cfg.tutor.readiness_keywords.clone()),
        TutorOptions {
            completion_threshold: cfg.tutor.completion_threshold,
            hint_cap: cfg.tutor.hint_cap,
            context_window: cfg.tutor.context_window,
        },
    );
    let service = TutorService::new(
        session_store,
        cache,
        engine,
        llm,
        images,
        cfg.images.prompt_version.clone(),
    );

    let view = open_session(&service).await?;
    let mut session_id = view.session.id;
    for msg in &view.transcript {
        println!("[{}] {}\n", msg.role.as_str(), msg.content);
    }

    let stdin = std::io::stdin();
    loop {
        print!("you> ");
        std::io::stdout().flush().ok();

        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input == "/quit" {
            break;
        }
        if input == "/abandon" {
            service.abandon(session_id).await?;
            println!("Session abandoned.\n");
            let view = open_session(&service).await?;
            session_id = view.session.id;
            for msg in &view.transcript {
                println!("[{}] {}\n", msg.role.as_str(), msg.content);
            }
            continue;
        }

        match service.student_turn(session_id, input).await {
            Ok(reply) => {
                println!("\n[tutor] {}\n", reply.message);
                if reply.calculator_visible {
                    println!("(calculator available for this question)\n");
                }
                if reply.completed {
                    println!("Subtopic completed. Goodbye!");
                    break;
                }
            }
            Err(e) if e.is_retryable() => {
                println!("\nSorry, something went wrong generating a reply. Please try again.\n");
            }
            Err(TutorError::StateConsistency(_)) => {
                println!("\nThis session's saved state is unusable. Starting a fresh session.\n");
                service.abandon(session_id).await.ok();
                let view = open_session(&service).await?;
                session_id = view.session.id;
                for msg in &view.transcript {
                    println!("[{}] {}\n", msg.role.as_str(), msg.content);
                }
            }
            Err(e) => return Err(e).context("Turn failed"),
        }
    }

    Ok(())
}

/// 有活跃会话则恢复，否则询问子主题并新建
async fn open_session(service: &TutorService) -> anyhow::Result<bloom::tutor::SessionView> {
    if let Some(session) = service.active_session().await? {
        match service.resume(session.id).await {
            Ok(view) => {
                println!("Resuming session {} (subtopic {}).\n", session.id, session.subtopic_id);
                return Ok(view);
            }
            Err(TutorError::StateConsistency(_)) => {
                tracing::warn!("session {} has an unusable checkpoint, abandoning", session.id);
                service.abandon(session.id).await.ok();
            }
            Err(e) => return Err(e).context("Failed to resume session"),
        }
    }

    print!("Subtopic name> ");
    std::io::stdout().flush().ok();
    let mut name = String::new();
    std::io::stdin().read_line(&mut name)?;
    let name = name.trim();
    let name = if name.is_empty() { "Fractions" } else { name };

    // 子主题 id 由名称哈希出一个稳定值，同名子主题复用同一份缓存内容
    let subtopic_id = stable_id(name);
    let view = service
        .start(subtopic_id, name)
        .await
        .context("Failed to start session")?;
    println!("Started session {} on \"{}\".\n", view.session.id, name);
    Ok(view)
}

fn stable_id(name: &str) -> i64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    name.to_lowercase().hash(&mut hasher);
    (hasher.finish() & 0x7FFF_FFFF) as i64
}
