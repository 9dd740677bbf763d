use std::sync::Arc;

use clap::Parser;
use serde_json::json;
use tracing_subscriber::EnvFilter;

mod cli;
mod config;
mod context;
mod history;
mod lock;
mod semantic;
#[cfg(test)]
mod tests;
mod web;

use cli::Command;
use config::Config;
use context::AppContext;
use semantic::QueryOptions;

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = cli::Args::parse();
    init_logging();

    let base_path = config::base_path()?;
    let config = Config::load_with(&base_path)?;
    let ctx = AppContext::new(config)?;

    match args.command {
        Command::Insert {
            url,
            title,
            timestamp,
        } => {
            let timestamp = timestamp.unwrap_or_else(|| chrono::Utc::now().to_rfc3339());
            let outcome = ctx.store().insert(&url, &title, &timestamp)?;
            print_json(&outcome)
        }

        Command::Import { path } => {
            let report = history::import_csv_file(ctx.store(), &path)?;
            print_json(&report)
        }

        Command::Classify { title } => {
            println!("{}", ctx.store().classifier().classify(&title));
            Ok(())
        }

        Command::BuildIndex {} => {
            let report = ctx.build_index()?;
            log::info!(
                "indexed {}/{} entries with {}",
                report.indexed,
                report.entries,
                report.model
            );
            print_json(&report)
        }

        Command::Recommend {
            query,
            top_n,
            threshold,
            no_backfill,
            ranked_only,
            scores,
        } => {
            let engine = ctx.engine()?;

            if !(scores || ranked_only || no_backfill) {
                let titles = engine.query(&query, top_n, threshold)?;
                for (idx, title) in titles.iter().enumerate() {
                    println!("{}. {}", idx + 1, title);
                }
                return Ok(());
            }

            let mut options = if ranked_only {
                QueryOptions::ranked_only(engine.config().top_n)
            } else {
                engine.options()
            };
            if let Some(top_n) = top_n {
                options.top_n = top_n;
            }
            if let Some(threshold) = threshold {
                options.score_threshold = threshold;
            }
            if no_backfill {
                options.backfill = false;
            }

            let results = engine.recommend(&query, &options)?;
            if scores {
                return print_json(&results);
            }

            for (idx, rec) in results.iter().enumerate() {
                println!("{}. {}", idx + 1, rec.title);
            }
            Ok(())
        }

        Command::Status {} => {
            let store = ctx.store();
            let index_path = ctx.config().index_path();
            print_json(&json!({
                "entries": store.count()?,
                "categories": store.category_counts()?,
                "rules": store.classifier().categories().collect::<Vec<_>>(),
                "history_db": store.path(),
                "index": index_path,
                "index_exists": index_path.exists(),
            }))
        }

        Command::Daemon { listen } => {
            let ctx = Arc::new(ctx);
            let engine = Arc::new(ctx.engine()?);
            web::start_daemon(web::SharedState::new(ctx, engine), &listen)
        }
    }
}
