use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use outreach_desk::api::OutreachClient;
use outreach_desk::config;
use outreach_desk::session::{store, Navigator, Session};

#[derive(Parser, Debug)]
#[command(about = "Print the raw JSON the outreach API returns for one item")]
struct Args {
    /// Path to YAML config
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Outreach item ID to inspect
    #[arg(long)]
    id: i64,
}

struct NoNavigation;

impl Navigator for NoNavigation {
    fn current_path(&self) -> String {
        String::new()
    }

    fn redirect(&self, path: &str) {
        eprintln!("credentials rejected; would redirect to {path}");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;
    let pool = store::init_pool(&cfg.app.database_url()).await?;
    store::run_migrations(&pool).await?;
    let session = Arc::new(Session::load(pool, Arc::new(NoNavigation)).await?);
    let client = OutreachClient::from_config(&cfg.api, session)?;

    let raw = client.get_outreach_raw(args.id).await?;
    println!("{}", serde_json::to_string_pretty(&raw)?);
    Ok(())
}
