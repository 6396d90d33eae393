use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use outreach_desk::api::OutreachClient;
use outreach_desk::config;
use outreach_desk::desk::{Actor, OutreachDesk};
use outreach_desk::model::{
    EditOutreach, ListQuery, OutreachItem, OutreachStatus, SingleGenerate, StatusFilter,
};
use outreach_desk::notify::{Notifications, Toast};
use outreach_desk::session::{store, Navigator, Session, LOGIN_PATH};

const OUTREACH_PATH: &str = "/outreach";
const PASSWORD_ENV: &str = "OUTREACH_PASSWORD";

#[derive(Debug, Parser)]
#[command(author, version, about = "Review, approve and send AI-drafted outreach")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Log in and store the session token
    Login {
        #[arg(long)]
        email: String,
        /// Falls back to $OUTREACH_PASSWORD
        #[arg(long)]
        password: Option<String>,
    },
    /// Forget the stored session
    Logout,
    /// Show who actions will be attributed to
    Whoami,
    /// List outreach items
    List {
        #[arg(long, value_enum, default_value_t = Tab::Pending)]
        tab: Tab,
        /// Explicit statuses, comma separated; overrides --tab
        #[arg(long = "status", value_delimiter = ',')]
        statuses: Vec<OutreachStatus>,
        #[arg(long)]
        limit: Option<u32>,
    },
    /// Show one item and the actions available on it
    Show { id: i64 },
    /// Change the subject and/or body of a draft
    Edit {
        id: i64,
        #[arg(long)]
        subject: Option<String>,
        #[arg(long)]
        body: Option<String>,
    },
    /// Approve a draft for sending
    Approve {
        id: i64,
        /// Approver name; defaults to the logged-in user
        #[arg(long = "as")]
        approved_by: Option<String>,
    },
    /// Reject a draft
    Reject {
        id: i64,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Send an approved message
    Send { id: i64 },
    /// Generate drafts in bulk, optionally for one campaign
    Generate {
        #[arg(long)]
        campaign: Option<i64>,
        #[arg(long, default_value_t = 50)]
        limit: i64,
    },
    /// Generate a draft for a single staff member or contact
    GenerateOne {
        #[arg(long, conflicts_with = "contact_id", required_unless_present = "contact_id")]
        staff_id: Option<i64>,
        #[arg(long)]
        contact_id: Option<i64>,
        #[arg(long)]
        campaign: Option<i64>,
        /// Defaults to a fresh random key
        #[arg(long)]
        idempotency_key: Option<String>,
    },
    /// List campaigns
    Campaigns,
}

impl Command {
    fn path(&self) -> &'static str {
        match self {
            Command::Login { .. } => LOGIN_PATH,
            _ => OUTREACH_PATH,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Tab {
    All,
    Pending,
    Approved,
    Rejected,
    Sent,
}

impl From<Tab> for StatusFilter {
    fn from(tab: Tab) -> Self {
        match tab {
            Tab::All => StatusFilter::All,
            Tab::Pending => StatusFilter::Pending,
            Tab::Approved => StatusFilter::Approved,
            Tab::Rejected => StatusFilter::Rejected,
            Tab::Sent => StatusFilter::Sent,
        }
    }
}

/// Terminal stand-in for page navigation: a redirect to the login view
/// becomes a hint on stderr.
struct CliNavigator {
    path: Mutex<String>,
}

impl Navigator for CliNavigator {
    fn current_path(&self) -> String {
        self.path.lock().map(|p| p.clone()).unwrap_or_default()
    }

    fn redirect(&self, path: &str) {
        if let Ok(mut current) = self.path.lock() {
            *current = path.to_string();
        }
        if path == LOGIN_PATH {
            eprintln!("Session expired. Run `outreach-desk login` to sign in again.");
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let pool = store::init_pool(&cfg.app.database_url()).await?;
    store::run_migrations(&pool).await?;

    let navigator = Arc::new(CliNavigator {
        path: Mutex::new(args.command.path().to_string()),
    });
    let session = Arc::new(Session::load(pool, navigator).await?);
    let client = OutreachClient::from_config(&cfg.api, session.clone())?;

    match args.command {
        Command::Login { email, password } => {
            let password = match password {
                Some(p) => p,
                None => std::env::var(PASSWORD_ENV)
                    .with_context(|| format!("--password or ${PASSWORD_ENV} is required"))?,
            };
            let res = client.login(&email, &password).await?;
            let name = res.user.display_name().to_string();
            let role = res.user.role;
            session.establish(res.access_token, res.user).await?;
            println!("Logged in as {name} ({role})");
            return Ok(());
        }
        Command::Logout => {
            session.logout().await?;
            println!("Logged out");
            return Ok(());
        }
        Command::Whoami => {
            let user = if session.is_authenticated() {
                Some(client.me().await?)
            } else {
                None
            };
            let actor = Actor::resolve(user.as_ref(), &cfg.actor);
            let source = if user.is_some() { "session" } else { "config" };
            println!("{} ({}) via {}", actor.name, actor.role, source);
            return Ok(());
        }
        _ => {}
    }

    let actor = Actor::resolve(session.user().as_ref(), &cfg.actor);
    info!(actor = %actor.name, role = %actor.role, "desk ready");
    let notifications = Arc::new(Notifications::new());
    let desk = OutreachDesk::new(Arc::new(client), notifications.clone(), actor);

    let result = run(args.command, &desk).await;
    let toasts = notifications.drain();
    for toast in &toasts {
        println!("{toast}");
    }
    match result {
        Ok(()) => Ok(()),
        // Already reported as a toast.
        Err(err) if toasts.iter().any(Toast::is_error) => {
            debug!(?err, "command failed");
            std::process::exit(1);
        }
        Err(err) => Err(err),
    }
}

async fn run(command: Command, desk: &OutreachDesk) -> Result<()> {
    match command {
        Command::List {
            tab,
            statuses,
            limit,
        } => {
            let items = if statuses.is_empty() {
                desk.list_tab(tab.into(), limit).await?
            } else {
                let mut query = ListQuery::with_statuses(&statuses);
                query.limit = limit;
                desk.list(&query).await?
            };
            if items.is_empty() {
                println!("No outreach items");
            }
            for item in &items {
                print_row(item);
            }
        }
        Command::Show { id } => {
            let item = desk.get(id).await?;
            print_item(&item);
            let controls = desk.controls(&item);
            println!(
                "actions: edit={} approve={} reject={} send={}",
                controls.edit, controls.approve, controls.reject, controls.send
            );
        }
        Command::Edit { id, subject, body } => {
            let edit = EditOutreach { subject, body };
            if edit.is_empty() {
                bail!("nothing to change: pass --subject and/or --body");
            }
            let item = desk.edit(id, &edit).await?;
            print_item(&item);
        }
        Command::Approve { id, approved_by } => {
            let item = desk.approve(id, approved_by.as_deref()).await?;
            print_row(&item);
        }
        Command::Reject { id, reason } => {
            let item = desk.reject(id, reason.as_deref()).await?;
            print_row(&item);
        }
        Command::Send { id } => {
            let item = desk.send_if_available(id).await?;
            print_row(&item);
        }
        Command::Generate { campaign, limit } => {
            match campaign {
                Some(campaign_id) => desk.generate_for_campaign(campaign_id, limit).await?,
                None => desk.generate_bulk(limit).await?,
            };
        }
        Command::GenerateOne {
            staff_id,
            contact_id,
            campaign,
            idempotency_key,
        } => {
            let req = SingleGenerate {
                staff_id,
                contact_id,
                campaign_id: campaign,
                idempotency_key: Some(
                    idempotency_key.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
                ),
            };
            desk.generate_single(&req).await?;
        }
        Command::Campaigns => {
            for c in desk.campaigns().await? {
                println!(
                    "#{:<5} {:<32} {:<10} limit/day={}{}",
                    c.id,
                    c.name,
                    c.status.as_deref().unwrap_or("-"),
                    c.daily_send_limit
                        .map(|l| l.to_string())
                        .unwrap_or_else(|| "-".into()),
                    if c.is_default { " (default)" } else { "" }
                );
            }
        }
        Command::Login { .. } | Command::Logout | Command::Whoami => {}
    }
    Ok(())
}

fn print_row(item: &OutreachItem) {
    println!(
        "#{:<6} {:<13} {}",
        item.id,
        item.status.as_str(),
        item.subject
    );
}

fn print_item(item: &OutreachItem) {
    println!("Outreach #{} [{}]", item.id, item.status);
    if let Some(to) = item.recipient_email.as_deref() {
        match item.recipient_name.as_deref() {
            Some(name) => println!("To: {name} <{to}>"),
            None => println!("To: {to}"),
        }
    }
    if let Some(campaign) = item.campaign_id {
        println!("Campaign: {campaign}");
    }
    println!("Subject: {}", item.subject);
    println!();
    println!("{}", item.body);
    println!();
    if let Some(by) = item.approved_by.as_deref() {
        let at = item
            .approved_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_default();
        println!("Approved by {by} {at}");
    }
    if let Some(reason) = item.rejection_reason.as_deref() {
        println!("Rejected: {reason}");
    }
    if let Some(sent) = item.sent_at {
        println!("Sent at {}", sent.to_rfc3339());
    }
}
