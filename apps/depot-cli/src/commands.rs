use std::io::{BufRead, IsTerminal};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use depot_auth::{FileTokenStore, SessionExpired, SessionExpiredHandler};
use depot_sdk::{ConsoleClient, ListQuery, ResourceKind};
use depot_utils::SecretString;
use futures::TryStreamExt;
use serde::Serialize;

use crate::config::CliConfig;

pub const LOGIN_HINT: &str = "session expired; run 'depot-cli login'";

#[derive(Subcommand)]
pub enum Command {
    /// Sign in and store the session in the token file
    Login(LoginArgs),
    /// Revoke the refresh token and forget the stored session
    Logout,
    /// Show the signed-in user
    Whoami {
        /// Reload the profile from the backend
        #[arg(long)]
        refresh: bool,
    },
    /// List a resource collection
    List(ListArgs),
    /// Fetch one item by id
    Get {
        resource: ResourceKind,
        id: String,
    },
    /// Send an authenticated request to any API path
    Request(RequestArgs),
    /// Print the effective configuration as YAML and exit
    PrintConfig,
}

#[derive(Args)]
pub struct LoginArgs {
    #[arg(long)]
    email: String,
    /// Prompted for without echo when not given; read from stdin when it
    /// is a pipe
    #[arg(long, env = "DEPOT_PASSWORD", hide_env_values = true)]
    password: Option<String>,
}

#[derive(Args)]
pub struct ListArgs {
    resource: ResourceKind,
    #[arg(long)]
    page: Option<u32>,
    #[arg(long)]
    limit: Option<u32>,
    #[arg(long)]
    search: Option<String>,
    #[arg(long)]
    sort: Option<String>,
    /// Extra filter as `key=value`; repeatable
    #[arg(long = "filter", value_parser = parse_filter)]
    filters: Vec<(String, String)>,
    /// Follow pagination to the last page
    #[arg(long)]
    all: bool,
}

#[derive(Args)]
pub struct RequestArgs {
    method: http::Method,
    /// Path under the API base URL, e.g. `/vendors`
    path: String,
    /// JSON request body
    #[arg(long)]
    data: Option<String>,
}

fn parse_filter(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_owned(), value.to_owned())),
        _ => Err(format!("expected key=value, got '{raw}'")),
    }
}

/// Prints the login hint once when the session is force-ended.
#[derive(Default)]
pub struct LoginHint {
    shown: AtomicBool,
}

impl SessionExpiredHandler for LoginHint {
    fn on_session_expired(&self, event: &SessionExpired) {
        tracing::warn!(reason = %event.reason, "session ended");
        if !self.shown.swap(true, Ordering::SeqCst) {
            eprintln!("{LOGIN_HINT}");
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}

fn connect(config: &CliConfig, hint: Arc<LoginHint>) -> Result<ConsoleClient> {
    let token_file = config.token_file()?;
    let store = FileTokenStore::open(&token_file)
        .with_context(|| format!("cannot open token file {}", token_file.display()))?;
    let client = ConsoleClient::builder(config.base_url()?)
        .session_config(config.session_config()?)
        .http_config(config.http_config())
        .token_store(Arc::new(store))
        .on_session_expired(hint)
        .build()?;
    Ok(client)
}

/// Prompt on the terminal with echo off, or read one line when stdin is a
/// pipe.
fn read_password() -> Result<SecretString> {
    let mut line = if std::io::stdin().is_terminal() {
        rpassword::prompt_password("password: ").context("cannot read password")?
    } else {
        let mut line = String::new();
        std::io::stdin().lock().read_line(&mut line)?;
        line
    };
    let password = SecretString::new(line.trim_end_matches(['\r', '\n']));
    zeroize::Zeroize::zeroize(&mut line);
    if password.is_empty() {
        anyhow::bail!("empty password");
    }
    Ok(password)
}

impl Command {
    /// # Errors
    /// Returns the failure of the command; API errors keep their
    /// [`depot_sdk::ApiError`] type inside the `anyhow` chain.
    pub async fn run(self, config: &CliConfig, hint: Arc<LoginHint>) -> Result<()> {
        if let Self::PrintConfig = self {
            print!("{}", serde_saphyr::to_string(config)?);
            return Ok(());
        }

        let client = connect(config, hint)?;
        match self {
            Self::Login(args) => {
                let password = match args.password {
                    Some(p) => SecretString::new(p),
                    None => read_password()?,
                };
                let user = client.login(&args.email, &password).await?;
                eprintln!("logged in as {} <{}>", user.name, user.email);
            }
            Self::Logout => {
                client.logout().await?;
                eprintln!("logged out");
            }
            Self::Whoami { refresh } => {
                if !client.is_authenticated() {
                    anyhow::bail!("not logged in; run 'depot-cli login'");
                }
                let user = match client.current_user() {
                    Some(user) if !refresh => user,
                    _ => client.fetch_profile().await?,
                };
                print_json(&user)?;
            }
            Self::List(args) => list(&client, args).await?,
            Self::Get { resource, id } => {
                let item: serde_json::Value = client.resource(resource).get(&id).await?;
                print_json(&item)?;
            }
            Self::Request(args) => {
                let body = args
                    .data
                    .as_deref()
                    .map(serde_json::from_str::<serde_json::Value>)
                    .transpose()
                    .context("--data is not valid JSON")?;
                let data = client
                    .send_json(args.method, &args.path, body.as_ref())
                    .await?;
                print_json(&data)?;
            }
            Self::PrintConfig => {}
        }
        Ok(())
    }
}

async fn list(client: &ConsoleClient, args: ListArgs) -> Result<()> {
    let mut query = ListQuery::new();
    query.page = args.page;
    query.limit = args.limit;
    query.search = args.search;
    query.sort = args.sort;
    query.filters.extend(args.filters);

    let resource = client.resource(args.resource);
    if args.all {
        let mut items = Vec::new();
        let mut pages = std::pin::pin!(resource.pages::<serde_json::Value>(query));
        while let Some(page) = pages.try_next().await? {
            items.extend(page.items);
        }
        return print_json(&items);
    }

    let page = resource.list::<serde_json::Value>(&query).await?;
    if let Some(p) = page.pagination {
        eprintln!("page {}/{} ({} total)", p.page, p.total_pages, p.total);
    }
    print_json(&page.items)
}
