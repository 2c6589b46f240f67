use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde_json::{Value, json};
use tracing_subscriber::EnvFilter;
use wayguard::guard::RedirectMemory;
use wayguard::http::{HttpIdentity, HttpProfileStore};
use wayguard::{
    AuthSnapshot, FileStorage, Gatekeeper, GuardConfig, GuardError, GuardInput, Profile, Redirect, RouteContext,
    RouteTable, Ruling, Session, TokioTimer, decide,
};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("invalid --query value `{0}`; expected key=value")]
    InvalidQuery(String),
    #[error("{0}")]
    Guard(#[from] GuardError),
    #[error("http client build failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "wayguard", about = "Routing-guard decision table and pipeline probe")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Evaluate the decision table for a hand-built state tuple.
    Decide(DecideArgs),
    /// Run the full session/profile/cache pipeline against a live backend.
    Probe(ProbeArgs),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ProfileArg {
    Unknown,
    Complete,
    Incomplete,
    Deleted,
}

impl ProfileArg {
    fn profile(self) -> Option<Profile> {
        match self {
            Self::Unknown => None,
            Self::Complete => Some(Profile { onboarding_completed: true, is_deleted: false }),
            Self::Incomplete => Some(Profile { onboarding_completed: false, is_deleted: false }),
            Self::Deleted => Some(Profile { onboarding_completed: true, is_deleted: true }),
        }
    }
}

#[derive(Args, Debug)]
struct DecideArgs {
    /// Requested location, optionally with a query string (`/onboarding?step=4`).
    #[arg(long)]
    path: String,

    /// Extra query parameters as `key=value`; repeatable.
    #[arg(long = "query")]
    query: Vec<String>,

    /// Signed-in user id. Omit for an anonymous visitor.
    #[arg(long)]
    user: Option<String>,

    #[arg(long, value_enum, default_value_t = ProfileArg::Unknown)]
    profile: ProfileArg,

    /// Cached `onboardingComplete` flag.
    #[arg(long)]
    onboarded: bool,

    /// Cached `isGuest` flag.
    #[arg(long)]
    guest: bool,

    /// Session bootstrap still in flight.
    #[arg(long)]
    loading: bool,

    /// Live storage read differs from the snapshot (reconciliation race).
    #[arg(long)]
    stored_onboarded: Option<bool>,

    /// Last redirect issued, e.g. `/onboarding`.
    #[arg(long)]
    last_redirect: Option<String>,
}

#[derive(Args, Debug)]
struct ProbeArgs {
    #[arg(long, env = "WAYGUARD_BASE_URL", default_value = "http://127.0.0.1:3000")]
    base_url: String,

    #[arg(long, env = "WAYGUARD_SESSION_TOKEN")]
    session_token: Option<String>,

    /// JSON file standing in for browser local storage.
    #[arg(long, env = "WAYGUARD_STATE_FILE", default_value = ".wayguard-state.json")]
    state_file: PathBuf,

    #[arg(long)]
    path: String,

    /// Enter (`true`) or leave (`false`) guest mode before evaluating.
    #[arg(long)]
    guest: Option<bool>,

    /// Per-request HTTP timeout in seconds.
    #[arg(long, default_value_t = 15)]
    http_timeout_secs: u64,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Decide(args) => run_decide(&args),
        Command::Probe(args) => run_probe(args).await,
    }
}

fn run_decide(args: &DecideArgs) -> Result<(), CliError> {
    let config = GuardConfig::from_env()?;
    let rendered = match evaluate_args(args, &config.routes)? {
        Some(ruling) => serde_json::to_value(&ruling)?,
        None => json!({ "rule": null, "decision": { "kind": "wait" } }),
    };
    print_json(&rendered)
}

fn evaluate_args(args: &DecideArgs, routes: &RouteTable) -> Result<Option<Ruling>, CliError> {
    let route = build_route(&args.path, &args.query)?;
    let auth = build_snapshot(args);

    let mut memory = RedirectMemory::default();
    if let Some(last) = &args.last_redirect {
        memory.remember(Redirect::from(RouteContext::parse(last)));
    }

    let input = GuardInput {
        route: &route,
        auth: &auth,
        stored_onboarding_complete: args.stored_onboarded.unwrap_or(auth.onboarding_complete),
    };
    Ok(decide(routes, &input, &memory))
}

async fn run_probe(args: ProbeArgs) -> Result<(), CliError> {
    let config = GuardConfig::from_env()?;
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(args.http_timeout_secs))
        .build()?;
    let route = RouteContext::parse(&args.path);

    let gk = Gatekeeper::new(
        config,
        Rc::new(HttpIdentity::new(client.clone(), &args.base_url, args.session_token.clone())),
        Rc::new(HttpProfileStore::new(client, &args.base_url, args.session_token)),
        Box::new(FileStorage::new(args.state_file)),
        Rc::new(TokioTimer),
    );

    gk.initialize(&route).await;
    if let Some(enabled) = args.guest {
        gk.set_guest_mode(enabled);
    }
    let directive = gk.on_route_change(&route).await;

    print_json(&json!({
        "route": route,
        "auth": gk.snapshot(),
        "directive": directive,
    }))
}

fn build_route(path: &str, extra: &[String]) -> Result<RouteContext, CliError> {
    let mut route = RouteContext::parse(path);
    for pair in extra {
        let Some((k, v)) = pair.split_once('=') else {
            return Err(CliError::InvalidQuery(pair.clone()));
        };
        if k.is_empty() {
            return Err(CliError::InvalidQuery(pair.clone()));
        }
        route.query.insert(k.to_owned(), v.to_owned());
    }
    Ok(route)
}

fn build_snapshot(args: &DecideArgs) -> AuthSnapshot {
    let session = args.user.as_ref().map(|id| Session::new(id.clone(), ""));
    let profile = if session.is_some() { args.profile.profile() } else { None };
    AuthSnapshot {
        is_guest: args.guest && session.is_none(),
        session,
        profile,
        loading: args.loading,
        session_initialized: !args.loading,
        onboarding_complete: args.onboarded,
    }
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
