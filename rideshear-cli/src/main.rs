use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use rideshear_core::logging::init_tracing;
use rideshear_core::CoreConfig;
use rideshear_rules::{
    rideshare, ContextBuilder, DocumentPath, EvaluationRequest, EvaluationResponse, Evaluator,
    InMemoryStore, OperationKind, PolicyApiBuilder, PolicyServiceConfig, PolicyTable, Principal,
    RawRequest, RuleError, RuleSummary, WriteMode,
};
use tracing::info;

mod client;

use client::{load_seed, parse_fields, print_rules, print_verdict, CliError, PolicyClient};

#[derive(Parser)]
#[command(name = "rideshear")]
#[command(about = "Rideshear - document access policies for the ride-sharing store", long_about = None)]
struct Cli {
    /// Policy file or directory; the built-in ride-share policies are used when absent
    #[arg(long, global = true, env = "RIDESHEAR_POLICY_PATH")]
    policies: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate one request and print the decision
    Check(CheckArgs),
    /// List the loaded rules
    Policies {
        /// Ask a running service instead of loading rules locally
        #[arg(long)]
        server: Option<String>,
    },
    /// Run the dry-run HTTP API
    Serve(ServeArgs),
    /// Show version information
    Version,
}

#[derive(Args)]
struct CheckArgs {
    /// Document path, e.g. rides/abc/messages/m1
    path: String,
    #[arg(long, short = 'o')]
    operation: OperationKind,
    /// Caller id; omit for an unauthenticated request
    #[arg(long)]
    uid: Option<String>,
    /// Extra claims as a JSON object or @file
    #[arg(long)]
    claims: Option<String>,
    /// Payload for create/update as a JSON object or @file
    #[arg(long)]
    payload: Option<String>,
    /// Stored state of the target; read from the seed data when omitted
    #[arg(long)]
    existing: Option<String>,
    /// Replace the document instead of merging the payload into it
    #[arg(long, default_value_t = false)]
    replace: bool,
    /// JSON file mapping document paths to their fields
    #[arg(long)]
    seed: Option<PathBuf>,
    /// Evaluate through a running service at this URL
    #[arg(long)]
    server: Option<String>,
}

#[derive(Args)]
struct ServeArgs {
    #[arg(long, env = "RIDESHEAR_HTTP_BIND")]
    bind: Option<String>,
    /// JSON file mapping document paths to their fields
    #[arg(long)]
    seed: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = CoreConfig::from_env()?;
    init_tracing(&config)?;

    let policy_path = cli.policies.clone().or_else(|| config.policy_path.clone());

    match cli.command {
        Commands::Check(args) => check(args, policy_path, &config).await?,
        Commands::Policies { server } => {
            let rules: Vec<RuleSummary> = match server {
                Some(url) => PolicyClient::new(&url)?.policies().await?,
                None => load_table(policy_path)?
                    .rules()
                    .iter()
                    .map(RuleSummary::from)
                    .collect(),
            };
            print_rules(&rules);
        }
        Commands::Serve(args) => {
            let store = InMemoryStore::new();
            if let Some(seed) = &args.seed {
                let count = load_seed(seed, &store)?;
                info!(documents = count, "seeded store");
            }
            let mut service_config = PolicyServiceConfig::from(&config);
            if let Some(bind) = args.bind {
                service_config.bind_address = bind;
            }
            let evaluator = Evaluator::new(load_table(policy_path)?);
            let shutdown = PolicyApiBuilder::new(evaluator, store, service_config)
                .serve()
                .await?;
            tokio::signal::ctrl_c()
                .await
                .context("waiting for shutdown signal")?;
            let _ = shutdown.send(());
        }
        Commands::Version => {
            println!("Rideshear v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}

async fn check(
    args: CheckArgs,
    policy_path: Option<PathBuf>,
    config: &CoreConfig,
) -> anyhow::Result<()> {
    let principal = match &args.uid {
        Some(uid) => Principal::authenticated(uid.clone()),
        None => Principal::anonymous(),
    };
    let principal = match &args.claims {
        Some(raw) => principal.with_claims(parse_fields(raw)?),
        None => principal,
    };
    let request = EvaluationRequest {
        path: args.path.clone(),
        operation: args.operation,
        principal,
        payload: args.payload.as_deref().map(parse_fields).transpose()?,
        mode: if args.replace {
            WriteMode::Replace
        } else {
            WriteMode::Merge
        },
    };

    if let Some(url) = &args.server {
        if args.existing.is_some() || args.seed.is_some() {
            return Err(CliError::Validation(
                "--existing and --seed only apply to local checks".into(),
            )
            .into());
        }
        let response = PolicyClient::new(url)?.evaluate(&request).await?;
        print_verdict(&response, &request);
        return Ok(());
    }

    let store = InMemoryStore::new();
    if let Some(seed) = &args.seed {
        load_seed(seed, &store)?;
    }
    let existing = match &args.existing {
        Some(raw) => Some(parse_fields(raw)?),
        None => {
            let target = DocumentPath::parse(&request.path)?;
            store.get(&target).map(|document| document.fields)
        }
    };

    let evaluator = Evaluator::new(load_table(policy_path)?);
    let builder = ContextBuilder::new(Arc::new(store.snapshot()));
    let raw = RawRequest {
        path: request.path.clone(),
        operation: request.operation,
        principal: request.principal.clone(),
        existing,
        payload: request.payload.clone(),
        mode: request.mode,
    }
    .upsert();

    let response = local_verdict(&evaluator, &builder, raw, config.eval_timeout).await?;
    print_verdict(&response, &request);
    Ok(())
}

/// Local checks always show the deny reason, a timeout included.
async fn local_verdict(
    evaluator: &Evaluator,
    builder: &ContextBuilder,
    request: RawRequest,
    timeout: Duration,
) -> Result<EvaluationResponse, RuleError> {
    let decision = evaluator.check_within(builder, request, timeout).await?;
    Ok(EvaluationResponse {
        allowed: decision.is_allowed(),
        message: decision.public_message().to_string(),
        reason: decision.reason().map(ToString::to_string),
    })
}

fn load_table(path: Option<PathBuf>) -> Result<PolicyTable, RuleError> {
    match path {
        Some(path) => {
            info!(path = %path.display(), "loading policies");
            PolicyTable::from_path(path)
        }
        None => rideshare::policy_table(),
    }
}
