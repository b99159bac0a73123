// # netctl - network action command line
//
// Thin front end over `netctl-core`. It is responsible for:
// 1. Reading configuration from environment variables
// 2. Loading the record snapshot the console exported
// 3. Registering the compiled-in provider adapters
// 4. Running one action through the gated service entry point
//
// No access, provider, or Wake-on-LAN logic lives here.
//
// ## Configuration
//
// - `NETCTL_RECORDS_PATH` (required): JSON snapshot with `access_rules`,
//   `provider_accounts` and `wol_targets` arrays
// - `NETCTL_SOURCE_ADDR`: source address the request is gated as (default 127.0.0.1)
// - `NETCTL_ADMIN_RULE_SETS`: comma-separated rule set ids every request must pass
// - `NETCTL_PROBE_TIMEOUT_SECS`: provider call bound (default 5)
// - `NETCTL_WAKE_TIMEOUT_SECS`: magic packet send bound (default 5)
// - `NETCTL_LOG_LEVEL`: trace, debug, info, warn, error (default warn)
//
// ## Example
//
// ```bash
// export NETCTL_RECORDS_PATH=/etc/netctl/records.json
// export NETCTL_ADMIN_RULE_SETS=lan-only
// export NETCTL_SOURCE_ADDR=192.168.1.20
//
// netctl wake nas
// netctl invoke cf-origin set_origin_port --payload '{"port": 8443}'
// ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use netctl_core::{
    AccessRuleSet, Action, ActionOutcome, ActionRequest, ErrorCategory, NetworkActionService,
    ProviderAccount, ServiceConfig, ServiceStores, Verdict, WolTarget,
};
use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{Level, debug, error, info};
use tracing_subscriber::FmtSubscriber;

/// Exit codes for scripts driving the CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NetctlExitCode {
    /// Action completed (and, for `check`, the verdict was Allow)
    Success = 0,
    /// Configuration, snapshot or startup error
    ConfigError = 1,
    /// The action ran and failed
    ActionFailed = 2,
    /// The source was denied
    AccessDenied = 3,
}

impl From<NetctlExitCode> for ExitCode {
    fn from(code: NetctlExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

#[derive(Parser, Debug)]
#[command(name = "netctl")]
#[command(version)]
#[command(about = "Run one network action: access check, provider test or invoke, Wake-on-LAN")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Evaluate a rule set for an address
    Check {
        /// Rule set id
        rule_set: String,
        /// IPv4 or IPv6 address
        address: String,
    },
    /// Probe a provider account
    Test {
        /// Provider account id
        account: String,
    },
    /// Invoke a provider action
    Invoke {
        /// Provider account id
        account: String,
        /// Action name (e.g. send, list_zones, set_origin_port)
        action: String,
        /// JSON payload passed to the action
        #[arg(long, default_value = "{}")]
        payload: String,
    },
    /// Send a magic packet to a Wake-on-LAN target
    Wake {
        /// Target id
        target: String,
    },
    /// List provider accounts with secrets masked
    Accounts,
}

/// Application configuration
#[derive(Debug)]
struct Config {
    records_path: PathBuf,
    source_addr: String,
    service: ServiceConfig,
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        let records_path = env::var("NETCTL_RECORDS_PATH").context(
            "NETCTL_RECORDS_PATH is required. \
             Set it via: export NETCTL_RECORDS_PATH=/etc/netctl/records.json",
        )?;

        let mut service = ServiceConfig::default();
        if let Some(secs) = secs_from_env("NETCTL_PROBE_TIMEOUT_SECS")? {
            service.probe_timeout_secs = secs;
        }
        if let Some(secs) = secs_from_env("NETCTL_WAKE_TIMEOUT_SECS")? {
            service.wake_timeout_secs = secs;
        }
        service.admin_rule_sets = env::var("NETCTL_ADMIN_RULE_SETS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            records_path: PathBuf::from(records_path),
            source_addr: env::var("NETCTL_SOURCE_ADDR").unwrap_or_else(|_| "127.0.0.1".to_string()),
            service,
            log_level: env::var("NETCTL_LOG_LEVEL").unwrap_or_else(|_| "warn".to_string()),
        })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        self.service.validate()?;

        if self.source_addr.trim().is_empty() {
            anyhow::bail!("NETCTL_SOURCE_ADDR cannot be empty");
        }

        if !self.records_path.is_file() {
            anyhow::bail!(
                "NETCTL_RECORDS_PATH does not point to a file: {}",
                self.records_path.display()
            );
        }

        self.level()?;
        Ok(())
    }

    fn level(&self) -> Result<Level> {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Ok(Level::TRACE),
            "debug" => Ok(Level::DEBUG),
            "info" => Ok(Level::INFO),
            "warn" => Ok(Level::WARN),
            "error" => Ok(Level::ERROR),
            _ => anyhow::bail!(
                "NETCTL_LOG_LEVEL '{}' is not valid. \
                 Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }
    }
}

fn secs_from_env(name: &str) -> Result<Option<u64>> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("{} must be a number of seconds. Got: {}", name, value)),
        Err(_) => Ok(None),
    }
}

/// Records exported by the console
#[derive(Debug, Default, Deserialize)]
struct Snapshot {
    #[serde(default)]
    access_rules: Vec<AccessRuleSet>,
    #[serde(default)]
    provider_accounts: Vec<ProviderAccount>,
    #[serde(default)]
    wol_targets: Vec<WolTarget>,
}

impl Snapshot {
    fn parse(text: &str) -> Result<Self> {
        let snapshot: Snapshot = serde_json::from_str(text).context("invalid records snapshot")?;

        // Provider accounts are checked when used, against the adapter
        for rule_set in &snapshot.access_rules {
            rule_set
                .validate()
                .with_context(|| format!("access rule set '{}'", rule_set.id))?;
        }
        for target in &snapshot.wol_targets {
            target
                .validate()
                .with_context(|| format!("wol target '{}'", target.id))?;
        }
        Ok(snapshot)
    }

    fn into_stores(self) -> ServiceStores {
        ServiceStores::memory(self.access_rules, self.provider_accounts, self.wol_targets)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return NetctlExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {:#}", e);
        return NetctlExitCode::ConfigError.into();
    }

    let log_level = config.level().unwrap_or(Level::WARN);
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return NetctlExitCode::ConfigError.into();
    }

    let snapshot = match std::fs::read_to_string(&config.records_path)
        .with_context(|| format!("reading {}", config.records_path.display()))
        .and_then(|text| Snapshot::parse(&text))
    {
        Ok(snapshot) => snapshot,
        Err(e) => {
            error!("Failed to load records: {:#}", e);
            return NetctlExitCode::ConfigError.into();
        }
    };

    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return NetctlExitCode::ConfigError.into();
        }
    };

    rt.block_on(run(cli.command, config, snapshot)).into()
}

/// Build the service and run one command
async fn run(command: Commands, config: Config, snapshot: Snapshot) -> NetctlExitCode {
    let service = match NetworkActionService::new(snapshot.into_stores(), config.service.clone()) {
        Ok(service) => service,
        Err(e) => {
            error!("Failed to create service: {}", e);
            return NetctlExitCode::ConfigError;
        }
    };
    register_providers(&service);

    let action = match into_action(command) {
        Ok(action) => action,
        Err(e) => {
            eprintln!("{:#}", e);
            return NetctlExitCode::ConfigError;
        }
    };

    let request = ActionRequest::new(config.source_addr, action);
    match service.handle(request).await {
        Ok(outcome) => report(outcome),
        Err(e) => {
            eprintln!("{}", e);
            exit_code_for(e.category())
        }
    }
}

fn register_providers(service: &NetworkActionService) {
    #[cfg(feature = "webhook")]
    netctl_provider_webhook::register(service.registry());
    #[cfg(feature = "cloudflare")]
    netctl_provider_cloudflare::register(service.registry());
    #[cfg(feature = "aliyun")]
    netctl_provider_aliyun::register(service.registry());
    #[cfg(feature = "dnspod")]
    netctl_provider_dnspod::register(service.registry());

    debug!("Registered providers: {:?}", service.registry().list_kinds());
}

/// Map a subcommand to a gated action
fn into_action(command: Commands) -> Result<Action> {
    let action = match command {
        Commands::Check { rule_set, address } => Action::CheckAccess {
            rule_set_id: rule_set,
            address,
        },
        Commands::Test { account } => Action::TestProvider {
            account_id: account,
        },
        Commands::Invoke {
            account,
            action,
            payload,
        } => Action::InvokeProvider {
            account_id: account,
            action,
            payload: serde_json::from_str(&payload).context("--payload must be valid JSON")?,
        },
        Commands::Wake { target } => Action::Wake { target_id: target },
        Commands::Accounts => Action::ListAccounts,
    };
    Ok(action)
}

fn report(outcome: ActionOutcome) -> NetctlExitCode {
    match outcome {
        ActionOutcome::Access(verdict) => {
            println!("{:?}", verdict);
            if verdict == Verdict::Allow {
                NetctlExitCode::Success
            } else {
                NetctlExitCode::AccessDenied
            }
        }
        ActionOutcome::Connectivity(probe) => {
            println!(
                "ok {} {}ms {}",
                probe.provider,
                probe.latency.as_millis(),
                probe.detail
            );
            NetctlExitCode::Success
        }
        ActionOutcome::Invoked(outcome) => {
            info!("{} {} -> {:?}", outcome.provider, outcome.action, outcome.status);
            match serde_json::to_string_pretty(&outcome.body) {
                Ok(body) => println!("{}", body),
                Err(_) => println!("{}", outcome.body),
            }
            NetctlExitCode::Success
        }
        ActionOutcome::Woken(report) => {
            println!(
                "sent {} bytes to {} for {}",
                report.bytes_sent, report.destination, report.mac
            );
            NetctlExitCode::Success
        }
        ActionOutcome::Accounts(views) => match serde_json::to_string_pretty(&views) {
            Ok(text) => {
                println!("{}", text);
                NetctlExitCode::Success
            }
            Err(e) => {
                eprintln!("{}", e);
                NetctlExitCode::ActionFailed
            }
        },
    }
}

fn exit_code_for(category: ErrorCategory) -> NetctlExitCode {
    match category {
        ErrorCategory::AccessDenied => NetctlExitCode::AccessDenied,
        ErrorCategory::Internal => NetctlExitCode::ConfigError,
        _ => NetctlExitCode::ActionFailed,
    }
}
