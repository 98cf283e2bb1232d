// Copyright 2026 BadCompany
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::io::Read;
use std::ops::Bound;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

use toolgate::config::{load_policy_file, Config};
use toolgate::engine::firewall::ContextFirewall;
use toolgate::engine_core::audit::verify_lines;
use toolgate::engine_core::store::read_ledger_lines;
use toolgate::runtime;
use toolgate::transport::server;

#[derive(Parser, Debug)]
#[command(version, about = "Gate and audit LLM-planned tool calls", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the gate as JSON lines over stdin/stdout
    Serve {
        /// Path to policy YAML file
        #[arg(long)]
        policy: Option<PathBuf>,

        /// Append-only ledger file (in memory when omitted)
        #[arg(long)]
        ledger: Option<PathBuf>,
    },
    /// Verify a ledger file's hash chain
    Verify {
        #[arg(long)]
        ledger: PathBuf,

        /// First sequence number to check
        #[arg(long)]
        from: Option<u64>,

        /// Last sequence number to check (inclusive)
        #[arg(long)]
        to: Option<u64>,
    },
    /// Run the context firewall over a file or stdin
    Scan {
        /// Text file to scan; stdin when omitted
        file: Option<PathBuf>,

        /// Policy whose firewall settings to use
        #[arg(long)]
        policy: Option<PathBuf>,
    },
    /// Validate a policy file and exit
    CheckPolicy { path: PathBuf },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    install_panic_hook();

    let mut config = Config::from_env().unwrap_or_else(|e| {
        eprintln!(
            "Warning: Failed to load config from env, using defaults: {}",
            e
        );
        Config::default()
    });

    init_tracing(&config);

    match cli.command {
        Command::Serve { policy, ledger } => {
            if let Some(p) = policy {
                config.policy_path = Some(p);
            }
            if let Some(l) = ledger {
                config.ledger_path = Some(l);
            }
            serve(config).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Verify { ledger, from, to } => verify(ledger, from, to),
        Command::Scan { file, policy } => {
            if let Some(p) = policy {
                config.policy_path = Some(p);
            }
            scan(&config, file)
        }
        Command::CheckPolicy { path } => {
            let policy = load_policy_file(&path)?;
            println!(
                "{}: ok ({} rules, {} tool overrides)",
                policy.name,
                policy.rules.len(),
                policy.tools.len()
            );
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let policy = config.load_policy()?;
    let chain = runtime::open_chain(&config).await?;
    let gate = Arc::new(runtime::build_gate(&config, &policy, chain)?);

    let sweeper = gate.spawn_sweeper(config.sweep_interval());
    let result = server::serve(gate, tokio::io::stdin(), tokio::io::stdout()).await;
    sweeper.abort();

    if let Err(e) = &result {
        error!("Server stopped: {:#}", e);
    }
    result
}

fn verify(ledger: PathBuf, from: Option<u64>, to: Option<u64>) -> anyhow::Result<ExitCode> {
    let lines = read_ledger_lines(&ledger)
        .with_context(|| format!("reading ledger {}", ledger.display()))?;
    let start = from.map_or(Bound::Unbounded, Bound::Included);
    let end = to.map_or(Bound::Unbounded, Bound::Included);
    let report = verify_lines(&lines, (start, end));

    println!("{}", serde_json::to_string_pretty(&report)?);
    if report.is_intact() {
        info!(checked = report.checked, "Ledger verified");
        Ok(ExitCode::SUCCESS)
    } else {
        error!(divergence = ?report.first_divergence, "Ledger verification failed");
        Ok(ExitCode::FAILURE)
    }
}

fn scan(config: &Config, file: Option<PathBuf>) -> anyhow::Result<ExitCode> {
    let policy = config.load_policy()?;
    let firewall = ContextFirewall::new(&policy.firewall)?;

    let (text, source) = match file {
        Some(path) => (
            std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?,
            path.display().to_string(),
        ),
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            (buf, "stdin".to_string())
        }
    };

    let findings = firewall.detect(&text, &source);
    let out = serde_json::json!({
        "clean": findings.is_empty(),
        "findings": findings,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(if findings.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn install_panic_hook() {
    std::panic::set_hook(Box::new(|panic_info| {
        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown".to_string());

        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };

        eprintln!("PANIC: {} at {}", message, location);
    }));
}

fn init_tracing(config: &Config) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("toolgate=info,warn"));

    let subscriber = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    if config.log_format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
