//! Subcommand implementations.

use anyhow::{Context, bail};
use clap::Args;
use interpose_coordinator::{Coordinator, InterposeConfig};
use interpose_observe::{FanoutSink, MetricsSink, TracingSink};
use interpose_types::{Envelope, Headers, Leg, RouteHints, RouteId};
use serde::Deserialize;
use serde_json::{Value, json};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use crate::plugins;

/// Exit code when the chain aborted and the message would be dropped.
const EXIT_ABORTED: u8 = 2;

/// Arguments for `interpose validate`.
#[derive(Args)]
pub struct ValidateArgs {
    /// Configuration file
    #[arg(short, long, env = "INTERPOSE_CONFIG")]
    config: PathBuf,
}

/// Arguments for `interpose test`.
#[derive(Args)]
pub struct TestArgs {
    /// Configuration file
    #[arg(short, long, env = "INTERPOSE_CONFIG")]
    config: PathBuf,

    /// Route whose chain runs
    #[arg(short, long)]
    route: String,

    /// Leg to run (request or response)
    #[arg(short, long, default_value = "request")]
    leg: Leg,

    /// Payload JSON, or an invocation document with a `payload` key.
    /// Prefix with @ to read from a file.
    #[arg(short, long)]
    input: String,

    /// Extra header, repeatable
    #[arg(short = 'H', long = "header", value_name = "KEY=VALUE", value_parser = parse_header)]
    headers: Vec<(String, String)>,

    /// Budget for the whole dispatch
    #[arg(long, default_value_t = 5000)]
    deadline_ms: u64,
}

fn parse_header(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((k, v)) if !k.trim().is_empty() => Ok((k.trim().to_string(), v.to_string())),
        _ => Err(format!("expected KEY=VALUE, got {s:?}")),
    }
}

/// Load, validate, and print a JSON summary.
pub fn validate(args: ValidateArgs) -> anyhow::Result<ExitCode> {
    let config = InterposeConfig::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;

    let catalog = plugins::builtin();
    let mut missing = Vec::new();
    for module in &config.modules {
        if let interpose_coordinator::config::RuntimeConfig::Local { plugin } = &module.runtime {
            if !catalog.contains(plugin) {
                missing.push(format!("module {:?} uses unknown plugin {plugin:?}", module.name));
            }
        }
    }
    if !missing.is_empty() {
        bail!("{}", missing.join("; "));
    }

    let routes: Vec<Value> = config
        .routes
        .iter()
        .map(|r| {
            let legs: serde_json::Map<String, Value> = r
                .legs()
                .map(|(leg, cfg)| {
                    let policy = cfg.policy(leg);
                    (
                        leg.to_string(),
                        json!({
                            "modules": cfg.modules,
                            "policy": policy.on_failure,
                            "retry_timeouts": policy.retry.retry_timeouts,
                        }),
                    )
                })
                .collect();
            json!({ "name": r.name, "legs": legs })
        })
        .collect();

    let summary = json!({
        "valid": true,
        "modules": config.modules.iter().map(|m| &m.name).collect::<Vec<_>>(),
        "routes": routes,
        "grace_period_ms": config.grace_period().as_millis() as u64,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(ExitCode::SUCCESS)
}

/// The `--input` document when it is more than a bare payload.
#[derive(Deserialize)]
struct InputDocument {
    payload: Value,
    #[serde(default)]
    headers: Headers,
    #[serde(default)]
    target: Option<String>,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    method: Option<String>,
}

fn read_envelope(input: &str, leg: Leg, headers: Vec<(String, String)>) -> anyhow::Result<Envelope> {
    let text = match input.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path).with_context(|| format!("reading {path}"))?,
        None => input.to_string(),
    };
    let value: Value = serde_json::from_str(&text).context("input is not valid JSON")?;

    let mut envelope = if value.get("payload").is_some() {
        let doc: InputDocument =
            serde_json::from_value(value).context("input document is malformed")?;
        let route = RouteHints {
            target: doc.target,
            path: doc.path,
            method: doc.method,
        };
        let mut envelope = Envelope::new(doc.payload, leg);
        envelope.headers = doc.headers;
        if route != RouteHints::default() {
            envelope = envelope.with_route(route);
        }
        envelope
    } else {
        Envelope::new(value, leg)
    };

    for (k, v) in headers {
        envelope.headers.insert(k, v);
    }
    Ok(envelope)
}

/// Dry-run one envelope and print the outcome with the metrics it produced.
pub async fn test(args: TestArgs) -> anyhow::Result<ExitCode> {
    let config = InterposeConfig::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    let envelope = read_envelope(&args.input, args.leg, args.headers)?;

    let metrics = Arc::new(MetricsSink::new());
    let sink = FanoutSink::new()
        .with(Arc::new(TracingSink::new()))
        .with(metrics.clone());
    let coordinator = Coordinator::from_config(&config, &plugins::builtin(), Arc::new(sink))
        .await
        .context("building chains")?;

    let route = RouteId::new(args.route);
    if coordinator.chain(&route, args.leg).await.is_none() {
        tracing::warn!(route = %route, leg = %args.leg, "interpose.cli.no_chain");
    }

    let deadline = tokio::time::Instant::now() + Duration::from_millis(args.deadline_ms);
    let outcome = coordinator
        .run_chain(&route, args.leg, envelope, deadline)
        .await;
    coordinator.close().await.context("closing runtimes")?;
    let aborted = outcome.is_aborted();

    let report = json!({
        "outcome": outcome,
        "metrics": metrics.snapshot(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(if aborted {
        ExitCode::from(EXIT_ABORTED)
    } else {
        ExitCode::SUCCESS
    })
}
