use anyhow::{bail, Context};
use colored::Colorize;
use fleetscout::input::{Config, Opts};
use fleetscout::prober::{
    CandidateStrategy, ProbeAttempt, ProbeSummary, Prober, RtspConnector, SafeMode,
};
use fleetscout::target::resolve_target;
use log::debug;
use std::net::SocketAddr;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[cfg(not(tarpaulin_include))]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let mut opts = Opts::read();
    let config = Config::read(opts.config_path.clone()).context("Failed to read configuration")?;
    opts.merge(&config);

    debug!("Main() `opts` arguments are {opts:?}");

    let Some(target) = opts.target.as_deref() else {
        bail!("No target given. Pass one with --target or set `target` in the config file.");
    };
    let ip = resolve_target(target).await?;
    let addr = SocketAddr::new(ip, opts.port);

    let candidates =
        CandidateStrategy::pick(opts.paths.clone(), opts.credentials.clone()).ordered();
    let prober = Prober::new(
        RtspConnector,
        opts.max_concurrency,
        Duration::from_millis(opts.timeout),
        SafeMode::new(opts.safe_mode),
    );

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let summary = prober.probe(addr, &candidates, &cancel).await;
    print_summary(&summary, &opts);

    Ok(())
}

/// Greppable mode prints only working URIs, one per line.
fn print_summary(summary: &ProbeSummary, opts: &Opts) {
    if opts.greppable {
        for attempt in summary.attempts.iter().filter(|a| a.success) {
            println!("{}", attempt.uri);
        }
        return;
    }

    for attempt in &summary.attempts {
        print_attempt(attempt, opts.accessible);
    }

    if let Some(best) = summary.best() {
        if opts.accessible {
            println!("Best stream {}", best.uri);
        } else {
            println!("Best stream {}", best.uri.purple());
        }
    }
    println!("{}", summary.describe());
}

fn print_attempt(attempt: &ProbeAttempt, accessible: bool) {
    let who = attempt
        .username
        .as_deref()
        .map_or_else(|| "anonymous".to_owned(), |u| format!("as {u}"));

    if attempt.success {
        let mut detail = Vec::new();
        if let Some(server) = &attempt.server {
            detail.push(server.clone());
        }
        if !attempt.codecs.is_empty() {
            detail.push(attempt.codecs.join("/"));
        }
        if let Some(ms) = attempt.latency_ms {
            detail.push(format!("{ms} ms"));
        }
        if accessible {
            println!("Open {} ({who}) {}", attempt.uri, detail.join(", "));
        } else {
            println!(
                "Open {} ({who}) {}",
                attempt.uri.purple(),
                detail.join(", ")
            );
        }
    } else {
        let reason = attempt
            .error
            .clone()
            .or_else(|| attempt.status.map(|s| format!("status {s}")))
            .unwrap_or_default();
        println!("Closed {} ({who}) {reason}", attempt.uri);
    }
}
