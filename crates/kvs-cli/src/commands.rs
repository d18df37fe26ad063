use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use colored::Colorize;
use kvs_sdk::{DatabaseConfig, Kvs, KvsConfig, Resource};
use kvs_server::KvsServer;
use serde_json::json;

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_deref())?;
    match cli.command {
        Command::Serve(args) => cmd_serve(config, args),
        Command::CheckConfig => cmd_check_config(&config, cli.format),
        Command::Sweep(args) => cmd_sweep(config, args, cli.format),
        Command::SaltFingerprint(args) => cmd_salt_fingerprint(config, args, cli.format),
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<KvsConfig> {
    match path {
        Some(path) => KvsConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display())),
        None => Ok(KvsConfig::default()),
    }
}

fn cmd_serve(mut config: KvsConfig, args: ServeArgs) -> anyhow::Result<()> {
    if let Some(bind) = args.bind {
        config.server.bind_addr = bind;
    }
    if config.database == DatabaseConfig::Memory {
        tracing::warn!("serving from an in-memory store; nothing survives a restart");
    }
    let kvs = Arc::new(Kvs::open(config).context("opening store")?);
    let server = KvsServer::new(kvs);
    println!(
        "{} KVS server on {}",
        "✓".green().bold(),
        server.config().bind_addr.to_string().bold()
    );
    let runtime = tokio::runtime::Runtime::new().context("starting runtime")?;
    runtime.block_on(server.serve_with_shutdown(async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "cannot listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    }))?;
    Ok(())
}

fn cmd_check_config(config: &KvsConfig, format: OutputFormat) -> anyhow::Result<()> {
    let backend = match &config.database {
        DatabaseConfig::Memory => "memory".to_string(),
        DatabaseConfig::Sqlite(sqlite) => format!("sqlite ({})", sqlite.path.display()),
    };
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(config)?),
        OutputFormat::Text => {
            println!("{} Config is valid", "✓".green().bold());
            println!("  Database: {}", backend.cyan());
            println!(
                "  Hashing: {} (fallbacks: {})",
                config.hash_algo.to_string().yellow(),
                join(&config.hash_algo_fallbacks)
            );
            println!(
                "  Fast store: {}",
                config.fast_store_url.as_deref().unwrap_or("none").cyan()
            );
            println!("  Lock TTL: {}s", config.default_lock_ttl_seconds);
            match config.cache_default_ttl() {
                Some(ttl) => println!("  Cache TTL: {}s", ttl.as_secs()),
                None => println!("  Cache TTL: {}", "none".dimmed()),
            }
            println!("  Bind: {}", config.server.bind_addr.to_string().bold());
            println!("  KV resources: {}", join(&config.server.kv_resources));
        }
    }
    Ok(())
}

fn cmd_sweep(config: KvsConfig, args: SweepArgs, format: OutputFormat) -> anyhow::Result<()> {
    if config.database == DatabaseConfig::Memory {
        println!("{} in-memory store, nothing persisted to sweep", "!".yellow().bold());
    }
    let kvs = Kvs::open(config).context("opening store")?;
    let resources = if args.all {
        Resource::ALL.to_vec()
    } else {
        args.resources
    };
    let mut total = 0;
    let mut swept = serde_json::Map::new();
    for resource in resources {
        let removed = kvs
            .sweep(resource)
            .with_context(|| format!("sweeping {resource}"))?;
        total += removed;
        swept.insert(resource.to_string(), json!(removed));
        if matches!(format, OutputFormat::Text) {
            println!("  {} {removed} expired", format!("{resource}:").cyan());
        }
    }
    match format {
        OutputFormat::Json => println!("{}", json!({ "swept": swept, "total": total })),
        OutputFormat::Text => println!("{} Swept {total} entries", "✓".green().bold()),
    }
    Ok(())
}

fn cmd_salt_fingerprint(config: KvsConfig, args: SaltArgs, format: OutputFormat) -> anyhow::Result<()> {
    anyhow::ensure!(
        args.resource.is_permalink(),
        "{} is not a permalink resource",
        args.resource
    );
    let kvs = Kvs::open(config).context("opening store")?;
    let fingerprint = kvs.salt_fingerprint(args.resource)?;
    match format {
        OutputFormat::Json => println!(
            "{}",
            json!({ "resource": args.resource, "fingerprint": fingerprint })
        ),
        OutputFormat::Text => println!("{}  {}", fingerprint.yellow(), args.resource),
    }
    Ok(())
}

fn join<T: std::fmt::Display>(items: &[T]) -> String {
    if items.is_empty() {
        return "none".into();
    }
    items.iter().map(T::to_string).collect::<Vec<_>>().join(", ")
}
