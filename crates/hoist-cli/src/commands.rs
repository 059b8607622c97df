use anyhow::{Context, Result};
use bytes::Bytes;
use colored::Colorize;
use hoist_storage::{ErrorCode, Storage, StorageConfig};
use hoist_types::{generate_id, now_ms, Account, App, Deployment, Package};
use tracing::debug;

use crate::cli::{Cli, Command, OutputFormat};

pub async fn run_command(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Health => cmd_health(cli.format).await,
        Command::Config => cmd_config(cli.format),
        Command::Selftest => cmd_selftest(cli.format).await,
    }
}

fn resolve_config() -> Result<StorageConfig> {
    let config =
        StorageConfig::from_env().context("invalid storage configuration in environment")?;
    debug!(config = ?config.redacted(), "resolved configuration");
    Ok(config)
}

fn open_storage(config: StorageConfig) -> Result<Storage> {
    Storage::from_config(config).map_err(|e| {
        anyhow::Error::new(e).context("cannot open storage (set HOIST_EMULATED=1 to use the local emulators)")
    })
}

async fn cmd_health(format: OutputFormat) -> Result<()> {
    let storage = open_storage(resolve_config()?)?;
    storage.check_health().await.context("health check failed")?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::json!({ "status": "ok" })),
        OutputFormat::Text => println!("{} storage is healthy", "✓".green().bold()),
    }
    Ok(())
}

fn cmd_config(format: OutputFormat) -> Result<()> {
    let config = resolve_config()?;
    print!("{}", render_config(&config, format)?);
    Ok(())
}

/// Credentials are always redacted.
fn render_config(config: &StorageConfig, format: OutputFormat) -> Result<String> {
    let config = config.redacted();
    Ok(match format {
        OutputFormat::Json => format!("{}\n", serde_json::to_string_pretty(&config)?),
        OutputFormat::Text => {
            let unset = || "(unset)".to_string();
            let mut out = String::new();
            let mode = if config.emulated { "emulated" } else { "hosted" };
            out.push_str(&format!("{} {}\n", "Mode:".bold(), mode.cyan()));
            out.push_str(&format!("  account:            {}\n", config.account.unwrap_or_else(unset)));
            out.push_str(&format!("  access key:         {}\n", config.access_key.unwrap_or_else(unset)));
            out.push_str(&format!("  table:              {}\n", config.table_name));
            out.push_str(&format!("  blob container:     {}\n", config.blob_container));
            out.push_str(&format!("  history container:  {}\n", config.history_container));
            if config.emulated {
                out.push_str(&format!("  emulator endpoint:  {}\n", config.emulator_blob_endpoint));
            }
            out
        }
    })
}

/// Outcome of a self-test run.
#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct SelftestReport {
    account_id: String,
    app_name: String,
    deployment_key: String,
    label: String,
    history_length: usize,
    blob_url: String,
}

async fn cmd_selftest(format: OutputFormat) -> Result<()> {
    let storage = open_storage(resolve_config()?)?;
    let report = selftest(&storage).await?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => {
            println!("{} self-test passed", "✓".green().bold());
            println!("  account:     {}", report.account_id.cyan());
            println!("  app:         {}", report.app_name);
            println!("  deployment:  {}", report.deployment_key.yellow());
            println!("  released:    {} ({} in history)", report.label, report.history_length);
            println!("  blob:        {}", report.blob_url);
        }
    }
    Ok(())
}

/// Creates a throwaway account with one app, one deployment and one release,
/// reads everything back, then removes the app and its blob.
async fn selftest(storage: &Storage) -> Result<SelftestReport> {
    let run = generate_id();
    let now = now_ms();
    let account = Account::new(format!("selftest-{run}@hoist.local"), "Self Test", now);
    let account_id = storage.add_account(&account).await.context("add account")?;

    let app = storage
        .add_app(&account_id, &App::new(format!("selftest-{run}"), now))
        .await
        .context("add app")?;
    let deployment = Deployment::new("Staging", generate_id(), now);
    let deployment_id = storage
        .add_deployment(&account_id, &app.id, &deployment)
        .await
        .context("add deployment")?;

    let blob_id = format!("selftest-{run}");
    storage
        .add_blob(&blob_id, Bytes::from_static(b"selftest"))
        .await
        .context("upload package blob")?;
    let blob_url = storage.get_blob_url(&blob_id).await.context("resolve blob url")?;
    let package = Package {
        app_version: "1.0.0".into(),
        blob_url: blob_url.clone(),
        package_hash: blob_id.clone(),
        size: 8,
        upload_time: now,
        ..Default::default()
    };
    let committed = storage
        .commit_package(&account_id, &app.id, &deployment_id, &package)
        .await
        .context("commit package")?;
    let history = storage
        .get_package_history_from_deployment_key(&deployment.key)
        .await
        .context("read history by deployment key")?;

    storage.remove_app(&account_id, &app.id).await.context("remove app")?;
    storage.remove_blob(&blob_id).await.context("remove package blob")?;
    match storage.get_deployment_info(&deployment.key).await {
        Err(e) if e.is(ErrorCode::NotFound) => {}
        Ok(_) => anyhow::bail!("deployment key still resolves after app removal"),
        Err(e) => return Err(anyhow::Error::new(e).context("verify cleanup")),
    }

    Ok(SelftestReport {
        account_id,
        app_name: app.name,
        deployment_key: deployment.key,
        label: committed.label,
        history_length: history.len(),
        blob_url,
    })
}
