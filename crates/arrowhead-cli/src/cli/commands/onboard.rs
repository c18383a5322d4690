//! `ahctl onboard` - obtain a device certificate and the core endpoints.

use anyhow::{Context as _, Result};
use arrowhead::tokio_util::sync::CancellationToken;
use arrowhead::{HttpTransport, OnboardedClient, OnboardingBootstrap};
use colored::Colorize;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tabled::{settings::Style, Table, Tabled};
use tracing::{debug, info};

use super::Context;
use crate::cli::args::OnboardArgs;
use crate::output::OutputFormat;

const IDENTITY_FILE: &str = "device.pem";
const TRUST_FILE: &str = "cloud.pem";

#[derive(Tabled)]
struct EndpointRow {
    #[tabled(rename = "System")]
    system: String,
    #[tabled(rename = "URL")]
    url: String,
}

#[derive(Serialize)]
struct OnboardReport {
    controller: String,
    common_name: String,
    endpoints: BTreeMap<String, String>,
    certificate: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    saved_to: Option<String>,
}

pub async fn execute(ctx: Context, args: OnboardArgs) -> Result<()> {
    let mut settings = ctx.settings.clone();
    let onboarding = &mut settings.onboarding;
    if let Some(name) = args.name {
        onboarding.common_name = Some(name);
    }
    if let Some(address) = args.address {
        onboarding.address = address;
    }
    if let Some(port) = args.port {
        onboarding.port = port;
    }
    onboarding.insecure |= args.insecure;
    onboarding.allow_insecure_bootstrap |= args.allow_insecure_bootstrap;

    let config = settings
        .onboarding_config(ctx.tls_defaults.clone())
        .context("Onboarding needs a device name: pass --name or set onboarding.common_name")?;
    let common_name = config.common_name().to_string();
    debug!(config = %config, "onboarding");

    let transport = Arc::new(HttpTransport::new(settings.onboarding.scheme)?);
    let bootstrap = OnboardingBootstrap::new(config, transport).prepare().await?;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupted, stopping onboarding");
            trigger.cancel();
        }
    });

    if ctx.output_format == OutputFormat::Pretty {
        println!(
            "{} {} at {}",
            "Onboarding".bold(),
            common_name.cyan(),
            bootstrap.address()
        );
    }

    let client = bootstrap.run(&cancel).await?;
    settings.apply_endpoints(client.endpoints())?;

    let saved_to = match &args.save {
        Some(dir) => Some(save_material(&client, dir)?),
        None => None,
    };

    let report = OnboardReport {
        controller: client.address().to_string(),
        common_name,
        endpoints: client
            .endpoints()
            .snapshot()
            .iter()
            .map(|(system, url)| (system.to_string(), url.to_string()))
            .collect(),
        certificate: client.certificate().certificate.clone(),
        saved_to,
    };

    match ctx.output_format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Pretty => print_report(&report, ctx.verbose),
    }

    Ok(())
}

/// Write the identity and trust bundles; returns the directory written to
fn save_material(client: &OnboardedClient, dir: &Path) -> Result<String> {
    let (Some(identity), Some(trust)) = (client.identity_pem(), client.trust_pem()) else {
        anyhow::bail!("No certificate material to save: onboarding ran over plain HTTP");
    };

    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;
    for (name, content) in [(IDENTITY_FILE, identity), (TRUST_FILE, trust)] {
        let path = dir.join(name);
        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }

    Ok(dir.display().to_string())
}

fn print_report(report: &OnboardReport, verbose: bool) {
    println!(
        "{} {} via {}",
        "Onboarded".green().bold(),
        report.common_name.cyan(),
        report.controller
    );
    println!();

    let rows: Vec<EndpointRow> = report
        .endpoints
        .iter()
        .map(|(system, url)| EndpointRow {
            system: system.clone(),
            url: url.clone(),
        })
        .collect();
    let table = Table::new(&rows).with(Style::rounded()).to_string();
    println!("{table}");

    if let Some(dir) = &report.saved_to {
        println!();
        println!(
            "{} {}/{{{IDENTITY_FILE},{TRUST_FILE}}}",
            "Saved:".bold(),
            dir
        );
        println!(
            "{}",
            "Point tls.key_store.file and tls.trust_store.file at these files to reuse them."
                .dimmed()
        );
    }

    if verbose && !report.certificate.is_empty() {
        println!();
        println!("{}", "Issued certificate:".bold());
        println!("{}", report.certificate.trim_end());
    }
}
