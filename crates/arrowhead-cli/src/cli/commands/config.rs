//! `ahctl config` - inspect the settings file.

use anyhow::Result;
use colored::Colorize;

use super::Context;
use crate::cli::args::{ConfigArgs, ConfigCommands};
use crate::output::OutputFormat;

pub async fn execute(ctx: Context, args: ConfigArgs) -> Result<()> {
    match args.command {
        ConfigCommands::Show => show_config(&ctx),
        ConfigCommands::Path => {
            println!("{}", ctx.settings_path.display());
            Ok(())
        }
    }
}

fn show_config(ctx: &Context) -> Result<()> {
    let settings = &ctx.settings;

    match ctx.output_format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(settings)?);
        }
        OutputFormat::Pretty => {
            let source = if ctx.settings_path.exists() {
                ctx.settings_path.display().to_string()
            } else {
                format!("{} (not found, defaults)", ctx.settings_path.display())
            };
            println!("{} {}", "Settings:".bold(), source.dimmed());
            println!();

            let onboarding = &settings.onboarding;
            println!(
                "  {} {}://{}:{}",
                "onboarding:".bold(),
                onboarding.scheme,
                onboarding.address,
                onboarding.port
            );
            println!(
                "  {} {}",
                "common_name:".bold(),
                onboarding
                    .common_name
                    .clone()
                    .unwrap_or_else(|| "(not set)".dimmed().to_string())
            );
            println!(
                "  {} {} every {} {:?}",
                "retries:".bold(),
                onboarding.retries,
                onboarding.delay,
                onboarding.delay_unit
            );
            if onboarding.insecure {
                let state = if onboarding.allow_insecure_bootstrap {
                    "enabled".red().bold()
                } else {
                    "requested but not allowed".yellow()
                };
                println!("  {} {}", "insecure:".bold(), state);
            }

            let tls = &settings.tls;
            let describe = |file: Option<&std::path::Path>, has_password: bool| {
                file.map_or_else(
                    || "(not set)".dimmed().to_string(),
                    |f| {
                        let password = if has_password { " (password set)" } else { "" };
                        format!("{}{password}", f.display())
                    },
                )
            };
            println!(
                "  {} {}",
                "key_store:".bold(),
                describe(tls.key_store.file.as_deref(), tls.key_store.password.is_some())
            );
            println!(
                "  {} {}",
                "trust_store:".bold(),
                describe(tls.trust_store.file.as_deref(), tls.trust_store.password.is_some())
            );
            println!(
                "  {} {}",
                "protocol:".bold(),
                tls.protocol.as_deref().unwrap_or("TLS")
            );

            if !settings.endpoints.is_empty() {
                println!("  {}", "endpoints:".bold());
                for (system, url) in &settings.endpoints {
                    println!("    {system} = {url}");
                }
            }
        }
    }

    Ok(())
}
