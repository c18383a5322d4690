//! `ahctl registry` - query and update the service registry.

use anyhow::{Context as _, Result};
use arrowhead::tls::StrictHostnameVerifier;
use arrowhead::{
    CoreSystem, HttpTransport, ServiceDefinition, ServiceQueryResult, ServiceRegistryClient,
    ServiceRegistryEntry, ServiceRegistryQuery, Transport, TransportProtocol,
};
use colored::Colorize;
use std::path::Path;
use std::sync::Arc;
use tabled::{settings::Style, Table, Tabled};
use url::Url;

use super::Context;
use crate::cli::args::{RegistryArgs, RegistryCommands};
use crate::output::OutputFormat;

#[derive(Tabled)]
struct ProviderRow {
    #[tabled(rename = "System")]
    system: String,
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "Port")]
    port: u16,
    #[tabled(rename = "URI")]
    uri: String,
    #[tabled(rename = "Interfaces")]
    interfaces: String,
}

impl From<&ServiceRegistryEntry> for ProviderRow {
    fn from(entry: &ServiceRegistryEntry) -> Self {
        Self {
            system: entry.provider.system_name.clone(),
            address: entry.provider.address.clone(),
            port: entry.provider.port,
            uri: entry.service_uri.clone().unwrap_or_default(),
            interfaces: entry.provided_service.interfaces.join(", "),
        }
    }
}

pub async fn execute(ctx: Context, args: RegistryArgs) -> Result<()> {
    let registry = connect(&ctx, args.url.as_deref())?;

    match args.command {
        RegistryCommands::Query {
            service,
            interface,
            ping,
        } => {
            let definition = interface
                .into_iter()
                .fold(ServiceDefinition::new(service), ServiceDefinition::interface);
            let query = ServiceRegistryQuery::new(definition).ping_providers(ping);
            let result = registry.query(&query).await?;
            print_query(&ctx, &query, &result)
        }
        RegistryCommands::Register { file } => {
            let entry = read_entry(&file)?;
            let registered = registry.register_service(&entry).await?;
            print_entry(&ctx, "Registered", &registered)
        }
        RegistryCommands::Remove { file } => {
            let entry = read_entry(&file)?;
            let removed = registry.remove_service(&entry).await?;
            print_entry(&ctx, "Removed", &removed)
        }
    }
}

/// Registry client for `url`, or for the `service_registry` endpoint override
fn connect(ctx: &Context, url: Option<&str>) -> Result<ServiceRegistryClient> {
    let base = match url {
        Some(url) => Url::parse(url).with_context(|| format!("Invalid registry URL: {url}"))?,
        None => ctx
            .settings
            .endpoint_overrides()?
            .into_iter()
            .find_map(|(system, url)| (system == CoreSystem::ServiceRegistry).then_some(url))
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "No service registry URL.\n\n\
                     Pass --url or add service_registry to [endpoints] in {}",
                    ctx.settings_path.display()
                )
            })?,
    };

    let protocol = match base.scheme() {
        "https" => TransportProtocol::Https,
        "http" => TransportProtocol::Http,
        other => anyhow::bail!("Unsupported registry URL scheme: {other}"),
    };
    let transport = HttpTransport::new(protocol)?;

    if protocol.is_secure() {
        let configurator = ctx.settings.tls.configurator(ctx.tls_defaults.clone());
        let context = configurator
            .create_mutual_context(ctx.settings.onboarding.strict)?
            .ok_or_else(|| anyhow::anyhow!("TLS material in the settings file is unusable"))?;
        transport.install_security_context(Arc::new(context), Arc::new(StrictHostnameVerifier))?;
    }

    Ok(ServiceRegistryClient::new(Arc::new(transport), base))
}

fn read_entry(path: &Path) -> Result<ServiceRegistryEntry> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("{} is not a service registry entry", path.display()))
}

fn print_query(
    ctx: &Context,
    query: &ServiceRegistryQuery,
    result: &ServiceQueryResult,
) -> Result<()> {
    if ctx.output_format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(result)?);
        return Ok(());
    }

    println!(
        "{} {}",
        "Service:".bold(),
        query.service.service_definition.cyan()
    );
    println!(
        "{} {} of {} registered",
        "Providers:".bold(),
        result.service_query_data.len(),
        result.unfiltered_hits
    );

    if result.is_empty() {
        println!("{}", "No matching providers.".dimmed());
        return Ok(());
    }

    let rows: Vec<ProviderRow> = result.service_query_data.iter().map(ProviderRow::from).collect();
    println!();
    println!("{}", Table::new(&rows).with(Style::rounded()));
    Ok(())
}

fn print_entry(ctx: &Context, action: &str, entry: &ServiceRegistryEntry) -> Result<()> {
    if ctx.output_format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(entry)?);
        return Ok(());
    }

    println!(
        "{} {} provided by {}",
        format!("{action}:").green().bold(),
        entry.provided_service.service_definition.cyan(),
        entry.provider.system_name
    );
    println!("{}", Table::new([ProviderRow::from(entry)]).with(Style::rounded()));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::OutputFormat;
    use arrowhead::settings::Settings;
    use arrowhead::tls::TlsDefaults;
    use std::path::PathBuf;

    fn context(settings: Settings) -> Context {
        Context {
            settings,
            settings_path: PathBuf::from("/tmp/ahctl.toml"),
            output_format: OutputFormat::Pretty,
            tls_defaults: TlsDefaults::default(),
            verbose: false,
        }
    }

    #[test]
    fn test_connect_uses_endpoint_override() {
        let settings = Settings::from_toml(
            "[endpoints]\nservice_registry = \"http://sr.local:8443/serviceregistry\"",
        )
        .unwrap();
        let registry = connect(&context(settings), None).unwrap();
        assert_eq!(registry.base().host_str(), Some("sr.local"));
    }

    #[test]
    fn test_connect_requires_url() {
        let err = connect(&context(Settings::default()), None).unwrap_err();
        assert!(err.to_string().contains("No service registry URL"));

        let err = connect(&context(Settings::default()), Some("ftp://sr.local")).unwrap_err();
        assert!(err.to_string().contains("scheme"));
    }

    #[test]
    fn test_read_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("entry.json");
        std::fs::write(
            &path,
            r#"{
                "providedService": {"serviceDefinition": "temperature", "interfaces": ["HTTP-INSECURE-JSON"]},
                "provider": {"systemName": "thermometer", "address": "10.0.0.7", "port": 8080},
                "serviceUri": "/temperature"
            }"#,
        )
        .unwrap();

        let entry = read_entry(&path).unwrap();
        let row = ProviderRow::from(&entry);
        assert_eq!(row.system, "thermometer");
        assert_eq!(row.interfaces, "HTTP-INSECURE-JSON");
    }
}
