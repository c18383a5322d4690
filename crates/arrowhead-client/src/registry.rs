//! Service registry client.

use crate::transport::{join_path, Transport};
use arrowhead_core::{Result, ServiceQueryResult, ServiceRegistryEntry, ServiceRegistryQuery};
use std::sync::Arc;
use tracing::debug;
use url::Url;

const QUERY: &str = "query";
const REGISTER: &str = "register";
const REMOVE: &str = "remove";

/// Queries and updates the service registry of a local cloud
#[derive(Debug, Clone)]
pub struct ServiceRegistryClient {
    transport: Arc<dyn Transport>,
    base: Url,
}

impl ServiceRegistryClient {
    /// Client for the registry at `base` (e.g. `https://host:8443/serviceregistry`)
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, base: Url) -> Self {
        Self { transport, base }
    }

    /// Registry base URL
    #[must_use]
    pub const fn base(&self) -> &Url {
        &self.base
    }

    /// Find providers of a service
    pub async fn query(&self, query: &ServiceRegistryQuery) -> Result<ServiceQueryResult> {
        let url = join_path(&self.base, &[QUERY])?;
        debug!(service = %query.service.service_definition, "querying service registry");
        Ok(self.transport.put(&url, query).await?)
    }

    /// Register a service offered by this system
    pub async fn register_service(
        &self,
        entry: &ServiceRegistryEntry,
    ) -> Result<ServiceRegistryEntry> {
        let url = join_path(&self.base, &[REGISTER])?;
        debug!(
            service = %entry.provided_service.service_definition,
            provider = %entry.provider.system_name,
            "registering service"
        );
        Ok(self.transport.post(&url, entry).await?)
    }

    /// Withdraw a previously registered service
    pub async fn remove_service(
        &self,
        entry: &ServiceRegistryEntry,
    ) -> Result<ServiceRegistryEntry> {
        let url = join_path(&self.base, &[REMOVE])?;
        debug!(
            service = %entry.provided_service.service_definition,
            provider = %entry.provider.system_name,
            "removing service"
        );
        Ok(self.transport.put(&url, entry).await?)
    }
}
