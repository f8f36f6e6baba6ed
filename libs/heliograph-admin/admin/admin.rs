//! Admin facade: route registration, validation and app lifecycle
//!
//! Validation happens at registration time, before the session is ever
//! touched. Everything here is plain synchronous checking; the connection
//! work lives in [`AdminSocketClient`].

use crate::core::config::{AdminCredentials, SdkConfig};
use crate::core::connection_state::Metrics;
use crate::core::session::AdminSocketClient;
use crate::traits::{AdminError, ReadRoute, Result, WriteRoute};
use parking_lot::RwLock;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::warn;

/// Primary index of a collection. MongoDB is the only adapter for now.
fn default_primary_index() -> Value {
    json!({ "_id": 1 })
}

fn is_index_required(route: &ReadRoute) -> bool {
    route.sort.is_some()
}

/// Entry point of the SDK
///
/// Register routes, then call [`start`](Self::start) once. The underlying
/// session keeps the registrations alive across reconnects until
/// [`stop`](Self::stop) withdraws them.
pub struct HeliographAdmin {
    app_started: AtomicBool,
    read_routes: RwLock<Vec<ReadRoute>>,
    write_routes: RwLock<Vec<WriteRoute>>,
    settings: RwLock<HashMap<String, Value>>,
    client: AdminSocketClient,
}

impl HeliographAdmin {
    pub fn new(credentials: AdminCredentials, config: SdkConfig) -> Self {
        Self {
            app_started: AtomicBool::new(false),
            read_routes: RwLock::new(Vec::new()),
            write_routes: RwLock::new(Vec::new()),
            settings: RwLock::new(HashMap::new()),
            client: AdminSocketClient::new(credentials, config),
        }
    }

    /// Store an app-level setting
    pub fn configure(&self, key: impl Into<String>, value: Value) {
        self.settings.write().insert(key.into(), value);
    }

    pub fn setting(&self, key: &str) -> Option<Value> {
        self.settings.read().get(key).cloned()
    }

    /// Read-route registration
    pub fn reads(&self) -> ReadRegistrar<'_> {
        ReadRegistrar { admin: self }
    }

    /// Write-route registration
    pub fn writes(&self) -> WriteRegistrar<'_> {
        WriteRegistrar { admin: self }
    }

    /// Connect, verify and declare the registered routes to the service
    pub async fn start(&self) -> Result<()> {
        if self.app_started.swap(true, Ordering::AcqRel) {
            return Err(AdminError::Configuration(
                "Heliograph app instance started more than once".into(),
            ));
        }

        let reads = self.read_routes.read().clone();
        let writes = self.write_routes.read().clone();

        if reads.is_empty() {
            warn!("starting Heliograph app without any read route configured");
        }
        if writes.is_empty() {
            warn!("starting Heliograph app without any write route configured");
        }

        check_write_triggers(&writes)?;

        self.client.ensure_ready().await?;
        self.client.activate(reads, writes).await
    }

    /// Withdraw the app's routes from the service
    pub async fn stop(&self) -> Result<()> {
        self.app_started.store(false, Ordering::Release);

        self.client.ensure_ready().await?;
        self.client.deactivate().await
    }

    pub fn metrics(&self) -> Metrics {
        self.client.metrics()
    }

    /// Tear down the session entirely
    pub fn shutdown(&self) {
        self.client.shutdown();
    }

    fn configure_read_route(&self, mut config: ReadRoute) -> Result<()> {
        if config.route_id.is_empty() {
            return Err(AdminError::Configuration(
                "Route ID is a required property for read configuration".into(),
            ));
        }

        let mut routes = self.read_routes.write();
        if routes.iter().any(|route| route.route_id == config.route_id) {
            return Err(AdminError::Configuration(format!(
                "Route ID: {} already configured for read operation",
                config.route_id
            )));
        }

        config.skip.get_or_insert(0);

        // _id must stay in any projection because it is currently the only
        // way to identify a unique document on the client.
        if let Some(projection) = &config.projection {
            let id = projection.get("_id");
            if id == Some(&json!(false)) || id == Some(&json!(-1)) {
                return Err(AdminError::Configuration(format!(
                    "Error at {} config. Query projection must not exclude primary key of this collection.",
                    config.route_id
                )));
            }
        }

        // skip and limit need a stable order, fall back to the primary index
        let skipping = config.skip.map_or(false, |skip| skip > 0);
        let limiting = config.limit.map_or(false, |limit| limit > 0);
        if (skipping || limiting) && config.sort.is_none() {
            config.sort = Some(default_primary_index());
        }

        if is_index_required(&config) && config.is_single_document {
            return Err(AdminError::Configuration(
                "Indexable query options (sort, limit, filter) cannot be applied to single document query"
                    .into(),
            ));
        }

        if let Some(sort) = &config.sort {
            if *sort != default_primary_index() {
                return Err(AdminError::Configuration(
                    "Routes that require database index to be created are not supported yet!"
                        .into(),
                ));
            }
        }

        routes.push(config);
        Ok(())
    }

    fn configure_write_route(&self, config: WriteRoute) -> Result<()> {
        if config.route_id.is_empty() {
            return Err(AdminError::Configuration(
                "Route ID is a required property for write configuration".into(),
            ));
        }

        let mut routes = self.write_routes.write();
        if routes.iter().any(|route| route.route_id == config.route_id) {
            return Err(AdminError::Configuration(format!(
                "Route ID: {} already configured for write operation",
                config.route_id
            )));
        }

        routes.push(config);
        Ok(())
    }
}

/// Every trigger must name a registered write route
fn check_write_triggers(writes: &[WriteRoute]) -> Result<()> {
    for route in writes {
        for trigger in &route.triggers {
            if !writes.iter().any(|other| &other.route_id == trigger) {
                return Err(AdminError::Configuration(format!(
                    "'{}' is not a valid routeId as trigger for '{}'",
                    trigger, route.route_id
                )));
            }
        }
    }
    Ok(())
}

/// Registration handle returned by [`HeliographAdmin::reads`]
pub struct ReadRegistrar<'a> {
    admin: &'a HeliographAdmin,
}

impl ReadRegistrar<'_> {
    pub fn route(&self, config: ReadRoute) -> Result<()> {
        self.admin.configure_read_route(config)
    }

    pub fn routes(&self, configs: Vec<ReadRoute>) -> Result<()> {
        for config in configs {
            self.admin.configure_read_route(config)?;
        }
        Ok(())
    }
}

/// Registration handle returned by [`HeliographAdmin::writes`]
pub struct WriteRegistrar<'a> {
    admin: &'a HeliographAdmin,
}

impl WriteRegistrar<'_> {
    pub fn route(&self, config: WriteRoute) -> Result<()> {
        self.admin.configure_write_route(config)
    }

    pub fn routes(&self, configs: Vec<WriteRoute>) -> Result<()> {
        for config in configs {
            self.admin.configure_write_route(config)?;
        }
        Ok(())
    }
}
