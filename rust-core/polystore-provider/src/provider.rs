// SPDX-License-Identifier: PMPL-1.0-or-later
//
// The provider: owner of the database table.
//
// A provider parses its startup configuration, instantiates one database
// per entry through the backend registry, and serves lookups by id and by
// name. Admin operations (open, close, destroy, list) mutate the table
// under an exclusive lock and honor the configured security token.

use std::collections::HashMap;
use std::sync::Arc;

use polystore_backend::{BackendRegistry, DatabaseBackend};
use polystore_core::{DatabaseId, KvError, KvResult, Mode};
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::bulk::BulkPool;
use crate::config::{DatabaseSpec, ProviderConfig};

/// An open database: a backend instance plus its provider-assigned id.
pub struct Database {
    id: DatabaseId,
    name: Option<String>,
    backend: Arc<dyn DatabaseBackend>,
}

impl Database {
    /// The provider-assigned identifier.
    pub fn id(&self) -> DatabaseId {
        self.id
    }

    /// The optional human name.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The backend instance.
    pub fn backend(&self) -> &Arc<dyn DatabaseBackend> {
        &self.backend
    }

    /// The stored configuration: backend defaults applied, `__id__` set.
    pub fn config(&self) -> Value {
        let mut cfg = self.backend.config();
        if let Value::Object(map) = &mut cfg {
            map.insert("__id__".into(), json!(self.id.to_string()));
        }
        cfg
    }

    /// Reject modes the backend does not accept.
    pub fn check_mode(&self, mode: Mode) -> KvResult<()> {
        if self.backend.supports_mode(mode) {
            Ok(())
        } else {
            Err(KvError::OpUnsupported)
        }
    }
}

#[derive(Default)]
struct Tables {
    by_id: HashMap<DatabaseId, Arc<Database>>,
    by_name: HashMap<String, DatabaseId>,
}

/// Hosts databases and serves the batched K/V operations against them.
pub struct Provider {
    registry: BackendRegistry,
    token: Option<String>,
    tables: RwLock<Tables>,
    bulk_pool: BulkPool,
}

impl Provider {
    /// Build a provider from a parsed configuration.
    pub fn new(config: ProviderConfig, registry: BackendRegistry) -> KvResult<Self> {
        let mut tables = Tables::default();
        let token = config.token.clone();
        for spec in &config.databases {
            let database = Self::instantiate(&registry, spec)?;
            info!(
                id = %database.id(),
                backend = spec.backend_type.as_str(),
                name = spec.name.as_deref().unwrap_or(""),
                "opened database"
            );
            Self::insert(&mut tables, database)?;
        }
        Ok(Self {
            registry,
            token,
            tables: RwLock::new(tables),
            bulk_pool: BulkPool::default(),
        })
    }

    /// Build a provider from the configuration's JSON text.
    pub fn from_config_str(text: &str, registry: BackendRegistry) -> KvResult<Self> {
        Self::new(ProviderConfig::from_str(text)?, registry)
    }

    fn instantiate(registry: &BackendRegistry, spec: &DatabaseSpec) -> KvResult<Arc<Database>> {
        let backend = registry.create(&spec.backend_type, &spec.config)?;
        Ok(Arc::new(Database {
            id: DatabaseId::generate(),
            name: spec.name.clone(),
            backend,
        }))
    }

    fn insert(tables: &mut Tables, database: Arc<Database>) -> KvResult<DatabaseId> {
        if let Some(name) = database.name() {
            if tables.by_name.contains_key(name) {
                return Err(KvError::InvalidConfig(format!(
                    "duplicate database name: {name}"
                )));
            }
            tables.by_name.insert(name.to_string(), database.id());
        }
        let id = database.id();
        tables.by_id.insert(id, database);
        Ok(id)
    }

    /// The staging-buffer pool shared by this provider's handlers.
    pub fn bulk_pool(&self) -> &BulkPool {
        &self.bulk_pool
    }

    fn check_token(&self, presented: Option<&str>) -> KvResult<()> {
        match (&self.token, presented) {
            (None, _) => Ok(()),
            (Some(expected), Some(given)) if expected == given => Ok(()),
            (Some(_), _) => Err(KvError::InvalidToken),
        }
    }

    /// Look up a database by id.
    pub async fn database(&self, id: &DatabaseId) -> KvResult<Arc<Database>> {
        self.tables
            .read()
            .await
            .by_id
            .get(id)
            .cloned()
            .ok_or(KvError::InvalidDatabase(*id))
    }

    /// Resolve a database id from its human name.
    pub async fn find_by_name(&self, name: &str) -> KvResult<DatabaseId> {
        self.tables
            .read()
            .await
            .by_name
            .get(name)
            .copied()
            .ok_or_else(|| KvError::Other(format!("no database named {name}")))
    }

    /// Admin: open a new database from a spec.
    pub async fn open_database(
        &self,
        token: Option<&str>,
        spec: &DatabaseSpec,
    ) -> KvResult<DatabaseId> {
        self.check_token(token)?;
        let database = Self::instantiate(&self.registry, spec)?;
        let mut tables = self.tables.write().await;
        let id = Self::insert(&mut tables, database)?;
        info!(id = %id, backend = spec.backend_type.as_str(), "opened database");
        Ok(id)
    }

    /// Admin: close a database, leaving any backing storage in place.
    pub async fn close_database(&self, token: Option<&str>, id: &DatabaseId) -> KvResult<()> {
        self.check_token(token)?;
        let mut tables = self.tables.write().await;
        let database = tables
            .by_id
            .remove(id)
            .ok_or(KvError::InvalidDatabase(*id))?;
        if let Some(name) = database.name() {
            tables.by_name.remove(name);
        }
        debug!(id = %id, "closed database");
        Ok(())
    }

    /// Admin: erase a database's contents (and backing storage) and close it.
    pub async fn destroy_database(&self, token: Option<&str>, id: &DatabaseId) -> KvResult<()> {
        self.check_token(token)?;
        let database = {
            let mut tables = self.tables.write().await;
            let database = tables
                .by_id
                .remove(id)
                .ok_or(KvError::InvalidDatabase(*id))?;
            if let Some(name) = database.name() {
                tables.by_name.remove(name);
            }
            database
        };
        database.backend().destroy().await?;
        info!(id = %id, "destroyed database");
        Ok(())
    }

    /// Admin: ids of every open database.
    pub async fn list_databases(&self, token: Option<&str>) -> KvResult<Vec<DatabaseId>> {
        self.check_token(token)?;
        Ok(self.tables.read().await.by_id.keys().copied().collect())
    }

    /// Admin: the provider's current configuration snapshot.
    pub async fn get_config(&self, token: Option<&str>) -> KvResult<Value> {
        self.check_token(token)?;
        let tables = self.tables.read().await;
        let databases: Vec<Value> = tables
            .by_id
            .values()
            .map(|db| {
                let mut entry = json!({
                    "type": db.backend().name(),
                    "config": db.config(),
                });
                if let Some(name) = db.name() {
                    entry["name"] = json!(name);
                }
                entry
            })
            .collect();
        Ok(json!({ "databases": databases }))
    }
}
