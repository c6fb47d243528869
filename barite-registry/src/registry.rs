//! Registry construction and bootstrap.
//!
//! [`Registry`] owns the persisted configuration (rules, triggers, jobs,
//! resources, groups), keeps an in-memory mirror of every record, and holds
//! the live handles returned by the dispatcher and scheduler ports. Opening
//! a registry loads every record and re-registers everything active, so a
//! restart restores the exact live state the store describes.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sha2::{Digest, Sha256};
use tracing::{info, warn};

use barite_model::{Group, Job, Resource, Rule, Trigger};
use barite_storage::{BlobStore, EntityStore, IdAllocator, KeyValueStore};
use barite_types::{ItemId, ROOT_GROUP};

use crate::ports::{
    DispatcherPort, MatcherHandle, Renderer, ScheduleHandle, SchedulerPort, SendPort,
};
use crate::RegistryResult;

pub(crate) const RULES_PREFIX: &[u8] = b"rules-";
pub(crate) const TRIGGERS_PREFIX: &[u8] = b"triggers-";
pub(crate) const JOBS_PREFIX: &[u8] = b"jobs-";
pub(crate) const RESOURCES_PREFIX: &[u8] = b"resources-";
pub(crate) const GROUPS_PREFIX: &[u8] = b"groups-";
pub(crate) const RESOURCE_HASH_PREFIX: &[u8] = b"resources_hash-";

const COLD_SALT_KEY: &[u8] = b"meta-coldsalt";
const COLD_SALT_LEN: usize = 32;

/// The collaborator ports a registry is wired to.
#[derive(Clone)]
pub struct Ports {
    pub dispatcher: Arc<dyn DispatcherPort>,
    pub scheduler: Arc<dyn SchedulerPort>,
    pub renderer: Arc<dyn Renderer>,
    pub sender: Arc<dyn SendPort>,
}

/// Settings fixed at open time.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Path of the key-value database file.
    pub db_path: PathBuf,
    /// Directory holding resource blobs.
    pub resource_dir: PathBuf,
    /// Prefixes recognized by command-kind matchers.
    pub command_prefixes: Vec<String>,
    /// Hard time budget for one template render.
    pub render_budget: Duration,
}

impl RegistryConfig {
    /// Conventional layout under one data directory.
    #[must_use]
    pub fn in_dir(data_dir: &std::path::Path) -> Self {
        Self {
            db_path: data_dir.join("registry.db"),
            resource_dir: data_dir.join("resources"),
            command_prefixes: vec!["/".to_string()],
            render_budget: Duration::from_secs(2),
        }
    }
}

pub(crate) struct RegistryInner {
    pub(crate) kv: KeyValueStore,
    pub(crate) ids: IdAllocator,
    pub(crate) blobs: BlobStore,
    pub(crate) cold_salt: Vec<u8>,
    pub(crate) command_prefixes: Vec<String>,
    pub(crate) render_budget: Duration,
    pub(crate) ports: Ports,

    pub(crate) rule_store: EntityStore<Rule>,
    pub(crate) trigger_store: EntityStore<Trigger>,
    pub(crate) job_store: EntityStore<Job>,
    pub(crate) resource_store: EntityStore<Resource>,
    pub(crate) group_store: EntityStore<Group>,

    pub(crate) rules: Mutex<HashMap<ItemId, Rule>>,
    pub(crate) triggers: Mutex<HashMap<ItemId, Trigger>>,
    pub(crate) jobs: Mutex<HashMap<ItemId, Job>>,
    pub(crate) resources: Mutex<HashMap<ItemId, Resource>>,
    pub(crate) groups: Mutex<HashMap<ItemId, Group>>,

    // Live port handles. An active record always has exactly one entry
    // here; drift between the two is an integrity error.
    pub(crate) rule_handles: Mutex<HashMap<ItemId, MatcherHandle>>,
    pub(crate) trigger_handles: Mutex<HashMap<ItemId, MatcherHandle>>,
    pub(crate) job_handles: Mutex<HashMap<ItemId, ScheduleHandle>>,
}

/// The live configuration registry. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct Registry {
    pub(crate) inner: Arc<RegistryInner>,
}

impl Registry {
    /// Opens the store, loads every record, and registers all active
    /// entities with the collaborator ports. A record that fails to
    /// register is logged and left inactive rather than failing the boot.
    pub fn open(config: RegistryConfig, ports: Ports) -> RegistryResult<Self> {
        let kv = KeyValueStore::open(&config.db_path)?;
        let ids = IdAllocator::open(kv.clone())?;
        let blobs = BlobStore::open(&config.resource_dir)?;
        let cold_salt = load_or_create_cold_salt(&kv)?;

        let rule_store = EntityStore::new(kv.clone(), RULES_PREFIX);
        let trigger_store = EntityStore::new(kv.clone(), TRIGGERS_PREFIX);
        let job_store = EntityStore::new(kv.clone(), JOBS_PREFIX);
        let resource_store = EntityStore::new(kv.clone(), RESOURCES_PREFIX);
        let group_store = EntityStore::new(kv.clone(), GROUPS_PREFIX);

        let mut groups = group_store.load_all()?;
        if !groups.contains_key(&ROOT_GROUP) {
            let root = Group::root();
            group_store.put(ROOT_GROUP, &root)?;
            groups.insert(ROOT_GROUP, root);
        }

        let rules = rule_store.load_all()?;
        let triggers = trigger_store.load_all()?;
        let jobs = job_store.load_all()?;
        let resources = resource_store.load_all()?;

        info!(
            rules = rules.len(),
            triggers = triggers.len(),
            jobs = jobs.len(),
            resources = resources.len(),
            groups = groups.len(),
            "registry loaded"
        );

        let registry = Self {
            inner: Arc::new(RegistryInner {
                kv,
                ids,
                blobs,
                cold_salt,
                command_prefixes: config.command_prefixes,
                render_budget: config.render_budget,
                ports,
                rule_store,
                trigger_store,
                job_store,
                resource_store,
                group_store,
                rules: Mutex::new(rules),
                triggers: Mutex::new(triggers),
                jobs: Mutex::new(jobs),
                resources: Mutex::new(resources),
                groups: Mutex::new(groups),
                rule_handles: Mutex::new(HashMap::new()),
                trigger_handles: Mutex::new(HashMap::new()),
                job_handles: Mutex::new(HashMap::new()),
            }),
        };

        registry.register_loaded();
        Ok(registry)
    }

    /// Registers every active loaded entity. Failures are logged and the
    /// entity stays dormant; the record itself is untouched.
    fn register_loaded(&self) {
        let rules: Vec<(ItemId, Rule)> = self
            .inner
            .rules
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, r)| r.active)
            .map(|(id, r)| (*id, r.clone()))
            .collect();
        for (id, rule) in rules {
            if let Err(err) = self.register_rule(id, &rule) {
                warn!(id, %err, "rule left unregistered at boot");
            }
        }

        let triggers: Vec<(ItemId, Trigger)> = self
            .inner
            .triggers
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, t)| t.active)
            .map(|(id, t)| (*id, t.clone()))
            .collect();
        for (id, trigger) in triggers {
            if let Err(err) = self.register_trigger(id, &trigger) {
                warn!(id, %err, "trigger left unregistered at boot");
            }
        }

        let jobs: Vec<(ItemId, Job)> = self
            .inner
            .jobs
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, j)| j.active)
            .map(|(id, j)| (*id, j.clone()))
            .collect();
        for (id, job) in jobs {
            if let Err(err) = self.register_job(id, &job) {
                warn!(id, %err, "job left unscheduled at boot");
            }
        }
    }

    /// Stable per-user token derived from the instance's cold salt. Equal
    /// users map to equal tokens on this instance only; the raw ID cannot
    /// be recovered from the token.
    #[must_use]
    pub fn anonymize_user(&self, user_id: i64) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.inner.cold_salt);
        hasher.update(user_id.to_le_bytes());
        hex::encode(&hasher.finalize()[..8])
    }

    /// The instance's cold salt, read-only. Consumers outside this crate
    /// use it to derive instance-scoped secrets.
    #[must_use]
    pub fn cold_salt(&self) -> &[u8] {
        &self.inner.cold_salt
    }

    /// The highest item ID allocated so far.
    #[must_use]
    pub fn high_water_mark(&self) -> ItemId {
        self.inner.ids.high_water_mark()
    }
}

/// The cold salt is generated once per store and never rotated; tokens
/// derived from it stay stable across restarts.
fn load_or_create_cold_salt(kv: &KeyValueStore) -> RegistryResult<Vec<u8>> {
    if let Some(salt) = kv.get(COLD_SALT_KEY)? {
        return Ok(salt);
    }
    let salt: Vec<u8> = (0..COLD_SALT_LEN).map(|_| rand::random::<u8>()).collect();
    kv.put(COLD_SALT_KEY, &salt)?;
    Ok(salt)
}
