//! Field usage cache.
//!
//! Maps a ticket field's id to the names of the forms that reference it,
//! for one selected instance. The map is built from the instance's forms on
//! first use and dropped when another instance is selected.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use parking_lot::RwLock;
use tracing::debug;

use deskmig_client::{Error as ClientError, HelpdeskClient};
use deskmig_proto::TicketForm;

#[derive(Debug, Default)]
struct UsageState {
    instance: Option<String>,
    usage: Option<HashMap<u64, BTreeSet<String>>>,
}

/// Cache statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageStats {
    /// Lookups answered from the populated map.
    pub hits: u64,
    /// Lookups that had to read forms first.
    pub misses: u64,
}

/// Lazily populated field id to form names map.
#[derive(Debug, Default)]
pub struct FieldUsageCache {
    state: RwLock<UsageState>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl FieldUsageCache {
    /// Create an empty cache with no instance selected.
    pub fn new() -> Self {
        Self::default()
    }

    /// Selected instance label.
    pub fn instance(&self) -> Option<String> {
        self.state.read().instance.clone()
    }

    /// Select an instance, dropping the map if it belonged to another one.
    pub fn select_instance(&self, label: &str) {
        let mut state = self.state.write();
        if state.instance.as_deref() != Some(label) {
            debug!(instance = label, "field usage cache invalidated");
            state.instance = Some(label.to_string());
            state.usage = None;
        }
    }

    /// Whether the map is built.
    pub fn is_populated(&self) -> bool {
        self.state.read().usage.is_some()
    }

    /// Build the map from the selected instance's forms.
    pub fn populate_from(&self, forms: &[TicketForm]) {
        let mut usage: HashMap<u64, BTreeSet<String>> = HashMap::new();
        for form in forms {
            for field_id in form.referenced_field_ids() {
                usage.entry(field_id).or_default().insert(form.name.clone());
            }
        }
        self.state.write().usage = Some(usage);
    }

    /// Forms of the selected instance that reference `field_id`, sorted by
    /// name. `None` until the map is built.
    pub fn cached_forms_using(&self, field_id: u64) -> Option<Vec<String>> {
        self.state.read().usage.as_ref().map(|usage| {
            usage
                .get(&field_id)
                .map(|names| names.iter().cloned().collect())
                .unwrap_or_default()
        })
    }

    /// Forms of `client`'s instance that reference `field_id`.
    ///
    /// Selects the client's instance and reads its forms on first use.
    pub async fn forms_using(
        &self,
        client: &HelpdeskClient,
        field_id: u64,
    ) -> Result<Vec<String>, ClientError> {
        self.select_instance(client.label());
        if let Some(names) = self.cached_forms_using(field_id) {
            self.hits.fetch_add(1, AtomicOrdering::Relaxed);
            return Ok(names);
        }

        self.misses.fetch_add(1, AtomicOrdering::Relaxed);
        let forms = client.reader().read_forms().await?;
        self.populate_from(&forms);
        Ok(self.cached_forms_using(field_id).unwrap_or_default())
    }

    /// Drop the map, keeping the selected instance.
    pub fn invalidate(&self) {
        self.state.write().usage = None;
    }

    /// Hit and miss counters.
    pub fn stats(&self) -> UsageStats {
        UsageStats {
            hits: self.hits.load(AtomicOrdering::Relaxed),
            misses: self.misses.load(AtomicOrdering::Relaxed),
        }
    }
}
