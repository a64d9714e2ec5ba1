//! Schema diffing.
//!
//! Compares a source read against a target read and classifies every source
//! object as already present in the target (matched by natural key) or
//! missing. Numeric ids are never compared across instances.

use std::collections::{BTreeMap, BTreeSet};

use deskmig_proto::{EntityKind, FieldCategory, FieldDefinition, InstanceSchema, NaturalKey, TicketForm};

/// An object that can be matched across instances.
pub trait Reconcile: Clone {
    /// Instance-independent identity.
    fn natural_key(&self) -> NaturalKey;

    /// Id in the instance the object was read from.
    fn instance_id(&self) -> u64;

    /// Record the id of the matching object in the target.
    fn set_target_id(&mut self, target_id: u64);

    /// Whether the object may be created in a target. Built-in objects are
    /// only ever matched, never created.
    fn is_creatable(&self) -> bool;

    /// Whether the object takes part in matching at all.
    fn is_matchable(&self) -> bool {
        true
    }
}

impl Reconcile for FieldDefinition {
    fn natural_key(&self) -> NaturalKey {
        FieldDefinition::natural_key(self)
    }

    fn instance_id(&self) -> u64 {
        self.source_id
    }

    fn set_target_id(&mut self, target_id: u64) {
        self.target_id = Some(target_id);
    }

    fn is_creatable(&self) -> bool {
        !self.system
    }
}

impl Reconcile for TicketForm {
    fn natural_key(&self) -> NaturalKey {
        TicketForm::natural_key(self)
    }

    fn instance_id(&self) -> u64 {
        self.source_id
    }

    fn set_target_id(&mut self, target_id: u64) {
        self.target_id = Some(target_id);
    }

    fn is_creatable(&self) -> bool {
        !self.default
    }

    // Every instance has its own default form; the two are not the same object.
    fn is_matchable(&self) -> bool {
        !self.default
    }
}

/// Result of diffing one collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Diff<T> {
    /// Source natural key to target id, for every matched object.
    pub matched: BTreeMap<NaturalKey, u64>,
    /// Creatable source objects absent from the target, in source order.
    pub missing: Vec<T>,
    /// Every considered source object in source order, matched ones carrying
    /// their target id.
    pub entries: Vec<T>,
}

impl<T> Default for Diff<T> {
    fn default() -> Self {
        Self {
            matched: BTreeMap::new(),
            missing: Vec::new(),
            entries: Vec::new(),
        }
    }
}

/// Diff `source` against `target`.
///
/// When the target holds several objects with the same natural key, the one
/// with the lowest id is matched, so the result does not depend on read
/// order. A source key that appears more than once is considered once.
pub fn diff<T: Reconcile>(source: &[T], target: &[T]) -> Diff<T> {
    let mut index: BTreeMap<NaturalKey, u64> = BTreeMap::new();
    for object in target.iter().filter(|o| o.is_matchable()) {
        index
            .entry(object.natural_key())
            .and_modify(|id| *id = (*id).min(object.instance_id()))
            .or_insert(object.instance_id());
    }

    let mut result = Diff::default();
    let mut seen = BTreeSet::new();
    for object in source.iter().filter(|o| o.is_matchable()) {
        let key = object.natural_key();
        if !seen.insert(key.clone()) {
            continue;
        }

        match index.get(&key) {
            Some(&target_id) => {
                let mut present = object.clone();
                present.set_target_id(target_id);
                result.matched.insert(key, target_id);
                result.entries.push(present);
            }
            None if object.is_creatable() => {
                result.missing.push(object.clone());
                result.entries.push(object.clone());
            }
            None => {}
        }
    }
    result
}

/// Per-kind counts for the analysis summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindSummary {
    /// Entity kind.
    pub kind: EntityKind,
    /// Objects to create.
    pub new: usize,
    /// Objects already present in the target.
    pub existing: usize,
    /// Options carried by the objects to create.
    pub new_options: usize,
}

/// Diff of two complete instance reads.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaDiff {
    /// Field diffs per category.
    pub fields: BTreeMap<FieldCategory, Diff<FieldDefinition>>,
    /// Ticket form diff.
    pub forms: Diff<TicketForm>,
}

impl SchemaDiff {
    /// Compute the diff between a source and a target read.
    pub fn compute(source: &InstanceSchema, target: &InstanceSchema) -> Self {
        let fields = FieldCategory::ALL
            .into_iter()
            .map(|category| (category, diff(source.fields(category), target.fields(category))))
            .collect();

        SchemaDiff {
            fields,
            forms: diff(&source.forms, &target.forms),
        }
    }

    /// Diff of one field category.
    pub fn field_diff(&self, category: FieldCategory) -> Option<&Diff<FieldDefinition>> {
        self.fields.get(&category)
    }

    /// Fields to create, ticket then user then organization.
    pub fn missing_fields(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.fields.values().flat_map(|d| d.missing.iter())
    }

    /// Forms to create.
    pub fn missing_forms(&self) -> impl Iterator<Item = &TicketForm> {
        self.forms.missing.iter()
    }

    /// Check if there is nothing to create.
    pub fn is_empty(&self) -> bool {
        self.missing_fields().next().is_none() && self.forms.missing.is_empty()
    }

    /// Total number of objects to create.
    pub fn change_count(&self) -> usize {
        self.missing_fields().count() + self.forms.missing.len()
    }

    /// Counts per entity kind, in migration order.
    pub fn summary(&self) -> Vec<KindSummary> {
        let mut rows: Vec<KindSummary> = self
            .fields
            .iter()
            .map(|(category, diff)| KindSummary {
                kind: EntityKind::Field(*category),
                new: diff.missing.len(),
                existing: diff.entries.iter().filter(|f| f.target_id.is_some() && !f.system).count(),
                new_options: diff.missing.iter().map(|f| f.options.len()).sum(),
            })
            .collect();
        rows.push(KindSummary {
            kind: EntityKind::TicketForm,
            new: self.forms.missing.len(),
            existing: self.forms.matched.len(),
            new_options: 0,
        });
        rows
    }
}
