//! Property tests for plan serialization, matching, creation order and
//! rollback order.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use proptest::prelude::*;
use serde_json::json;

use deskmig_client::{ExecutorConfig, HelpdeskClient, Method, MockHelpdesk};
use deskmig_core::migration::{diff, CreationStep, MigrationPlan, PlanSerializer};
use deskmig_core::rollback::{RollbackConfig, RollbackEngine, RollbackLog};
use deskmig_proto::{
    ConditionAudience, ConditionChild, EntityKind, FieldCategory, FieldDefinition, FieldOption,
    FieldType, FormCondition, TicketForm,
};

fn category() -> impl Strategy<Value = FieldCategory> {
    prop::sample::select(FieldCategory::ALL.to_vec())
}

fn field_type() -> impl Strategy<Value = FieldType> {
    prop_oneof![
        prop::sample::select(vec![
            FieldType::Text,
            FieldType::Textarea,
            FieldType::Integer,
            FieldType::Decimal,
            FieldType::Date,
            FieldType::Checkbox,
            FieldType::Regexp,
            FieldType::Tagger,
            FieldType::Dropdown,
            FieldType::Multiselect,
            FieldType::Lookup,
        ]),
        "x_[a-z]{1,8}".prop_map(FieldType::Unknown),
    ]
}

/// Free text including the characters CSV has to quote.
fn text() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 ,;|\"'_\n-]{0,12}"
}

fn option() -> impl Strategy<Value = FieldOption> {
    (text(), text(), any::<i64>(), any::<bool>(), any::<bool>()).prop_map(
        |(value, name, position, active, default)| FieldOption {
            value,
            name,
            position,
            active,
            default,
        },
    )
}

fn field(keys: &'static str) -> impl Strategy<Value = FieldDefinition> {
    (
        (category(), any::<u64>(), proptest::option::of(any::<u64>()), keys, text(), field_type()),
        (any::<bool>(), any::<bool>(), any::<i64>(), text(), text(), text()),
        (text(), text(), any::<[bool; 3]>()),
        (prop::collection::vec(option(), 0..4), any::<bool>()),
    )
        .prop_map(
            |(
                (category, source_id, target_id, key, title, field_type),
                (required, active, position, description, tag, pattern),
                (title_in_portal, agent_description, portal),
                (options, system),
            )| {
                let mut field = FieldDefinition::new(category, source_id, key, title, field_type)
                    .with_required(required);
                field.target_id = target_id;
                field.active = active;
                field.position = position;
                field.description = description;
                field.tag = tag;
                field.regexp_for_validation = pattern;
                field.portal.title_in_portal = title_in_portal;
                field.portal.agent_description = agent_description;
                field.portal.visible_in_portal = portal[0];
                field.portal.editable_in_portal = portal[1];
                field.portal.required_in_portal = portal[2];
                field.options = options;
                field.system = system;
                field
            },
        )
}

fn condition() -> impl Strategy<Value = FormCondition> {
    (
        any::<bool>(),
        any::<u64>(),
        text(),
        prop::collection::vec((any::<u64>(), any::<bool>()), 0..3),
    )
        .prop_map(|(agent, parent_field_id, value, children)| FormCondition {
            audience: if agent {
                ConditionAudience::Agent
            } else {
                ConditionAudience::EndUser
            },
            parent_field_id,
            value: json!(value),
            child_fields: children
                .into_iter()
                .map(|(id, is_required)| ConditionChild {
                    id,
                    is_required,
                    required_on_statuses: None,
                })
                .collect(),
        })
}

fn form() -> impl Strategy<Value = TicketForm> {
    (
        (any::<u64>(), proptest::option::of(any::<u64>()), "[A-Za-z][A-Za-z0-9 ]{0,10}", text()),
        (any::<[bool; 3]>(), any::<i64>()),
        prop::collection::vec(any::<u64>(), 0..5),
        prop::collection::vec(condition(), 0..3),
    )
        .prop_map(
            |((source_id, target_id, name, display_name), (flags, position), field_ids, conditions)| {
                let mut form = TicketForm::new(source_id, name, field_ids);
                form.target_id = target_id;
                form.display_name = display_name;
                form.active = flags[0];
                form.end_user_visible = flags[1];
                form.default = flags[2];
                form.position = position;
                form.conditions = conditions;
                form
            },
        )
}

/// Plans as the reader accepts them: keys unique within a category, form
/// names unique ignoring case.
fn plan() -> impl Strategy<Value = MigrationPlan> {
    (
        prop::collection::vec(field("[a-z_]{1,8} ?"), 0..6),
        prop::collection::vec(form(), 0..4),
    )
        .prop_map(|(fields, forms)| {
            let mut keys = HashSet::new();
            let mut names = HashSet::new();
            MigrationPlan {
                fields: fields
                    .into_iter()
                    .filter(|f| keys.insert((f.category, f.key.trim().to_string())))
                    .collect(),
                forms: forms
                    .into_iter()
                    .filter(|f| names.insert(f.name.trim().to_lowercase()))
                    .collect(),
            }
        })
}

fn missing_keys(fields: &[FieldDefinition]) -> BTreeSet<String> {
    fields.iter().map(|f| format!("{:?}", f.natural_key())).collect()
}

proptest! {
    #[test]
    fn prop_plan_survives_csv_round_trip(plan in plan()) {
        let mut out = Vec::new();
        PlanSerializer::write(&plan, &mut out).unwrap();
        let read = PlanSerializer::read(out.as_slice()).unwrap();
        prop_assert_eq!(read, plan);
    }

    #[test]
    fn prop_forms_created_after_every_field(plan in plan()) {
        let steps = plan.creation_plan().steps;
        let first_form = steps
            .iter()
            .position(|s| matches!(s, CreationStep::Form(_)))
            .unwrap_or(steps.len());
        prop_assert!(steps[first_form..].iter().all(|s| matches!(s, CreationStep::Form(_))));

        let expected = plan
            .fields
            .iter()
            .filter(|f| f.target_id.is_none() && !f.system)
            .count();
        prop_assert_eq!(first_form, expected);
    }

    #[test]
    fn prop_matching_ignores_read_order(
        (source, shuffled_source) in prop::collection::vec(field("[a-c]{1,2}"), 0..8)
            .prop_flat_map(|v| (Just(v.clone()), Just(v).prop_shuffle())),
        (target, shuffled_target) in prop::collection::vec(field("[a-c]{1,2}"), 0..8)
            .prop_flat_map(|v| (Just(v.clone()), Just(v).prop_shuffle())),
    ) {
        let baseline = diff(&source, &target);
        prop_assert_eq!(&diff(&source, &shuffled_target), &baseline);

        let reordered = diff(&shuffled_source, &target);
        prop_assert_eq!(&reordered.matched, &baseline.matched);
        prop_assert_eq!(missing_keys(&reordered.missing), missing_keys(&baseline.missing));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_rollback_deletes_newest_first(
        kinds in prop::collection::vec(prop::sample::select(EntityKind::ALL.to_vec()), 1..12),
        removed in prop::collection::vec(any::<bool>(), 12),
    ) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rollback_log.csv");

        let mut log = RollbackLog::open(&path).unwrap();
        let mut expected = Vec::new();
        for (idx, kind) in kinds.iter().enumerate() {
            let entry = log.append_created(*kind, 100 + idx as u64, "object").unwrap();
            if removed[idx] {
                log.append_removed(&entry).unwrap();
            } else {
                expected.push(entry.target_id);
            }
        }
        expected.reverse();

        let target = Arc::new(MockHelpdesk::new());
        let client =
            HelpdeskClient::with_transport("target", target.clone(), ExecutorConfig::without_delays());
        let mut engine = RollbackEngine::new(client, log, RollbackConfig::default());
        engine.confirm("DELETE").unwrap();

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let report = runtime.block_on(engine.rollback()).unwrap();

        // Nothing exists in the target, so every delete is a 404.
        prop_assert!(report.is_complete());
        let order: Vec<u64> = report.already_absent.iter().map(|e| e.target_id).collect();
        prop_assert_eq!(&order, &expected);

        let deleted: Vec<u64> = target
            .requests()
            .into_iter()
            .filter(|r| r.method == Method::Delete)
            .filter_map(|r| {
                r.path
                    .rsplit('/')
                    .next()
                    .and_then(|last| last.trim_end_matches(".json").parse().ok())
            })
            .collect();
        prop_assert_eq!(deleted, expected);
    }
}
