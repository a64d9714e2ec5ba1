//! Integration tests for analyze, import and rollback against in-memory
//! instances.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::broadcast;

use deskmig_client::{ApiRequest, ApiResponse, ExecutorConfig, HelpdeskClient, Method, MockHelpdesk};
use deskmig_core::migration::{
    KindCounts, MigrationConfig, MigrationExecutor, MigrationPlan, PlanSerializer, RunOutcome,
    SchemaDiff,
};
use deskmig_core::rollback::{RollbackConfig, RollbackEngine, RollbackLog, RollbackState};
use deskmig_core::MigrationError;
use deskmig_proto::{EntityKind, FieldCategory, FieldDefinition, FieldType};

const TICKET: EntityKind = EntityKind::Field(FieldCategory::Ticket);
const USER: EntityKind = EntityKind::Field(FieldCategory::User);

struct TestContext {
    source: Arc<MockHelpdesk>,
    target: Arc<MockHelpdesk>,
    dir: tempfile::TempDir,
}

impl TestContext {
    fn new() -> Self {
        Self {
            source: Arc::new(MockHelpdesk::new()),
            target: Arc::new(MockHelpdesk::new().with_next_id(501)),
            dir: tempfile::tempdir().unwrap(),
        }
    }

    fn client(mock: &Arc<MockHelpdesk>, label: &str) -> HelpdeskClient {
        HelpdeskClient::with_transport(label, mock.clone(), ExecutorConfig::without_delays())
    }

    fn source_client(&self) -> HelpdeskClient {
        Self::client(&self.source, "source")
    }

    fn target_client(&self) -> HelpdeskClient {
        Self::client(&self.target, "target")
    }

    fn plan_path(&self) -> PathBuf {
        self.dir.path().join("plan.csv")
    }

    fn log_path(&self) -> PathBuf {
        self.dir.path().join("rollback_log.csv")
    }

    /// Source with `priority_lvl` and a form using it.
    fn seed_priority_scenario(&self) -> u64 {
        let field_id = self.source.seed(
            TICKET,
            json!({
                "id": 40,
                "type": "tagger",
                "title": "Priority Level",
                "key": "priority_lvl",
                "custom_field_options": [
                    {"name": "High", "value": "p_high"},
                    {"name": "Low", "value": "p_low"}
                ]
            }),
        );
        self.source.seed(
            EntityKind::TicketForm,
            json!({"id": 7, "name": "Main Form", "ticket_field_ids": [field_id]}),
        );
        field_id
    }

    /// Analyze both instances and round-trip the plan through CSV.
    async fn analyze(&self) -> MigrationPlan {
        let source = self.source_client().read_schema().await.unwrap();
        let target = self.target_client().read_schema().await.unwrap();
        let plan = MigrationPlan::from_diff(&SchemaDiff::compute(&source, &target));
        PlanSerializer::write_path(&plan, self.plan_path()).unwrap();
        PlanSerializer::read_path(self.plan_path()).unwrap()
    }

    fn executor(&self, config: MigrationConfig) -> MigrationExecutor {
        let log = RollbackLog::open(self.log_path()).unwrap();
        MigrationExecutor::new(self.target_client(), log, config)
    }

    fn rollback_engine(&self, path: PathBuf) -> RollbackEngine {
        let log = RollbackLog::open(path).unwrap();
        RollbackEngine::new(self.target_client(), log, RollbackConfig::default())
    }
}

fn posts(requests: &[ApiRequest]) -> Vec<&ApiRequest> {
    requests.iter().filter(|r| r.method == Method::Post).collect()
}

#[tokio::test]
async fn test_field_created_before_form_with_remapped_reference() {
    let ctx = TestContext::new();
    let source_field = ctx.seed_priority_scenario();

    let plan = ctx.analyze().await;
    assert_eq!(plan.fields.len(), 1);
    assert_eq!(plan.fields[0].options.len(), 2);
    assert_eq!(plan.forms[0].field_ids, vec![source_field]);

    let mut executor = ctx.executor(MigrationConfig::default());
    let report = executor.run(&plan).await.unwrap();
    assert!(report.is_clean());

    let requests = ctx.target.requests();
    let creates = posts(&requests);
    assert_eq!(creates.len(), 2);
    assert_eq!(creates[0].path, "ticket_fields.json");
    assert_eq!(creates[1].path, "ticket_forms.json");
    let form_body: &Value = creates[1].body.as_ref().unwrap();
    assert_eq!(form_body["ticket_form"]["ticket_field_ids"], json!([501]));

    let field = ctx.target.object(TICKET, 501).unwrap();
    assert_eq!(field["custom_field_options"].as_array().map(Vec::len), Some(2));

    let entries = RollbackLog::read(ctx.log_path()).unwrap();
    let logged: Vec<(u64, EntityKind, u64)> = entries
        .iter()
        .map(|e| (e.sequence_no, e.entity_kind, e.target_id))
        .collect();
    assert_eq!(logged, vec![(1, TICKET, 501), (2, EntityKind::TicketForm, 502)]);

    assert_eq!(
        report.counts(TICKET),
        KindCounts {
            created: 1,
            options_created: 2,
            ..KindCounts::default()
        }
    );
    assert_eq!(report.counts(EntityKind::TicketForm).created, 1);
}

#[tokio::test]
async fn test_rollback_deletes_in_reverse_order() {
    let ctx = TestContext::new();
    ctx.seed_priority_scenario();
    let plan = ctx.analyze().await;
    ctx.executor(MigrationConfig::default()).run(&plan).await.unwrap();

    let mut engine = ctx.rollback_engine(ctx.log_path());
    engine.confirm("DELETE").unwrap();
    let report = engine.rollback().await.unwrap();

    let sequence: Vec<u64> = report.removed.iter().map(|e| e.sequence_no).collect();
    assert_eq!(sequence, vec![2, 1]);
    let deletes: Vec<String> = ctx
        .target
        .requests()
        .into_iter()
        .filter(|r| r.method == Method::Delete)
        .map(|r| r.path)
        .collect();
    assert_eq!(deletes, vec!["ticket_forms/502.json", "ticket_fields/501.json"]);

    assert!(ctx.target.objects(TICKET).is_empty());
    assert!(ctx.target.objects(EntityKind::TicketForm).is_empty());
    assert_eq!(engine.state(), RollbackState::Done);
    assert!(RollbackLog::read(ctx.log_path()).unwrap().is_empty());
}

#[tokio::test]
async fn test_second_rollback_pass_succeeds() {
    let ctx = TestContext::new();
    ctx.seed_priority_scenario();
    let plan = ctx.analyze().await;
    ctx.executor(MigrationConfig::default()).run(&plan).await.unwrap();

    let copy = ctx.dir.path().join("copy.csv");
    std::fs::copy(ctx.log_path(), &copy).unwrap();

    let mut first = ctx.rollback_engine(ctx.log_path());
    first.confirm("DELETE").unwrap();
    assert!(first.rollback().await.unwrap().is_complete());

    let mut second = ctx.rollback_engine(copy);
    second.confirm("DELETE").unwrap();
    let report = second.rollback().await.unwrap();
    assert!(report.is_complete());
    assert!(report.removed.is_empty());
    assert_eq!(report.already_absent.len(), 2);
    assert_eq!(second.state(), RollbackState::Done);
}

#[tokio::test]
async fn test_dangling_option_rejected_before_any_request() {
    let ctx = TestContext::new();
    ctx.seed_priority_scenario();
    let source = ctx.source_client().read_schema().await.unwrap();
    let target = ctx.target_client().read_schema().await.unwrap();
    let plan = MigrationPlan::from_diff(&SchemaDiff::compute(&source, &target));
    PlanSerializer::write_path(&plan, ctx.plan_path()).unwrap();
    let requests_before = ctx.target.requests().len();

    // Operator deletes the field row but forgets its options
    let text = std::fs::read_to_string(ctx.plan_path()).unwrap();
    let edited: Vec<&str> = text
        .lines()
        .filter(|line| !line.starts_with("field,"))
        .collect();
    std::fs::write(ctx.plan_path(), edited.join("\n")).unwrap();

    match PlanSerializer::read_path(ctx.plan_path()) {
        Err(MigrationError::DanglingOption { line, key, .. }) => {
            assert_eq!(line, 2);
            assert_eq!(key, "priority_lvl");
        }
        other => panic!("expected dangling option, got {:?}", other),
    }
    assert_eq!(ctx.target.requests().len(), requests_before);
}

#[tokio::test]
async fn test_rejected_field_skips_dependent_form() {
    let ctx = TestContext::new();
    ctx.seed_priority_scenario();
    ctx.source.seed(USER, json!({"type": "text", "title": "Tier", "key": "tier"}));
    ctx.target
        .reject_create(TICKET, "Priority Level", 403, r#"{"error":"Forbidden"}"#, 1);

    let plan = ctx.analyze().await;
    let report = ctx.executor(MigrationConfig::default()).run(&plan).await.unwrap();

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.counts(TICKET).failed, 1);
    assert_eq!(report.counts(USER).created, 1);
    assert_eq!(report.counts(EntityKind::TicketForm).skipped, 1);
    assert!(report.failures.iter().any(|f| f.skipped && f.name == "Main Form"));

    // The form was never submitted and only the user field is logged
    let requests = ctx.target.requests();
    assert!(posts(&requests).iter().all(|r| r.path != "ticket_forms.json"));
    let entries = RollbackLog::read(ctx.log_path()).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].entity_kind, USER);
}

#[tokio::test]
async fn test_existing_field_seeds_form_reference() {
    let ctx = TestContext::new();
    ctx.seed_priority_scenario();
    let existing = ctx.target.seed(
        TICKET,
        json!({"type": "tagger", "title": "Priority", "key": "priority_lvl"}),
    );

    let plan = ctx.analyze().await;
    assert_eq!(plan.fields[0].target_id, Some(existing));

    let report = ctx.executor(MigrationConfig::default()).run(&plan).await.unwrap();
    assert_eq!(report.counts(TICKET).existing, 1);
    assert_eq!(report.counts(TICKET).created, 0);

    let form = &ctx.target.objects(EntityKind::TicketForm)[0];
    assert_eq!(form["ticket_field_ids"], json!([existing]));
    assert_eq!(RollbackLog::read(ctx.log_path()).unwrap().len(), 1);
}

#[tokio::test]
async fn test_tag_collision_retried_with_suffix() {
    let ctx = TestContext::new();
    ctx.target.seed(
        TICKET,
        json!({"type": "checkbox", "title": "Customer VIP", "tag": "vip"}),
    );

    let mut field = FieldDefinition::new(
        FieldCategory::Ticket,
        12,
        FieldDefinition::derived_key("VIP", &FieldType::Checkbox),
        "VIP",
        FieldType::Checkbox,
    );
    field.tag = "vip".to_string();
    let plan = MigrationPlan::new().with_field(field);

    let report = ctx.executor(MigrationConfig::default()).run(&plan).await.unwrap();
    assert!(report.is_clean());
    assert_eq!(report.renames.len(), 1);
    assert_eq!(report.renames[0].to, "vip:checkbox_migrated");

    let tags: Vec<Value> = ctx
        .target
        .objects(TICKET)
        .iter()
        .map(|o| o["tag"].clone())
        .collect();
    assert_eq!(tags, vec![json!("vip"), json!("vip_migrated")]);
    assert_eq!(RollbackLog::read(ctx.log_path()).unwrap().len(), 1);
}

#[tokio::test]
async fn test_collision_reported_when_rename_disabled() {
    let ctx = TestContext::new();
    ctx.target.seed(USER, json!({"type": "text", "title": "Tier", "key": "tier"}));
    let field = FieldDefinition::new(FieldCategory::User, 3, "tier", "Tier", FieldType::Text);
    // Pretend the diff missed it, e.g. the target changed after analyze
    let plan = MigrationPlan::new().with_field(field);

    let report = ctx
        .executor(MigrationConfig::default().without_collision_rename())
        .run(&plan)
        .await
        .unwrap();
    assert_eq!(report.counts(USER).failed, 1);
    assert!(report.renames.is_empty());
    assert!(RollbackLog::read(ctx.log_path()).unwrap().is_empty());
}

#[tokio::test]
async fn test_shutdown_stops_between_entries() {
    let ctx = TestContext::new();
    ctx.seed_priority_scenario();
    let plan = ctx.analyze().await;
    let requests_before = ctx.target.requests().len();

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    shutdown_tx.send(()).unwrap();
    let report = ctx
        .executor(MigrationConfig::default())
        .run_until_shutdown(&plan, shutdown_rx)
        .await
        .unwrap();

    assert_eq!(report.outcome, RunOutcome::Cancelled);
    assert!(report.created.is_empty());
    assert_eq!(ctx.target.requests().len(), requests_before);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_interrupts_rate_limit_wait() {
    let ctx = TestContext::new();
    ctx.seed_priority_scenario();
    let plan = ctx.analyze().await;
    let requests_before = ctx.target.requests().len();

    // The first create is throttled for five minutes
    ctx.target
        .push_response(ApiResponse::rate_limited(Some(Duration::from_secs(300))));
    let client = HelpdeskClient::with_transport("target", ctx.target.clone(), ExecutorConfig::new());
    let log = RollbackLog::open(ctx.log_path()).unwrap();
    let mut executor = MigrationExecutor::new(client, log, MigrationConfig::default());

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(2)).await;
        let _ = shutdown_tx.send(());
    });

    let started = tokio::time::Instant::now();
    let report = executor.run_until_shutdown(&plan, shutdown_rx).await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(300));
    assert_eq!(report.outcome, RunOutcome::Cancelled);
    assert!(report.created.is_empty());
    assert!(report.failures.is_empty());
    assert_eq!(ctx.target.requests().len(), requests_before + 1);
    assert!(ctx.target.objects(TICKET).is_empty());
    assert!(RollbackLog::read(ctx.log_path()).unwrap().is_empty());
}

#[tokio::test]
async fn test_exhausted_retries_abort_run_and_keep_log_accurate() {
    let ctx = TestContext::new();
    ctx.seed_priority_scenario();
    ctx.source.seed(USER, json!({"type": "text", "title": "Tier", "key": "tier"}));
    let plan = ctx.analyze().await;

    // The ticket field goes through, every attempt at the user field times out
    ctx.target.push_response(ApiResponse::new(
        201,
        json!({"ticket_field": {"id": 501, "title": "Priority Level"}}).to_string(),
    ));
    for _ in 0..ExecutorConfig::without_delays().max_attempts {
        ctx.target.push_timeout();
    }
    let report = ctx.executor(MigrationConfig::default()).run(&plan).await.unwrap();

    assert!(matches!(report.outcome, RunOutcome::Aborted(_)));
    assert_eq!(report.counts(TICKET).created, 1);
    assert_eq!(report.counts(USER).failed, 1);
    assert_eq!(report.counts(EntityKind::TicketForm), KindCounts::default());

    let entries = RollbackLog::read(ctx.log_path()).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].target_id, 501);
}

#[tokio::test]
async fn test_rollback_refused_without_confirmation() {
    let ctx = TestContext::new();
    ctx.seed_priority_scenario();
    let plan = ctx.analyze().await;
    ctx.executor(MigrationConfig::default()).run(&plan).await.unwrap();

    let mut engine = ctx.rollback_engine(ctx.log_path());
    assert!(matches!(engine.confirm("yes"), Err(MigrationError::ConfirmationRejected)));
    assert!(matches!(engine.rollback().await, Err(MigrationError::NotConfirmed)));
    assert_eq!(ctx.target.request_count(Method::Delete), 0);
    assert_eq!(engine.pending().unwrap().len(), 2);
}

#[tokio::test]
async fn test_default_form_and_system_fields_are_not_created() {
    let ctx = TestContext::new();
    for mock in [&ctx.source, &ctx.target] {
        mock.seed(TICKET, json!({"type": "subject", "title": "Subject", "removable": false}));
    }
    let subject = ctx.source.objects(TICKET)[0]["id"].as_u64().unwrap();
    let notes = ctx.source.seed(TICKET, json!({"type": "textarea", "title": "Notes"}));
    ctx.source.seed(
        EntityKind::TicketForm,
        json!({"name": "Default Ticket Form", "default": true, "ticket_field_ids": [subject]}),
    );
    ctx.source.seed(
        EntityKind::TicketForm,
        json!({"name": "Support", "ticket_field_ids": [subject, notes]}),
    );

    let plan = ctx.analyze().await;
    let report = ctx.executor(MigrationConfig::default()).run(&plan).await.unwrap();
    assert!(report.is_clean());

    let forms = ctx.target.objects(EntityKind::TicketForm);
    assert_eq!(forms.len(), 1);
    assert_eq!(forms[0]["name"], "Support");
    let target_subject = ctx.target.objects(TICKET)[0]["id"].clone();
    assert_eq!(forms[0]["ticket_field_ids"][0], target_subject);
    assert_eq!(ctx.target.objects(TICKET).len(), 2);
}
