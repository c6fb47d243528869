//! End-to-end registry tests against fake collaborator ports.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use pretty_assertions::assert_eq;

use barite_model::{Group, Job, LimiterSpec, MatcherKind, Recipients, Rule};
use barite_storage::{EntityStore, KeyValueStore};
use barite_registry::{
    DispatcherPort, MatcherHandle, MatcherSpec, PortError, Ports, Registry, RegistryConfig,
    RegistryError, RenderContext, RenderError, Renderer, ScheduleHandle, ScheduledTask,
    SchedulerPort, SendPort,
};
use barite_types::{EventBody, InboundEvent, ItemKind, MessageMask, SendTarget, ROOT_GROUP};

// ── Fake ports ───────────────────────────────────────────────────

#[derive(Default)]
struct FakeDispatcher {
    next: AtomicU64,
    live: Mutex<HashMap<u64, MatcherSpec>>,
}

impl FakeDispatcher {
    fn live_count(&self) -> usize {
        self.live.lock().unwrap().len()
    }

    /// Runs matchers in priority order, honoring block-following.
    fn dispatch(&self, event: &InboundEvent) {
        let mut specs: Vec<(i32, bool, barite_registry::Predicate, barite_registry::EventHandler)> =
            self.live
                .lock()
                .unwrap()
                .values()
                .map(|s| {
                    (
                        s.priority,
                        s.block_following,
                        Arc::clone(&s.predicate),
                        Arc::clone(&s.handler),
                    )
                })
                .collect();
        specs.sort_by_key(|(priority, ..)| std::cmp::Reverse(*priority));
        for (_, block, predicate, handler) in specs {
            if predicate(event) {
                handler(event);
                if block {
                    break;
                }
            }
        }
    }
}

impl DispatcherPort for FakeDispatcher {
    fn register(&self, spec: MatcherSpec) -> Result<MatcherHandle, PortError> {
        let raw = self.next.fetch_add(1, Ordering::SeqCst) + 1;
        self.live.lock().unwrap().insert(raw, spec);
        Ok(MatcherHandle::from_raw(raw))
    }

    fn unregister(&self, handle: MatcherHandle) -> Result<(), PortError> {
        self.live
            .lock()
            .unwrap()
            .remove(&handle.into_raw())
            .map(|_| ())
            .ok_or_else(|| PortError("unknown matcher handle".to_string()))
    }
}

#[derive(Default)]
struct FakeScheduler {
    next: AtomicU64,
    live: Mutex<HashMap<u64, (String, ScheduledTask)>>,
}

impl FakeScheduler {
    fn live_count(&self) -> usize {
        self.live.lock().unwrap().len()
    }

    /// Fires every live task once, as a cron tick would.
    fn tick(&self) {
        // tasks may cancel themselves; do not hold the lock while running
        let tasks: Vec<ScheduledTask> = self
            .live
            .lock()
            .unwrap()
            .values()
            .map(|(_, task)| Arc::clone(task))
            .collect();
        for task in tasks {
            task();
        }
    }
}

impl SchedulerPort for FakeScheduler {
    fn schedule(&self, cron_spec: &str, task: ScheduledTask) -> Result<ScheduleHandle, PortError> {
        let raw = self.next.fetch_add(1, Ordering::SeqCst) + 1;
        self.live
            .lock()
            .unwrap()
            .insert(raw, (cron_spec.to_string(), task));
        Ok(ScheduleHandle::from_raw(raw))
    }

    fn cancel(&self, handle: ScheduleHandle) -> Result<(), PortError> {
        self.live
            .lock()
            .unwrap()
            .remove(&handle.into_raw())
            .map(|_| ())
            .ok_or_else(|| PortError("unknown schedule handle".to_string()))
    }
}

/// Renders templates verbatim; rejects sources containing "{{bad}}".
struct EchoRenderer;

impl Renderer for EchoRenderer {
    fn check(&self, source: &str) -> Result<(), RenderError> {
        if source.contains("{{bad}}") {
            Err(RenderError::Syntax("unknown token".to_string()))
        } else {
            Ok(())
        }
    }

    fn render(&self, source: &str, _context: &RenderContext) -> Result<String, RenderError> {
        Ok(source.to_string())
    }
}

#[derive(Default)]
struct RecordingSender {
    sent: Mutex<Vec<(SendTarget, String)>>,
}

impl SendPort for RecordingSender {
    fn send(&self, target: SendTarget, text: &str) {
        self.sent.lock().unwrap().push((target, text.to_string()));
    }
}

struct Fixture {
    registry: Registry,
    dispatcher: Arc<FakeDispatcher>,
    scheduler: Arc<FakeScheduler>,
    sender: Arc<RecordingSender>,
    dir: tempfile::TempDir,
}

fn open_fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    open_in(dir)
}

fn open_in(dir: tempfile::TempDir) -> Fixture {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    let dispatcher = Arc::new(FakeDispatcher::default());
    let scheduler = Arc::new(FakeScheduler::default());
    let sender = Arc::new(RecordingSender::default());
    let ports = Ports {
        dispatcher: dispatcher.clone(),
        scheduler: scheduler.clone(),
        renderer: Arc::new(EchoRenderer),
        sender: sender.clone(),
    };
    let registry = Registry::open(RegistryConfig::in_dir(dir.path()), ports).unwrap();
    Fixture {
        registry,
        dispatcher,
        scheduler,
        sender,
        dir,
    }
}

fn ping_rule(template: &str) -> Rule {
    Rule {
        display_name: "ping".into(),
        matcher_kind: MatcherKind::FullMatch,
        patterns: vec!["ping".into()],
        response_template: template.into(),
        ..Rule::default()
    }
}

fn group_message(text: &str) -> InboundEvent {
    InboundEvent {
        body: EventBody::Message {
            class: MessageMask::GROUP_NORMAL,
            text: text.into(),
            addressed: false,
        },
        group_id: 42,
        user_id: 7,
        raw: serde_json::Value::Null,
    }
}

// ── Rules ────────────────────────────────────────────────────────

#[test]
fn rule_lifecycle_keeps_one_live_matcher() {
    let fx = open_fixture();
    let id = fx.registry.create_rule(ROOT_GROUP, ping_rule("pong")).unwrap();
    assert_eq!(fx.dispatcher.live_count(), 1);

    // replace definition: never two live matchers for one rule
    let mut updated = ping_rule("pong!");
    updated.priority = 10;
    fx.registry.update_rule(id, updated).unwrap();
    assert_eq!(fx.dispatcher.live_count(), 1);

    // deactivate
    let mut inactive = ping_rule("pong!");
    inactive.active = false;
    fx.registry.update_rule(id, inactive).unwrap();
    assert_eq!(fx.dispatcher.live_count(), 0);

    // reactivate, then delete
    fx.registry.update_rule(id, ping_rule("pong")).unwrap();
    assert_eq!(fx.dispatcher.live_count(), 1);
    fx.registry.delete_rule(id).unwrap();
    assert_eq!(fx.dispatcher.live_count(), 0);
    assert!(fx.registry.get_rule(id).is_none());
}

#[test]
fn dispatched_match_renders_and_replies() {
    let fx = open_fixture();
    fx.registry.create_rule(ROOT_GROUP, ping_rule("pong")).unwrap();

    fx.dispatcher.dispatch(&group_message("ping"));
    fx.dispatcher.dispatch(&group_message("not ping"));

    let sent = fx.sender.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0], (SendTarget::Group(42), "pong".to_string()));
}

#[test]
fn invalid_rule_is_rejected_before_any_mutation() {
    let fx = open_fixture();
    let mut bad = ping_rule("pong");
    bad.matcher_kind = MatcherKind::Regex;
    bad.patterns = vec!["(".into()];
    assert!(matches!(
        fx.registry.create_rule(ROOT_GROUP, bad),
        Err(RegistryError::Validation(_))
    ));

    let mut bad_template = ping_rule("{{bad}}");
    bad_template.patterns = vec!["x".into()];
    assert!(matches!(
        fx.registry.create_rule(ROOT_GROUP, bad_template),
        Err(RegistryError::Validation(_))
    ));

    assert_eq!(fx.dispatcher.live_count(), 0);
    assert!(fx.registry.list_rules().is_empty());
    assert!(fx.registry.get_group(ROOT_GROUP).unwrap().items.is_empty());
}

#[test]
fn regex_rule_with_multiple_patterns_is_rejected() {
    let fx = open_fixture();
    let mut rule = ping_rule("pong");
    rule.matcher_kind = MatcherKind::Regex;
    rule.patterns = vec!["^a$".into(), "^b$".into()];
    assert!(matches!(
        fx.registry.create_rule(ROOT_GROUP, rule),
        Err(RegistryError::Validation(_))
    ));
    assert_eq!(fx.dispatcher.live_count(), 0);
    assert!(fx.registry.list_rules().is_empty());
}

#[test]
fn replies_are_whitespace_trimmed() {
    let fx = open_fixture();
    fx.registry
        .create_rule(ROOT_GROUP, ping_rule("  pong  \n"))
        .unwrap();
    fx.dispatcher.dispatch(&group_message("ping"));

    let sent = fx.sender.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].1, "pong");
}

#[test]
fn whitespace_only_reply_is_not_sent() {
    let fx = open_fixture();
    fx.registry
        .create_rule(ROOT_GROUP, ping_rule("  \n\t "))
        .unwrap();
    fx.dispatcher.dispatch(&group_message("ping"));
    assert!(fx.sender.sent.lock().unwrap().is_empty());
}

#[test]
fn rate_limited_rule_stops_replying_at_the_cap() {
    let fx = open_fixture();
    let mut rule = ping_rule("pong");
    rule.rate_limit = Some(LimiterSpec::Duration {
        duration_secs: 3600,
        max_usage: 2,
    });
    fx.registry.create_rule(ROOT_GROUP, rule).unwrap();

    for _ in 0..3 {
        fx.dispatcher.dispatch(&group_message("ping"));
    }
    assert_eq!(fx.sender.sent.lock().unwrap().len(), 2);
}

#[test]
fn blocking_rule_shadows_lower_priority() {
    let fx = open_fixture();
    let mut high = ping_rule("first");
    high.priority = 90;
    let mut low = ping_rule("second");
    low.priority = 10;
    fx.registry.create_rule(ROOT_GROUP, high).unwrap();
    fx.registry.create_rule(ROOT_GROUP, low).unwrap();

    fx.dispatcher.dispatch(&group_message("ping"));
    let sent = fx.sender.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].1, "first");
}

// ── Groups ───────────────────────────────────────────────────────

#[test]
fn root_group_cannot_be_deleted() {
    let fx = open_fixture();
    assert!(matches!(
        fx.registry.delete_group(ROOT_GROUP, ROOT_GROUP),
        Err(RegistryError::Forbidden(_))
    ));
}

#[test]
fn groups_cannot_nest() {
    let fx = open_fixture();
    let child = fx.registry.create_group("child", ROOT_GROUP).unwrap();
    assert!(matches!(
        fx.registry.create_group("grandchild", child),
        Err(RegistryError::Unsupported(_))
    ));
    assert!(matches!(
        fx.registry.move_item(ItemKind::Group, child, child),
        Err(RegistryError::Unsupported(_))
    ));
}

#[test]
fn delete_group_relocates_items_first() {
    let fx = open_fixture();
    let group = fx.registry.create_group("pack", ROOT_GROUP).unwrap();
    let rule_id = fx.registry.create_rule(group, ping_rule("pong")).unwrap();
    assert_eq!(fx.dispatcher.live_count(), 1);

    fx.registry.delete_group(group, ROOT_GROUP).unwrap();

    assert!(fx.registry.get_group(group).is_none());
    let rule = fx.registry.get_rule(rule_id).unwrap();
    assert_eq!(rule.parent_group, ROOT_GROUP);
    // the matcher never went down; moving is not re-registration
    assert_eq!(fx.dispatcher.live_count(), 1);
    let root = fx.registry.get_group(ROOT_GROUP).unwrap();
    assert!(root.position_of(ItemKind::Rule, rule_id).is_some());
    assert!(root.position_of(ItemKind::Group, group).is_none());
}

#[test]
fn delete_group_validates_target_before_mutating() {
    let fx = open_fixture();
    let group = fx.registry.create_group("pack", ROOT_GROUP).unwrap();
    let rule_id = fx.registry.create_rule(group, ping_rule("pong")).unwrap();

    assert!(matches!(
        fx.registry.delete_group(group, 9999),
        Err(RegistryError::NotFound(_))
    ));
    assert!(matches!(
        fx.registry.delete_group(group, group),
        Err(RegistryError::Validation(_))
    ));

    // nothing moved, nothing deleted
    assert!(fx.registry.get_group(group).is_some());
    assert_eq!(fx.registry.get_rule(rule_id).unwrap().parent_group, group);
}

#[test]
fn rename_group_syncs_parent_listing() {
    let fx = open_fixture();
    let group = fx.registry.create_group("old name", ROOT_GROUP).unwrap();
    fx.registry.rename_group(group, "new name").unwrap();

    assert_eq!(fx.registry.get_group(group).unwrap().display_name, "new name");
    let root = fx.registry.get_group(ROOT_GROUP).unwrap();
    let pos = root.position_of(ItemKind::Group, group).unwrap();
    assert_eq!(root.items[pos].display_name, "new name");
}

// ── Jobs ─────────────────────────────────────────────────────────

fn daily_job(template: &str, run_once: bool) -> Job {
    Job {
        display_name: "broadcast".into(),
        recipients: Recipients {
            users: vec![7],
            groups: vec![42],
        },
        run_once,
        cron_spec: "0 9 * * *".into(),
        action_template: template.into(),
        ..Job::default()
    }
}

#[test]
fn job_tick_broadcasts_to_all_recipients() {
    let fx = open_fixture();
    fx.registry.create_job(ROOT_GROUP, daily_job("news", false)).unwrap();
    fx.scheduler.tick();
    fx.scheduler.tick();

    let sent = fx.sender.sent.lock().unwrap();
    assert_eq!(sent.len(), 4);
    assert!(sent.contains(&(SendTarget::User(7), "news".to_string())));
    assert!(sent.contains(&(SendTarget::Group(42), "news".to_string())));
}

#[test]
fn one_shot_job_deletes_itself_after_firing() {
    let fx = open_fixture();
    let id = fx.registry.create_job(ROOT_GROUP, daily_job("once", true)).unwrap();
    assert_eq!(fx.scheduler.live_count(), 1);

    fx.scheduler.tick();

    assert_eq!(fx.sender.sent.lock().unwrap().len(), 2);
    assert!(fx.registry.get_job(id).is_none());
    assert_eq!(fx.scheduler.live_count(), 0);
    // a later tick sends nothing
    fx.scheduler.tick();
    assert_eq!(fx.sender.sent.lock().unwrap().len(), 2);
}

#[test]
fn job_broadcast_is_trimmed_and_blank_output_suppressed() {
    let fx = open_fixture();
    fx.registry
        .create_job(ROOT_GROUP, daily_job(" news \n", false))
        .unwrap();
    fx.registry
        .create_job(ROOT_GROUP, daily_job("   ", false))
        .unwrap();
    fx.scheduler.tick();

    let sent = fx.sender.sent.lock().unwrap();
    assert_eq!(sent.len(), 2);
    assert!(sent.iter().all(|(_, text)| text == "news"));
}

#[test]
fn bad_cron_rejected() {
    let fx = open_fixture();
    let mut job = daily_job("news", false);
    job.cron_spec = "not cron".into();
    assert!(matches!(
        fx.registry.create_job(ROOT_GROUP, job),
        Err(RegistryError::Validation(_))
    ));
    assert_eq!(fx.scheduler.live_count(), 0);
}

// ── Resources ────────────────────────────────────────────────────

#[test]
fn duplicate_upload_answers_with_existing_id() {
    let fx = open_fixture();
    let (id, created) = fx
        .registry
        .upload_resource(ROOT_GROUP, "photo.png", b"image bytes")
        .unwrap();
    assert!(created);

    let (again, created) = fx
        .registry
        .upload_resource(ROOT_GROUP, "other-name.png", b"image bytes")
        .unwrap();
    assert!(!created);
    assert_eq!(again, id);
    assert_eq!(fx.registry.list_resources().len(), 1);
    assert_eq!(fx.registry.read_resource(id).unwrap(), b"image bytes");
}

#[test]
fn deleted_resource_frees_its_digest() {
    let fx = open_fixture();
    let (id, _) = fx
        .registry
        .upload_resource(ROOT_GROUP, "photo.png", b"image bytes")
        .unwrap();
    let digest = fx.registry.get_resource(id).unwrap().sha256_sum;
    fx.registry.delete_resource(id).unwrap();

    assert_eq!(fx.registry.resource_by_hash(&digest).unwrap(), None);
    // same bytes upload again as a fresh record, reusing the blob
    let (new_id, created) = fx
        .registry
        .upload_resource(ROOT_GROUP, "photo.png", b"image bytes")
        .unwrap();
    assert!(created);
    assert_ne!(new_id, id);
}

#[test]
fn rename_resource_syncs_parent_listing() {
    let fx = open_fixture();
    let (id, _) = fx
        .registry
        .upload_resource(ROOT_GROUP, "photo.png", b"image bytes")
        .unwrap();
    fx.registry.rename_resource(id, "portrait.jpg").unwrap();

    let resource = fx.registry.get_resource(id).unwrap();
    assert_eq!(resource.file_name, "portrait");
    assert_eq!(resource.ext, ".jpg");
    let root = fx.registry.get_group(ROOT_GROUP).unwrap();
    let pos = root.position_of(ItemKind::Resource, id).unwrap();
    assert_eq!(root.items[pos].display_name, "portrait.jpg");
}

// ── Bundles ──────────────────────────────────────────────────────

#[test]
fn export_import_round_trip_allocates_fresh_ids() {
    let fx = open_fixture();
    let group = fx.registry.create_group("pack", ROOT_GROUP).unwrap();
    let rule_a = fx.registry.create_rule(group, ping_rule("pong")).unwrap();
    let mut keyword = ping_rule("there");
    keyword.display_name = "hi".into();
    keyword.matcher_kind = MatcherKind::Keyword;
    keyword.patterns = vec!["hi".into()];
    let rule_b = fx.registry.create_rule(group, keyword).unwrap();
    let (res_id, _) = fx
        .registry
        .upload_resource(group, "photo.png", b"image bytes")
        .unwrap();
    let digest = fx.registry.get_resource(res_id).unwrap().sha256_sum;

    let bytes = fx.registry.export_group(group, "pack-plugin", 3).unwrap();
    let imported = fx.registry.import_bundle(&bytes).unwrap();

    assert_ne!(imported, group);
    let new_group = fx.registry.get_group(imported).unwrap();
    assert_eq!(new_group.display_name, "pack");
    assert_eq!(new_group.parent_group, ROOT_GROUP);
    // the bundle carries the stamp the exporter asked for
    assert_eq!(new_group.plugin_name, "pack-plugin");
    assert_eq!(new_group.plugin_version, 3);
    assert_eq!(new_group.items.len(), 3);
    for item in &new_group.items {
        assert!(![rule_a, rule_b, res_id].contains(&item.item_id));
    }

    // imported resource carries the same digest and a readable blob
    let new_res = new_group
        .items
        .iter()
        .find(|i| i.kind == ItemKind::Resource)
        .unwrap();
    let resource = fx.registry.get_resource(new_res.item_id).unwrap();
    assert_eq!(resource.sha256_sum, digest);
    assert_eq!(
        fx.registry.read_resource(new_res.item_id).unwrap(),
        b"image bytes"
    );

    // both copies of each active rule are live
    assert_eq!(fx.dispatcher.live_count(), 4);
}

#[test]
fn tampered_bundle_is_rejected() {
    let fx = open_fixture();
    let group = fx.registry.create_group("pack", ROOT_GROUP).unwrap();
    fx.registry
        .upload_resource(group, "photo.png", b"image bytes")
        .unwrap();
    let mut bytes = fx.registry.export_group(group, "pack", 1).unwrap();
    // flip a byte somewhere in the compressed payload
    let mid = bytes.len() / 2;
    bytes[mid] ^= 0xff;
    assert!(fx.registry.import_bundle(&bytes).is_err());
}

#[test]
fn delete_tolerates_stale_group_listing() {
    let fx = open_fixture();
    let rule_id = fx.registry.create_rule(ROOT_GROUP, ping_rule("pong")).unwrap();

    let dir = fx.dir;
    drop(fx.registry);
    drop(fx.dispatcher);
    drop(fx.scheduler);
    drop(fx.sender);

    // desync store and listing: rewrite the root group without its items
    {
        let kv = KeyValueStore::open(&dir.path().join("registry.db")).unwrap();
        let groups: EntityStore<Group> = EntityStore::new(kv, b"groups-");
        groups.put(ROOT_GROUP, &Group::root()).unwrap();
    }

    let fx = open_in(dir);
    // removal from the listing is a no-op rather than an error
    fx.registry.delete_rule(rule_id).unwrap();
    assert!(fx.registry.get_rule(rule_id).is_none());
    assert_eq!(fx.dispatcher.live_count(), 0);
}

// ── Restart ──────────────────────────────────────────────────────

#[test]
fn reopen_restores_records_and_registrations() {
    let fx = open_fixture();
    let rule_id = fx.registry.create_rule(ROOT_GROUP, ping_rule("pong")).unwrap();
    let mut dormant = ping_rule("quiet");
    dormant.active = false;
    fx.registry.create_rule(ROOT_GROUP, dormant).unwrap();
    fx.registry.create_job(ROOT_GROUP, daily_job("news", false)).unwrap();
    let token = fx.registry.anonymize_user(7);

    let dir = fx.dir;
    drop(fx.registry);
    drop(fx.dispatcher);
    drop(fx.scheduler);
    drop(fx.sender);

    let fx = open_in(dir);
    assert_eq!(fx.registry.list_rules().len(), 2);
    assert_eq!(fx.dispatcher.live_count(), 1);
    assert_eq!(fx.scheduler.live_count(), 1);
    assert!(fx.registry.get_rule(rule_id).unwrap().active);

    // new items never collide with pre-restart IDs
    let new_id = fx.registry.create_rule(ROOT_GROUP, ping_rule("again")).unwrap();
    assert!(new_id > rule_id);

    // cold salt survives, so user tokens are stable
    assert_eq!(fx.registry.anonymize_user(7), token);
    assert_ne!(fx.registry.anonymize_user(8), token);
}
