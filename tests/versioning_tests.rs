//! Integration tests for commit tracking, branching, diffing and merging.
//!
//! Every test works against a scratch project root holding a Todo2 task store
//! and a commit log.

use serde_json::{Value, json};
use task_versioning::commits::CommitTracker;
use task_versioning::store::{JsonTaskStore, TaskStore};
use task_versioning::types::{Branch, TaskState};
use tempfile::TempDir;

/// Helper to create a project root with the given task store contents.
fn setup_project(todos: Value) -> (TempDir, JsonTaskStore, CommitTracker) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let store = JsonTaskStore::for_project(dir.path());
    std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
    std::fs::write(
        store.path(),
        serde_json::to_string_pretty(&json!({ "todos": todos })).unwrap(),
    )
    .unwrap();
    let tracker = CommitTracker::for_project(dir.path());
    (dir, store, tracker)
}

fn state(value: Value) -> TaskState {
    serde_json::from_value(value).unwrap()
}

fn named(name: &str) -> Branch {
    Branch::Named(name.to_string())
}

mod commit_log_tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use chrono::{Duration, TimeZone, Utc};
    use task_versioning::error::VersioningError;
    use task_versioning::types::Commit;

    #[test]
    fn round_trip_preserves_order_and_fields() {
        let (dir, _, tracker) = setup_project(json!([]));
        let base = Utc.with_ymd_and_hms(2025, 1, 26, 10, 0, 0).unwrap();

        let mut written = Vec::new();
        for i in 0..5 {
            let commit = Commit::new(
                &format!("T-{}", i % 2),
                format!("Update task: {}", i),
                state(json!({"id": format!("T-{}", i % 2), "n": i})),
                state(json!({"id": format!("T-{}", i % 2), "n": i + 1, "tags": ["a", "b"]})),
                Some("tester"),
                if i % 2 == 0 { Branch::Main } else { named("feature-x") },
            )
            .unwrap()
            .with_timestamp(base + Duration::microseconds(1_500_000 * i));
            written.push(tracker.append(commit).unwrap());
        }

        let reopened = CommitTracker::for_project(dir.path());
        assert_eq!(reopened.all_commits().unwrap(), written);
    }

    #[test]
    fn log_file_format() {
        let (dir, _, tracker) = setup_project(json!([]));
        tracker
            .track_create(
                "T-1",
                state(json!({"id": "T-1", "name": "Login"})),
                None,
                &named("feature-x"),
            )
            .unwrap();

        let raw: Value = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join(".todo2/commits.json")).unwrap(),
        )
        .unwrap();
        let record = &raw["commits"][0];

        assert_eq!(record["task_id"], json!("T-1"));
        assert_eq!(record["message"], json!("Create task: Login"));
        assert_eq!(record["old_state"], json!({}));
        assert_eq!(record["author"], json!("system"));
        assert_eq!(record["branch"], json!("feature-x"));
        assert!(record["timestamp"].as_str().unwrap().ends_with('Z'));
    }

    #[test]
    fn corrupted_log_fails_loudly_and_survives() {
        let (dir, _, tracker) = setup_project(json!([]));
        let log = dir.path().join(".todo2/commits.json");
        std::fs::write(&log, "{\"commits\": [").unwrap();

        assert!(matches!(
            tracker.commits_for_task("T-1"),
            Err(VersioningError::Corrupted { .. })
        ));
        let create = tracker.track_create("T-1", state(json!({"id": "T-1"})), None, &Branch::Main);
        assert!(create.is_err());
        assert_eq!(std::fs::read_to_string(&log).unwrap(), "{\"commits\": [");
    }

    #[test]
    fn time_travel() {
        let (_dir, _, tracker) = setup_project(json!([]));
        let t0 = Utc.with_ymd_and_hms(2025, 1, 26, 10, 0, 0).unwrap();
        let created = Commit::new(
            "T-1",
            "Create task: T-1",
            TaskState::new(),
            state(json!({"id": "T-1", "status": "todo"})),
            None,
            Branch::Main,
        )
        .unwrap()
        .with_timestamp(t0);
        let updated = Commit::new(
            "T-1",
            "Update task: T-1",
            state(json!({"id": "T-1", "status": "todo"})),
            state(json!({"id": "T-1", "status": "done"})),
            None,
            Branch::Main,
        )
        .unwrap()
        .with_timestamp(t0 + Duration::hours(2));
        tracker.append_batch(vec![created, updated]).unwrap();

        assert_eq!(tracker.state_at_time("T-1", t0 - Duration::seconds(1)).unwrap(), None);
        assert_eq!(
            tracker.state_at_time("T-1", t0).unwrap().unwrap()["status"],
            json!("todo")
        );
        assert_eq!(
            tracker.state_at_time("T-1", t0 + Duration::hours(1)).unwrap().unwrap()["status"],
            json!("todo")
        );
        assert_eq!(
            tracker.state_at_time("T-1", t0 + Duration::hours(3)).unwrap().unwrap()["status"],
            json!("done")
        );
    }
}

mod scenario_tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use task_versioning::branch::{all_branches, filter_by_branch};
    use task_versioning::diff::{compare_versions, diff_states};
    use task_versioning::types::Task;

    #[test]
    fn create_then_complete_on_feature_branch() {
        let (_dir, _, tracker) = setup_project(json!([]));
        let feature = named("feature-x");

        let first = tracker
            .track_create("T-1", state(json!({"status": "todo"})), None, &feature)
            .unwrap();
        let second = tracker
            .track_update(
                "T-1",
                state(json!({"status": "todo"})),
                state(json!({"status": "done"})),
                None,
                &feature,
            )
            .unwrap();

        assert_eq!(first.new_state, state(json!({"status": "todo"})));
        assert_eq!(second.old_state["status"], json!("todo"));
        assert_eq!(second.new_state["status"], json!("done"));

        let commits = tracker.commits_for_task("T-1").unwrap();
        assert_eq!(commits, vec![first.clone(), second.clone()]);

        let diff = diff_states(&first.new_state, &second.new_state);
        assert_eq!(diff.changed["status"].old, json!("todo"));
        assert_eq!(diff.changed["status"].new, json!("done"));
        assert!(diff.added.is_empty());
        assert!(diff.removed.is_empty());

        let comparison = compare_versions(&tracker, "T-1", None, None).unwrap().unwrap();
        assert_eq!(comparison.diff, diff);
        assert_eq!(tracker.commits_for_branch(&feature).unwrap().len(), 2);
    }

    #[test]
    fn branches_from_task_store() {
        let (_dir, store, _) = setup_project(json!([
            {"id": "T-1", "tags": ["branch:feature-auth"]},
            {"id": "T-2", "tags": []}
        ]));
        let tasks: Vec<Task> = store.load_tasks().unwrap();

        let branches: Vec<Branch> = all_branches(&tasks).into_iter().collect();
        assert_eq!(branches, vec![Branch::Main, named("feature-auth")]);

        let main: Vec<&str> = filter_by_branch(&tasks, &Branch::Main)
            .iter()
            .map(|t| t.id.as_str())
            .collect();
        assert_eq!(main, vec!["T-2"]);
    }

    #[test]
    fn status_change_and_delete_helpers() {
        let (_dir, _, tracker) = setup_project(json!([]));
        let task = state(json!({"id": "T-1", "name": "Login", "status": "todo"}));

        let change = tracker
            .track_status_change("T-1", "todo", "in_progress", &task, Some("ana"), &Branch::Main)
            .unwrap();
        let delete = tracker
            .track_delete("T-1", change.new_state.clone(), None, &Branch::Main)
            .unwrap();

        assert_eq!(change.message, "Change status: todo → in_progress");
        assert_eq!(change.new_state["status"], json!("in_progress"));
        assert_eq!(delete.message, "Delete task: Login");
        assert!(delete.new_state.is_empty());
        assert_eq!(tracker.latest_commit_for_task("T-1").unwrap(), Some(delete));
    }
}

mod merge_tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use task_versioning::merge::{MergeOptions, MergeStrategy, merge_branches, preview_merge};
    use task_versioning::store::{branch_tasks, set_task_branch};

    fn feature_project() -> (TempDir, JsonTaskStore, CommitTracker) {
        setup_project(json!([
            {"id": "task-1", "name": "Task 1", "tags": ["branch:feature-auth"], "status": "done"},
            {"id": "task-2", "name": "Task 2", "tags": [], "status": "todo"},
            {"id": "task-3", "name": "Task 3", "tags": ["branch:feature-auth", "ui"], "status": "done",
             "lastModified": "2025-01-26T09:00:00"},
            {"id": "task-3", "name": "Task 3", "tags": ["ui"], "status": "review",
             "lastModified": "2025-01-26T10:00:00"}
        ]))
    }

    #[test]
    fn preview_reports_without_writing() {
        let (_dir, store, tracker) = feature_project();
        let before = std::fs::read_to_string(store.path()).unwrap();

        let plan = preview_merge(&store, &named("feature-auth"), &Branch::Main).unwrap();

        assert_eq!(plan.would_merge.len(), 1);
        assert_eq!(plan.would_merge[0].task_id, "task-1");
        assert_eq!(plan.conflicts.len(), 1);
        assert_eq!(plan.conflicts[0].task_id, "task-3");
        assert_eq!(
            plan.conflicts[0].conflict_fields,
            vec!["lastModified".to_string(), "status".to_string()]
        );
        assert_eq!(std::fs::read_to_string(store.path()).unwrap(), before);
        assert!(tracker.all_commits().unwrap().is_empty());
    }

    #[test]
    fn apply_newer_keeps_newer_target() {
        let (_dir, store, tracker) = feature_project();

        let outcome = merge_branches(
            &store,
            &tracker,
            &named("feature-auth"),
            &Branch::Main,
            &MergeOptions::default(),
        )
        .unwrap();

        assert_eq!(outcome.strategy, MergeStrategy::Newer);
        assert_eq!(outcome.merged, 1);
        assert_eq!(outcome.resolved.len(), 1);
        // task-3 kept its target values, so only the move of task-1 is recorded
        assert_eq!(outcome.commits.len(), 1);

        let main = branch_tasks(&store, &Branch::Main).unwrap();
        assert_eq!(main.len(), 3);
        let task3 = main.iter().find(|t| t.id == "task-3").unwrap();
        assert_eq!(task3.status.as_deref(), Some("review"));
        assert!(branch_tasks(&store, &named("feature-auth")).unwrap().is_empty());

        let raw: Value =
            serde_json::from_str(&std::fs::read_to_string(store.path()).unwrap()).unwrap();
        let moved = raw["todos"]
            .as_array()
            .unwrap()
            .iter()
            .find(|t| t["id"] == json!("task-1"))
            .unwrap();
        assert_eq!(moved["tags"], json!([]));

        let logged = tracker.all_commits().unwrap();
        assert_eq!(logged, outcome.commits);
        assert!(logged.iter().all(|c| c.branch == Branch::Main));
    }

    #[test]
    fn apply_source_overwrites_target() {
        let (_dir, store, tracker) = feature_project();

        let outcome = merge_branches(
            &store,
            &tracker,
            &named("feature-auth"),
            &Branch::Main,
            &MergeOptions {
                strategy: MergeStrategy::Source,
                ..MergeOptions::default()
            },
        )
        .unwrap();

        assert_eq!(outcome.commits.len(), 2);
        let resolved = &outcome.commits[1];
        assert_eq!(resolved.task_id, "task-3");
        assert_eq!(resolved.old_state["status"], json!("review"));
        assert_eq!(resolved.new_state["status"], json!("done"));

        let main = branch_tasks(&store, &Branch::Main).unwrap();
        let task3 = main.iter().find(|t| t.id == "task-3").unwrap();
        assert_eq!(task3.status.as_deref(), Some("done"));
        assert_eq!(task3.tags, Some(vec!["ui".to_string()]));
    }

    #[test]
    fn merge_into_named_branch() {
        let (_dir, store, tracker) = feature_project();
        let release = named("release");
        set_task_branch(&store, &tracker, "task-2", &release, None)
            .unwrap()
            .unwrap();

        let outcome = merge_branches(
            &store,
            &tracker,
            &named("feature-auth"),
            &release,
            &MergeOptions::default(),
        )
        .unwrap();

        assert_eq!(outcome.merged, 2);
        assert!(outcome.plan.conflicts.is_empty());
        let on_release: Vec<String> = branch_tasks(&store, &release)
            .unwrap()
            .into_iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(on_release, vec!["task-1", "task-2", "task-3"]);
    }
}

mod concurrency_tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn concurrent_appends_lose_nothing() {
        let (_dir, _, tracker) = setup_project(json!([]));
        let tracker = Arc::new(tracker);

        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let tracker = Arc::clone(&tracker);
                thread::spawn(move || {
                    for i in 0..10 {
                        let id = format!("W{}-{}", worker, i);
                        tracker
                            .track_create(&id, state(json!({"id": id})), None, &Branch::Main)
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(tracker.all_commits().unwrap().len(), 80);
    }

    #[test]
    fn separate_trackers_share_the_file_lock() {
        let (dir, _, _) = setup_project(json!([]));
        let root = dir.path().to_path_buf();

        let handles: Vec<_> = (0..4)
            .map(|worker| {
                let root = root.clone();
                thread::spawn(move || {
                    let tracker = CommitTracker::for_project(&root);
                    for i in 0..10 {
                        let id = format!("P{}-{}", worker, i);
                        tracker
                            .track_create(&id, state(json!({"id": id})), None, &Branch::Main)
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let tracker = CommitTracker::for_project(&root);
        assert_eq!(tracker.all_commits().unwrap().len(), 40);
    }
}
