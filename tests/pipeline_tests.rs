//! End-to-end analysis tests.
//!
//! Drive the whole pipeline (parse, group, match, file) against the
//! in-memory tracker. HTTP behavior is covered in `github_tests.rs`.

use std::fs;
use std::path::PathBuf;

use failtrack::analysis::{self, AnalysisContext, GroupAction};
use failtrack::dedup;
use failtrack::grouping;
use failtrack::model::{BuildContext, FailureRecord, FailureStatus, IssueState, TrackingIssue};
use failtrack::parser::ResultSource;
use failtrack::tracker::MemoryTracker;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn assertion(name: &str, message: &str) -> serde_json::Value {
    serde_json::json!({
        "fullName": name,
        "title": name,
        "ancestorTitles": [],
        "status": "failed",
        "failureMessages": [message],
        "duration": 12.0
    })
}

/// Write a JSON report with the given failing assertions to a temp file.
fn write_report(name: &str, assertions: Vec<serde_json::Value>) -> PathBuf {
    let report = serde_json::json!({
        "numFailedTests": assertions.len(),
        "testResults": [
            {
                "name": "/ws/src/app.test.js",
                "status": "failed",
                "message": "",
                "assertionResults": assertions
            }
        ]
    });
    let path = std::env::temp_dir().join(format!(
        "failtrack-pipeline-{name}-{}.json",
        std::process::id()
    ));
    fs::write(&path, serde_json::to_string_pretty(&report).unwrap()).unwrap();
    path
}

/// 3 missing-module failures and 2 locator timeouts.
fn five_failures(name: &str) -> ResultSource {
    let timeout = "TypeoutError: waiting for locator timeout";
    let report = write_report(
        name,
        vec![
            assertion("loads widget", "Cannot find module 'foo'"),
            assertion("clicks submit", timeout),
            assertion("renders header", "Cannot find module 'foo'"),
            assertion("opens menu", timeout),
            assertion("saves draft", "Cannot find module 'foo'"),
        ],
    );
    ResultSource::JestReport(report)
}

fn context() -> AnalysisContext {
    AnalysisContext {
        build: BuildContext {
            branch: Some("main".to_string()),
            build_number: Some("128".to_string()),
            build_url: Some("https://ci.example.test/job/e2e/128/".to_string()),
            job_name: Some("e2e".to_string()),
            workspace: Some(PathBuf::from("/ws")),
        },
        ..Default::default()
    }
}

fn cleanup(source: &ResultSource) {
    if let ResultSource::JestReport(path) = source {
        let _ = fs::remove_file(path);
    }
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn five_failures_become_two_issues() {
    let source = five_failures("two-issues");
    let mut tracker = MemoryTracker::new();
    let outcome = analysis::analyze(Some(&source), &context(), &mut tracker);
    cleanup(&source);

    assert_eq!(outcome.source.as_deref(), Some("json-report"));
    assert_eq!(outcome.total_failures, 5);
    let shape: Vec<_> = outcome
        .groups
        .iter()
        .map(|g| (g.count, g.title.as_str()))
        .collect();
    assert_eq!(
        shape,
        vec![
            (3, "Test Failure: Missing module 'foo' (3 tests)"),
            (2, "Test Failure: Timeout errors (2 tests)"),
        ]
    );
    assert_eq!(outcome.created_issues(), vec![1, 2]);

    let created = tracker.created();
    assert_eq!(created.len(), 2);
    let (_, first) = &created[0];
    assert!(first.body.contains("Error Signature: `missing_module:foo`"));
    assert!(first.body.contains("`src/app.test.js`"));
    assert!(first.body.contains("- loads widget"));
    assert!(first.body.contains("[#128](https://ci.example.test/job/e2e/128/)"));
    assert!(first.labels.contains("automated-test-failure"));
    assert!(first.labels.contains("bug"));
}

#[test]
fn existing_signature_gets_a_comment_not_a_duplicate() {
    let report = write_report(
        "rerun",
        vec![
            assertion("loads widget", "Cannot find module 'foo'"),
            assertion("renders header", "Cannot find module 'foo' from 'src/header.js'"),
            assertion("saves draft", "Cannot find module 'foo'"),
        ],
    );
    let source = ResultSource::JestReport(report);
    let existing = TrackingIssue {
        number: 40,
        title: "Renamed by a human".to_string(),
        body: "## Test Failure Report\n\nError Signature: `missing_module:foo`\n".to_string(),
        state: IssueState::Open,
    };
    let mut tracker = MemoryTracker::with_issues(vec![existing]);

    let outcome = analysis::analyze(Some(&source), &context(), &mut tracker);
    cleanup(&source);

    assert_eq!(outcome.groups.len(), 1);
    assert!(outcome.created_issues().is_empty());
    assert_eq!(outcome.commented_issues(), vec![40]);
    assert!(tracker.created().is_empty());
    assert_eq!(tracker.comments().len(), 1);
    assert_eq!(tracker.comments()[0].issue, 40);
    assert!(tracker.comments()[0].body.contains("Error Signature: `missing_module:foo`"));
}

#[test]
fn second_run_matches_issues_filed_by_the_first() {
    let first = five_failures("first-run");
    let mut tracker = MemoryTracker::new();
    analysis::analyze(Some(&first), &context(), &mut tracker);
    cleanup(&first);
    assert_eq!(tracker.created().len(), 2);

    let second = five_failures("second-run");
    let outcome = analysis::analyze(Some(&second), &context(), &mut tracker);
    cleanup(&second);

    assert!(outcome.created_issues().is_empty());
    assert_eq!(outcome.commented_issues(), vec![1, 2]);
    assert_eq!(tracker.created().len(), 2);
    assert_eq!(tracker.comments().len(), 2);
}

#[test]
fn max_issues_one_processes_only_largest_group() {
    let report = write_report(
        "max-one",
        vec![
            assertion("a", "ReferenceError: window is not defined"),
            assertion("b", "Cannot find module 'foo'"),
            assertion("c", "Cannot find module 'foo'"),
            assertion("d", "Cannot find module 'foo'"),
            assertion("e", "connect ECONNREFUSED 127.0.0.1:3000"),
            assertion("f", "connect ECONNREFUSED 127.0.0.1:3000"),
        ],
    );
    let source = ResultSource::JestReport(report);
    let mut ctx = context();
    ctx.options.max_issues = 1;
    let mut tracker = MemoryTracker::new();
    let outcome = analysis::analyze(Some(&source), &ctx, &mut tracker);
    cleanup(&source);

    assert_eq!(outcome.groups.len(), 3);
    assert_eq!(outcome.groups[0].signature, "missing_module:foo");
    assert_eq!(outcome.groups[0].action, GroupAction::Created(1));
    assert_eq!(outcome.groups[1].action, GroupAction::Skipped);
    assert_eq!(outcome.groups[2].action, GroupAction::Skipped);
    assert_eq!(outcome.failed_count(), 0);
    assert_eq!(tracker.created().len(), 1);
}

#[test]
fn count_change_matches_by_title() {
    let source = five_failures("title-match");
    let legacy = TrackingIssue {
        number: 8,
        title: "Test Failure: Timeout errors (7 tests)".to_string(),
        body: "Filed by hand, no signature marker".to_string(),
        state: IssueState::Open,
    };
    let mut tracker = MemoryTracker::with_issues(vec![legacy]);
    let outcome = analysis::analyze(Some(&source), &context(), &mut tracker);
    cleanup(&source);

    assert_eq!(outcome.groups[0].action, GroupAction::Created(9));
    assert_eq!(outcome.groups[1].action, GroupAction::Commented(8));
}

#[test]
fn closed_issues_do_not_absorb_new_failures() {
    let source = five_failures("closed");
    let closed = TrackingIssue {
        number: 3,
        title: "Test Failure: Missing module 'foo' (3 tests)".to_string(),
        body: "Error Signature: `missing_module:foo`".to_string(),
        state: IssueState::Closed,
    };
    let mut tracker = MemoryTracker::with_issues(vec![closed]);
    let outcome = analysis::analyze(Some(&source), &context(), &mut tracker);
    cleanup(&source);

    assert_eq!(outcome.created_issues().len(), 2);
    assert!(tracker.comments().is_empty());
}

#[test]
fn tracker_errors_do_not_stop_the_batch() {
    let source = five_failures("comment-fails");
    let existing = TrackingIssue {
        number: 5,
        title: "Test Failure: Missing module 'foo' (1 test)".to_string(),
        body: "Error Signature: `missing_module:foo`".to_string(),
        state: IssueState::Open,
    };
    let mut tracker = MemoryTracker::with_issues(vec![existing]).failing_comment();
    let outcome = analysis::analyze(Some(&source), &context(), &mut tracker);
    cleanup(&source);

    assert!(matches!(outcome.groups[0].action, GroupAction::Failed(_)));
    assert_eq!(outcome.groups[1].action, GroupAction::Created(6));
}

#[test]
fn missing_or_malformed_input_is_a_noop() {
    let mut tracker = MemoryTracker::new();

    let missing = ResultSource::JestReport(PathBuf::from("/no/such/report.json"));
    let outcome = analysis::analyze(Some(&missing), &context(), &mut tracker);
    assert_eq!(outcome.total_failures, 0);
    assert!(outcome.groups.is_empty());

    let garbage = std::env::temp_dir().join(format!("failtrack-garbage-{}.json", std::process::id()));
    fs::write(&garbage, "{ not json").unwrap();
    let source = ResultSource::JestReport(garbage);
    let outcome = analysis::analyze(Some(&source), &context(), &mut tracker);
    cleanup(&source);
    assert!(outcome.groups.is_empty());

    let outcome = analysis::analyze(None, &context(), &mut tracker);
    assert!(outcome.groups.is_empty());
    assert_eq!(tracker.fetch_calls(), 0);
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

#[test]
fn grouping_is_a_stable_partition() {
    let messages = [
        "Cannot find module 'a'",
        "Timeout of 100ms exceeded",
        "Cannot find module 'b'",
        "Cannot find module 'a'",
        "Timeout of 250ms exceeded",
        "ReferenceError: x is not defined",
        "Cannot find module 'a'",
        "Timeout of 900ms exceeded",
    ];
    let records: Vec<FailureRecord> = messages
        .iter()
        .enumerate()
        .map(|(i, m)| FailureRecord::new(format!("t{i}"), "spec.js", *m, FailureStatus::Failed))
        .collect();

    let groups = grouping::group(records.clone());

    let sizes: Vec<usize> = groups.iter().map(|g| g.len()).collect();
    assert!(sizes.windows(2).all(|w| w[0] >= w[1]), "{sizes:?}");
    assert_eq!(sizes.iter().sum::<usize>(), records.len());

    for group in &groups {
        assert_eq!(group.representative_message(), group.records()[0].error_message());
        for record in group.records() {
            assert_eq!(record.error_signature(), group.signature());
        }
        // Input order is kept inside each group.
        let positions: Vec<usize> = group
            .records()
            .iter()
            .map(|r| records.iter().position(|o| o == r).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    // Ties keep first-seen order: module 'a' (3) and timeouts (3), then 'b', then x.
    let order: Vec<&str> = groups.iter().map(|g| g.signature()).collect();
    assert_eq!(
        order,
        vec![
            "missing_module:a",
            "timeout_error",
            "missing_module:b",
            "reference_error:x_not_defined",
        ]
    );
}

#[test]
fn title_suffix_counts_are_ignored_when_matching() {
    let issues = vec![TrackingIssue {
        number: 1,
        title: "Test Failure: X (3 tests)".to_string(),
        body: String::new(),
        state: IssueState::Open,
    }];
    let found = dedup::find_match(&issues, "some_signature", "Test Failure: X (7 tests)");
    assert_eq!(found.map(|i| i.number), Some(1));

    let found = dedup::find_match(&issues, "some_signature", "Test Failure: X (1 test)");
    assert_eq!(found.map(|i| i.number), Some(1));

    assert!(dedup::find_match(&issues, "some_signature", "Test Failure: Y (3 tests)").is_none());
}
