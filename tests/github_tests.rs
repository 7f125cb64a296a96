//! GitHub tracker tests against a local fake API server.
//!
//! Each test scripts the exact sequence of responses the server returns and
//! then inspects the requests the client made.

use std::io::Read;
use std::net::TcpListener;
use std::thread::{self, JoinHandle};

use failtrack::analysis::{self, AnalysisContext, GroupAction};
use failtrack::config::schema::TrackerConfig;
use failtrack::model::{IssueDraft, IssueState};
use failtrack::parser::ResultSource;
use failtrack::tracker::{GitHubTracker, IssueTracker};
use tiny_http::{Header, Response, Server};

const TOKEN: &str = "ghp_test_token_123";

#[derive(Debug)]
struct Recorded {
    method: String,
    url: String,
    authorization: Option<String>,
    accept: Option<String>,
    api_version: Option<String>,
    body: String,
}

/// Serve `responses` in order, one per request, then stop.
fn serve(responses: Vec<(u16, String)>) -> (String, JoinHandle<Vec<Recorded>>) {
    let server = Server::http("127.0.0.1:0").unwrap();
    let addr = server.server_addr().to_ip().unwrap();
    let handle = thread::spawn(move || {
        let mut seen = Vec::new();
        for (status, body) in responses {
            let Ok(mut request) = server.recv() else {
                break;
            };
            let mut content = String::new();
            request.as_reader().read_to_string(&mut content).unwrap();
            let header = |name: &'static str| {
                request
                    .headers()
                    .iter()
                    .find(|h| h.field.equiv(name))
                    .map(|h| h.value.as_str().to_string())
            };
            seen.push(Recorded {
                method: request.method().as_str().to_string(),
                url: request.url().to_string(),
                authorization: header("Authorization"),
                accept: header("Accept"),
                api_version: header("X-GitHub-Api-Version"),
                body: content,
            });
            let response = Response::from_string(body)
                .with_status_code(status)
                .with_header(
                    Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]).unwrap(),
                );
            request.respond(response).unwrap();
        }
        seen
    });
    (format!("http://{addr}"), handle)
}

fn config(api_url: &str) -> TrackerConfig {
    TrackerConfig {
        api_url: api_url.to_string(),
        owner: "acme".to_string(),
        repo: "web".to_string(),
        timeout_ms: 5000,
        max_retries: 2,
        retry_base_ms: 1,
        ..Default::default()
    }
}

fn tracker(api_url: &str) -> GitHubTracker {
    GitHubTracker::new(&config(api_url), TOKEN).unwrap()
}

fn draft() -> IssueDraft {
    IssueDraft {
        title: "Test Failure: Missing module 'foo' (3 tests)".to_string(),
        body: "Error Signature: `missing_module:foo`".to_string(),
        labels: ["automated-test-failure", "bug", "dependencies"]
            .into_iter()
            .map(String::from)
            .collect(),
    }
}

fn issue_json(number: u64, title: &str, body: &str) -> serde_json::Value {
    serde_json::json!({ "number": number, "title": title, "body": body, "state": "open" })
}

// ---------------------------------------------------------------------------
// Issue creation
// ---------------------------------------------------------------------------

#[test]
fn create_issue_posts_json_with_auth_headers() {
    let (url, server) = serve(vec![(201, r#"{"number": 42}"#.to_string())]);
    let mut tracker = tracker(&url);

    let number = tracker.create_issue(&draft()).unwrap();
    assert_eq!(number, 42);

    let seen = server.join().unwrap();
    assert_eq!(seen.len(), 1);
    let request = &seen[0];
    assert_eq!(request.method, "POST");
    assert_eq!(request.url, "/repos/acme/web/issues");
    assert_eq!(request.authorization.as_deref(), Some("Bearer ghp_test_token_123"));
    assert_eq!(request.accept.as_deref(), Some("application/vnd.github+json"));
    assert_eq!(request.api_version.as_deref(), Some("2022-11-28"));

    let payload: serde_json::Value = serde_json::from_str(&request.body).unwrap();
    assert_eq!(payload["title"], "Test Failure: Missing module 'foo' (3 tests)");
    assert_eq!(
        payload["labels"],
        serde_json::json!(["automated-test-failure", "bug", "dependencies"])
    );
}

#[test]
fn create_issue_requires_201() {
    let (url, server) = serve(vec![(200, r#"{"number": 7}"#.to_string())]);
    let mut tracker = tracker(&url);

    let err = tracker.create_issue(&draft()).unwrap_err();
    assert!(format!("{err:#}").contains("HTTP 200"), "{err:#}");
    assert_eq!(server.join().unwrap().len(), 1);
}

#[test]
fn transient_errors_are_retried() {
    let (url, server) = serve(vec![
        (500, "oops".to_string()),
        (429, r#"{"message": "rate limited"}"#.to_string()),
        (201, r#"{"number": 3}"#.to_string()),
    ]);
    let mut tracker = tracker(&url);

    assert_eq!(tracker.create_issue(&draft()).unwrap(), 3);
    let seen = server.join().unwrap();
    assert_eq!(seen.len(), 3);
    assert!(seen.iter().all(|r| r.url == "/repos/acme/web/issues"));
}

#[test]
fn gives_up_after_max_retries() {
    let (url, server) = serve(vec![
        (502, "bad gateway".to_string()),
        (502, "bad gateway".to_string()),
        (502, "bad gateway".to_string()),
    ]);
    let mut tracker = tracker(&url);

    let err = tracker.create_issue(&draft()).unwrap_err();
    let message = format!("{err:#}");
    assert!(message.contains("HTTP 502"), "{message}");
    assert!(message.contains("bad gateway"), "{message}");
    assert_eq!(server.join().unwrap().len(), 3);
}

#[test]
fn client_errors_fail_fast_without_leaking_token() {
    let body = format!(r#"{{"message": "Bad credentials for {TOKEN}"}}"#);
    let (url, server) = serve(vec![(401, body)]);
    let mut tracker = tracker(&url);

    let err = tracker.create_issue(&draft()).unwrap_err();
    let message = format!("{err:#}");
    assert!(message.contains("HTTP 401"), "{message}");
    assert!(message.contains("Bad credentials for ***"), "{message}");
    assert!(!message.contains(TOKEN));
    assert_eq!(server.join().unwrap().len(), 1);
}

#[test]
fn transport_failure_is_reported() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let mut cfg = config(&format!("http://127.0.0.1:{port}"));
    cfg.max_retries = 0;
    let tracker = GitHubTracker::new(&cfg, TOKEN).unwrap();

    let err = tracker.fetch_open_issues(&[]).unwrap_err();
    assert!(format!("{err:#}").contains("GitHub issue listing failed"));
}

// ---------------------------------------------------------------------------
// Listing and comments
// ---------------------------------------------------------------------------

#[test]
fn listing_paginates_and_skips_pull_requests() {
    let mut first_page: Vec<serde_json::Value> = (1..=100)
        .map(|n| issue_json(n, &format!("issue {n}"), ""))
        .collect();
    first_page[0]["pull_request"] = serde_json::json!({ "url": "https://example.invalid/pr/1" });
    let second_page: Vec<serde_json::Value> = (101..=103)
        .map(|n| issue_json(n, &format!("issue {n}"), ""))
        .collect();

    let (url, server) = serve(vec![
        (200, serde_json::to_string(&first_page).unwrap()),
        (200, serde_json::to_string(&second_page).unwrap()),
    ]);
    let tracker = tracker(&url);

    let issues = tracker
        .fetch_open_issues(&["automated-test-failure".to_string()])
        .unwrap();
    assert_eq!(issues.len(), 102);
    assert_eq!(issues[0].number, 2);
    assert_eq!(issues.last().unwrap().number, 103);
    assert!(issues.iter().all(|i| i.state == IssueState::Open));

    let seen = server.join().unwrap();
    assert_eq!(seen.len(), 2);
    for (request, page) in seen.iter().zip(["page=1", "page=2"]) {
        assert_eq!(request.method, "GET");
        assert!(request.url.starts_with("/repos/acme/web/issues?"), "{}", request.url);
        assert!(request.url.contains("state=open"));
        assert!(request.url.contains("per_page=100"));
        assert!(request.url.contains(page));
        assert!(request.url.contains("labels=automated-test-failure"));
    }
}

#[test]
fn malformed_listing_is_an_error() {
    let (url, server) = serve(vec![(200, "<html>not json</html>".to_string())]);
    let tracker = tracker(&url);

    let err = tracker.fetch_open_issues(&[]).unwrap_err();
    assert!(format!("{err:#}").contains("failed to parse GitHub issue listing"));
    server.join().unwrap();
}

#[test]
fn comment_posts_to_issue_comments() {
    let (url, server) = serve(vec![(201, r#"{"id": 1}"#.to_string())]);
    let mut tracker = tracker(&url);

    tracker.add_comment(17, "### Failure occurred again").unwrap();

    let seen = server.join().unwrap();
    assert_eq!(seen[0].method, "POST");
    assert_eq!(seen[0].url, "/repos/acme/web/issues/17/comments");
    let payload: serde_json::Value = serde_json::from_str(&seen[0].body).unwrap();
    assert_eq!(payload["body"], "### Failure occurred again");
}

#[test]
fn check_access_reads_repository() {
    let (url, server) = serve(vec![(200, r#"{"full_name": "acme/web"}"#.to_string())]);
    tracker(&url).check_access().unwrap();

    let seen = server.join().unwrap();
    assert_eq!(seen[0].method, "GET");
    assert_eq!(seen[0].url, "/repos/acme/web");
}

// ---------------------------------------------------------------------------
// End to end over HTTP
// ---------------------------------------------------------------------------

#[test]
fn analysis_comments_on_existing_issue_over_http() {
    let existing = vec![issue_json(
        9,
        "Test Failure: Missing module 'foo' (1 test)",
        "## Test Failure Report\n\nError Signature: `missing_module:foo`\n",
    )];
    let (url, server) = serve(vec![
        (200, serde_json::to_string(&existing).unwrap()),
        (201, r#"{"id": 100}"#.to_string()),
    ]);
    let mut tracker = tracker(&url);

    let source = ResultSource::Console(
        "FAIL src/app.test.js\n  ● loads foo\n\n    Cannot find module 'foo' from 'src/app.js'\n\n"
            .to_string(),
    );
    let outcome = analysis::analyze(Some(&source), &AnalysisContext::default(), &mut tracker);

    assert_eq!(outcome.groups.len(), 1);
    assert_eq!(outcome.groups[0].action, GroupAction::Commented(9));

    let seen = server.join().unwrap();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[1].url, "/repos/acme/web/issues/9/comments");
}
