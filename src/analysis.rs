//! The analysis pass: collect → group → cap → match → comment or create.
//!
//! One call to [`analyze`] handles one CI run. Open issues are fetched once
//! up front; issues created during the run are appended to that local list
//! so later groups can match them.

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::FailtrackConfig;
use crate::config::schema::ReportConfig;
use crate::dedup;
use crate::grouping;
use crate::issue;
use crate::model::{BuildContext, FailureGroup, IssueState, TrackingIssue};
use crate::parser::{self, ResultSource};
use crate::tracker::IssueTracker;

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// Settings that shape a run.
#[derive(Debug, Clone)]
pub struct AnalysisOptions {
    /// At most this many groups (largest first) are filed or updated.
    pub max_issues: usize,
    pub test_type: String,
    /// Marks automatically filed issues; also the listing filter.
    pub filter_label: String,
    pub base_labels: Vec<String>,
    pub report: ReportConfig,
    /// Set by the CLI when the tracker is a preview; only affects logging.
    pub dry_run: bool,
}

impl AnalysisOptions {
    pub fn from_config(config: &FailtrackConfig) -> Self {
        Self {
            max_issues: config.general.max_issues,
            test_type: config.general.test_type.clone(),
            filter_label: config.general.filter_label.clone(),
            base_labels: config.general.base_labels.clone(),
            report: config.report.clone(),
            dry_run: false,
        }
    }
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self::from_config(&FailtrackConfig::default())
    }
}

/// Everything a run needs besides its input and its tracker.
#[derive(Debug, Clone, Default)]
pub struct AnalysisContext {
    pub build: BuildContext,
    pub options: AnalysisOptions,
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// What happened to one failure group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", content = "detail", rename_all = "snake_case")]
pub enum GroupAction {
    /// A new issue with this number was filed.
    Created(u64),
    /// A comment was added to this existing issue.
    Commented(u64),
    /// The tracker call failed; the run continued.
    Failed(String),
    /// Beyond `max_issues`; not sent to the tracker.
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupOutcome {
    pub signature: String,
    pub title: String,
    pub count: usize,
    pub action: GroupAction,
}

/// Summary of one run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AnalysisOutcome {
    /// Kind of input that was read, if any.
    pub source: Option<String>,
    pub total_failures: usize,
    pub groups: Vec<GroupOutcome>,
}

impl AnalysisOutcome {
    /// Numbers of issues filed during the run.
    pub fn created_issues(&self) -> Vec<u64> {
        self.groups
            .iter()
            .filter_map(|g| match g.action {
                GroupAction::Created(n) => Some(n),
                _ => None,
            })
            .collect()
    }

    /// Numbers of existing issues that were commented on.
    pub fn commented_issues(&self) -> Vec<u64> {
        self.groups
            .iter()
            .filter_map(|g| match g.action {
                GroupAction::Commented(n) => Some(n),
                _ => None,
            })
            .collect()
    }

    pub fn failed_count(&self) -> usize {
        self.groups
            .iter()
            .filter(|g| matches!(g.action, GroupAction::Failed(_)))
            .count()
    }

    pub fn skipped_count(&self) -> usize {
        self.groups
            .iter()
            .filter(|g| g.action == GroupAction::Skipped)
            .count()
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Run one full analysis pass.
///
/// Never fails: reader problems yield an empty run and tracker problems are
/// recorded per group as [`GroupAction::Failed`].
pub fn analyze(
    source: Option<&ResultSource>,
    ctx: &AnalysisContext,
    tracker: &mut dyn IssueTracker,
) -> AnalysisOutcome {
    let records = parser::collect_failures(source, &ctx.build);
    let total_failures = records.len();
    let mut outcome = AnalysisOutcome {
        source: source.map(|s| s.kind().to_string()),
        total_failures,
        groups: Vec::new(),
    };

    if records.is_empty() {
        info!("no test failures found; nothing to report");
        return outcome;
    }

    let groups = grouping::group(records);
    info!(
        failures = total_failures,
        groups = groups.len(),
        max_issues = ctx.options.max_issues,
        dry_run = ctx.options.dry_run,
        "grouped test failures"
    );

    let (active, overflow) = groups.split_at(groups.len().min(ctx.options.max_issues));
    if !overflow.is_empty() {
        info!(
            skipped = overflow.len(),
            "more failure groups than max_issues; smallest groups skipped"
        );
    }

    // Nothing to file, so the tracker is not contacted at all.
    let mut open_issues = if active.is_empty() {
        None
    } else {
        match fetch_open_issues(ctx, tracker) {
            Ok(issues) => Some(issues),
            Err(reason) => {
                error!(tracker = tracker.name(), %reason, "cannot list open issues; filing nothing this run");
                outcome.groups.extend(
                    active
                        .iter()
                        .map(|g| group_outcome(g, ctx, GroupAction::Failed(reason.clone()))),
                );
                None
            }
        }
    };

    if let Some(open_issues) = open_issues.as_mut() {
        for group in active {
            let action = process_group(group, ctx, open_issues, tracker);
            outcome.groups.push(group_outcome(group, ctx, action));
        }
    }

    outcome
        .groups
        .extend(overflow.iter().map(|g| group_outcome(g, ctx, GroupAction::Skipped)));

    info!(
        created = outcome.created_issues().len(),
        commented = outcome.commented_issues().len(),
        failed = outcome.failed_count(),
        skipped = outcome.skipped_count(),
        "analysis finished"
    );
    outcome
}

fn fetch_open_issues(
    ctx: &AnalysisContext,
    tracker: &dyn IssueTracker,
) -> Result<Vec<TrackingIssue>, String> {
    let labels: Vec<String> = if ctx.options.filter_label.trim().is_empty() {
        Vec::new()
    } else {
        vec![ctx.options.filter_label.clone()]
    };
    tracker
        .fetch_open_issues(&labels)
        .map_err(|e| format!("{e:#}"))
}

/// Comment on a matching issue or file a new one.
fn process_group(
    group: &FailureGroup,
    ctx: &AnalysisContext,
    open_issues: &mut Vec<TrackingIssue>,
    tracker: &mut dyn IssueTracker,
) -> GroupAction {
    let signature = group.signature();
    let title = issue::title(signature, group, &ctx.options.test_type);

    if let Some((existing, reason)) = dedup::find_match_with_reason(open_issues, signature, &title) {
        let number = existing.number;
        debug!(signature, issue = number, %reason, "matched existing issue");
        let comment = issue::update_comment(group, ctx);
        return match tracker.add_comment(number, &comment) {
            Ok(()) => {
                info!(signature, issue = number, count = group.len(), "commented on existing issue");
                GroupAction::Commented(number)
            }
            Err(e) => {
                let reason = format!("{e:#}");
                warn!(signature, issue = number, %reason, "failed to comment on issue");
                GroupAction::Failed(reason)
            }
        };
    }

    let draft = issue::draft(group, ctx);
    match tracker.create_issue(&draft) {
        Ok(number) => {
            info!(signature, issue = number, count = group.len(), title = %draft.title, "created issue");
            open_issues.push(TrackingIssue {
                number,
                title: draft.title,
                body: draft.body,
                state: IssueState::Open,
            });
            GroupAction::Created(number)
        }
        Err(e) => {
            let reason = format!("{e:#}");
            warn!(signature, %reason, "failed to create issue");
            GroupAction::Failed(reason)
        }
    }
}

fn group_outcome(group: &FailureGroup, ctx: &AnalysisContext, action: GroupAction) -> GroupOutcome {
    GroupOutcome {
        signature: group.signature().to_string(),
        title: issue::title(group.signature(), group, &ctx.options.test_type),
        count: group.len(),
        action,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
