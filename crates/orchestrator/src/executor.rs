//! The triage executor: discovery, the bounded worker pool, and the per-issue
//! state machine.
//!
//! ## Per-issue sequence
//!
//! ```text
//! Discovered ─classify→ Classified ─assign→ Assigned ─assess→ Assessed ─annotate→ Done
//! ```
//!
//! Annotation performs the remote writes in a fixed order: category labels,
//! assignee, assessment comment, and finally the sentinel label. Permanent
//! errors on the first three are recorded and annotation continues. A transient
//! error (the tracker has already exhausted its retries) or any failure of the
//! sentinel write moves the issue to `Failed`.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use pipeline::{
    Assessor, AssignmentMatcher, Category, Classifier, Issue, IssueTracker, KeywordClassifier,
    LabelName, LabelTable, PipelineRunId, ProcessingState, Timestamp, TrackerError, TrackerOperation,
    TriageConfig, TriageError, Username,
};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::report::{AssigneeOutcome, IssueOutcome, OperationFailure, RunReport};

/// Drives batches of issues through the triage pipeline.
///
/// All collaborators are shared behind `Arc` so that worker tasks can be
/// spawned onto the runtime. The [`AssignmentMatcher`] lives as long as the
/// executor; its load counters accumulate across every run made with it.
pub struct TriageExecutor {
    config: Arc<TriageConfig>,
    tracker: Arc<dyn IssueTracker>,
    classifier: Arc<dyn Classifier>,
    labels: Arc<LabelTable>,
    matcher: Arc<AssignmentMatcher>,
    assessor: Arc<Assessor>,
}

impl TriageExecutor {
    /// Builds an executor with the keyword classifier described by `config`.
    pub fn new(config: Arc<TriageConfig>, tracker: Arc<dyn IssueTracker>) -> Self {
        let rules = config.category_rules();
        let classifier = Arc::new(KeywordClassifier::new(&rules));
        let labels = Arc::new(LabelTable::from_rules(&rules));
        let matcher = Arc::new(AssignmentMatcher::new(
            &config.roster(),
            &rules,
            &config.domain_hints,
        ));
        let assessor = Arc::new(Assessor::new(&config.templates, config.marker.clone()));
        Self {
            config,
            tracker,
            classifier,
            labels,
            matcher,
            assessor,
        }
    }

    /// Replaces the classifier.
    pub fn with_classifier(mut self, classifier: Arc<dyn Classifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn matcher(&self) -> &AssignmentMatcher {
        &self.matcher
    }

    /// Runs one batch.
    ///
    /// Discovery pages through the tracker until the listing is exhausted,
    /// `max_issues` issues have been started, or `cancel` fires. Issues already
    /// running when cancellation is observed finish all of their writes; no new
    /// issue starts afterwards.
    pub async fn run(&self, cancel: CancellationToken) -> RunReport {
        let run_id = PipelineRunId::new_random();
        let span = info_span!("triage_run", run_id = %run_id, repository = %self.config.repository);
        self.run_batch(run_id, cancel).instrument(span).await
    }

    async fn run_batch(&self, run_id: PipelineRunId, cancel: CancellationToken) -> RunReport {
        let started_at = Timestamp::now();
        let repository = &self.config.repository;
        let permits = Arc::new(Semaphore::new(self.config.max_workers));
        let mut tasks = JoinSet::new();
        let mut seen = HashSet::new();
        let mut cursor = None;
        let mut cancelled = false;
        let mut discovery_error = None;

        info!(max_workers = self.config.max_workers, "Starting triage run");

        'discovery: loop {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            let page = match self.tracker.list_unprocessed_issues(repository, cursor).await {
                Ok(page) => page,
                Err(source) => {
                    let err = TriageError::Discovery { source };
                    error!(error = %err, "Issue discovery failed");
                    discovery_error = Some(err.to_string());
                    break;
                }
            };
            debug!(issues = page.issues.len(), has_next = page.next.is_some(), "Fetched issue page");

            for issue in page.issues {
                if seen.len() >= self.config.max_issues {
                    info!(max_issues = self.config.max_issues, "Issue cap reached");
                    break 'discovery;
                }
                if !seen.insert(issue.number) {
                    continue;
                }

                let permit = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    permit = permits.clone().acquire_owned() => permit.ok(),
                };
                let Some(permit) = permit else {
                    cancelled = cancel.is_cancelled();
                    break 'discovery;
                };

                let worker = self.worker();
                let span = info_span!("triage_issue", issue = %issue.number);
                tasks.spawn(
                    async move {
                        let outcome = worker.process(issue).await;
                        drop(permit);
                        outcome
                    }
                    .instrument(span),
                );
            }

            match page.next {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        if cancelled {
            warn!(started = seen.len(), "Cancellation observed; waiting for in-flight issues");
        }

        let mut outcomes = Vec::with_capacity(seen.len());
        let mut lost_workers = 0;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    error!(error = %e, "Issue worker ended without an outcome");
                    lost_workers += 1;
                }
            }
        }
        outcomes.sort_by_key(|o| o.number);

        let report = RunReport {
            run_id,
            repository: repository.clone(),
            started_at,
            finished_at: Timestamp::now(),
            cancelled,
            discovery_error,
            lost_workers,
            outcomes,
        };
        let counts = report.counts();
        info!(
            done = counts.done,
            partial_failure = counts.partial_failure,
            failed = counts.failed,
            cancelled,
            "Triage run complete"
        );
        report
    }

    fn worker(&self) -> IssueWorker {
        IssueWorker {
            config: self.config.clone(),
            tracker: self.tracker.clone(),
            classifier: self.classifier.clone(),
            labels: self.labels.clone(),
            matcher: self.matcher.clone(),
            assessor: self.assessor.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Per-issue processing
// ---------------------------------------------------------------------------

/// Owned handles a spawned task needs to process one issue.
struct IssueWorker {
    config: Arc<TriageConfig>,
    tracker: Arc<dyn IssueTracker>,
    classifier: Arc<dyn Classifier>,
    labels: Arc<LabelTable>,
    matcher: Arc<AssignmentMatcher>,
    assessor: Arc<Assessor>,
}

/// Assignment decision taken in the `Assigned` stage, written during
/// annotation. A `Write` holds one unit of the member's load until the write
/// succeeds or the load is handed back.
enum AssigneePlan {
    Keep(Username),
    Write(Username),
    Nobody,
}

/// Whether annotation may continue after a write.
enum Flow {
    Continue,
    Abort,
}

/// Mutable record of one issue's progress.
struct IssueRun {
    outcome: IssueOutcome,
}

impl IssueRun {
    fn new(issue: &Issue) -> Self {
        Self {
            outcome: IssueOutcome {
                number: issue.number,
                title: issue.title.clone(),
                url: issue.url.clone(),
                state: ProcessingState::Discovered,
                categories: BTreeSet::new(),
                labels_applied: Vec::new(),
                assignee: AssigneeOutcome::NotAttempted,
                comment_posted: false,
                failures: Vec::new(),
            },
        }
    }

    fn enter(&mut self, next: ProcessingState) {
        let result = self.outcome.state.advance(next);
        debug_assert!(result.is_ok(), "{result:?}");
        if let Err(e) = result {
            error!(error = %e, "Ignoring invalid state transition");
        } else {
            debug!(state = %next, "Issue state changed");
        }
    }

    /// Records a failed write. Transient errors end the issue: the tracker has
    /// already spent its retries, and skipping the sentinel leaves the issue
    /// discoverable on the next run.
    fn record(&mut self, operation: TrackerOperation, err: &TrackerError) -> Flow {
        self.outcome.failures.push(OperationFailure::new(operation, err));
        if err.is_transient() {
            warn!(%operation, error = %err, "Remote write failed after retries; abandoning issue");
            self.enter(ProcessingState::Failed);
            Flow::Abort
        } else {
            warn!(%operation, error = %err, "Remote write rejected; continuing");
            Flow::Continue
        }
    }

    fn finish(self) -> IssueOutcome {
        self.outcome
    }
}

impl IssueWorker {
    async fn process(&self, issue: Issue) -> IssueOutcome {
        let mut run = IssueRun::new(&issue);

        // Classify.
        let mut categories = self.classifier.classify(&issue);
        if categories.is_empty() {
            categories.insert(Category::unclassified());
        }
        let labels: Vec<LabelName> = categories
            .iter()
            .map(|c| self.labels.label(c))
            .filter(|l| !issue.has_label(l))
            .collect();
        run.outcome.categories = categories.clone();
        run.enter(ProcessingState::Classified);

        // Assign.
        let plan = match &issue.assignee {
            Some(existing) => AssigneePlan::Keep(existing.clone()),
            None => match self.matcher.assign(&categories, &issue.text()) {
                Some(username) => AssigneePlan::Write(username),
                None => AssigneePlan::Nobody,
            },
        };
        run.enter(ProcessingState::Assigned);

        // Assess.
        let comment = self.assessor.assess(&issue, &categories);
        run.enter(ProcessingState::Assessed);

        // Annotate.
        if let Flow::Abort = self.annotate(&mut run, &issue, labels, plan, &comment).await {
            return run.finish();
        }
        run.enter(ProcessingState::Done);
        info!(
            categories = ?run.outcome.categories,
            assignee = %run.outcome.assignee,
            failures = run.outcome.failures.len(),
            "Issue triaged"
        );
        run.finish()
    }

    async fn annotate(
        &self,
        run: &mut IssueRun,
        issue: &Issue,
        labels: Vec<LabelName>,
        plan: AssigneePlan,
        comment: &str,
    ) -> Flow {
        let repository = &self.config.repository;

        for label in labels {
            match self.tracker.add_label(repository, issue.number, &label).await {
                Ok(()) => run.outcome.labels_applied.push(label),
                Err(e) => {
                    if let Flow::Abort = run.record(TrackerOperation::AddLabel, &e) {
                        if let AssigneePlan::Write(username) = &plan {
                            self.matcher.release(username);
                        }
                        return Flow::Abort;
                    }
                }
            }
        }

        run.outcome.assignee = match plan {
            AssigneePlan::Keep(existing) => AssigneeOutcome::Existing(existing),
            AssigneePlan::Nobody => AssigneeOutcome::Unassigned,
            AssigneePlan::Write(username) => {
                match self.tracker.set_assignee(repository, issue.number, &username).await {
                    Ok(()) => AssigneeOutcome::Assigned(username),
                    Err(e) => {
                        if matches!(e, TrackerError::InvalidAssignee { .. }) {
                            self.matcher.reject(&username);
                        } else {
                            self.matcher.release(&username);
                        }
                        if let Flow::Abort = run.record(TrackerOperation::SetAssignee, &e) {
                            return Flow::Abort;
                        }
                        AssigneeOutcome::Rejected(username)
                    }
                }
            }
        };

        match self.tracker.post_comment(repository, issue.number, comment).await {
            Ok(()) => run.outcome.comment_posted = true,
            Err(e) => {
                if let Flow::Abort = run.record(TrackerOperation::PostComment, &e) {
                    return Flow::Abort;
                }
            }
        }

        // The sentinel is the terminal marker and must be the last write.
        let sentinel = &self.config.sentinel_label;
        match self.tracker.add_label(repository, issue.number, sentinel).await {
            Ok(()) => {
                run.outcome.labels_applied.push(sentinel.clone());
                Flow::Continue
            }
            Err(e) => {
                run.record(TrackerOperation::AddLabel, &e);
                if run.outcome.state != ProcessingState::Failed {
                    error!(error = %e, "Sentinel label could not be applied");
                    run.enter(ProcessingState::Failed);
                }
                Flow::Abort
            }
        }
    }
}
