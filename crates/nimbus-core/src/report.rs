//! Validation reports
//!
//! One [`ValidationReport`] per allocation and pass. Dry runs and enforcing
//! runs produce the same shape; only enforcing runs record actions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Why an allocation was not checked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// No backend serves the resource type
    UnsupportedResource,
    ResourceNotFound,
    /// Activation never completed
    MissingProjectId,
    ProjectNotFound,
    /// The backend could not be built or queried
    BackendError,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            SkipReason::UnsupportedResource => "unsupported resource type",
            SkipReason::ResourceNotFound => "resource not found",
            SkipReason::MissingProjectId => "no project id recorded",
            SkipReason::ProjectNotFound => "project not found on provider",
            SkipReason::BackendError => "backend error",
        };
        write!(f, "{}", text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum Outcome {
    Checked,
    Skipped(SkipReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscrepancyKind {
    /// Allocation member without a role on the project
    MissingUser,
    /// Project principal that is not an allocation member
    ExtraUser,
    Quota,
    Label,
    LimitRange,
}

/// One expected/observed mismatch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discrepancy {
    pub kind: DiscrepancyKind,
    /// Attribute display name, label key, username or limit-range path
    pub field: String,
    pub expected: Option<String>,
    pub actual: Option<String>,
}

impl Discrepancy {
    pub fn new(
        kind: DiscrepancyKind,
        field: impl Into<String>,
        expected: Option<String>,
        actual: Option<String>,
    ) -> Self {
        Self {
            kind,
            field: field.into(),
            expected,
            actual,
        }
    }
}

impl std::fmt::Display for Discrepancy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:?} '{}': expected {}, actual {}",
            self.kind,
            self.field,
            self.expected.as_deref().unwrap_or("<unset>"),
            self.actual.as_deref().unwrap_or("<unset>")
        )
    }
}

/// Corrective action taken by an enforcing pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    AddedUser { username: String },
    RemovedUser { username: String },
    /// Quota never set anywhere; computed from the allocation quantity
    PersistedDefaultQuota { attribute: String, value: i64 },
    /// Provider value recorded on the allocation, provider left alone
    AdoptedQuota { attribute: String, value: i64 },
    ReappliedQuota,
    MergedLabels { labels: Vec<String> },
    ReplacedLimits,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub allocation_id: String,
    pub resource: String,
    pub project_id: Option<String>,
    pub apply: bool,
    pub outcome: Outcome,
    pub discrepancies: Vec<Discrepancy>,
    pub actions: Vec<Action>,
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn new(allocation_id: impl Into<String>, resource: impl Into<String>, apply: bool) -> Self {
        Self {
            allocation_id: allocation_id.into(),
            resource: resource.into(),
            project_id: None,
            apply,
            outcome: Outcome::Checked,
            discrepancies: Vec::new(),
            actions: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn skipped(mut self, reason: SkipReason) -> Self {
        self.outcome = Outcome::Skipped(reason);
        self
    }

    pub fn discrepancy(&mut self, discrepancy: Discrepancy) {
        self.discrepancies.push(discrepancy);
    }

    pub fn action(&mut self, action: Action) {
        self.actions.push(action);
    }

    pub fn error(&mut self, error: impl std::fmt::Display) {
        self.errors.push(error.to_string());
    }

    pub fn is_checked(&self) -> bool {
        self.outcome == Outcome::Checked
    }

    /// Checked, nothing to report, nothing failed
    pub fn is_clean(&self) -> bool {
        self.is_checked() && self.discrepancies.is_empty() && self.errors.is_empty()
    }

    pub fn of_kind(&self, kind: DiscrepancyKind) -> impl Iterator<Item = &Discrepancy> {
        self.discrepancies.iter().filter(move |d| d.kind == kind)
    }
}

/// Counts for one `validate_all` run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub apply: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub total: usize,
    pub clean: usize,
    pub with_discrepancies: usize,
    pub skipped: usize,
    pub unsupported: usize,
    pub failed: usize,
    pub actions: usize,
}

impl RunSummary {
    pub fn from_reports(apply: bool, started_at: DateTime<Utc>, reports: &[ValidationReport]) -> Self {
        let mut summary = Self {
            apply,
            started_at,
            finished_at: Utc::now(),
            total: reports.len(),
            clean: 0,
            with_discrepancies: 0,
            skipped: 0,
            unsupported: 0,
            failed: 0,
            actions: 0,
        };
        for report in reports {
            match report.outcome {
                Outcome::Skipped(SkipReason::UnsupportedResource) => summary.unsupported += 1,
                Outcome::Skipped(_) => summary.skipped += 1,
                Outcome::Checked if report.is_clean() => summary.clean += 1,
                Outcome::Checked => {}
            }
            if !report.discrepancies.is_empty() {
                summary.with_discrepancies += 1;
            }
            if !report.errors.is_empty() {
                summary.failed += 1;
            }
            summary.actions += report.actions.len();
        }
        summary
    }
}
