//! Severity levels and data-integrity markers shared by every report.

use serde::Serialize;

/// How bad a finding is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Critical,
    Error,
    Warning,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "CRITICAL",
            Severity::Error => "ERROR",
            Severity::Warning => "WARNING",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Something in the fetched data did not line up.
///
/// These never abort an analysis. The affected field is reported as
/// unavailable and the issue travels with the report so the reader knows
/// which parts are incomplete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DataIssue {
    /// A `source` back-reference points at a run or slot that does not exist.
    DanglingSource {
        node: String,
        previous_node: String,
        slot: usize,
    },
    /// A sub-workflow invoker has no resolvable target id.
    UnresolvedSubWorkflowTarget { node: String },
    /// A secondary fetch failed; the dependent result is unavailable.
    FetchFailed { target: String, message: String },
    /// The execution did not embed its workflow definition and it could not
    /// be fetched either.
    MissingDefinition { workflow_id: String },
}

impl std::fmt::Display for DataIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataIssue::DanglingSource {
                node,
                previous_node,
                slot,
            } => write!(
                f,
                "{} references {} output {} which has no recorded run",
                node, previous_node, slot
            ),
            DataIssue::UnresolvedSubWorkflowTarget { node } => {
                write!(f, "{} has no resolvable target workflow id", node)
            }
            DataIssue::FetchFailed { target, message } => {
                write!(f, "could not fetch {}: {}", target, message)
            }
            DataIssue::MissingDefinition { workflow_id } => {
                write!(f, "workflow definition {} unavailable", workflow_id)
            }
        }
    }
}
