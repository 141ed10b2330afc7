use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::parsers::number::{parse_decimal, round2};

/// Opaque session credential issued by the portal on a successful sign-in.
///
/// The client never interprets the value. It only forwards it on every call,
/// together with the `asi` navigation parameter when the portal handed one out.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken {
    value: String,
    asi: Option<String>,
}

impl SessionToken {
    /// Wraps a raw session value (e.g. the `JSESSIONID` cookie).
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            asi: None,
        }
    }

    /// Attaches the portal's `asi` navigation parameter.
    pub fn with_asi(mut self, asi: impl Into<String>) -> Self {
        self.asi = Some(asi.into());
        self
    }

    /// The raw session value as issued by the portal.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// The `asi` navigation parameter, if one is attached.
    pub fn asi(&self) -> Option<&str> {
        self.asi.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.value.trim().is_empty()
    }
}

// Token values are credentials; keep them out of debug output and logs.
impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionToken")
            .field("value", &"<redacted>")
            .field("asi", &self.asi.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Username and password for the portal's login form.
#[derive(Clone, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Portal-assigned identifier of a single scorecard (the QIS `nodeID`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScorecardId(String);

impl ScorecardId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScorecardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ScorecardId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ScorecardId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// One row of the scorecard index page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScorecardSummary {
    /// Identifier used to request the detail page.
    pub id: ScorecardId,
    /// Human-readable label, e.g. "Informatik (PO-Version 2017)".
    pub title: String,
}

/// A grade as reported by the portal.
///
/// Numeric grades use the canonical period decimal separator. Anything else the
/// portal prints in the grade column (e.g. "nicht bestanden") is kept verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Grade {
    Numeric(f64),
    Symbolic(String),
}

impl Grade {
    /// Parses a raw grade cell. Returns `None` for an empty cell.
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.split_whitespace().collect::<Vec<_>>().join(" ");
        if normalized.is_empty() {
            return None;
        }
        match parse_decimal(&normalized) {
            Some(value) => Some(Grade::Numeric(value)),
            None => Some(Grade::Symbolic(normalized)),
        }
    }

    pub fn as_numeric(&self) -> Option<f64> {
        match self {
            Grade::Numeric(value) => Some(*value),
            Grade::Symbolic(_) => None,
        }
    }
}

/// The kind of an exam row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExamKind {
    /// Graded examination (Prüfungsleistung).
    #[serde(rename = "PL")]
    Exam,
    /// Ungraded coursework (Studienleistung).
    #[serde(rename = "SL")]
    Coursework,
}

impl ExamKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_uppercase().as_str() {
            "PL" => Some(ExamKind::Exam),
            "SL" => Some(ExamKind::Coursework),
            _ => None,
        }
    }
}

/// The state of an entry as reported in the status column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreStatus {
    /// "bestanden"
    Passed,
    /// "nicht bestanden"
    Failed,
    /// "angemeldet": registered, no result yet.
    Registered,
}

impl ScoreStatus {
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.split_whitespace().collect::<Vec<_>>().join(" ");
        match normalized.to_lowercase().as_str() {
            "bestanden" | "passed" => Some(ScoreStatus::Passed),
            "nicht bestanden" | "failed" => Some(ScoreStatus::Failed),
            "angemeldet" | "registered" => Some(ScoreStatus::Registered),
            _ => None,
        }
    }
}

/// A single row of a scorecard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeEntry {
    /// Exam or module number as printed by the portal.
    pub number: Option<String>,
    /// The course or exam title.
    pub title: String,
    /// The heading of the section this row appears under.
    pub category: Option<String>,
    /// Exam kind; `None` for module rows.
    pub kind: Option<ExamKind>,
    /// Semester label, e.g. "WS 2017/18".
    pub semester: Option<String>,
    /// The grade; `None` when the portal left the cell empty.
    pub grade: Option<Grade>,
    /// Status column value.
    pub status: Option<ScoreStatus>,
    /// Credit points awarded for this row. Never negative.
    pub credits: Option<f64>,
    /// Date the result was issued.
    pub date: Option<NaiveDate>,
    /// Attempt number.
    pub attempt: Option<u32>,
    /// Exam row listed under a module row. Aggregates count the module instead.
    #[serde(default)]
    pub part_of_module: bool,
}

impl GradeEntry {
    /// Creates an entry with only a title set.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            number: None,
            title: title.into(),
            category: None,
            kind: None,
            semester: None,
            grade: None,
            status: None,
            credits: None,
            date: None,
            attempt: None,
            part_of_module: false,
        }
    }

    pub fn numeric_grade(&self) -> Option<f64> {
        self.grade.as_ref().and_then(Grade::as_numeric)
    }
}

/// Which entries contribute their credit points to the scorecard total.
///
/// Whether the portal counts ungraded or pending entries in its own totals has
/// not been confirmed against real documents, so both readings are offered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CreditSumPolicy {
    /// Every entry with credit points counts, whatever its grade.
    #[default]
    IncludeUngraded,
    /// Only entries with a numeric grade count.
    GradedOnly,
}

impl FromStr for CreditSumPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "include-ungraded" | "include_ungraded" | "all" => Ok(CreditSumPolicy::IncludeUngraded),
            "graded-only" | "graded_only" | "graded" => Ok(CreditSumPolicy::GradedOnly),
            other => Err(format!("Unknown credit sum policy: {}", other)),
        }
    }
}

/// Where the grade-point average of a scorecard came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GpaSource {
    /// Printed by the portal on the scorecard page.
    Reported,
    /// Credit-weighted mean over the numeric entries.
    Computed,
}

/// A parsed scorecard with its aggregates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scorecard {
    /// Entries in document order.
    pub entries: Vec<GradeEntry>,
    /// Grade-point average, rounded to two decimals.
    pub grade_point_average: Option<f64>,
    /// Origin of `grade_point_average`.
    pub gpa_source: Option<GpaSource>,
    /// Total credit points according to the configured policy.
    pub credit_point_sum: f64,
}

impl Scorecard {
    /// Builds a scorecard, preferring a portal-reported average over a computed one.
    pub fn new(entries: Vec<GradeEntry>, reported_gpa: Option<f64>, policy: CreditSumPolicy) -> Self {
        let (grade_point_average, gpa_source) = match reported_gpa {
            Some(gpa) => (Some(round2(gpa)), Some(GpaSource::Reported)),
            None => match Self::compute_grade_point_average(&entries) {
                Some(gpa) => (Some(gpa), Some(GpaSource::Computed)),
                None => (None, None),
            },
        };
        let credit_point_sum = Self::compute_credit_point_sum(&entries, policy);

        Self {
            entries,
            grade_point_average,
            gpa_source,
            credit_point_sum,
        }
    }

    /// Credit-weighted mean of all entries that have a numeric grade and
    /// positive credit points, leaving out exam rows that belong to a module.
    /// `None` when no entry qualifies.
    pub fn compute_grade_point_average(entries: &[GradeEntry]) -> Option<f64> {
        let (weighted, credits) = entries
            .iter()
            .filter(|entry| !entry.part_of_module)
            .filter_map(|entry| {
                let grade = entry.numeric_grade()?;
                let credits = entry.credits.filter(|c| *c > 0.0)?;
                Some((grade * credits, credits))
            })
            .fold((0.0, 0.0), |(sum, total), (w, c)| (sum + w, total + c));

        if credits > 0.0 {
            Some(round2(weighted / credits))
        } else {
            None
        }
    }

    pub fn compute_credit_point_sum(entries: &[GradeEntry], policy: CreditSumPolicy) -> f64 {
        let sum: f64 = entries
            .iter()
            .filter(|entry| !entry.part_of_module)
            .filter(|entry| match policy {
                CreditSumPolicy::IncludeUngraded => true,
                CreditSumPolicy::GradedOnly => entry.numeric_grade().is_some(),
            })
            .filter_map(|entry| entry.credits)
            .sum();
        round2(sum)
    }
}

/// Result of a sign-in, including what the portal's landing page tells us.
#[derive(Debug, Clone)]
pub struct SignInDetails {
    pub token: SessionToken,
    /// The name shown in the portal's login status box.
    pub user_display_name: String,
}
