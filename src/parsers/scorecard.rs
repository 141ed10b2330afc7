use crate::error::{PortalError, Result};
use crate::models::{CreditSumPolicy, ExamKind, Grade, GradeEntry, ScoreStatus, Scorecard};
use crate::parsers::document::{Document, Node, Pattern};
use crate::parsers::number::{parse_decimal, round2};
use chrono::NaiveDate;
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

static TABLES: LazyLock<Pattern> =
    LazyLock::new(|| Pattern::parse("table").expect("invalid pattern: tables"));

static REPORTED_AVERAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:durchschnittsnote|notendurchschnitt)\s*:\s*(\d+(?:[.,]\d+)?)")
        .expect("invalid regex: reported average")
});

const DATE_FORMATS: [&str; 3] = ["%d.%m.%Y", "%Y-%m-%d", "%d.%m.%y"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Column {
    Number,
    Title,
    Kind,
    Semester,
    Grade,
    Status,
    Credits,
    Date,
    Attempt,
}

impl Column {
    fn classify(header: &str) -> Option<Self> {
        let h = header.trim().to_lowercase();
        let h = h.trim_end_matches(':');

        if h.starts_with("prüfungsnr") || matches!(h, "nr." | "nr" | "no." | "id") {
            Some(Column::Number)
        } else if h.contains("text")
            || h.contains("titel")
            || matches!(h, "modul" | "title" | "course" | "veranstaltung")
        {
            Some(Column::Title)
        } else if matches!(h, "art" | "typ" | "kind" | "type") || h.contains("leistungsart") {
            Some(Column::Kind)
        } else if h.contains("semester") {
            Some(Column::Semester)
        } else if matches!(h, "note" | "grade") {
            Some(Column::Grade)
        } else if h == "status" {
            Some(Column::Status)
        } else if h.contains("credit")
            || h.contains("ects")
            || h.contains("bonus")
            || matches!(h, "cp" | "lp" | "leistungspunkte")
        {
            Some(Column::Credits)
        } else if h.contains("datum") || h == "date" {
            Some(Column::Date)
        } else if h.starts_with("versuch") || h == "attempt" {
            Some(Column::Attempt)
        } else {
            None
        }
    }
}

/// Maps the grade table's columns to their position, derived from the header row.
struct ColumnMap {
    width: usize,
    positions: HashMap<Column, usize>,
}

impl ColumnMap {
    fn from_header(cells: &[Node<'_>]) -> Self {
        let mut positions = HashMap::new();
        for (index, cell) in cells.iter().enumerate() {
            if let Some(column) = Column::classify(&cell.text()) {
                positions.entry(column).or_insert(index);
            }
        }
        Self {
            width: cells.len(),
            positions,
        }
    }

    fn text(&self, cells: &[Node<'_>], column: Column) -> String {
        self.positions
            .get(&column)
            .and_then(|&index| cells.get(index))
            .map(|cell| cell.text())
            .unwrap_or_default()
    }
}

fn table_rows<'a>(table: &Node<'a>) -> Vec<Node<'a>> {
    let mut rows = Vec::new();
    for child in table.children(&["tr", "thead", "tbody", "tfoot"]) {
        if child.name() == "tr" {
            rows.push(child);
        } else {
            rows.extend(child.children(&["tr"]));
        }
    }
    rows
}

/// Finds the first table whose header row names a title column.
fn locate_grade_table<'a>(document: &'a Document) -> Option<(Node<'a>, ColumnMap, Vec<Node<'a>>)> {
    document.find_all(&TABLES).into_iter().find_map(|table| {
        let rows = table_rows(&table);
        let header_index = rows
            .iter()
            .position(|row| !row.children(&["th"]).is_empty())?;
        let columns = ColumnMap::from_header(&rows[header_index].children(&["th", "td"]));
        columns.positions.contains_key(&Column::Title).then(|| {
            let body = rows[header_index + 1..].to_vec();
            (table, columns, body)
        })
    })
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(raw, format).ok())
}

fn parse_credits(raw: &str, title: &str) -> Result<Option<f64>> {
    if raw.is_empty() {
        return Ok(None);
    }
    match parse_decimal(raw) {
        Some(credits) if credits < 0.0 => Err(PortalError::UnexpectedPortalResponse(format!(
            "negative credit points {:?} for {:?}",
            raw, title
        ))),
        Some(credits) => Ok(Some(credits)),
        None => {
            tracing::warn!(credits = raw, "ignoring unreadable credit points");
            Ok(None)
        }
    }
}

/// Reads a "Durchschnittsnote: x,y" line printed outside the grade table.
fn parse_reported_average(document: &Document, grade_table: &Node<'_>) -> Option<f64> {
    let text = document.text().replacen(&grade_table.text(), " ", 1);
    REPORTED_AVERAGE
        .captures(&text)
        .and_then(|captures| captures.get(1))
        .and_then(|m| parse_decimal(m.as_str()))
}

/// A graded exam row under a module.
struct ExamResult {
    /// Exam number, or the title when the portal prints none.
    key: String,
    grade: f64,
    failed: bool,
    attempt: u32,
    row: usize,
}

impl ExamResult {
    fn from_entry(entry: &GradeEntry, row: usize) -> Option<Self> {
        Some(Self {
            key: entry.number.clone().unwrap_or_else(|| entry.title.clone()),
            grade: entry.numeric_grade()?,
            failed: entry.status == Some(ScoreStatus::Failed),
            attempt: entry.attempt.unwrap_or(0),
            row,
        })
    }
}

/// Grade of a module derived from its exams.
///
/// Failed attempts are ignored once any attempt did not fail. Each exam
/// contributes its latest attempt; several exams are averaged.
fn module_grade(mut results: Vec<ExamResult>) -> Option<f64> {
    if results.iter().any(|r| !r.failed) {
        results.retain(|r| !r.failed);
    }

    let mut latest: HashMap<String, ExamResult> = HashMap::new();
    for result in results {
        let newer = latest
            .get(&result.key)
            .is_none_or(|seen| (result.attempt, result.row) > (seen.attempt, seen.row));
        if newer {
            latest.insert(result.key.clone(), result);
        }
    }

    if latest.is_empty() {
        return None;
    }
    let sum: f64 = latest.values().map(|r| r.grade).sum();
    Some(round2(sum / latest.len() as f64))
}

/// Parses a scorecard detail page.
///
/// Rows that span fewer cells than the header are section headings and become
/// the `category` of the rows below them. Rows with an exam kind belong to the
/// module row above them until the next module or heading; a module without
/// its own grade takes the grade of its exams.
pub fn parse_scorecard(html: &str, policy: CreditSumPolicy) -> Result<Scorecard> {
    let document = Document::parse(html);
    let (table, columns, rows) = locate_grade_table(&document).ok_or_else(|| {
        PortalError::UnexpectedPortalResponse("grade table not found on scorecard page".to_string())
    })?;

    let mut entries: Vec<GradeEntry> = Vec::new();
    let mut category: Option<String> = None;
    let mut current_module: Option<usize> = None;
    let mut exam_results: HashMap<usize, Vec<ExamResult>> = HashMap::new();
    let mut data_rows = 0usize;

    for row in rows {
        let cells = row.children(&["td", "th"]);
        if row.children(&["td"]).is_empty() {
            continue;
        }

        if cells.len() < columns.width {
            let heading = row.text();
            if !heading.is_empty() {
                category = Some(heading);
                current_module = None;
            }
            continue;
        }

        data_rows += 1;
        let title = columns.text(&cells, Column::Title);
        if title.is_empty() {
            continue;
        }

        let kind_text = columns.text(&cells, Column::Kind);
        let number = columns.text(&cells, Column::Number);
        let semester = columns.text(&cells, Column::Semester);
        let credits = parse_credits(&columns.text(&cells, Column::Credits), &title)?;
        let is_module = kind_text.is_empty();

        let entry = GradeEntry {
            number: (!number.is_empty()).then_some(number),
            category: category.clone(),
            kind: ExamKind::parse(&kind_text),
            semester: (!semester.is_empty()).then_some(semester),
            grade: Grade::parse(&columns.text(&cells, Column::Grade)),
            status: ScoreStatus::parse(&columns.text(&cells, Column::Status)),
            credits,
            date: parse_date(&columns.text(&cells, Column::Date)),
            attempt: columns.text(&cells, Column::Attempt).parse().ok(),
            part_of_module: !is_module && current_module.is_some(),
            title,
        };

        if is_module {
            current_module = Some(entries.len());
        } else if let Some(module) = current_module {
            if let Some(result) = ExamResult::from_entry(&entry, entries.len()) {
                exam_results.entry(module).or_default().push(result);
            }
        }

        entries.push(entry);
    }

    if data_rows > 0 && entries.is_empty() {
        return Err(PortalError::UnexpectedPortalResponse(
            "no row of the grade table carries a course title".to_string(),
        ));
    }

    for (module, results) in exam_results {
        if let (Some(grade), Some(entry)) = (module_grade(results), entries.get_mut(module)) {
            if entry.grade.is_none() {
                entry.grade = Some(Grade::Numeric(grade));
            }
        }
    }

    let reported = parse_reported_average(&document, &table);
    tracing::debug!(
        entries = entries.len(),
        reported_average = reported.is_some(),
        "parsed scorecard"
    );

    Ok(Scorecard::new(entries, reported, policy))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GpaSource;

    fn flat_page(rows: &[(&str, &str, &str)]) -> String {
        let body: String = rows
            .iter()
            .map(|(title, grade, credits)| {
                format!(
                    "<tr><td>{}</td><td>{}</td><td>{}</td><td>01.02.2018</td></tr>",
                    title, grade, credits
                )
            })
            .collect();
        format!(
            r#"<html><body>
              <table><tr><td>Layout</td></tr></table>
              <table>
                <tr><th>Prüfungstext</th><th>Note</th><th>Credits</th><th>Datum</th></tr>
                {}
              </table>
            </body></html>"#,
            body
        )
    }

    const QIS_HEADER: &str = "<tr><th>Prüfungsnr.</th><th>Prüfungstext</th><th>Art</th><th>Semester</th>\
        <th>Note</th><th>Status</th><th>Credits</th><th>Prüfungsdatum</th><th>Versuch</th>\
        <th>Vermerk</th><th>Freiversuch</th></tr>";

    fn qis_row(cells: [&str; 11]) -> String {
        let tds: String = cells.iter().map(|c| format!("<td>{}</td>", c)).collect();
        format!("<tr>{}</tr>", tds)
    }

    fn qis_page(extra: &str) -> String {
        let rows = [
            "<tr><td colspan=\"11\">Pflichtmodule</td></tr>".to_string(),
            qis_row(["100", "Grundlagen der Informatik", "", "WS 2017/18", "", "bestanden", "10", "01.02.2018", "", "", ""]),
            qis_row(["110", "Grundlagen der Informatik", "PL", "WS 2017/18", "1,3", "bestanden", "", "01.02.2018", "1", "", ""]),
            qis_row(["1109", "Praktikum Informatik", "SL", "WS 2017/18", "", "bestanden", "", "01.02.2018", "1", "", ""]),
            qis_row(["200", "Analysis", "", "SS 2018", "", "bestanden", "5", "15.07.2018", "", "", ""]),
            qis_row(["210", "Analysis", "PL", "SS 2018", "2,0", "bestanden", "", "15.07.2018", "2", "", ""]),
        ]
        .concat();
        format!(
            "<html><body>{}<table>{}{}</table></body></html>",
            extra, QIS_HEADER, rows
        )
    }

    #[test]
    fn parses_numeric_and_symbolic_grades() {
        let html = flat_page(&[("Math I", "1.7", "5.0"), ("History", "nicht bestanden", "3.0")]);
        let scorecard = parse_scorecard(&html, CreditSumPolicy::IncludeUngraded).unwrap();

        assert_eq!(scorecard.entries.len(), 2);
        assert_eq!(scorecard.entries[0].title, "Math I");
        assert_eq!(scorecard.entries[0].grade, Some(Grade::Numeric(1.7)));
        assert_eq!(scorecard.entries[0].credits, Some(5.0));
        assert_eq!(scorecard.entries[0].date, NaiveDate::from_ymd_opt(2018, 2, 1));
        assert_eq!(
            scorecard.entries[1].grade,
            Some(Grade::Symbolic("nicht bestanden".to_string()))
        );
        assert_eq!(scorecard.grade_point_average, Some(1.7));
        assert_eq!(scorecard.gpa_source, Some(GpaSource::Computed));
        assert_eq!(scorecard.credit_point_sum, 8.0);
    }

    #[test]
    fn graded_only_policy_skips_symbolic_credits() {
        let html = flat_page(&[("Math I", "1,7", "5,0"), ("History", "nicht bestanden", "3,0")]);
        let scorecard = parse_scorecard(&html, CreditSumPolicy::GradedOnly).unwrap();
        assert_eq!(scorecard.credit_point_sum, 5.0);
        assert_eq!(scorecard.grade_point_average, Some(1.7));
    }

    #[test]
    fn header_only_table_is_an_empty_scorecard() {
        let html = flat_page(&[]);
        let scorecard = parse_scorecard(&html, CreditSumPolicy::default()).unwrap();
        assert!(scorecard.entries.is_empty());
        assert_eq!(scorecard.grade_point_average, None);
        assert_eq!(scorecard.gpa_source, None);
        assert_eq!(scorecard.credit_point_sum, 0.0);
    }

    #[test]
    fn missing_grade_table_is_unexpected() {
        let html = "<html><body><table><tr><th>Name</th></tr><tr><td>x</td></tr></table></body></html>";
        assert!(matches!(
            parse_scorecard(html, CreditSumPolicy::default()),
            Err(PortalError::UnexpectedPortalResponse(_))
        ));
    }

    #[test]
    fn rows_without_any_title_are_unexpected() {
        let html = flat_page(&[("", "1,0", "5"), (" ", "2,0", "5")]);
        assert!(matches!(
            parse_scorecard(&html, CreditSumPolicy::default()),
            Err(PortalError::UnexpectedPortalResponse(_))
        ));
    }

    #[test]
    fn single_untitled_row_is_skipped() {
        let html = flat_page(&[("Math I", "1,0", "5"), ("", "", "")]);
        let scorecard = parse_scorecard(&html, CreditSumPolicy::default()).unwrap();
        assert_eq!(scorecard.entries.len(), 1);
    }

    #[test]
    fn negative_credits_are_unexpected() {
        let html = flat_page(&[("Math I", "1,0", "-5")]);
        assert!(matches!(
            parse_scorecard(&html, CreditSumPolicy::default()),
            Err(PortalError::UnexpectedPortalResponse(_))
        ));
    }

    #[test]
    fn folds_exam_grades_into_modules() {
        let scorecard = parse_scorecard(&qis_page(""), CreditSumPolicy::IncludeUngraded).unwrap();

        assert_eq!(scorecard.entries.len(), 5);
        let module = &scorecard.entries[0];
        assert_eq!(module.number.as_deref(), Some("100"));
        assert_eq!(module.category.as_deref(), Some("Pflichtmodule"));
        assert_eq!(module.kind, None);
        assert_eq!(module.grade, Some(Grade::Numeric(1.3)));
        assert_eq!(module.status, Some(ScoreStatus::Passed));

        let exam = &scorecard.entries[1];
        assert_eq!(exam.kind, Some(ExamKind::Exam));
        assert_eq!(exam.attempt, Some(1));
        assert_eq!(exam.semester.as_deref(), Some("WS 2017/18"));
        assert_eq!(scorecard.entries[2].kind, Some(ExamKind::Coursework));
        assert_eq!(scorecard.entries[2].grade, None);

        // (1.3 * 10 + 2.0 * 5) / 15
        assert_eq!(scorecard.grade_point_average, Some(1.53));
        assert_eq!(scorecard.credit_point_sum, 15.0);
    }

    #[test]
    fn prefers_reported_average() {
        let html = qis_page("<p>Durchschnittsnote: 1,6</p>");
        let scorecard = parse_scorecard(&html, CreditSumPolicy::default()).unwrap();
        assert_eq!(scorecard.grade_point_average, Some(1.6));
        assert_eq!(scorecard.gpa_source, Some(GpaSource::Reported));
    }

    fn qis_table(rows: &[String]) -> String {
        format!(
            "<html><body><table>{}{}</table></body></html>",
            QIS_HEADER,
            rows.concat()
        )
    }

    #[test]
    fn exam_credits_are_not_counted_twice() {
        let html = qis_table(&[
            qis_row(["100", "Grundlagen der Informatik", "", "WS 2017/18", "", "bestanden", "10", "", "", "", ""]),
            qis_row(["110", "Grundlagen der Informatik", "PL", "WS 2017/18", "1,3", "bestanden", "10", "01.02.2018", "1", "", ""]),
        ]);
        let scorecard = parse_scorecard(&html, CreditSumPolicy::IncludeUngraded).unwrap();

        assert!(!scorecard.entries[0].part_of_module);
        assert!(scorecard.entries[1].part_of_module);
        assert_eq!(scorecard.entries[1].credits, Some(10.0));
        assert_eq!(scorecard.credit_point_sum, 10.0);
        assert_eq!(scorecard.grade_point_average, Some(1.3));

        let graded = parse_scorecard(&html, CreditSumPolicy::GradedOnly).unwrap();
        assert_eq!(graded.credit_point_sum, 10.0);
    }

    #[test]
    fn retaken_exam_grades_the_module_with_the_passed_attempt() {
        let html = qis_table(&[
            qis_row(["100", "Grundlagen der Informatik", "", "WS 2017/18", "", "bestanden", "10", "", "", "", ""]),
            qis_row(["110", "Grundlagen der Informatik", "PL", "WS 2017/18", "5,0", "nicht bestanden", "", "01.02.2018", "1", "", ""]),
            qis_row(["110", "Grundlagen der Informatik", "PL", "SS 2018", "2,3", "bestanden", "", "20.07.2018", "2", "", ""]),
            qis_row(["200", "Analysis", "", "SS 2018", "", "bestanden", "5", "", "", "", ""]),
            qis_row(["210", "Analysis", "PL", "SS 2018", "1,0", "bestanden", "", "15.07.2018", "1", "", ""]),
        ]);
        let scorecard = parse_scorecard(&html, CreditSumPolicy::GradedOnly).unwrap();

        assert_eq!(scorecard.entries[0].grade, Some(Grade::Numeric(2.3)));
        // (2.3 * 10 + 1.0 * 5) / 15
        assert_eq!(scorecard.grade_point_average, Some(1.87));
        assert_eq!(scorecard.credit_point_sum, 15.0);
    }

    #[test]
    fn module_with_two_graded_exams_takes_their_mean() {
        let html = qis_table(&[
            qis_row(["300", "Physik", "", "WS 2018/19", "", "bestanden", "10", "", "", "", ""]),
            qis_row(["310", "Physik Klausur", "PL", "WS 2018/19", "1,7", "bestanden", "", "", "1", "", ""]),
            qis_row(["320", "Physik Labor", "PL", "WS 2018/19", "2,3", "bestanden", "", "", "1", "", ""]),
        ]);
        let scorecard = parse_scorecard(&html, CreditSumPolicy::default()).unwrap();
        assert_eq!(scorecard.entries[0].grade, Some(Grade::Numeric(2.0)));
    }

    #[test]
    fn heading_row_ends_the_previous_module() {
        let html = qis_table(&[
            "<tr><td colspan=\"11\">Pflichtmodule</td></tr>".to_string(),
            qis_row(["100", "Grundlagen der Informatik", "", "WS 2017/18", "", "bestanden", "10", "", "", "", ""]),
            qis_row(["110", "Grundlagen der Informatik", "PL", "WS 2017/18", "1,3", "bestanden", "", "", "1", "", ""]),
            "<tr><td colspan=\"11\">Zusatzleistungen</td></tr>".to_string(),
            qis_row(["900", "Englisch B2", "PL", "SS 2018", "3,0", "bestanden", "2", "", "1", "", ""]),
        ]);
        let scorecard = parse_scorecard(&html, CreditSumPolicy::default()).unwrap();

        assert_eq!(scorecard.entries[0].grade, Some(Grade::Numeric(1.3)));
        let extra = &scorecard.entries[2];
        assert_eq!(extra.category.as_deref(), Some("Zusatzleistungen"));
        assert!(!extra.part_of_module);
        // (1.3 * 10 + 3.0 * 2) / 12
        assert_eq!(scorecard.grade_point_average, Some(1.58));
        assert_eq!(scorecard.credit_point_sum, 12.0);
    }

    #[test]
    fn average_column_in_grade_table_is_not_a_reported_average() {
        let html = r#"<html><body><table>
            <tr><th>Prüfungstext</th><th>Note</th><th>Credits</th></tr>
            <tr><td>Math I</td><td>1,0</td><td>5</td></tr>
            <tr><td colspan="3">Notendurchschnitt: 2,4</td></tr>
          </table></body></html>"#;
        let scorecard = parse_scorecard(html, CreditSumPolicy::default()).unwrap();
        assert_eq!(scorecard.grade_point_average, Some(1.0));
        assert_eq!(scorecard.gpa_source, Some(GpaSource::Computed));
    }

    #[test]
    fn average_without_colon_is_ignored() {
        let html = qis_page("<p>Notendurchschnitt 2,9</p>");
        let scorecard = parse_scorecard(&html, CreditSumPolicy::default()).unwrap();
        assert_eq!(scorecard.gpa_source, Some(GpaSource::Computed));
    }
}
