//! Semantic column resolution.
//!
//! Analyses ask for columns by meaning ("gpa", "nationality") rather than by
//! the header a particular export happens to use. [`match_column`] runs the
//! four match stages against the dataset's headers; [`ColumnResolver`] runs
//! them for the requested name first and then for each alias in the table.
//! A `None` result means the feature is unavailable for this dataset.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use log::info;
use serde::{Deserialize, Serialize};

use crate::{cli::ColumnsArgs, config::AppConfig, data::ColumnKind, dataset::Dataset, table};

pub const SCORE: &str = "gpa";
pub const AID: &str = "financial_aid";
pub const REVENUE: &str = "tuition_revenue";
pub const NATIONALITY: &str = "nationality";
pub const PROGRAM: &str = "program";
pub const GENDER: &str = "gender";
pub const COHORT: &str = "cohort";
pub const STUDENT_ID: &str = "student_id";

pub const SEMANTIC_COLUMNS: &[&str] = &[
    SCORE,
    AID,
    REVENUE,
    NATIONALITY,
    PROGRAM,
    GENDER,
    COHORT,
    STUDENT_ID,
];

const BUILTIN_ALIASES: &[(&str, &[&str])] = &[
    (
        SCORE,
        &[
            "cumulative_gpa",
            "cgpa",
            "gpa_score",
            "grade_point_average",
            "overall_gpa",
        ],
    ),
    (
        AID,
        &[
            "scholarship_amount",
            "scholarship",
            "aid_amount",
            "aid",
            "grant_amount",
            "bursary",
            "discount",
        ],
    ),
    (
        REVENUE,
        &[
            "tuition_fee",
            "tuition",
            "fees_paid",
            "total_fees",
            "amount_paid",
            "revenue",
        ],
    ),
    (
        NATIONALITY,
        &["citizenship", "country_of_origin", "country", "nation"],
    ),
    (
        PROGRAM,
        &["programme", "major", "course", "degree", "department", "college"],
    ),
    (GENDER, &["sex"]),
    (
        COHORT,
        &["intake", "admission_year", "entry_year", "academic_year", "year"],
    ),
    (STUDENT_ID, &["student_number", "learner_id", "id"]),
];

/// Minimum header length for the "header is a substring of the request" stage.
const REVERSE_SUBSTRING_MIN_LEN: usize = 3;

/// Semantic name to candidate header names, tried in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AliasTable {
    entries: BTreeMap<String, Vec<String>>,
}

impl Default for AliasTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl AliasTable {
    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    pub fn builtin() -> Self {
        let entries = BUILTIN_ALIASES
            .iter()
            .map(|(semantic, aliases)| {
                (
                    semantic.to_string(),
                    aliases.iter().map(|a| a.to_string()).collect(),
                )
            })
            .collect();
        Self { entries }
    }

    /// Adds `extra` aliases ahead of the existing ones for the same semantic name.
    pub fn merged_with(mut self, extra: &BTreeMap<String, Vec<String>>) -> Self {
        for (semantic, aliases) in extra {
            let entry = self.entries.entry(semantic.clone()).or_default();
            let mut combined = aliases.clone();
            combined.extend(entry.iter().filter(|a| !aliases.contains(a)).cloned());
            *entry = combined;
        }
        self
    }

    pub fn aliases(&self, semantic: &str) -> &[String] {
        self.entries
            .get(semantic)
            .map(|v| v.as_slice())
            .unwrap_or_default()
    }
}

/// Four-stage match of one requested name against the available headers.
///
/// Stages: exact, case-insensitive exact, requested contained in a header,
/// header contained in the requested name. Headers are scanned in order, so
/// the first header satisfying the earliest stage wins.
pub fn match_column<'a>(requested: &str, actual: &[&'a str]) -> Option<&'a str> {
    let requested = requested.trim();
    if requested.is_empty() {
        return None;
    }
    if let Some(found) = actual.iter().find(|name| **name == requested) {
        return Some(*found);
    }
    let lowered = requested.to_lowercase();
    let lowered_actual = actual
        .iter()
        .map(|name| (*name, name.trim().to_lowercase()))
        .collect::<Vec<_>>();
    if let Some((found, _)) = lowered_actual.iter().find(|(_, l)| *l == lowered) {
        return Some(*found);
    }
    if let Some((found, _)) = lowered_actual.iter().find(|(_, l)| l.contains(&lowered)) {
        return Some(*found);
    }
    lowered_actual
        .iter()
        .find(|(_, l)| l.len() >= REVERSE_SUBSTRING_MIN_LEN && lowered.contains(l.as_str()))
        .map(|(found, _)| *found)
}

#[derive(Debug, Clone, Default)]
pub struct ColumnResolver {
    aliases: AliasTable,
}

impl ColumnResolver {
    pub fn new(aliases: AliasTable) -> Self {
        Self { aliases }
    }

    pub fn aliases(&self) -> &AliasTable {
        &self.aliases
    }

    pub fn resolve(&self, requested: &str, actual: &[&str]) -> Option<String> {
        if let Some(found) = match_column(requested, actual) {
            return Some(found.to_string());
        }
        self.aliases
            .aliases(requested)
            .iter()
            .find_map(|alias| match_column(alias, actual))
            .map(str::to_string)
    }

    pub fn resolve_in(&self, requested: &str, dataset: &Dataset) -> Option<String> {
        let actual = dataset.column_names().collect::<Vec<_>>();
        self.resolve(requested, &actual)
    }
}

/// Semantic name to resolved header for every known semantic column.
pub fn resolve_all(resolver: &ColumnResolver, dataset: &Dataset) -> BTreeMap<String, String> {
    SEMANTIC_COLUMNS
        .iter()
        .filter_map(|semantic| {
            resolver
                .resolve_in(semantic, dataset)
                .map(|found| (semantic.to_string(), found))
        })
        .collect()
}

/// The semantic roles this crate's analyses understand, resolved once per dataset.
///
/// Numeric roles only resolve to numeric columns and categorical roles to
/// categorical ones. Roles are claimed in declaration order and a header is
/// never assigned to two roles.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SemanticColumns {
    pub score: Option<String>,
    pub aid: Option<String>,
    pub revenue: Option<String>,
    pub nationality: Option<String>,
    pub program: Option<String>,
    pub gender: Option<String>,
    pub cohort: Option<String>,
    pub student_id: Option<String>,
}

impl SemanticColumns {
    pub fn resolve(resolver: &ColumnResolver, dataset: &Dataset) -> Self {
        let mut claimed: Vec<String> = Vec::new();
        let mut claim = |semantic: &str, kind: Option<ColumnKind>| {
            let available = dataset
                .columns()
                .iter()
                .filter(|c| kind.is_none_or(|k| c.kind == k))
                .filter(|c| !claimed.contains(&c.name))
                .map(|c| c.name.as_str())
                .collect::<Vec<_>>();
            let found = resolver.resolve(semantic, &available);
            if let Some(name) = &found {
                claimed.push(name.clone());
            }
            found
        };
        let student_id = claim(STUDENT_ID, None);
        let score = claim(SCORE, Some(ColumnKind::Numeric));
        let aid = claim(AID, Some(ColumnKind::Numeric));
        let revenue = claim(REVENUE, Some(ColumnKind::Numeric));
        let nationality = claim(NATIONALITY, Some(ColumnKind::Categorical));
        let program = claim(PROGRAM, Some(ColumnKind::Categorical));
        let gender = claim(GENDER, Some(ColumnKind::Categorical));
        let cohort = claim(COHORT, None);
        Self {
            score,
            aid,
            revenue,
            nationality,
            program,
            gender,
            cohort,
            student_id,
        }
    }

    /// Semantic role of an actual header, if it was claimed by one.
    pub fn role_of(&self, column: &str) -> Option<&'static str> {
        [
            (SCORE, &self.score),
            (AID, &self.aid),
            (REVENUE, &self.revenue),
            (NATIONALITY, &self.nationality),
            (PROGRAM, &self.program),
            (GENDER, &self.gender),
            (COHORT, &self.cohort),
            (STUDENT_ID, &self.student_id),
        ]
        .into_iter()
        .find(|(_, resolved)| resolved.as_deref() == Some(column))
        .map(|(semantic, _)| semantic)
    }

    pub fn is_monetary(&self, column: &str) -> bool {
        matches!(self.role_of(column), Some(AID) | Some(REVENUE))
    }
}

pub fn execute(args: &ColumnsArgs) -> Result<()> {
    let config = AppConfig::load_optional(args.config.as_deref())?;
    let dataset = crate::load_dataset(&args.input, args.delimiter, args.input_encoding.as_deref())
        .with_context(|| format!("Loading dataset from {:?}", args.input))?;
    let resolver = ColumnResolver::new(config.alias_table());
    let semantic_columns = SemanticColumns::resolve(&resolver, &dataset);

    let mut rows = Vec::with_capacity(SEMANTIC_COLUMNS.len());
    for semantic in SEMANTIC_COLUMNS {
        let resolved = dataset
            .column_names()
            .find(|name| semantic_columns.role_of(name) == Some(*semantic))
            .map(str::to_string);
        let kind = resolved
            .as_deref()
            .and_then(|name| dataset.column_kind(name))
            .map(|kind| kind.to_string())
            .unwrap_or_default();
        rows.push(vec![
            semantic.to_string(),
            resolved.unwrap_or_else(|| "-".to_string()),
            kind,
        ]);
    }

    let headers = vec![
        "semantic".to_string(),
        "column".to_string(),
        "kind".to_string(),
    ];
    table::print_table(&headers, &rows);
    info!(
        "Resolved {} of {} semantic column(s)",
        rows.iter().filter(|row| row[1] != "-").count(),
        SEMANTIC_COLUMNS.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match_beats_case_insensitive() {
        let actual = ["GPA", "gpa"];
        assert_eq!(match_column("gpa", &actual), Some("gpa"));
    }

    #[test]
    fn case_insensitive_then_substring_stages() {
        assert_eq!(match_column("gpa", &["Name", "GPA"]), Some("GPA"));
        assert_eq!(match_column("gpa", &["Name", "term_gpa_final"]), Some("term_gpa_final"));
        assert_eq!(match_column("nationality_code", &["id", "Nationality"]), Some("Nationality"));
    }

    #[test]
    fn reverse_substring_ignores_tiny_headers() {
        assert_eq!(match_column("student_id", &["id"]), None);
    }

    #[test]
    fn alias_table_is_consulted_after_direct_stages() {
        let resolver = ColumnResolver::default();
        let actual = ["student", "cumulative_gpa", "Country"];
        assert_eq!(resolver.resolve(SCORE, &actual).as_deref(), Some("cumulative_gpa"));
        assert_eq!(resolver.resolve(NATIONALITY, &actual).as_deref(), Some("Country"));
        assert_eq!(resolver.resolve(GENDER, &actual), None);
    }

    #[test]
    fn extra_aliases_take_precedence() {
        let mut extra = BTreeMap::new();
        extra.insert(GENDER.to_string(), vec!["m_f".to_string()]);
        let resolver = ColumnResolver::new(AliasTable::builtin().merged_with(&extra));
        let actual = ["sex_code", "m_f"];
        assert_eq!(resolver.resolve(GENDER, &actual).as_deref(), Some("m_f"));
        assert!(resolver.aliases().aliases(GENDER).contains(&"sex".to_string()));
    }

    #[test]
    fn semantic_columns_respect_kinds_and_claims() {
        let dataset = Dataset::from_raw(
            vec![
                "Student ID".into(),
                "CGPA".into(),
                "Scholarship".into(),
                "Tuition".into(),
                "Country".into(),
                "Major".into(),
            ],
            vec![vec![
                "S1".into(),
                "3.1".into(),
                "1000".into(),
                "50000".into(),
                "UAE".into(),
                "Business".into(),
            ]],
        )
        .expect("dataset");
        let columns = SemanticColumns::resolve(&ColumnResolver::default(), &dataset);
        assert_eq!(columns.student_id.as_deref(), Some("Student ID"));
        assert_eq!(columns.score.as_deref(), Some("CGPA"));
        assert_eq!(columns.aid.as_deref(), Some("Scholarship"));
        assert_eq!(columns.revenue.as_deref(), Some("Tuition"));
        assert_eq!(columns.nationality.as_deref(), Some("Country"));
        assert_eq!(columns.program.as_deref(), Some("Major"));
        assert_eq!(columns.gender, None);
        assert_eq!(columns.role_of("Tuition"), Some(REVENUE));
        assert!(columns.is_monetary("Scholarship"));
        assert!(!columns.is_monetary("CGPA"));
    }

    #[test]
    fn unknown_semantic_without_aliases_is_not_found() {
        let resolver = ColumnResolver::new(AliasTable::empty());
        assert_eq!(resolver.resolve("retention", &["gpa", "country"]), None);
    }
}
