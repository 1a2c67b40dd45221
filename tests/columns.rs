use std::collections::BTreeMap;

use csv_insights::columns::{AliasTable, ColumnResolver, SCORE, match_column};
use proptest::prelude::*;

fn resolver() -> ColumnResolver {
    ColumnResolver::new(AliasTable::builtin())
}

#[test]
fn stages_apply_in_order() {
    let headers = ["Overall GPA", "gpa_term", "GPA"];
    assert_eq!(match_column("GPA", &headers), Some("GPA"));
    assert_eq!(match_column("gpa", &headers), Some("GPA"));
    assert_eq!(match_column("gpa", &["Overall GPA", "gpa_term"]), Some("Overall GPA"));
    assert_eq!(match_column("student_nationality", &["Nationality"]), Some("Nationality"));
}

#[test]
fn short_headers_do_not_match_by_reverse_substring() {
    assert_eq!(match_column("program", &["pr", "id"]), None);
}

#[test]
fn aliases_are_consulted_after_the_requested_name() {
    let headers = ["Student Number", "CGPA", "Citizenship"];
    let resolver = resolver();
    assert_eq!(resolver.resolve(SCORE, &headers).as_deref(), Some("CGPA"));
    assert_eq!(resolver.resolve("nationality", &headers).as_deref(), Some("Citizenship"));
    assert_eq!(resolver.resolve("tuition_revenue", &headers), None);
}

#[test]
fn configured_aliases_take_precedence() {
    let mut extra = BTreeMap::new();
    extra.insert("gpa".to_string(), vec!["term_average".to_string()]);
    let resolver = ColumnResolver::new(AliasTable::builtin().merged_with(&extra));
    let headers = ["grade_point_average", "term_average"];
    assert_eq!(resolver.resolve(SCORE, &headers).as_deref(), Some("term_average"));
}

proptest! {
    #[test]
    fn resolution_is_idempotent(
        requested in "[a-z_]{1,16}",
        headers in prop::collection::vec("[A-Za-z_ ]{1,16}", 0..8),
    ) {
        let actual = headers.iter().map(String::as_str).collect::<Vec<_>>();
        let resolver = resolver();
        let first = resolver.resolve(&requested, &actual);
        let second = resolver.resolve(&requested, &actual);
        prop_assert_eq!(&first, &second);
        if let Some(found) = first {
            prop_assert!(headers.contains(&found));
        }
    }
}
