use std::collections::BTreeMap;

use csv_insights::parser::{Strategy, parse_structured, parse_with_strategy, string_field};
use proptest::prelude::*;
use serde_json::{Value, json};

#[test]
fn fenced_insight_reply_is_recovered() {
    let reply = "```json\n{\"insight\": \"x\"}\n```";
    assert_eq!(parse_structured(reply), Some(json!({"insight": "x"})));
    let (strategy, _) = parse_with_strategy(reply).expect("parsed");
    assert_eq!(strategy, Strategy::Unfenced);
}

#[test]
fn chatty_reply_with_comments_and_trailing_comma() {
    let reply = "Sure! Here is the analysis:\n{\n  // cause first\n  \"root_cause\": \"late fees\",\n  \"impact\": \"fewer enrolments\",\n}\nLet me know if you need more.";
    let (strategy, value) = parse_with_strategy(reply).expect("parsed");
    assert_eq!(strategy, Strategy::TrailingCommaTolerant);
    assert_eq!(string_field(&value, "impact").as_deref(), Some("fewer enrolments"));
}

#[test]
fn bare_keys_need_the_last_strategy() {
    let reply = "{action: \"call students\", expected_outcome: \"retention\"}";
    let (strategy, value) = parse_with_strategy(reply).expect("parsed");
    assert_eq!(strategy, Strategy::BraceSpanRepair);
    assert_eq!(string_field(&value, "action").as_deref(), Some("call students"));
}

#[test]
fn prose_without_structure_is_not_an_error() {
    assert_eq!(parse_structured("I could not analyse this chart."), None);
    assert_eq!(parse_structured(""), None);
}

proptest! {
    #[test]
    fn wrapped_objects_round_trip(
        fields in prop::collection::btree_map("[a-z_]{1,8}", "[A-Za-z0-9 .,]{0,20}", 1..6),
        prefix in "[A-Za-z ]{0,30}",
        fenced in any::<bool>(),
    ) {
        let expected = Value::Object(
            fields
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect(),
        );
        let body = serde_json::to_string_pretty(&expected).unwrap();
        let text = if fenced {
            format!("{prefix}\n```json\n{body}\n```\n")
        } else {
            format!("{prefix}\n{body}\nThanks")
        };
        prop_assert_eq!(parse_structured(&text), Some(expected));
    }

    #[test]
    fn direct_json_always_wins_first(
        fields in prop::collection::btree_map("[a-z]{1,6}", 0i64..1000, 1..5),
    ) {
        let map = fields.into_iter().collect::<BTreeMap<_, _>>();
        let text = serde_json::to_string(&map).unwrap();
        let (strategy, _) = parse_with_strategy(&text).expect("parsed");
        prop_assert_eq!(strategy, Strategy::Direct);
    }
}
