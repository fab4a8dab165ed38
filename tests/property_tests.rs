//! Property-based tests using proptest

use futures::executor::block_on;
use futures::stream::{self, StreamExt};
use pipes_rs::{ConfNode, Context, Item, RegexOptions, pipe_regex, pipe_regex_async};
use proptest::prelude::*;
use serde_json::{Value, json};

#[derive(Debug, Clone)]
struct RuleDef {
    field: &'static str,
    pattern: String,
    replace: String,
    global: bool,
}

fn rule_strategy() -> impl Strategy<Value = RuleDef> {
    (
        prop::sample::select(vec!["a", "b"]),
        "[a-c]{1,2}",
        "[a-z]{0,3}",
        any::<bool>(),
    )
        .prop_map(|(field, pattern, replace, global)| RuleDef {
            field,
            pattern,
            replace,
            global,
        })
}

fn item_strategy() -> impl Strategy<Value = (String, String)> {
    ("[a-c ]{0,10}", "[a-c]{0,6}")
}

fn conf_for(rules: &[RuleDef]) -> ConfNode {
    let rules = rules
        .iter()
        .map(|r| {
            ConfNode::record([
                ("field", ConfNode::text(r.field)),
                ("match", ConfNode::text(r.pattern.clone())),
                ("replace", ConfNode::text(r.replace.clone())),
                ("globalmatch", ConfNode::text(if r.global { "1" } else { "" })),
            ])
        })
        .collect();
    ConfNode::record([("RULE", ConfNode::List(rules))])
}

fn items_for(values: &[(String, String)]) -> Vec<Item> {
    values
        .iter()
        .enumerate()
        .map(|(id, (a, b))| Item::from_value(json!({"id": id, "a": a, "b": b})))
        .collect()
}

fn run_sync(conf: &ConfNode, items: Vec<Item>, options: RegexOptions) -> Vec<Item> {
    pipe_regex(&Context::new(), items, conf, options)
        .unwrap()
        .collect::<pipes_rs::Result<_>>()
        .unwrap()
}

fn run_async(conf: &ConfNode, items: Vec<Item>, options: RegexOptions) -> Vec<Item> {
    block_on(async {
        pipe_regex_async(&Context::new(), stream::iter(items), conf, options)
            .await
            .unwrap()
            .map(|r| r.unwrap())
            .collect::<Vec<_>>()
            .await
    })
}

/// Reference fold for one field, straight on the regex crate.
fn expected_word(original: &str, field: &str, rules: &[RuleDef]) -> String {
    rules
        .iter()
        .filter(|r| r.field == field)
        .fold(original.to_string(), |word, r| {
            if word.is_empty() {
                return word;
            }
            let re = regex::Regex::new(&r.pattern).unwrap();
            let limit = if r.global { 0 } else { 1 };
            re.replacen(&word, limit, regex::NoExpand(&r.replace)).into_owned()
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn test_order_and_length_preserved(
        values in prop::collection::vec(item_strategy(), 0..12),
        rules in prop::collection::vec(rule_strategy(), 0..5)
    ) {
        let conf = conf_for(&rules);
        for out in [
            run_sync(&conf, items_for(&values), RegexOptions::default()),
            run_async(&conf, items_for(&values), RegexOptions::default()),
        ] {
            let ids: Vec<Value> = out.iter().map(|i| i.get("id", Value::Null)).collect();
            let expected: Vec<Value> = (0..values.len()).map(|n| json!(n)).collect();
            prop_assert_eq!(ids, expected);
        }
    }

    #[test]
    fn test_sync_async_equivalent(
        values in prop::collection::vec(item_strategy(), 0..12),
        rules in prop::collection::vec(rule_strategy(), 0..6)
    ) {
        let conf = conf_for(&rules);
        let sync = run_sync(&conf, items_for(&values), RegexOptions::default());
        let async_out = run_async(&conf, items_for(&values), RegexOptions::default());
        prop_assert_eq!(sync, async_out);
    }

    #[test]
    fn test_rules_fold_in_declaration_order(
        values in prop::collection::vec(item_strategy(), 1..6),
        rules in prop::collection::vec(rule_strategy(), 1..6)
    ) {
        let conf = conf_for(&rules);
        let out = run_sync(&conf, items_for(&values), RegexOptions::default());
        for (item, (a, b)) in out.iter().zip(&values) {
            if rules.iter().any(|r| r.field == "a") {
                prop_assert_eq!(item.get("a", Value::Null), json!(expected_word(a, "a", &rules)));
            }
            if rules.iter().any(|r| r.field == "b") {
                prop_assert_eq!(item.get("b", Value::Null), json!(expected_word(b, "b", &rules)));
            }
        }
    }

    #[test]
    fn test_empty_rules_identity(values in prop::collection::vec(item_strategy(), 0..12)) {
        let items = items_for(&values);
        let out = run_sync(&conf_for(&[]), items.clone(), RegexOptions::default());
        prop_assert_eq!(out, items);
    }

    #[test]
    fn test_bypassed_items_unchanged(
        values in prop::collection::vec(item_strategy(), 0..12),
        rules in prop::collection::vec(rule_strategy(), 0..5)
    ) {
        let items = items_for(&values);
        let conf = conf_for(&rules);
        let bypass_all = || RegexOptions::default().pass_if(|_: &Item| true);
        prop_assert_eq!(run_sync(&conf, items.clone(), bypass_all()), items.clone());
        prop_assert_eq!(run_async(&conf, items.clone(), bypass_all()), items);
    }
}
