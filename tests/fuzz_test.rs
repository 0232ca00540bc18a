//! Randomized tests for named-parameter translation.
//!
//! Templates are assembled from random pieces (parameters, string literals,
//! comments, casts and plain words) so the expected arguments are known up front.

use dbscope::db::translator::{find_parameters, translate};
use dbscope::error::DbError;
use dbscope::models::{NamedArgs, SqlValue};
use rand::Rng;
use rand::distributions::Alphanumeric;

/// Generate random string of given length
fn random_string(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Generate a parameter name: a letter followed by word characters.
fn random_name() -> String {
    let mut rng = rand::thread_rng();
    let first = (b'a' + rng.gen_range(0..26)) as char;
    let rest_len = rng.gen_range(0..8);
    let mut name = first.to_string();
    for _ in 0..rest_len {
        let c = match rng.gen_range(0..3) {
            0 => '_',
            1 => (b'0' + rng.gen_range(0..10)) as char,
            _ => (b'a' + rng.gen_range(0..26)) as char,
        };
        name.push(c);
    }
    name
}

/// A random template and the parameter names it references, in order.
fn random_template(names: &[String]) -> (String, Vec<String>) {
    let mut rng = rand::thread_rng();
    let mut pieces = Vec::new();
    let mut expected = Vec::new();

    for _ in 0..rng.gen_range(1..20) {
        match rng.gen_range(0..7) {
            0 | 1 => {
                let name = names[rng.gen_range(0..names.len())].clone();
                pieces.push(format!(":{}", name));
                expected.push(name);
            }
            2 => pieces.push(format!("'{} :{}'", random_string(4), random_name())),
            3 => pieces.push(format!("-- :{}\n", random_name())),
            4 => pieces.push(format!("/* :{} */", random_name())),
            5 => pieces.push(format!("col::{}", random_string(3))),
            _ => pieces.push(random_string(rng.gen_range(1..8))),
        }
    }

    (pieces.join(" "), expected)
}

/// Generate various edge-case strings
fn edge_case_strings() -> Vec<String> {
    vec![
        String::new(),
        ":".to_string(),
        "::".to_string(),
        ":::a".to_string(),
        "'".to_string(),
        "'unterminated :a".to_string(),
        "/* unterminated :a".to_string(),
        "-- :a".to_string(),
        "$".to_string(),
        "$$ :a".to_string(),
        "$tag$ :a $other$".to_string(),
        "\"".to_string(),
        "`:a".to_string(),
        "\\".to_string(),
        "'\\".to_string(),
        "日本:語".to_string(),
        ":ü".to_string(),
        "üöÄ".repeat(100),
        "'OR 1=1--".to_string(),
        "a".repeat(10000),
        ":a".repeat(1000),
        random_string(1000),
        "\u{0000}\u{FFFF}".to_string(),
    ]
}

#[test]
fn fuzz_translate_matches_expected_arguments() {
    for _ in 0..500 {
        let names: Vec<String> = (0..rand::thread_rng().gen_range(1..5))
            .map(|_| random_name())
            .collect();
        let args: NamedArgs = names
            .iter()
            .map(|n| (n.clone(), SqlValue::String(n.clone())))
            .collect();
        let (template, expected) = random_template(&names);

        let translated = translate(&template, &args, |_, i| format!("${}", i + 1))
            .unwrap_or_else(|e| panic!("template {template:?} failed: {e}"));

        let bound: Vec<String> = translated
            .args
            .iter()
            .map(|v| match v {
                SqlValue::String(s) => s.clone(),
                other => panic!("unexpected value {other:?}"),
            })
            .collect();
        assert_eq!(bound, expected, "template: {template:?}");

        for i in 1..=expected.len() {
            assert!(
                translated.sql.contains(&format!("${}", i)),
                "missing placeholder ${i} in {:?}",
                translated.sql
            );
        }
    }
}

#[test]
fn fuzz_translate_reports_missing_parameter() {
    for _ in 0..200 {
        let names = vec![random_name(), random_name()];
        let (template, expected) = random_template(&names);
        let Some(first) = expected.first() else {
            continue;
        };

        // Provide every name except the first one referenced
        let args: NamedArgs = names
            .iter()
            .filter(|n| *n != first)
            .map(|n| (n.clone(), SqlValue::Null))
            .collect();

        match translate(&template, &args, |_, _| "?".to_string()) {
            Err(DbError::MissingParameter { name }) => assert_eq!(&name, first),
            other => panic!("template {template:?}: expected missing parameter, got {other:?}"),
        }
    }
}

#[test]
fn fuzz_edge_cases_never_panic() {
    let args: NamedArgs = [("a", SqlValue::Int(1))].into_iter().collect();
    for template in edge_case_strings() {
        let tokens = find_parameters(&template);
        for token in &tokens {
            assert!(template.is_char_boundary(token.span.start));
            assert!(template.is_char_boundary(token.span.end));
        }
        // Either translates or reports a missing name; never panics
        let _ = translate(&template, &args, |_, _| "?".to_string());
    }
}

#[test]
fn fuzz_templates_without_parameters_pass_through() {
    for _ in 0..200 {
        let template = format!(
            "SELECT '{}', \"{}\" -- :{}\n/* :{} */ FROM t WHERE c::text = x",
            random_string(10),
            random_string(5),
            random_name(),
            random_name()
        );
        let translated = translate(&template, &NamedArgs::new(), |_, _| "?".to_string()).unwrap();
        assert_eq!(translated.sql, template);
        assert!(translated.args.is_empty());
    }
}
