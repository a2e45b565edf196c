use fjs_tooltip as fjst;
use fjst::{Context, DiagnosticKind, EvalError, EvalOptions};
use serde_json::json;

// Malformed expressions are diagnostics, not failures, whatever the mode.
#[test]
fn test_malformed_expression_is_a_diagnostic() {
    for opts in [EvalOptions::default(), EvalOptions::strict()] {
        let out = fjst::evaluate("Hi {{ name ( }}", &Context::new(), opts).unwrap();
        assert_eq!(out.text, "Hi {{ name ( }}");
        assert_eq!(out.diagnostics.len(), 1);
        assert_eq!(out.diagnostics[0].kind, DiagnosticKind::Syntax);
    }
}

#[test]
fn test_strict_missing_reference() {
    let err = fjst::evaluate("{{missing}}", &Context::new(), EvalOptions::strict()).unwrap_err();
    assert_eq!(err, EvalError::Unresolved("missing".into()));
    assert!(err.is_recoverable());

    let out = fjst::evaluate("a {{missing}} b", &Context::new(), EvalOptions::default()).unwrap();
    assert_eq!(out.text, "a  b");
    assert!(out.diagnostics.is_empty());
}

#[test]
fn test_contract_violations_are_distinguishable() {
    let err = fjst::render_tooltip(&json!({"type": "tooltip", "id": "t", "text": 7}), None, json!({}))
        .unwrap_err();
    assert!(matches!(err, EvalError::Contract(_)));
    assert!(!err.is_recoverable());

    let err = fjst::render_tooltip(&json!({"type": "tooltip", "id": "t"}), None, json!([1]))
        .unwrap_err();
    assert!(!err.is_recoverable());
}

// Runaway nesting is cut off with a syntax diagnostic instead of recursing.
#[test]
fn test_deeply_nested_expression_is_a_diagnostic() {
    let template = format!("{{{{{}}}}}", "(".repeat(5_000));
    for opts in [EvalOptions::default(), EvalOptions::strict()] {
        let out = fjst::evaluate(&template, &Context::new(), opts).unwrap();
        assert_eq!(out.text, template);
        assert_eq!(out.diagnostics.len(), 1);
        assert_eq!(out.diagnostics[0].kind, DiagnosticKind::Syntax);
        assert!(out.diagnostics[0].message.contains("nested too deeply"));
    }
}

#[test]
fn test_deeply_nested_blocks_still_render() {
    let template = format!("{}x{}", "{{#if true}}".repeat(5_000), "{{/if}}".repeat(5_000));
    let out = fjst::Pipeline::default().run(&template, &Context::new(), EvalOptions::default());
    assert!(!out.failed);
    assert!(out.content.as_str().contains('x'));
    assert!(!out.diagnostics.is_empty());
    assert!(out.diagnostics.iter().all(|d| d.kind == DiagnosticKind::Syntax));
}
