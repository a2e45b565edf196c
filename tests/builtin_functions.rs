use fjs_tooltip as fjst;
use fjst::{Context, EvalOptions};
use pretty_assertions::assert_eq;
use serde_json::json;

fn eval(template: &str, data: serde_json::Value) -> String {
    let ctx = Context::from_value(data).unwrap();
    fjst::evaluate(template, &ctx, EvalOptions::strict()).unwrap().text
}

#[test]
fn test_string_functions() {
    assert_eq!(eval("{{ upper(name) }}/{{ lower('AbC') }}/{{ trim(pad) }}", json!({"name": "ann", "pad": "  x "})), "ANN/abc/x");
}

#[test]
fn test_list_functions() {
    let data = json!({"tags": ["b", "a", "b"]});
    assert_eq!(eval("{{ join(unique(tags), ' + ') }}", data.clone()), "b + a");
    assert_eq!(eval("{{ length(tags) }} {{ first(tags) }}", data.clone()), "3 b");
    assert_eq!(eval("{{#if contains(tags, 'a')}}has a{{/if}}", data), "has a");
}

#[test]
fn test_or_default() {
    assert_eq!(eval("{{ or_default(nick, 'anonymous') }}", json!({"nick": null})), "anonymous");
    assert_eq!(eval("{{ or_default(nick, 'anonymous') }}", json!({"nick": "z"})), "z");
}

#[test]
fn test_ambient_variables() {
    let ctx = Context::from_value(json!({"name": "Ann"}))
        .unwrap()
        .with_variable("today", json!("Monday"));
    let out = fjst::evaluate("{{name}}, today is {{today}}", &ctx, EvalOptions::strict()).unwrap();
    assert_eq!(out.text, "Ann, today is Monday");
}

#[test]
fn test_nested_loops_and_conditions() {
    let data = json!({
        "teams": [
            {"name": "Core", "members": [{"name": "Alice", "lead": true}, {"name": "Bob", "lead": false}]},
            {"name": "Web", "members": [{"name": "Carol", "lead": false}]}
        ]
    });
    let template = "{{#loop teams}}{{name}}:{{#loop members}} {{name}}{{#if lead}}*{{/if}}{{/loop}};{{/loop}}";
    assert_eq!(eval(template, data), "Core: Alice* Bob;Web: Carol;");
}
