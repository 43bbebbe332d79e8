use super::*;

#[test]
fn template_ids_carry_the_tpl_prefix() {
    let id = TemplateId::new();
    assert!(id.as_str().starts_with("tpl-"));
}

#[test]
fn param_type_serializes_lowercase() {
    let json = serde_json::to_string(&ParamType::Number).expect("serialize");
    assert_eq!(json, "\"number\"");
}
