use pretty_assertions::assert_eq;
use serde_json::{Value, json};

use form_spec::{
    FieldDescriptor, FieldInput, FieldType, Form, FormConfiguration, Notification, SubmitError,
    submit_values, value_map,
};

fn fixture(name: &str) -> &'static str {
    match name {
        "student_contact" => include_str!("../tests/fixtures/student_contact.json"),
        _ => panic!("unknown fixture {}", name),
    }
}

fn student_contact() -> FormConfiguration {
    serde_json::from_str(fixture("student_contact")).expect("deserialize")
}

fn fill_required(form: &mut Form) {
    let inputs = [
        ("first_name", FieldInput::Text("Asha".into())),
        ("last_name", FieldInput::Text("Rai".into())),
        ("email", FieldInput::Text("asha@example.com".into())),
        ("mobile", FieldInput::Phone("+977 980-000 0000".into())),
        ("nationality", FieldInput::Select("NP".into())),
        ("country_id", FieldInput::Select("au".into())),
        ("visa_refused", FieldInput::Select("no".into())),
        ("intakes", FieldInput::Toggle("feb".into())),
    ];
    for (name, input) in inputs {
        form.input(name, input).expect(name);
    }
}

#[test]
fn fixture_passes_configuration_check() {
    let issues = student_contact().check();
    assert!(issues.iter().all(|issue| !issue.is_error()), "{:?}", issues);
}

#[test]
fn filled_contact_form_submits_coerced_values() {
    let mut form = Form::new(student_contact());
    fill_required(&mut form);
    form.input("english_test", FieldInput::Select("ielts".into()))
        .expect("english test");
    form.input("english_score", FieldInput::Text("7".into()))
        .expect("score");

    let values = form.submit(|values| values).expect("submits");
    assert_eq!(values["english_score"], json!(7));
    assert_eq!(values["mobile"], json!("+9779800000000"));
    assert_eq!(values["intakes"], json!(["feb"]));
    assert_eq!(values["state_id"], json!(""));
    assert_eq!(values["photo"], Value::Null);
    assert!(form.state().errors().is_empty());
}

#[test]
fn non_numeric_number_blocks_submission() {
    let config = FormConfiguration::new(vec![FieldDescriptor::new(
        "budget",
        "Budget",
        FieldType::Number,
    )]);
    let err = submit_values(config.clone(), &value_map(&json!({ "budget": "abc" })))
        .expect_err("blocked");
    assert_eq!(err.errors().get("budget"), Some("Invalid number"));

    let values = submit_values(config, &value_map(&json!({ "budget": "42" }))).expect("submits");
    assert_eq!(values["budget"], json!(42));
    assert!(values["budget"].is_i64());
}

#[test]
fn visible_conditional_number_is_still_type_checked() {
    let mut form = Form::new(student_contact());
    fill_required(&mut form);
    form.input("english_test", FieldInput::Select("pte".into()))
        .expect("english test");
    form.input("english_score", FieldInput::Text("seventy".into()))
        .expect("score");
    let err = form.submit(|_| ()).expect_err("blocked");
    assert!(matches!(err, SubmitError::Invalid(_)));
    assert_eq!(form.state().error("english_score"), Some("Invalid number"));
}

#[test]
fn hidden_conditional_fields_contribute_no_errors() {
    let mut form = Form::new(student_contact());
    fill_required(&mut form);
    let values = form.submit(|values| values).expect("submits");
    assert_eq!(values["refusal_details"], json!(""));
    assert_eq!(values["relative_country"], json!(""));
}

#[test]
fn visible_required_conditional_fields_block_submission() {
    let mut form = Form::new(student_contact());
    fill_required(&mut form);
    form.input("visa_refused", FieldInput::Select("yes".into()))
        .expect("refused");
    form.input("has_relatives", FieldInput::Select("yes".into()))
        .expect("relatives");

    let err = form.submit(|_| ()).expect_err("blocked");
    assert_eq!(err.phase(), "conditional");
    assert_eq!(
        err.errors().get("refusal_details"),
        Some("Refusal details is required")
    );
    assert_eq!(
        err.errors().get("relative_country"),
        Some("Relative's country is required")
    );
    assert_eq!(err.errors().len(), 2);
}

fn alternate_phone() -> FormConfiguration {
    FormConfiguration::new(vec![
        FieldDescriptor::new("has_alt", "Alternate number", FieldType::Radio)
            .with_options([("Yes", "yes"), ("No", "no")]),
        FieldDescriptor::new("alt_phone", "Alternate phone", FieldType::Phone)
            .required()
            .with_condition("has_alt == 'yes'"),
    ])
}

#[test]
fn punctuation_only_conditional_phone_is_still_missing() {
    for typed in ["-", "()", ".", " - "] {
        let mut form = Form::new(alternate_phone());
        form.input("has_alt", FieldInput::Select("yes".into()))
            .expect("has alt");
        form.input("alt_phone", FieldInput::Phone(typed.into()))
            .expect("phone");

        let err = form.submit(|_| ()).expect_err(typed);
        assert_eq!(err.phase(), "conditional");
        assert_eq!(
            err.errors().get("alt_phone"),
            Some("Alternate phone is required")
        );
    }
}

#[test]
fn zero_satisfies_a_conditional_requirement() {
    let config = FormConfiguration::new(vec![
        FieldDescriptor::new("sat_test", "Sat a test", FieldType::Radio)
            .with_options([("Yes", "yes"), ("No", "no")]),
        FieldDescriptor::new("attempts", "Attempts", FieldType::Number)
            .required()
            .with_condition("sat_test == 'yes'"),
    ]);
    let values = submit_values(config, &value_map(&json!({ "sat_test": "yes", "attempts": "0" })))
        .expect("zero is an answer");
    assert_eq!(values["attempts"], json!(0));
}

#[test]
fn blank_string_for_optional_list_submits_as_empty_list() {
    let config = FormConfiguration::new(vec![
        FieldDescriptor::new("intakes", "Intakes", FieldType::MultiCheckbox)
            .with_options([("Feb", "feb")]),
    ]);
    let values = submit_values(config, &value_map(&json!({ "intakes": "" }))).expect("submits");
    assert_eq!(values["intakes"], json!([]));
}

#[test]
fn country_state_scenario() {
    let config: FormConfiguration = serde_json::from_value(json!({
        "fields": [
            { "name": "country_id", "label": "Country", "type": "select", "required": true,
              "options": [{ "label": "Canada", "value": "ca" }] },
            { "name": "state_id", "label": "State", "type": "select", "required": true,
              "renderingCondition": "country_id == 'ca'" }
        ]
    }))
    .expect("config");

    let err = submit_values(config.clone(), &value_map(&json!({}))).expect_err("unset country");
    assert!(err.errors().get("state_id").is_none());

    let err = submit_values(config, &value_map(&json!({ "country_id": "ca" })))
        .expect_err("missing state");
    assert_eq!(err.errors().len(), 1);
    assert_eq!(err.errors().get("state_id"), Some("State is required"));
}

#[test]
fn optional_only_form_submits_empty_values() {
    let config = FormConfiguration::new(vec![
        FieldDescriptor::new("nickname", "Nickname", FieldType::Text),
        FieldDescriptor::new("score", "Score", FieldType::Number),
        FieldDescriptor::new("intakes", "Intakes", FieldType::MultiCheckbox)
            .with_options([("Feb", "feb")]),
        FieldDescriptor::new("dob", "Date of birth", FieldType::Date),
        FieldDescriptor::new("mobile", "Mobile", FieldType::Phone),
    ]);
    let mut form = Form::new(config);
    let values = form.submit(|values| values).expect("submits");
    assert_eq!(
        Value::Object(values),
        json!({
            "nickname": "",
            "score": null,
            "intakes": [],
            "dob": null,
            "mobile": ""
        })
    );
}

#[test]
fn min_checked_two_requires_two_selections() {
    let mut field = FieldDescriptor::new("documents", "Documents", FieldType::MultiCheckbox)
        .required()
        .with_options([("Passport", "passport"), ("Transcript", "transcript"), ("CV", "cv")]);
    field.min_checked = Some(2);
    let mut form = Form::new(FormConfiguration::new(vec![field]));

    form.input("documents", FieldInput::Toggle("passport".into()))
        .expect("toggle");
    let err = form.submit(|_| ()).expect_err("one selection");
    assert_eq!(
        err.errors().get("documents"),
        Some("Select at least 2 option(s) for Documents")
    );

    form.input("documents", FieldInput::Toggle("cv".into()))
        .expect("toggle");
    let values = form.submit(|values| values).expect("two selections");
    assert_eq!(values["documents"], json!(["passport", "cv"]));
}

#[test]
fn attempt_submission_warns_without_touching_errors() {
    let mut form = Form::new(student_contact());
    form.input("english_test", FieldInput::Select("ielts".into()))
        .expect("english test");
    let notices = form.attempt_submission();
    assert_eq!(
        notices,
        vec![Notification {
            field: "english_score".into(),
            message: "Overall band is required".into(),
        }]
    );
    assert!(form.state().errors().is_empty());
}

#[test]
fn edit_mode_values_seed_the_form() {
    let initial = value_map(&json!({
        "first_name": "Asha",
        "country_id": "ca",
        "relatives": [{ "country": "AU" }]
    }));
    let form = Form::with_initial_values(student_contact(), &initial);
    let visible: Vec<_> = form.visible_fields().map(|field| field.name.as_str()).collect();
    assert!(visible.contains(&"state_id"));
    assert!(!form.state().is_form_dirty());
    assert_eq!(form.values()["first_name"], json!("Asha"));
}

#[test]
fn reset_restores_mounted_values() {
    let mut form = Form::new(student_contact());
    fill_required(&mut form);
    assert!(form.state().is_form_dirty());
    form.reset();
    assert!(!form.state().is_form_dirty());
    assert_eq!(form.values()["first_name"], json!(""));
}
