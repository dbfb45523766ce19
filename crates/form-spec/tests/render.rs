use serde_json::json;

use form_spec::{
    FieldInput, Form, FormConfiguration, RegistryOptions, RendererRegistry, StaticOfferedCountries,
    render_json_ui, render_text, value_map,
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

#[test]
fn render_json_ui_exposes_structure() {
    let form = Form::new(student_contact());
    let ui = render_json_ui(&form.render().expect("render"));

    assert_eq!(ui["id"], "student-contact");
    assert_eq!(ui["title"], "Student contact");
    let controls = ui["controls"].as_array().expect("controls array");
    let names: Vec<_> = controls
        .iter()
        .filter_map(|control| control["name"].as_str())
        .collect();
    assert_eq!(names.first(), Some(&"first_name"));
    assert!(!names.contains(&"state_id"));
    assert!(!names.contains(&"english_score"));

    assert_eq!(controls[0]["cols"], 3);
    assert_eq!(controls[0]["widget"], "input");
    assert_eq!(controls[0]["binding"], "registered");
    let mobile = controls
        .iter()
        .find(|control| control["name"] == "mobile")
        .expect("mobile");
    assert_eq!(mobile["binding"], "controlled");
    assert_eq!(mobile["widget"], "phone_input");
    let website = controls
        .iter()
        .find(|control| control["name"] == "website")
        .expect("website");
    assert_eq!(website["cols"], 6);
    assert_eq!(website["input_type"], "url");
}

#[test]
fn conditional_controls_appear_in_declared_order() {
    let mut form = Form::new(student_contact());
    form.input("country_id", FieldInput::Select("ca".into()))
        .expect("input");
    let rendered = form.render().expect("render");
    let names: Vec<_> = rendered
        .controls
        .iter()
        .map(|control| control.name.as_str())
        .collect();
    let country = names.iter().position(|name| *name == "country_id");
    let state = names.iter().position(|name| *name == "state_id");
    assert_eq!(state, country.map(|index| index + 1));
}

#[test]
fn errors_show_on_controls_after_submit() {
    let mut form = Form::new(student_contact());
    let _ = form.submit(|_| ());
    let rendered = form.render().expect("render");
    let first = rendered.control("first_name").expect("first name");
    assert_eq!(first.error.as_deref(), Some("First name is required"));

    let text = render_text(&rendered);
    assert!(text.contains("Form: Student contact (student-contact)"));
    assert!(text.contains("! First name is required"));
}

#[test]
fn render_text_lists_options_and_states() {
    let initial = value_map(&json!({ "intakes": ["jul"], "english_test": "ielts" }));
    let form = Form::with_initial_values(student_contact(), &initial);
    let text = render_text(&form.render().expect("render"));

    assert!(text.contains("intakes (Intakes) <multi-checkbox> [required] = jul"));
    assert!(text.contains("[ ] February, [x] July, [ ] November"));
    assert!(text.contains("english_score (Overall band) <number> [required]"));
    assert!(text.contains("Overall score as printed on the test report form."));
    assert!(text.contains("counsellor_id (Counsellor) <relation> [disabled]"));
    assert!(text.contains("Loading..."));
}

#[test]
fn read_only_form_disables_every_control() {
    let mut config = student_contact();
    config.disabled = true;
    let mut form = Form::new(config);
    let rendered = form.render().expect("render");
    assert!(rendered.controls.iter().all(|control| control.disabled));
    assert!(render_text(&rendered).contains("Read-only"));
    assert!(form.input("first_name", FieldInput::Text("x".into())).is_err());
}

#[test]
fn custom_registry_drives_preferred_country() {
    let registry = RendererRegistry::with_defaults(RegistryOptions {
        offered_countries: Some(StaticOfferedCountries::from_codes(["CA", "GB"]).shared()),
        image_base_url: None,
    });
    let form = Form::new(student_contact()).with_registry(registry);
    let ui = render_json_ui(&form.render().expect("render"));
    let preferred = ui["controls"]
        .as_array()
        .expect("controls")
        .iter()
        .find(|control| control["name"] == "preferred_destination")
        .cloned()
        .expect("preferred");
    let labels: Vec<_> = preferred["options"]
        .as_array()
        .expect("options")
        .iter()
        .filter_map(|option| option["label"].as_str())
        .collect();
    assert_eq!(labels, vec!["Canada", "United Kingdom"]);
    assert!(preferred["options"][0]["flag"].is_string());
}
