use std::collections::BTreeMap;

use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use form_spec::{
    CachedOptionSource, FieldDescriptor, FieldInput, FieldType, Form, FormConfiguration,
    HttpOptionSource, HttpSourceConfig, OptionSource, RelationRequest, RelationStatus,
    ResolveError, resolve_options,
};

fn source_for(server: &MockServer) -> HttpOptionSource {
    HttpOptionSource::new(HttpSourceConfig {
        base_url: Some(server.uri()),
        ..Default::default()
    })
    .expect("client")
}

fn request(endpoint: &str) -> RelationRequest {
    let field = FieldDescriptor::new("course_id", "Course", FieldType::Relation).with_endpoint(endpoint);
    RelationRequest::from_field(&field).expect("endpoint")
}

#[tokio::test]
async fn data_wrapped_payload_normalizes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/courses"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "data": [{ "id": "1", "name": "A" }] })),
        )
        .mount(&server)
        .await;

    let options = resolve_options(&source_for(&server), &request("/courses")).await;
    assert_eq!(options.len(), 1);
    assert_eq!(options[0].label, "A");
    assert_eq!(options[0].value, "1");
}

#[tokio::test]
async fn failing_endpoint_resolves_to_no_options() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/courses"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let options = resolve_options(&source_for(&server), &request("/courses")).await;
    assert!(options.is_empty());
}

#[tokio::test]
async fn non_json_body_resolves_to_no_options() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/courses"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let options = resolve_options(&source_for(&server), &request("/courses")).await;
    assert!(options.is_empty());
}

#[tokio::test]
async fn query_params_and_token_are_sent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/universities"))
        .and(query_param("country", "AU"))
        .and(header("Authorization", "Bearer s3cret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "uuid": "u-1", "title": "Monash" },
            { "uuid": "u-2", "title": "Deakin" }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let source = HttpOptionSource::new(HttpSourceConfig {
        base_url: Some(format!("{}/", server.uri())),
        bearer_token: Some("s3cret".into()),
        ..Default::default()
    })
    .expect("client");
    let mut field = FieldDescriptor::new("university", "University", FieldType::Relation)
        .with_endpoint("/api/universities");
    field.query_params.insert("country".into(), "AU".into());
    field.label_field = Some("title".into());
    field.value_field = Some("uuid".into());

    let request = RelationRequest::from_field(&field).expect("endpoint");
    let options = resolve_options(&source, &request).await;
    let labels: Vec<_> = options.iter().map(|option| option.label.as_str()).collect();
    assert_eq!(labels, vec!["Monash", "Deakin"]);
    assert_eq!(options[1].value, "u-2");
}

#[tokio::test]
async fn endpoints_outside_allow_list_are_refused() {
    let server = MockServer::start().await;
    let source = HttpOptionSource::new(HttpSourceConfig {
        base_url: Some(server.uri()),
        allowed_endpoints: vec!["/api/*".into()],
        ..Default::default()
    })
    .expect("client");

    let err = source
        .fetch("/admin/users", &BTreeMap::new())
        .await
        .expect_err("refused");
    assert!(matches!(err, ResolveError::NotAllowed(_)));
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
}

#[tokio::test]
async fn relative_endpoint_without_base_url_errors() {
    let source = HttpOptionSource::new(HttpSourceConfig::default()).expect("client");
    let err = source
        .fetch("/courses", &BTreeMap::new())
        .await
        .expect_err("no base");
    assert!(matches!(err, ResolveError::NoBaseUrl(_)));
}

#[tokio::test]
async fn cache_serves_repeat_requests() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/intakes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": 1, "name": "Feb" }])))
        .expect(2)
        .mount(&server)
        .await;

    let cached = CachedOptionSource::new(source_for(&server));
    let query = BTreeMap::new();
    cached.fetch("/intakes", &query).await.expect("first");
    cached.fetch("/intakes", &query).await.expect("cached");
    assert_eq!(cached.len(), 1);

    cached.invalidate("/intakes");
    assert!(cached.is_empty());
    cached.fetch("/intakes", &query).await.expect("refetched");
}

#[tokio::test]
async fn form_loads_relation_options() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/counsellors"))
        .and(query_param("branch", "ktm"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{ "id": 5, "full_name": "Mina Gurung" }]
        })))
        .mount(&server)
        .await;

    let config: FormConfiguration =
        serde_json::from_str(include_str!("../tests/fixtures/student_contact.json"))
            .expect("fixture");
    let mut form = Form::new(config);
    assert_eq!(form.pending_fetches().len(), 1);
    assert_eq!(
        form.input("counsellor_id", FieldInput::Select("5".into())),
        Err(form_spec::FormError::Disabled("counsellor_id".into()))
    );

    form.load_relations(&source_for(&server)).await;
    assert!(form.pending_fetches().is_empty());
    let controller = form.relation("counsellor_id").expect("controller");
    match controller.status() {
        RelationStatus::Ready { options } => {
            assert_eq!(options[0].label, "Mina Gurung");
            assert_eq!(options[0].value, "5");
        }
        other => panic!("unexpected status {:?}", other),
    }

    form.input("counsellor_id", FieldInput::Select("5".into()))
        .expect("selectable once loaded");
    assert_eq!(form.values()["counsellor_id"], json!("5"));
}

#[tokio::test]
async fn hidden_relation_never_fetches() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;

    let config = FormConfiguration::new(vec![
        FieldDescriptor::new("needs_course", "Needs course", FieldType::Radio)
            .with_options([("Yes", "yes"), ("No", "no")]),
        FieldDescriptor::new("course_id", "Course", FieldType::Relation)
            .with_endpoint("/courses")
            .with_condition("needs_course == 'yes'"),
    ]);
    let mut form = Form::new(config);
    form.load_relations(&source_for(&server)).await;
    assert_eq!(
        form.relation("course_id").map(|relation| relation.status().clone()),
        Some(RelationStatus::Unmounted)
    );
}
