use academicd::api::{ApiError, FormsApi, HttpFormsApi};
use academicd::config::BackendConfig;
use academicd::forms::{FieldValue, FormValues};
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(base: String) -> HttpFormsApi {
    HttpFormsApi::new(&BackendConfig {
        api_base_url: base,
        timeout_secs: 5,
        ..BackendConfig::default()
    })
    .expect("http client")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn fetch_template_accepts_data_envelope_and_bare_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/form-template/tpl-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "_id": "tpl-1",
                "title": "Leave",
                "sections": [{ "id": "s", "fields": [
                    { "key": "fullName", "label": "Full name", "type": "text", "required": true }
                ]}]
            }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/form-instance"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "_id": "inst-1", "templateId": "tpl-1", "responses": { "fullName": "Bao" },
              "approved": { "approveStatus": "pending" } },
            { "_id": "inst-2", "templateId": "tpl-1", "approved": { "approveStatus": "rejected" } }
        ])))
        .mount(&server)
        .await;

    let base = server.uri();
    let (template, instances) = tokio::task::spawn_blocking(move || {
        let api = client(base);
        let template = api.fetch_template("tpl-1").expect("template");
        let instances = api.list_instances().expect("instances");
        (template, instances)
    })
    .await
    .expect("join");

    assert_eq!(template.id, "tpl-1");
    assert_eq!(template.fields().count(), 1);
    assert_eq!(instances.len(), 2);
    assert!(instances[0].is_pending());
    assert!(!instances[1].is_pending());
    assert_eq!(
        instances[0].responses.get("fullName"),
        Some(&FieldValue::Text("Bao".into()))
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn create_update_and_attach_send_expected_requests() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/form-instance"))
        .and(body_partial_json(json!({
            "templateId": "tpl-1",
            "responses": { "subjects": "Math,Physics" }
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "data": { "_id": "inst-9", "templateId": "tpl-1" }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/form-instance/inst-9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "_id": "inst-9" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/form-instance/inst-9/signature"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .expect(1)
        .mount(&server)
        .await;

    let base = server.uri();
    tokio::task::spawn_blocking(move || {
        let api = client(base);
        let responses: FormValues = [(
            "subjects".to_string(),
            FieldValue::Text("Math,Physics".into()),
        )]
        .into_iter()
        .collect();
        let created = api.create_instance("tpl-1", &responses).expect("create");
        assert_eq!(created.id, "inst-9");
        let updated = api
            .update_instance("inst-9", "tpl-1", &responses)
            .expect("update");
        assert_eq!(updated.id, "inst-9");
        api.attach_signature("inst-9", "studentSignature", b"\x89PNG\r\n\x1a\nink")
            .expect("attach");
    })
    .await
    .expect("join");

    let requests = server.received_requests().await.expect("recorded requests");
    let attach = requests
        .iter()
        .find(|r| r.url.path().ends_with("/signature"))
        .expect("signature request");
    let body = String::from_utf8_lossy(&attach.body);
    assert!(body.contains("name=\"keyInsert\""));
    assert!(body.contains("studentSignature"));
    assert!(body.contains("name=\"insertSignature\""));
    assert!(body.contains("image/png"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn rejection_carries_backend_message() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/api/form-instance/inst-3"))
        .respond_with(
            ResponseTemplate::new(409).set_body_json(json!({ "message": "Form already approved" })),
        )
        .mount(&server)
        .await;

    let base = server.uri();
    let err = tokio::task::spawn_blocking(move || client(base).delete_instance("inst-3"))
        .await
        .expect("join")
        .expect_err("delete must fail");
    match err {
        ApiError::Rejected { status, message } => {
            assert_eq!(status, 409);
            assert_eq!(message, "Form already approved");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}
