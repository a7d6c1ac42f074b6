use std::sync::Arc;

use reqwest::StatusCode;
use serde_json::{Value, json};

use goods_api::app::{build_app, services};
use goods_infra::Settings;
use goods_infra::workers::WorkerHandle;

struct TestServer {
    base_url: String,
    client: reqwest::Client,
    handle: tokio::task::JoinHandle<()>,
    _audit_worker: WorkerHandle,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod, in-memory wiring, ephemeral port.
        let services = Arc::new(services::build_in_memory_services(&Settings::default()));
        let audit_worker = services.spawn_audit_worker().expect("audit subscription");
        let app = build_app(services);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            client: reqwest::Client::new(),
            handle,
            _audit_worker: audit_worker,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.base_url, path)
    }

    async fn create(&self, project_id: i64, name: &str) -> Value {
        let res = self
            .client
            .post(self.url(&format!("/good/create?projectId={project_id}")))
            .json(&json!({ "name": name, "description": "" }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
        res.json().await.unwrap()
    }

    async fn get(&self, id: &Value, project_id: i64) -> reqwest::Response {
        self.client
            .get(self.url(&format!("/goods?id={id}&projectId={project_id}")))
            .send()
            .await
            .unwrap()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn assert_error(res: reqwest::Response, status: StatusCode, code: u64) -> Value {
    assert_eq!(res.status(), status);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["code"], code);
    assert_eq!(body["details"], json!({}));
    body
}

#[tokio::test]
async fn health_is_public() {
    let srv = TestServer::spawn().await;
    let res = srv
        .client
        .get(format!("{}/health", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn create_assigns_increasing_priorities_and_get_returns_the_good() {
    let srv = TestServer::spawn().await;

    let first = srv.create(1, "first").await;
    let second = srv.create(1, "second").await;
    assert_eq!(first["priority"], 1);
    assert_eq!(second["priority"], 2);
    assert_eq!(first["projectId"], 1);
    assert_eq!(first["removed"], false);

    let res = srv.get(&second["id"], 1).await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["name"], "second");

    // Wrong project is indistinguishable from a missing good.
    assert_error(srv.get(&second["id"], 2).await, StatusCode::NOT_FOUND, 3).await;
}

#[tokio::test]
async fn invalid_input_is_rejected_with_code_4() {
    let srv = TestServer::spawn().await;

    let missing_project = srv
        .client
        .post(srv.url("/good/create"))
        .json(&json!({ "name": "x" }))
        .send()
        .await
        .unwrap();
    let body = assert_error(missing_project, StatusCode::BAD_REQUEST, 4).await;
    assert_eq!(body["message"], "Invalid project ID");

    let empty_name = srv
        .client
        .post(srv.url("/good/create?projectId=1"))
        .json(&json!({ "name": "  " }))
        .send()
        .await
        .unwrap();
    assert_error(empty_name, StatusCode::BAD_REQUEST, 4).await;

    let bad_payload = srv
        .client
        .post(srv.url("/good/create?projectId=1"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    let body = assert_error(bad_payload, StatusCode::BAD_REQUEST, 4).await;
    assert_eq!(body["message"], "Invalid request payload");

    let bad_id = srv
        .client
        .get(srv.url("/goods?id=-1&projectId=1"))
        .send()
        .await
        .unwrap();
    let body = assert_error(bad_id, StatusCode::BAD_REQUEST, 4).await;
    assert_eq!(body["message"], "Invalid good ID");
}

#[tokio::test]
async fn reprioritize_returns_every_shifted_item() {
    let srv = TestServer::spawn().await;
    let a = srv.create(1, "A").await;
    let _b = srv.create(1, "B").await;
    let c = srv.create(1, "C").await;

    let res = srv
        .client
        .patch(srv.url(&format!("/good/reprioritize?id={}&projectId=1", a["id"])))
        .json(&json!({ "newPriority": 3 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(
        body,
        json!({ "priorities": [
            { "id": a["id"], "priority": 3 },
            { "id": c["id"], "priority": 4 },
        ]})
    );

    let res = srv.get(&a["id"], 1).await;
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["priority"], 3);
}

#[tokio::test]
async fn reprioritize_rejects_non_positive_priority() {
    let srv = TestServer::spawn().await;
    let a = srv.create(1, "A").await;

    let res = srv
        .client
        .patch(srv.url(&format!("/good/reprioritize?id={}&projectId=1", a["id"])))
        .json(&json!({ "newPriority": 0 }))
        .send()
        .await
        .unwrap();
    let body = assert_error(res, StatusCode::BAD_REQUEST, 4).await;
    assert_eq!(body["message"], "Priority must be greater than 0");
}

#[tokio::test]
async fn reprioritize_rejects_ranks_near_i64_max_and_keeps_serving() {
    let srv = TestServer::spawn().await;
    let a = srv.create(1, "A").await;
    let b = srv.create(1, "B").await;

    for id in [&a["id"], &b["id"]] {
        let res = srv
            .client
            .patch(srv.url(&format!("/good/reprioritize?id={id}&projectId=1")))
            .json(&json!({ "newPriority": i64::MAX }))
            .send()
            .await
            .unwrap();
        assert_error(res, StatusCode::BAD_REQUEST, 4).await;
    }

    let c = srv.create(1, "C").await;
    assert_eq!(c["priority"], 3);
    let other = srv.create(2, "X").await;
    assert_eq!(other["priority"], 1);
}

#[tokio::test]
async fn update_changes_text_but_not_priority() {
    let srv = TestServer::spawn().await;
    let a = srv.create(3, "A").await;

    let res = srv
        .client
        .patch(srv.url(&format!("/good/update?id={}&projectId=3", a["id"])))
        .json(&json!({ "name": "renamed", "description": "new text" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["name"], "renamed");
    assert_eq!(body["description"], "new text");
    assert_eq!(body["priority"], 1);

    let fetched: Value = srv.get(&a["id"], 3).await.json().await.unwrap();
    assert_eq!(fetched["name"], "renamed");
}

#[tokio::test]
async fn remove_is_terminal_and_reflected_in_list_meta() {
    let srv = TestServer::spawn().await;
    let a = srv.create(1, "A").await;
    let _b = srv.create(1, "B").await;

    let remove_url = srv.url(&format!("/good/remove?id={}&projectId=1", a["id"]));
    let res = srv.client.delete(&remove_url).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body, json!({ "id": a["id"], "projectId": 1, "removed": true }));

    assert_error(srv.get(&a["id"], 1).await, StatusCode::NOT_FOUND, 3).await;
    let again = srv.client.delete(&remove_url).send().await.unwrap();
    assert_error(again, StatusCode::NOT_FOUND, 3).await;

    let res = srv
        .client
        .get(srv.url("/goods/list?limit=abc&offset=0"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(
        body["meta"],
        json!({ "total": 1, "removed": 1, "limit": 10, "offset": 0 })
    );
    let names: Vec<&str> = body["goods"]
        .as_array()
        .unwrap()
        .iter()
        .map(|g| g["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["B"]);
}
