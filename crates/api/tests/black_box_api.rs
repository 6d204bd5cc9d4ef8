use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::{Value, json};

use matflow_api::config::ApiConfig;
use matflow_auth::{JwtClaims, Role};
use matflow_core::{DepotId, UserId};

const JWT_SECRET: &str = "test-secret";

struct TestServer {
    base_url: String,
    client: reqwest::Client,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod, bound to an ephemeral port.
        let mut config = ApiConfig::default();
        config.jwt.secret = JWT_SECRET.to_string();
        let app = matflow_api::app::build_app(&config);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{addr}"),
            client: reqwest::Client::new(),
            handle,
        }
    }

    async fn get(&self, path: &str, token: &str) -> (StatusCode, Value) {
        let res = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(token)
            .send()
            .await
            .unwrap();
        read(res).await
    }

    async fn send(&self, method: reqwest::Method, path: &str, token: &str, key: Option<&str>, body: Value) -> (StatusCode, Value) {
        let mut req = self
            .client
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(token)
            .json(&body);
        if let Some(key) = key {
            req = req.header("Idempotency-Key", key);
        }
        read(req.send().await.unwrap()).await
    }

    async fn post(&self, path: &str, token: &str, key: &str, body: Value) -> (StatusCode, Value) {
        self.send(reqwest::Method::POST, path, token, Some(key), body).await
    }

    async fn put(&self, path: &str, token: &str, key: &str, body: Value) -> (StatusCode, Value) {
        self.send(reqwest::Method::PUT, path, token, Some(key), body).await
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn read(res: reqwest::Response) -> (StatusCode, Value) {
    let status = res.status();
    let text = res.text().await.unwrap_or_default();
    let body = serde_json::from_str(&text).unwrap_or(Value::String(text));
    (status, body)
}

fn mint_jwt(roles: Vec<Role>, depot_id: Option<DepotId>) -> String {
    let now = Utc::now();
    let claims = JwtClaims {
        sub: UserId::new(),
        depot_id,
        roles,
        issued_at: now,
        expires_at: now + ChronoDuration::minutes(10),
    };

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .expect("failed to encode jwt")
}

/// One depot with a token per role.
struct Depot {
    id: DepotId,
    chef: String,
    magazinier: String,
    directeur: String,
}

impl Depot {
    fn new() -> Self {
        let id = DepotId::new();
        Self {
            id,
            chef: mint_jwt(vec![Role::CHEF_CHANTIER], Some(id)),
            magazinier: mint_jwt(vec![Role::MAGAZINIER], Some(id)),
            directeur: mint_jwt(vec![Role::DIRECTEUR], Some(id)),
        }
    }

    async fn material(&self, srv: &TestServer, name: &str, initial_stock: i64) -> String {
        let (status, body) = srv
            .post(
                "/materials",
                &self.directeur,
                &format!("mat-{name}-{}", self.id),
                json!({
                    "depot_id": self.id,
                    "name": name,
                    "unit": "sac",
                    "unit_price": 4500,
                    "stock_minimum": 2,
                    "initial_stock": initial_stock,
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["id"].as_str().unwrap().to_string()
    }

    async fn request(&self, srv: &TestServer, key: &str, lines: Value) -> Value {
        let (status, body) = srv
            .post(
                "/requests",
                &self.chef,
                key,
                json!({ "depot_id": self.id, "priority": "urgent", "lines": lines }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body
    }
}

#[tokio::test]
async fn health_is_public() {
    let srv = TestServer::spawn().await;
    let res = srv.client.get(format!("{}/health", srv.base_url)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn auth_required_for_protected_endpoints() {
    let srv = TestServer::spawn().await;

    let res = srv.client.get(format!("{}/whoami", srv.base_url)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let (status, body) = srv.get("/whoami", "not.a.token").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthenticated");
}

#[tokio::test]
async fn whoami_reflects_the_token() {
    let srv = TestServer::spawn().await;
    let depot = DepotId::new();
    let token = mint_jwt(vec![Role::MAGAZINIER], Some(depot));

    let (status, body) = srv.get("/whoami", &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["depot_id"].as_str().unwrap(), depot.to_string());
    assert!(body["roles"].as_array().unwrap().iter().any(|r| r == "magazinier"));
    assert!(body["permissions"].as_array().unwrap().iter().any(|p| p == "requests.process"));
}

#[tokio::test]
async fn request_to_delivery_note_with_partial_grant() {
    let srv = TestServer::spawn().await;
    let depot = Depot::new();
    let cement = depot.material(&srv, "ciment", 10).await;

    let request = depot
        .request(&srv, "dem-1", json!([{ "materiel_id": cement, "quantity": 12 }]))
        .await;
    assert_eq!(request["numero"], "DEM-0001");
    assert_eq!(request["status"], "pending");
    assert_eq!(request["line_count"], 1);
    assert_eq!(request["total_requested"], 12);
    assert!(request["total_granted"].is_null());
    let request_id = request["id"].as_str().unwrap().to_string();

    let (status, outcome) = srv
        .put(
            &format!("/requests/{request_id}/validate"),
            &depot.magazinier,
            "val-1",
            json!({
                "decision": "approve",
                "grants": [{ "materiel_id": cement, "quantity_granted": 8 }],
                "comment": "stock limité",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{outcome}");
    assert_eq!(outcome["request"]["status"], "approved");
    assert_eq!(outcome["request"]["lines"][0]["quantity_granted"], 8);
    assert_eq!(outcome["request"]["total_granted"], 8);
    assert_eq!(outcome["availability"][0]["sufficient"], true);

    let (status, note) = srv
        .post(&format!("/requests/{request_id}/process"), &depot.magazinier, "bl-1", json!({}))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{note}");
    assert_eq!(note["numero"], "BL-0001");
    assert_eq!(note["lines"].as_array().unwrap().len(), 1);
    assert_eq!(note["lines"][0]["quantity"], 8);
    assert_eq!(note["total_quantity"], 8);

    let (status, movements) = srv
        .get(&format!("/stock/movements?materiel_id={cement}"), &depot.directeur)
        .await;
    assert_eq!(status, StatusCode::OK);
    let deltas: Vec<i64> = movements
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["delta"].as_i64().unwrap())
        .collect();
    assert_eq!(deltas, vec![10, -8]);
    assert_eq!(movements[1]["reason"], "fulfillment_out");
    assert_eq!(movements[1]["balance_after"], 2);

    let (_, request) = srv.get(&format!("/requests/{request_id}"), &depot.chef).await;
    assert_eq!(request["status"], "delivered");
    assert_eq!(request["total_requested"], 12);
    assert_eq!(request["total_granted"], 8);

    let (_, listed) = srv.get("/requests?status=delivered", &depot.chef).await;
    assert_eq!(listed["total"], 1);
    assert_eq!(listed["items"][0]["line_count"], 1);
    assert_eq!(listed["items"][0]["total_granted"], 8);

    // Replaying the same key is refused and names the note it produced.
    let (status, body) = srv
        .post(&format!("/requests/{request_id}/process"), &depot.magazinier, "bl-1", json!({}))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "already_processed");
    assert!(body["message"].as_str().unwrap().contains("BL-0001"));
}

#[tokio::test]
async fn rejection_leaves_stock_untouched() {
    let srv = TestServer::spawn().await;
    let depot = Depot::new();
    let sand = depot.material(&srv, "sable", 5).await;
    let request = depot
        .request(&srv, "dem-r", json!([{ "materiel_id": sand, "quantity": 3 }]))
        .await;
    let request_id = request["id"].as_str().unwrap();

    let (status, outcome) = srv
        .put(
            &format!("/requests/{request_id}/validate"),
            &depot.directeur,
            "val-r",
            json!({ "decision": "reject", "comment": "doublon" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["request"]["status"], "rejected");

    let (status, body) = srv
        .post(&format!("/requests/{request_id}/process"), &depot.magazinier, "bl-r", json!({}))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "invalid_state");

    let (_, movements) = srv
        .get(&format!("/stock/movements?materiel_id={sand}"), &depot.magazinier)
        .await;
    assert_eq!(movements.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn grant_above_requested_is_unprocessable() {
    let srv = TestServer::spawn().await;
    let depot = Depot::new();
    let cement = depot.material(&srv, "ciment", 10).await;
    let request = depot
        .request(&srv, "dem-g", json!([{ "materiel_id": cement, "quantity": 2 }]))
        .await;

    let (status, body) = srv
        .put(
            &format!("/requests/{}/validate", request["id"].as_str().unwrap()),
            &depot.magazinier,
            "val-g",
            json!({ "decision": "approve", "grants": [{ "materiel_id": cement, "quantity_granted": 3 }] }),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "invalid_grant");
}

#[tokio::test]
async fn manual_remove_beyond_stock_is_refused() {
    let srv = TestServer::spawn().await;
    let depot = Depot::new();
    let cement = depot.material(&srv, "ciment", 2).await;

    let (status, body) = srv
        .post(
            "/stock/remove",
            &depot.magazinier,
            "rm-1",
            json!({ "materiel_id": cement, "quantity": 5 }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "insufficient_stock");

    let (_, materials) = srv
        .get(&format!("/materials?depot_id={}", depot.id), &depot.chef)
        .await;
    assert_eq!(materials[0]["stock_current"], 2);

    // A failed attempt releases its key.
    let (status, movement) = srv
        .post(
            "/stock/remove",
            &depot.magazinier,
            "rm-1",
            json!({ "materiel_id": cement, "quantity": 1 }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(movement["balance_after"], 1);

    let (status, low) = srv.get("/stock/low", &depot.directeur).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(low[0]["id"].as_str().unwrap(), cement);
}

#[tokio::test]
async fn mutations_require_an_idempotency_key() {
    let srv = TestServer::spawn().await;
    let depot = Depot::new();
    let cement = depot.material(&srv, "ciment", 2).await;

    let (status, body) = srv
        .send(
            reqwest::Method::POST,
            "/stock/add",
            &depot.magazinier,
            None,
            json!({ "materiel_id": cement, "quantity": 1 }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_input");
}

#[tokio::test]
async fn roles_are_enforced() {
    let srv = TestServer::spawn().await;
    let depot = Depot::new();
    let cement = depot.material(&srv, "ciment", 10).await;

    let (status, body) = srv
        .post(
            "/delivery-notes/direct",
            &depot.chef,
            "direct-chef",
            json!({ "depot_id": depot.id, "recipient": UserId::new(), "lines": [{ "materiel_id": cement, "quantity": 1 }] }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "unauthorized");

    let (status, _) = srv
        .post(
            "/stock/correction",
            &depot.magazinier,
            "corr-mag",
            json!({ "materiel_id": cement, "delta": -1 }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let stranger = mint_jwt(vec![Role::new("viewer")], Some(depot.id));
    let (status, _) = srv.get(&format!("/stock/movements?materiel_id={cement}"), &stranger).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn depots_are_isolated() {
    let srv = TestServer::spawn().await;
    let a = Depot::new();
    let b = Depot::new();
    let cement = a.material(&srv, "ciment", 10).await;
    let request = a
        .request(&srv, "dem-iso", json!([{ "materiel_id": cement, "quantity": 1 }]))
        .await;
    let request_id = request["id"].as_str().unwrap();

    let (status, body) = srv.get(&format!("/requests/{request_id}"), &b.chef).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");

    let (status, body) = srv.get("/requests", &b.chef).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 0);

    let (status, _) = srv.get(&format!("/requests?depot_id={}", a.id), &b.chef).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // A material of depot A cannot be requested from depot B.
    let (status, body) = srv
        .post(
            "/requests",
            &b.chef,
            "dem-foreign",
            json!({ "depot_id": b.id, "lines": [{ "materiel_id": cement, "quantity": 1 }] }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_input");
}

#[tokio::test]
async fn direct_distribution_and_cancellation() {
    let srv = TestServer::spawn().await;
    let depot = Depot::new();
    let cement = depot.material(&srv, "ciment", 10).await;
    let gravel = depot.material(&srv, "gravier", 6).await;

    let order = json!({
        "depot_id": depot.id,
        "recipient": UserId::new(),
        "lines": [
            { "materiel_id": cement, "quantity": 4 },
            { "materiel_id": gravel, "quantity": 6 },
        ],
        "comment": "chantier nord",
    });
    let (status, note) = srv.post("/delivery-notes/direct", &depot.magazinier, "direct-1", order.clone()).await;
    assert_eq!(status, StatusCode::CREATED, "{note}");
    assert_eq!(note["request_id"], Value::Null);
    assert_eq!(note["status"], "delivered");
    let note_id = note["id"].as_str().unwrap().to_string();

    let (status, _) = srv.post("/delivery-notes/direct", &depot.magazinier, "direct-1", order).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, cancelled) = srv
        .post(
            &format!("/delivery-notes/{note_id}/cancel"),
            &depot.directeur,
            "cancel-1",
            json!({ "comment": "erreur de saisie" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{cancelled}");
    assert_eq!(cancelled["status"], "cancelled");

    let (_, materials) = srv
        .get(&format!("/materials?depot_id={}", depot.id), &depot.directeur)
        .await;
    let stocks: Vec<i64> = materials
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["stock_current"].as_i64().unwrap())
        .collect();
    assert_eq!(stocks, vec![10, 6]);

    let (status, body) = srv
        .post(&format!("/delivery-notes/{note_id}/cancel"), &depot.directeur, "cancel-2", json!({}))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "invalid_transition");

    let (status, listed) = srv
        .get(&format!("/delivery-notes?status=cancelled&depot_id={}", depot.id), &depot.chef)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed["total"], 1);
}
