use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use bizkit::{
    handler_fn, EventBus, InMemoryPersistence, ModuleContextBuilder, ModuleCtx, ModuleRegistry,
    ModuleState,
};
use clients::api::rest::dto::ClientDto;
use clients::{ClientCreated, ClientDirectory, ClientsModule, CLIENT_CREATED, DIRECTORY_SERVICE};
use parking_lot::Mutex;
use tower::ServiceExt;

struct Harness {
    ctx: ModuleCtx,
    registry: Arc<ModuleRegistry>,
    db: Arc<InMemoryPersistence>,
}

async fn harness() -> Harness {
    let registry = Arc::new(ModuleRegistry::new());
    let bus = Arc::new(EventBus::new(16));
    let db = Arc::new(InMemoryPersistence::new());
    let ctx = ModuleContextBuilder::new(Arc::clone(&registry), bus)
        .persistence(db.clone())
        .build();

    registry.register(Arc::new(ClientsModule::new())).await.unwrap();
    registry.initialize_all(&ctx).await.unwrap();
    Harness { ctx, registry, db }
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, serde_json::Value) {
    let res = app.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

fn post_client(tenant: &str, name: &str, email: &str) -> Request<Body> {
    Request::post("/api/v1/clients")
        .header("x-tenant-id", tenant)
        .header("content-type", "application/json")
        .body(Body::from(
            serde_json::json!({ "name": name, "email": email }).to_string(),
        ))
        .unwrap()
}

fn get(uri: &str, tenant: &str) -> Request<Body> {
    Request::get(uri)
        .header("x-tenant-id", tenant)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn module_wires_entity_service_and_routes() {
    let h = harness().await;

    assert_eq!(h.registry.module_state("clients"), Some(ModuleState::Initialized));
    assert_eq!(h.db.owner_of("clients").as_deref(), Some("clients"));
    assert!(h.ctx.services().contains(DIRECTORY_SERVICE));
    assert_eq!(h.ctx.http().mounted_paths(), vec!["/api/v1/clients"]);
}

#[tokio::test]
async fn create_list_and_fetch_per_tenant() {
    let h = harness().await;
    let app = h.ctx.http().take_router();

    let (status, body) = send(&app, post_client("acme", "Ann", "ann@acme.io")).await;
    assert_eq!(status, StatusCode::CREATED);
    let created: ClientDto = serde_json::from_value(body).unwrap();
    assert_eq!(created.email, "ann@acme.io");

    send(&app, post_client("globex", "Gus", "gus@globex.io")).await;

    let (status, body) = send(&app, get("/api/v1/clients", "acme")).await;
    assert_eq!(status, StatusCode::OK);
    let listed: Vec<ClientDto> = serde_json::from_value(body).unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, created.id);

    let uri = format!("/api/v1/clients/{}", created.id);
    let (status, body) = send(&app, get(&uri, "acme")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Ann");

    // Another tenant cannot see it.
    let (status, body) = send(&app, get(&uri, "globex")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], 404);
}

#[tokio::test]
async fn errors_are_problem_responses() {
    let h = harness().await;
    let app = h.ctx.http().take_router();

    let missing_tenant = Request::get("/api/v1/clients").body(Body::empty()).unwrap();
    let (status, body) = send(&app, missing_tenant).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().unwrap().contains("x-tenant-id"));

    send(&app, post_client("acme", "Ann", "ann@acme.io")).await;
    let (status, body) = send(&app, post_client("acme", "Ann 2", "ann@acme.io")).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["title"], "Duplicate Email");

    let (status, _) = send(&app, post_client("acme", "", "x@acme.io")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn creation_publishes_client_created_synchronously() {
    let h = harness().await;
    let seen = Arc::new(Mutex::new(Vec::<ClientCreated>::new()));
    let sink = Arc::clone(&seen);
    h.ctx
        .events()
        .subscribe(
            CLIENT_CREATED,
            "test.sink",
            handler_fn(move |event| {
                let sink = Arc::clone(&sink);
                async move {
                    sink.lock().push(event.payload_as()?);
                    anyhow::Ok(())
                }
            }),
            0,
        )
        .unwrap();

    let directory = h
        .ctx
        .services()
        .get_typed::<ClientDirectory>(DIRECTORY_SERVICE)
        .unwrap();
    let client = directory
        .create(
            "acme",
            clients::NewClient {
                name: "Ann".into(),
                email: "ann@acme.io".into(),
            },
        )
        .await
        .unwrap();

    let seen = seen.lock();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].client_id, client.id);
    assert_eq!(seen[0].tenant_id, "acme");
}
