use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use curtain_link::DeviceController;
use curtain_link::mock::{MockConnector, MockDevice};
use serde_json::Value;
use tokio::runtime::Handle;
use tower::ServiceExt;

use curtain_server::app::{AppContext, create_app};
use curtain_server::configs::Storage;
use curtain_server::services::{CurtainService, SqliteRecorder};
use curtain_server::tests::{RecordingBus, setup_test_db, test_curtain, test_link_config, test_topics};

pub struct MockApp {
    pub router: Router,
    pub storage: Arc<Storage>,
    pub service: Arc<CurtainService>,
    pub device: MockDevice,
    pub connector: MockConnector,
    pub bus: Arc<RecordingBus>,
}

impl MockApp {
    pub async fn new() -> Self {
        let storage = setup_test_db().await;
        let device = MockDevice::new();
        let connector = MockConnector::new(device.clone());
        let bus = Arc::new(RecordingBus::connected());

        let controller = Arc::new(DeviceController::new(test_link_config(), connector.clone()));
        let service = Arc::new(CurtainService::new(
            controller,
            Arc::new(SqliteRecorder::new(storage.clone(), Handle::current())),
            bus.clone(),
            test_topics(),
            test_curtain(),
        ));
        service.register_callbacks();

        let router = create_app(&AppContext {
            storage: storage.clone(),
            service: service.clone(),
        });

        Self {
            router,
            storage,
            service,
            device,
            connector,
            bus,
        }
    }

    pub async fn connected() -> Self {
        let app = Self::new().await;
        app.service.controller().connect().unwrap();
        app
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .uri(uri)
            .method(Method::GET)
            .body(Body::empty())
            .unwrap();

        self.send(request).await
    }

    pub async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .uri(uri)
            .method(Method::POST)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();

        self.send(request).await
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&body).unwrap_or(Value::Null);

        (status, body)
    }

    /// Polls `uri` until the `count` field reaches `expected`.
    pub async fn wait_for_count(&self, uri: &str, expected: u64) -> Value {
        for _ in 0..200 {
            let (_, body) = self.get(uri).await;
            if body["count"].as_u64() == Some(expected) {
                return body;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        panic!("{uri} never reached count {expected}");
    }

    pub async fn wait_until(&self, condition: impl Fn(&CurtainService) -> bool) {
        for _ in 0..200 {
            if condition(&self.service) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        panic!("condition never held");
    }
}
