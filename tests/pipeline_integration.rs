//! End-to-end tests for the consumption loop.
//!
//! Events are fed through an in-memory source; WhatsApp delivery goes to a
//! fake provider served by Axum on a random port; records land in an
//! in-memory libSQL database.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Form, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use secrecy::SecretString;
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use notification_dispatcher::channels::{DisabledNotifier, WhatsAppConfig, WhatsAppNotifier};
use notification_dispatcher::pipeline::{
    ConsumptionLoop, DeliveryStatus, Dispatcher, PipelineConfig, StatusPolicy,
};
use notification_dispatcher::store::{Database, LibSqlBackend, NotificationFilter};
use notification_dispatcher::stream::{MemoryPublisher, MemorySource};

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Number the fake provider refuses to deliver to.
const BLOCKED_NUMBER: &str = "+15550000";

#[derive(Debug, Clone)]
struct CapturedRequest {
    account: String,
    authorized: bool,
    form: HashMap<String, String>,
}

type Captured = Arc<Mutex<Vec<CapturedRequest>>>;

async fn create_message(
    State(captured): State<Captured>,
    Path(account): Path<String>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> (StatusCode, Json<serde_json::Value>) {
    let authorized = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("Basic "));
    let blocked = form
        .get("To")
        .is_some_and(|to| *to == format!("whatsapp:{BLOCKED_NUMBER}"));
    captured.lock().unwrap().push(CapturedRequest {
        account,
        authorized,
        form,
    });

    if blocked {
        (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"code": 63016, "message": "recipient not opted in"})),
        )
    } else {
        (
            StatusCode::CREATED,
            Json(serde_json::json!({"sid": "SM0001", "status": "queued"})),
        )
    }
}

/// Start the fake messaging provider, return (base url, captured requests).
async fn start_fake_provider() -> (String, Captured) {
    let captured: Captured = Arc::default();
    let app = Router::new()
        .route(
            "/2010-04-01/Accounts/{account}/Messages.json",
            post(create_message),
        )
        .with_state(Arc::clone(&captured));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://127.0.0.1:{port}"), captured)
}

async fn build_loop(
    api_base: String,
    policy: StatusPolicy,
) -> (ConsumptionLoop, MemoryPublisher, Arc<dyn Database>) {
    let whatsapp = WhatsAppNotifier::new(WhatsAppConfig {
        account_sid: "AC123".into(),
        auth_token: SecretString::from("secret"),
        from_number: "+15559999".into(),
        api_base,
    });
    let dispatcher = Dispatcher::new(
        Arc::new(DisabledNotifier::new("email")),
        Arc::new(whatsapp),
    );
    let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    let (source, publisher) = MemorySource::new("notifications");
    let consumer = ConsumptionLoop::new(
        Arc::new(source),
        Arc::new(dispatcher),
        Arc::clone(&db),
        PipelineConfig {
            status_policy: policy,
            ..PipelineConfig::default()
        },
    );
    (consumer, publisher, db)
}

#[tokio::test]
async fn whatsapp_event_reaches_provider_and_is_stored() {
    timeout(TEST_TIMEOUT, async {
        let (base, captured) = start_fake_provider().await;
        let (consumer, publisher, db) = build_loop(base, StatusPolicy::Processed).await;

        publisher.publish(
            r#"{
                "id": "w-1",
                "organization_id": "org-9",
                "to": "+15551234",
                "from": "inventory",
                "type": "whatsapp",
                "priority": "low",
                "message": "482913",
                "created_at": "2024-06-01T12:00:00Z"
            }"#,
        );
        drop(publisher);

        let stats = consumer.run(CancellationToken::new()).await.unwrap();
        assert_eq!(stats.stored, 1);
        assert_eq!(stats.delivery_failures, 0);

        let requests = captured.lock().unwrap().clone();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].account, "AC123");
        assert!(requests[0].authorized);
        assert_eq!(requests[0].form["To"], "whatsapp:+15551234");
        assert_eq!(requests[0].form["From"], "whatsapp:+15559999");
        assert_eq!(
            requests[0].form["Body"],
            "Your verification code is: 482913"
        );

        let record = db.get_notification("w-1").await.unwrap().unwrap();
        assert_eq!(record.organization_id, "org-9");
        assert_eq!(record.status, DeliveryStatus::Delivered);
        assert_eq!(
            record.created_at.unwrap().to_rfc3339(),
            "2024-06-01T12:00:00+00:00"
        );
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn provider_rejection_does_not_block_persistence() {
    timeout(TEST_TIMEOUT, async {
        let (base, captured) = start_fake_provider().await;
        let (consumer, publisher, db) = build_loop(base, StatusPolicy::Processed).await;

        publisher.publish(format!(
            r#"{{"id":"w-2","type":"whatsapp","to":"{BLOCKED_NUMBER}","message":"1"}}"#
        ));
        publisher.publish(r#"{"id":"w-3","type":"whatsapp","to":"+15551111","message":"2"}"#);
        drop(publisher);

        let stats = consumer.run(CancellationToken::new()).await.unwrap();
        assert_eq!(stats.delivery_failures, 1);
        assert_eq!(stats.stored, 2);
        assert_eq!(captured.lock().unwrap().len(), 2);

        let blocked = db.get_notification("w-2").await.unwrap().unwrap();
        assert_eq!(blocked.status, DeliveryStatus::Delivered);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn outcome_policy_persists_real_results() {
    timeout(TEST_TIMEOUT, async {
        let (base, _captured) = start_fake_provider().await;
        let (consumer, publisher, db) = build_loop(base, StatusPolicy::Outcome).await;

        publisher.publish(format!(
            r#"{{"id":"w-4","type":"whatsapp","to":"{BLOCKED_NUMBER}","message":"1"}}"#
        ));
        publisher.publish(r#"{"id":"e-1","type":"email","to":"a@b.com","message":"2"}"#);
        publisher.publish(r#"{"id":"p-1","type":"pigeon","to":"roof","message":"3"}"#);
        publisher.publish(r#"{"id":"w-5","type":"whatsapp","to":"+15552222","message":"4"}"#);
        drop(publisher);

        consumer.run(CancellationToken::new()).await.unwrap();

        let statuses: Vec<(String, DeliveryStatus)> = db
            .list_notifications(&NotificationFilter::default())
            .await
            .unwrap()
            .into_iter()
            .map(|r| (r.notification_id, r.status))
            .collect();
        assert_eq!(
            statuses,
            vec![
                ("w-4".to_string(), DeliveryStatus::Failed),
                ("e-1".to_string(), DeliveryStatus::Failed),
                ("p-1".to_string(), DeliveryStatus::Skipped),
                ("w-5".to_string(), DeliveryStatus::Delivered),
            ]
        );
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn unreachable_provider_is_logged_and_skipped() {
    timeout(TEST_TIMEOUT, async {
        // Bind then drop to get a port nothing listens on.
        let port = {
            let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
            l.local_addr().unwrap().port()
        };
        let (consumer, publisher, db) =
            build_loop(format!("http://127.0.0.1:{port}"), StatusPolicy::Processed).await;

        publisher.publish(r#"{"id":"w-6","type":"whatsapp","to":"+15553333","message":"x"}"#);
        drop(publisher);

        let stats = consumer.run(CancellationToken::new()).await.unwrap();
        assert_eq!(stats.delivery_failures, 1);
        assert!(db.get_notification("w-6").await.unwrap().is_some());
    })
    .await
    .expect("test timed out");
}
