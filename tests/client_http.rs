use std::sync::{Arc, Mutex};
use std::time::Duration;

use mockito::{Matcher, ServerGuard};
use outreach_desk::api::{ApiError, OutreachClient, OutreachService};
use outreach_desk::desk::{Actor, OutreachDesk};
use outreach_desk::model::{
    ActorRole, ApproveOutreach, BulkGenerate, OutreachStatus, StatusFilter, User,
};
use outreach_desk::notify::{Notifications, Toast};
use outreach_desk::session::{store, Navigator, Session, LOGIN_PATH};
use reqwest::{Client, Url};
use serde_json::json;

#[derive(Default)]
struct RecordingNavigator {
    path: Mutex<String>,
    redirects: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    fn at(path: &str) -> Arc<Self> {
        Arc::new(Self {
            path: Mutex::new(path.to_string()),
            redirects: Mutex::default(),
        })
    }

    fn redirects(&self) -> Vec<String> {
        self.redirects.lock().unwrap().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn current_path(&self) -> String {
        self.path.lock().unwrap().clone()
    }

    fn redirect(&self, path: &str) {
        *self.path.lock().unwrap() = path.to_string();
        self.redirects.lock().unwrap().push(path.to_string());
    }
}

async fn setup_pool() -> store::Pool {
    let pool = store::init_pool("sqlite::memory:").await.unwrap();
    store::run_migrations(&pool).await.unwrap();
    pool
}

fn reviewer() -> User {
    User {
        id: 9,
        email: "ops@example.com".into(),
        name: Some("Ops Reviewer".into()),
        role: ActorRole::Reviewer,
    }
}

async fn logged_in(path: &str) -> (Arc<Session>, Arc<RecordingNavigator>, store::Pool) {
    let pool = setup_pool().await;
    let nav = RecordingNavigator::at(path);
    let session = Session::load(pool.clone(), nav.clone()).await.unwrap();
    session.establish("tok-1".into(), reviewer()).await.unwrap();
    (Arc::new(session), nav, pool)
}

fn base_url(server: &ServerGuard) -> Url {
    Url::parse(&format!("{}/api/v1/", server.url())).unwrap()
}

fn client_for(base: Url, session: Arc<Session>, timeout: Duration) -> OutreachClient {
    let http = Client::builder()
        .no_proxy()
        .timeout(timeout)
        .build()
        .unwrap();
    OutreachClient::with_http(http, base, None, session)
}

const ITEM_42_APPROVED: &str = r#"{"id":42,"subject":"Hi","body":"Hello","status":"approved","approved_by":"Ops Reviewer","approved_at":"2026-10-16T09:30:00Z"}"#;

fn outreach_list() -> Matcher {
    Matcher::Regex(r"^/api/v1/outreach(\?|$)".into())
}

fn pending_statuses() -> Matcher {
    Matcher::UrlEncoded("statuses".into(), "generated,under_review,edited".into())
}

#[tokio::test]
async fn approve_posts_approver_and_invalidates_lists() {
    let mut server = mockito::Server::new_async().await;
    let before = server
        .mock("GET", outreach_list())
        .match_query(pending_statuses())
        .with_header("content-type", "application/json")
        .with_body(r#"[{"id":42,"subject":"Hi","body":"Hello","status":"under_review"}]"#)
        .expect(1)
        .create_async()
        .await;
    let approve = server
        .mock("POST", "/api/v1/outreach/42/approve")
        .match_header("authorization", "Bearer tok-1")
        .match_header("x-api-key", Matcher::Missing)
        .match_body(Matcher::Json(json!({ "approved_by": "Ops Reviewer" })))
        .with_header("content-type", "application/json")
        .with_body(ITEM_42_APPROVED)
        .expect(1)
        .create_async()
        .await;

    let (session, _nav, _pool) = logged_in("/outreach").await;
    let client = client_for(base_url(&server), session.clone(), Duration::from_secs(5));
    let notes = Arc::new(Notifications::new());
    let actor = Actor::resolve(session.user().as_ref(), &Default::default());
    let desk = OutreachDesk::new(Arc::new(client), notes.clone(), actor);

    let pending = desk.list_tab(StatusFilter::Pending, None).await.unwrap();
    assert_eq!(pending[0].status, OutreachStatus::UnderReview);
    before.assert_async().await;
    before.remove_async().await;

    let item = desk.approve(42, None).await.unwrap();
    assert_eq!(item.status, OutreachStatus::Approved);
    assert_eq!(item.approved_by.as_deref(), Some("Ops Reviewer"));
    approve.assert_async().await;

    let after = server
        .mock("GET", outreach_list())
        .match_query(pending_statuses())
        .with_header("content-type", "application/json")
        .with_body("[]")
        .expect(1)
        .create_async()
        .await;
    let pending = desk.list_tab(StatusFilter::Pending, None).await.unwrap();
    assert!(pending.is_empty());
    after.assert_async().await;
    assert_eq!(notes.drain(), vec![Toast::success("Outreach #42 approved")]);
}

#[tokio::test]
async fn api_key_is_used_without_a_session() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/api/v1/outreach/3")
        .match_header("x-api-key", "key-123")
        .match_header("authorization", Matcher::Missing)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id":3,"subject":"s","body":"b","status":"edited"}"#)
        .expect(1)
        .create_async()
        .await;
    let pool = setup_pool().await;
    let session = Arc::new(
        Session::load(pool, RecordingNavigator::at("/outreach"))
            .await
            .unwrap(),
    );
    let http = Client::builder().no_proxy().build().unwrap();
    let client =
        OutreachClient::with_http(http, base_url(&server), Some("key-123".into()), session);

    assert_eq!(
        client.get_outreach(3).await.unwrap().status,
        OutreachStatus::Edited
    );
    mock.assert_async().await;
}

#[tokio::test]
async fn unauthorized_clears_session_and_redirects_to_login() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/api/v1/outreach/1")
        .with_status(401)
        .with_header("content-type", "application/json")
        .with_body(r#"{"detail":"Token expired"}"#)
        .expect(1)
        .create_async()
        .await;
    let (session, nav, pool) = logged_in("/outreach").await;
    let client = client_for(base_url(&server), session.clone(), Duration::from_secs(5));

    let err = client.get_outreach(1).await.unwrap_err();
    assert!(err.is_unauthorized());
    assert_eq!(err.to_string(), "Token expired");
    mock.assert_async().await;

    assert_eq!(session.token(), None);
    assert_eq!(session.user(), None);
    assert_eq!(store::get_value(&pool, store::TOKEN_KEY).await.unwrap(), None);
    assert_eq!(store::get_value(&pool, store::USER_KEY).await.unwrap(), None);
    assert_eq!(nav.redirects(), vec![LOGIN_PATH.to_string()]);
}

#[tokio::test]
async fn unauthorized_on_login_page_stays_put() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/api/v1/auth/me")
        .with_status(401)
        .create_async()
        .await;
    let (session, nav, _pool) = logged_in(LOGIN_PATH).await;
    let client = client_for(base_url(&server), session.clone(), Duration::from_secs(5));

    assert!(client.me().await.unwrap_err().is_unauthorized());
    assert!(!session.is_authenticated());
    assert!(nav.redirects().is_empty());
}

#[tokio::test]
async fn rate_limited_send_keeps_server_wording() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/api/v1/outreach/5/send")
        .match_body(Matcher::Exact(String::new()))
        .with_status(429)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"detail":{"code":"DAILY_SEND_LIMIT","message":"Daily send limit reached for campaign 3"}}"#,
        )
        .expect(1)
        .create_async()
        .await;
    let (session, _nav, _pool) = logged_in("/outreach").await;
    let client = client_for(base_url(&server), session.clone(), Duration::from_secs(5));

    let err = client.send_outreach(5).await.unwrap_err();
    assert!(err.is_rate_limited());
    assert_eq!(err.code(), Some("DAILY_SEND_LIMIT"));
    assert_eq!(
        err.user_message("Failed to send outreach"),
        "Daily send limit reached for campaign 3"
    );
    // Not an auth failure: the session survives.
    assert!(session.is_authenticated());
    mock.assert_async().await;
}

#[tokio::test]
async fn bulk_generate_and_counts() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/api/v1/outreach/generate/bulk")
        .match_body(Matcher::Json(json!({ "limit": 1 })))
        .with_header("content-type", "application/json")
        .with_body(r#"{"generated":1,"skipped":0,"errors":0}"#)
        .expect(1)
        .create_async()
        .await;
    let (session, _nav, _pool) = logged_in("/outreach").await;
    let client = client_for(base_url(&server), session, Duration::from_secs(5));

    let counts = client.generate_bulk(&BulkGenerate::new(0)).await.unwrap();
    assert_eq!(counts.generated, 1);
    mock.assert_async().await;
}

#[tokio::test]
async fn malformed_success_body_is_a_decode_error() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/api/v1/outreach/1/approve")
        .with_body("<html>ok</html>")
        .create_async()
        .await;
    let (session, _nav, _pool) = logged_in("/outreach").await;
    let client = client_for(base_url(&server), session, Duration::from_secs(5));

    let err = client
        .approve_outreach(
            1,
            &ApproveOutreach {
                approved_by: "x".into(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Decode(ref m) if m.contains("<html>ok</html>")));
}

#[tokio::test]
async fn slow_server_times_out() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/api/v1/outreach/1")
        .with_chunked_body(|w| {
            use std::io::Write;
            std::thread::sleep(Duration::from_secs(1));
            w.write_all(b"{}")
        })
        .create_async()
        .await;
    let (session, _nav, _pool) = logged_in("/outreach").await;
    let client = client_for(base_url(&server), session.clone(), Duration::from_millis(200));

    let err = client.get_outreach(1).await.unwrap_err();
    assert_eq!(err, ApiError::Timeout);
    assert!(session.is_authenticated());
}
