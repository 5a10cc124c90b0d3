//! Router tests over the in-memory store and a scripted transport

use crate::auth::{hash_password, SESSION_COOKIE};
use crate::{create_router, AppState};
use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use chrono::Duration;
use courier_common::types::{MailingStatus, Permission};
use courier_common::Config;
use courier_core::ScriptedTransport;
use courier_storage::models::{CreateMailing, CreateMessage, CreateRecipient, CreateUser, Mailing, User};
use courier_storage::Repositories;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use tower::ServiceExt;

struct Harness {
    router: Router,
    repos: Repositories,
    transport: Arc<ScriptedTransport>,
}

fn harness_with(transport: ScriptedTransport) -> Harness {
    let config = Config::from_toml("[database]\nbackend = \"memory\"\n").unwrap();
    let repos = Repositories::memory();
    let transport = Arc::new(transport);
    let state = AppState::new(config, repos.clone(), transport.clone()).unwrap();
    Harness {
        router: create_router(state),
        repos,
        transport,
    }
}

fn harness() -> Harness {
    harness_with(ScriptedTransport::new())
}

impl Harness {
    async fn user(&self, email: &str, password: &str) -> User {
        self.repos
            .users
            .create(CreateUser {
                email: email.to_string(),
                username: None,
                password_hash: hash_password(password).unwrap(),
                phone_number: None,
                country: None,
                is_superuser: false,
            })
            .await
            .unwrap()
    }

    /// A user with a live session, returned as a `Cookie` header value
    async fn login(&self, email: &str) -> (User, String) {
        let user = self.user(email, "password123").await;
        let session = self.repos.sessions.create(user.id, Duration::hours(1)).await.unwrap();
        (user, format!("{}={}", SESSION_COOKIE, session.id))
    }

    async fn mailing_for(&self, user: &User, emails: &[&str]) -> Mailing {
        let message = self
            .repos
            .messages
            .create(CreateMessage {
                title: "Spring news".to_string(),
                content: "Hello there".to_string(),
                owner_id: Some(user.id),
            })
            .await
            .unwrap();

        let mut recipient_ids = Vec::new();
        for email in emails {
            let recipient = self
                .repos
                .recipients
                .create(CreateRecipient {
                    email: email.to_string(),
                    full_name: email.to_string(),
                    note: String::new(),
                    owner_id: Some(user.id),
                })
                .await
                .unwrap();
            recipient_ids.push(recipient.id);
        }

        self.repos
            .mailings
            .create(CreateMailing {
                message_id: message.id,
                recipient_ids,
                first_send_time: None,
                end_send_time: None,
                owner_id: Some(user.id),
            })
            .await
            .unwrap()
    }

    async fn get(&self, uri: &str, cookie: Option<&str>) -> Response {
        let mut request = Request::builder().uri(uri);
        if let Some(cookie) = cookie {
            request = request.header(header::COOKIE, cookie);
        }
        self.router
            .clone()
            .oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn post(&self, uri: &str, cookie: Option<&str>, form: &str) -> Response {
        let mut request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(cookie) = cookie {
            request = request.header(header::COOKIE, cookie);
        }
        self.router
            .clone()
            .oneshot(request.body(Body::from(form.to_string())).unwrap())
            .await
            .unwrap()
    }
}

async fn body_text(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn location(response: &Response) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

#[tokio::test]
async fn test_health() {
    let h = harness();
    let response = h.get("/health", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "OK");
}

#[tokio::test]
async fn test_static_stylesheet() {
    let h = harness();
    let response = h.get("/static/style.css", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/css");

    let missing = h.get("/static/nope.js", None).await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_home_is_public() {
    let h = harness();
    let response = h.get("/", None).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_protected_pages_redirect_to_login() {
    let h = harness();
    let response = h.get("/mailings", None).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login?next=%2Fmailings");

    let filtered = h.get("/attempts?mailing=abc", None).await;
    assert_eq!(location(&filtered), "/login?next=%2Fattempts%3Fmailing%3Dabc");
}

#[tokio::test]
async fn test_register_starts_session_and_sends_welcome() {
    let h = harness();
    let response = h
        .post(
            "/register",
            None,
            "email=new%40example.com&username=newbie&phone_number=&country=&password1=secret123&password2=secret123",
        )
        .await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");
    let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
    assert!(cookie.starts_with(SESSION_COOKIE));
    assert!(cookie.contains("HttpOnly"));

    let sent = h.transport.sent().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, vec!["new@example.com".to_string()]);
    assert!(sent[0].body.contains("newbie"));

    let duplicate = h
        .post(
            "/register",
            None,
            "email=new%40example.com&password1=secret123&password2=secret123",
        )
        .await;
    assert_eq!(duplicate.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body_text(duplicate).await.contains("already exists"));
}

#[tokio::test]
async fn test_register_email_unique_ignoring_case() {
    let h = harness();
    let first = h
        .post(
            "/register",
            None,
            "email=Bob%40example.com&password1=secret123&password2=secret123",
        )
        .await;
    assert_eq!(first.status(), StatusCode::SEE_OTHER);

    let second = h
        .post(
            "/register",
            None,
            "email=bob%40example.com&password1=other4567&password2=other4567",
        )
        .await;
    assert_eq!(second.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body_text(second).await.contains("already exists"));

    let login = h
        .post("/login", None, "email=bob%40example.com&password=secret123")
        .await;
    assert_eq!(login.status(), StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn test_register_rejects_mismatched_passwords() {
    let h = harness();
    let response = h
        .post(
            "/register",
            None,
            "email=new%40example.com&password1=secret123&password2=secret124",
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(h.transport.sent().await.is_empty());
}

#[tokio::test]
async fn test_login() {
    let h = harness();
    h.user("owner@example.com", "password123").await;

    let bad = h
        .post("/login", None, "email=owner%40example.com&password=wrong")
        .await;
    assert_eq!(bad.status(), StatusCode::UNAUTHORIZED);
    assert!(bad.headers().get(header::SET_COOKIE).is_none());

    let good = h
        .post(
            "/login",
            None,
            "email=owner%40example.com&password=password123&next=%2Fmailings",
        )
        .await;
    assert_eq!(good.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&good), "/mailings");
    assert!(good.headers().get(header::SET_COOKIE).is_some());

    let offsite = h
        .post(
            "/login",
            None,
            "email=owner%40example.com&password=password123&next=%2F%2Fevil.example.com",
        )
        .await;
    assert_eq!(location(&offsite), "/");
}

#[tokio::test]
async fn test_logout_ends_session() {
    let h = harness();
    let (_, cookie) = h.login("owner@example.com").await;

    let response = h.post("/logout", Some(&cookie), "").await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login");

    let after = h.get("/recipients", Some(&cookie)).await;
    assert_eq!(after.status(), StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn test_lists_are_scoped_to_owner() {
    let h = harness();
    let (alice, alice_cookie) = h.login("alice@example.com").await;
    let (bob, _) = h.login("bob@example.com").await;
    h.mailing_for(&alice, &["a1@example.com"]).await;
    h.mailing_for(&bob, &["b1@example.com"]).await;

    let body = body_text(h.get("/recipients", Some(&alice_cookie)).await).await;
    assert!(body.contains("a1@example.com"));
    assert!(!body.contains("b1@example.com"));

    h.repos
        .users
        .grant_permission(alice.id, Permission::ViewAllRecipients)
        .await
        .unwrap();
    let body = body_text(h.get("/recipients", Some(&alice_cookie)).await).await;
    assert!(body.contains("b1@example.com"));
}

#[tokio::test]
async fn test_non_owner_cannot_edit() {
    let h = harness();
    let (alice, _) = h.login("alice@example.com").await;
    let (bob, bob_cookie) = h.login("bob@example.com").await;
    let mailing = h.mailing_for(&alice, &["a1@example.com"]).await;

    let detail = format!("/mailings/{}", mailing.id);
    assert_eq!(h.get(&detail, Some(&bob_cookie)).await.status(), StatusCode::FORBIDDEN);

    let edit = format!("/mailings/{}/edit", mailing.id);
    let response = h.get(&edit, Some(&bob_cookie)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(body_text(response).await.contains("Forbidden"));

    h.repos
        .users
        .grant_permission(bob.id, Permission::ViewAllMailings)
        .await
        .unwrap();
    assert_eq!(h.get(&detail, Some(&bob_cookie)).await.status(), StatusCode::OK);
    assert_eq!(h.get(&edit, Some(&bob_cookie)).await.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_missing_mailing_is_not_found() {
    let h = harness();
    let (_, cookie) = h.login("owner@example.com").await;
    let uri = format!("/mailings/{}", uuid::Uuid::new_v4());
    assert_eq!(h.get(&uri, Some(&cookie)).await.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_create_recipient_and_duplicate() {
    let h = harness();
    let (_, cookie) = h.login("owner@example.com").await;

    let response = h
        .post(
            "/recipients/new",
            Some(&cookie),
            "email=reader%40example.com&full_name=Rea+Der&note=",
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let duplicate = h
        .post(
            "/recipients/new",
            Some(&cookie),
            "email=reader%40example.com&full_name=Rea+Der&note=",
        )
        .await;
    assert_eq!(duplicate.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_create_mailing_with_several_recipients() {
    let h = harness();
    let (user, cookie) = h.login("owner@example.com").await;
    let existing = h.mailing_for(&user, &["a@example.com", "b@example.com"]).await;
    let recipients = h.repos.mailings.recipients(existing.id).await.unwrap();

    let form = format!(
        "message_id={}&recipients={}&recipients={}&first_send_time=2026-05-01T09%3A30&end_send_time=",
        existing.message_id, recipients[0].id, recipients[1].id
    );
    let response = h.post("/mailings/new", Some(&cookie), &form).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let id = location(&response).trim_start_matches("/mailings/").parse().unwrap();
    let created = h.repos.mailings.get(id).await.unwrap().unwrap();
    assert_eq!(created.status, "created");
    assert_eq!(created.owner_id, Some(user.id));
    assert!(created.first_send_time.is_some());
    assert_eq!(h.repos.mailings.recipients(id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_mailing_form_rejects_foreign_message() {
    let h = harness();
    let (alice, _) = h.login("alice@example.com").await;
    let (_, bob_cookie) = h.login("bob@example.com").await;
    let foreign = h.mailing_for(&alice, &[]).await;

    let form = format!("message_id={}", foreign.message_id);
    let response = h.post("/mailings/new", Some(&bob_cookie), &form).await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_start_dispatches_and_records_attempts() {
    let h = harness_with(ScriptedTransport::new().failing_for("bad@example.com"));
    let (user, cookie) = h.login("owner@example.com").await;
    let mailing = h
        .mailing_for(&user, &["ok@example.com", "bad@example.com"])
        .await;

    let start = format!("/mailings/{}/start", mailing.id);
    let response = h.post(&start, Some(&cookie), "").await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), format!("/attempts?mailing={}", mailing.id));

    assert_eq!(h.transport.sent().await.len(), 2);
    let attempts = h
        .repos
        .attempts
        .list(Some(user.id), Some(mailing.id))
        .await
        .unwrap();
    assert_eq!(attempts.len(), 2);

    let stored = h.repos.mailings.get(mailing.id).await.unwrap().unwrap();
    assert_eq!(stored.status_enum(), Some(MailingStatus::Running));

    let page = body_text(h.get(&location_of_attempts(mailing.id), Some(&cookie)).await).await;
    assert!(page.contains("bad@example.com"));
    assert!(page.contains("550"));

    let again = h.post(&start, Some(&cookie), "").await;
    assert_eq!(again.status(), StatusCode::CONFLICT);
    assert!(body_text(again).await.contains("already been started"));
    assert_eq!(h.transport.sent().await.len(), 2);

    let stats = body_text(h.get("/statistics", Some(&cookie)).await).await;
    assert!(stats.contains("50.0%"));
}

fn location_of_attempts(id: uuid::Uuid) -> String {
    format!("/attempts?mailing={}", id)
}

#[tokio::test]
async fn test_block_requires_permission() {
    let h = harness();
    let (owner, cookie) = h.login("owner@example.com").await;
    let (moderator, moderator_cookie) = h.login("moderator@example.com").await;
    let mailing = h.mailing_for(&owner, &["a@example.com"]).await;
    let block = format!("/mailings/{}/block", mailing.id);

    let denied = h.post(&block, Some(&cookie), "is_blocked=on").await;
    assert_eq!(denied.status(), StatusCode::FORBIDDEN);

    h.repos
        .users
        .grant_permission(moderator.id, Permission::BlockMailings)
        .await
        .unwrap();
    let response = h.post(&block, Some(&moderator_cookie), "is_blocked=on").await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(h.repos.mailings.get(mailing.id).await.unwrap().unwrap().is_blocked);

    let start = format!("/mailings/{}/start", mailing.id);
    let refused = h.post(&start, Some(&cookie), "").await;
    assert_eq!(refused.status(), StatusCode::CONFLICT);
    assert!(body_text(refused).await.contains("blocked"));
    assert!(h.transport.sent().await.is_empty());

    let cleared = h.post(&block, Some(&moderator_cookie), "").await;
    assert_eq!(cleared.status(), StatusCode::SEE_OTHER);
    assert!(!h.repos.mailings.get(mailing.id).await.unwrap().unwrap().is_blocked);
}

#[tokio::test]
async fn test_block_missing_mailing() {
    let h = harness();
    let (user, cookie) = h.login("moderator@example.com").await;
    h.repos
        .users
        .grant_permission(user.id, Permission::BlockMailings)
        .await
        .unwrap();

    let uri = format!("/mailings/{}/block", uuid::Uuid::new_v4());
    let response = h.post(&uri, Some(&cookie), "is_blocked=on").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_deleting_message_removes_its_mailings() {
    let h = harness();
    let (user, cookie) = h.login("owner@example.com").await;
    let mailing = h.mailing_for(&user, &["a@example.com"]).await;

    let listed = body_text(h.get("/mailings", Some(&cookie)).await).await;
    assert!(listed.contains("Spring news"));

    let delete = format!("/messages/{}/delete", mailing.message_id);
    let response = h.post(&delete, Some(&cookie), "").await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(h.repos.mailings.get(mailing.id).await.unwrap().is_none());

    let listed = body_text(h.get("/mailings", Some(&cookie)).await).await;
    assert!(!listed.contains("Spring news"));
}

#[tokio::test(start_paused = true)]
async fn test_session_cleanup_purges_expired() {
    let h = harness();
    let (user, _) = h.login("owner@example.com").await;
    let live = h.repos.sessions.create(user.id, Duration::hours(2)).await.unwrap();
    h.repos.sessions.create(user.id, Duration::hours(-1)).await.unwrap();

    let period = std::time::Duration::from_secs(3600);
    let handle = crate::spawn_session_cleanup(h.repos.clone(), period);
    tokio::time::sleep(std::time::Duration::from_secs(1)).await;
    assert_eq!(h.repos.sessions.delete_expired().await.unwrap(), 0);

    h.repos.sessions.create(user.id, Duration::minutes(-5)).await.unwrap();
    tokio::time::sleep(period).await;
    assert_eq!(h.repos.sessions.delete_expired().await.unwrap(), 0);
    assert!(h.repos.sessions.get(&live.id).await.unwrap().is_some());

    handle.abort();
}
