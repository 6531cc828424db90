//! Session lifecycle through `AuthService`, with a controllable clock

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

use user_accounts::accounts::{Account, AccountStore, InMemoryAccountStore};
use user_accounts::auth::{
    AccessClaims, AuthService, Clock, FixedClock, GateOutcome, Identity, InMemorySessionStore,
    NewSession, RejectKind, Role, SessionStore, TokenCodec,
};
use user_accounts::configuration::JwtSettings;
use user_accounts::error::{AppError, AuthError};
use user_accounts::startup::spawn_session_reaper;

const ISSUER: &str = "lifecycle";

fn jwt_settings() -> JwtSettings {
    JwtSettings {
        access_secret: "lifecycle-access-secret-0123456789".to_string(),
        refresh_secret: "lifecycle-refresh-secret-0123456789".to_string(),
        access_token_expiry_minutes: 15,
        refresh_token_expiry_days: 7,
        issuer: ISSUER.to_string(),
        hash_cost: 4,
    }
}

struct Harness {
    service: AuthService,
    clock: FixedClock,
    accounts: InMemoryAccountStore,
    sessions: InMemorySessionStore,
}

async fn harness() -> Harness {
    let clock = FixedClock::new(DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap());
    let accounts = InMemoryAccountStore::new();
    let sessions = InMemorySessionStore::new();

    let service = AuthService::with_clock(
        jwt_settings(),
        Arc::new(accounts.clone()),
        Arc::new(sessions.clone()),
        Arc::new(clock.clone()),
    )
    .expect("Failed to build auth service");

    let password_hash = service.hasher().hash_password("Password123").unwrap();
    accounts
        .insert(Account {
            id: 42,
            email: "user42@example.com".to_string(),
            username: "user42".to_string(),
            password_hash,
            role: Role::User,
            email_verified: true,
            created_at: clock.now(),
        })
        .await;

    Harness {
        service,
        clock,
        accounts,
        sessions,
    }
}

fn bearer(token: &str) -> String {
    format!("Bearer {}", token)
}

fn is_invalid_refresh<T>(result: &Result<T, AppError>) -> bool {
    matches!(result, Err(AppError::Auth(AuthError::InvalidRefreshToken)))
}

#[tokio::test]
async fn login_authenticate_refresh_and_role_change() {
    let h = harness().await;

    let account = h.service.verify_credentials("user42", "Password123").await.unwrap();
    assert_eq!(account.id, 42);
    let pair = h.service.issue_session(account.id, account.role).await.unwrap();

    let identity = h.service.authenticate(Some(&bearer(&pair.access_token))).unwrap();
    assert_eq!(identity, Identity { user_id: 42, role: Role::User });

    h.accounts.set_role(42, Role::Admin).await.unwrap();

    let rotated = h.service.refresh_session(&pair.refresh_token).await.unwrap();
    assert_ne!(rotated.tokens.refresh_token, pair.refresh_token);
    assert!(is_invalid_refresh(
        &h.service.refresh_session(&pair.refresh_token).await
    ));

    let identity = h
        .service
        .authenticate(Some(&bearer(&rotated.tokens.access_token)))
        .unwrap();
    assert_eq!(identity.role, Role::Admin);
    assert!(h.service.authorize(Some(&identity), &[Role::Admin]).is_ok());
}

#[tokio::test]
async fn user_token_is_forbidden_not_unauthorized_on_admin_gate() {
    let h = harness().await;
    let pair = h.service.issue_session(42, Role::User).await.unwrap();

    let outcome = h
        .service
        .gate()
        .check(Some(&bearer(&pair.access_token)), &[Role::Admin]);

    assert!(matches!(
        outcome,
        GateOutcome::Reject {
            kind: RejectKind::Forbidden,
            ..
        }
    ));
}

#[tokio::test]
async fn access_token_expires_on_the_second() {
    let h = harness().await;
    let pair = h.service.issue_session(42, Role::User).await.unwrap();
    let header = bearer(&pair.access_token);

    h.clock.advance(Duration::minutes(15) - Duration::seconds(1));
    assert!(h.service.authenticate(Some(&header)).is_ok());

    h.clock.advance(Duration::seconds(1));
    assert_eq!(
        h.service.authenticate(Some(&header)),
        Err(AuthError::TokenInvalid)
    );
}

#[tokio::test]
async fn refresh_token_outlives_access_token_but_not_its_own_lifetime() {
    let h = harness().await;
    let pair = h.service.issue_session(42, Role::User).await.unwrap();

    h.clock.advance(Duration::days(1));
    let rotated = h.service.refresh_session(&pair.refresh_token).await.unwrap();

    h.clock.advance(Duration::days(7));
    assert!(is_invalid_refresh(
        &h.service.refresh_session(&rotated.tokens.refresh_token).await
    ));
}

#[tokio::test]
async fn logout_then_refresh_is_rejected() {
    let h = harness().await;
    let pair = h.service.issue_session(42, Role::User).await.unwrap();

    h.service.end_session(&pair.refresh_token).await.unwrap();
    h.service.end_session(&pair.refresh_token).await.unwrap();

    assert!(is_invalid_refresh(
        &h.service.refresh_session(&pair.refresh_token).await
    ));
    assert!(h.sessions.is_empty().await);
}

#[tokio::test]
async fn tokens_from_another_issuer_are_rejected() {
    let h = harness().await;
    let foreign = TokenCodec::new("someone-else", Arc::new(h.clock.clone()));
    let forged = foreign
        .issue(
            AccessClaims { sub: 42, role: Role::Admin },
            &jwt_settings().access_secret,
            Duration::minutes(15),
        )
        .unwrap();

    assert_eq!(
        h.service.authenticate(Some(&bearer(&forged.token))),
        Err(AuthError::TokenInvalid)
    );
}

#[tokio::test]
async fn reaper_purges_expired_sessions() {
    let sessions = InMemorySessionStore::new();
    let store: Arc<dyn SessionStore> = Arc::new(sessions.clone());
    store
        .create(NewSession {
            user_id: 1,
            token_hash: "expired".to_string(),
            expires_at: Utc::now() - Duration::seconds(1),
        })
        .await
        .unwrap();
    store
        .create(NewSession {
            user_id: 1,
            token_hash: "live".to_string(),
            expires_at: Utc::now() + Duration::days(1),
        })
        .await
        .unwrap();

    let reaper = spawn_session_reaper(store, std::time::Duration::from_millis(10));
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    reaper.abort();

    assert_eq!(sessions.len().await, 1);
    assert!(sessions.find(1, "live").await.unwrap().is_some());
}
