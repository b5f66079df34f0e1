mod common;

use axum::{
    extract::{FromRequestParts, State},
    http::{Method, Request, Uri, header, request::Parts},
};
use common::{MemoryRepository, add_user, create_test_state};
use ficha_portal::{
    AppState,
    auth::{self, AuthUser, Claims},
    errors::AppError,
    extract::Json,
    handlers,
    models::LoginRequest,
    permissions::{Capability, PermissionMap, Role},
    repository::Repository,
};
use jsonwebtoken::{EncodingKey, Header, encode};
use std::{sync::Arc, time::SystemTime};
use tokio::test;

// --- Helpers ---

fn get_request_parts(token: Option<&str>) -> Parts {
    let mut builder = Request::builder()
        .method(Method::GET)
        .uri(Uri::from_static("/fichas"));
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let (parts, _) = builder.body(()).unwrap().into_parts();
    parts
}

fn expired_token(user_id: i32, state: &AppState) -> String {
    let now = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap()
        .as_secs() as usize;
    let claims = Claims {
        sub: user_id.to_string(),
        iat: now - 7200,
        exp: now - 3600,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(state.config.jwt_secret.as_bytes()),
    )
    .unwrap()
}

// --- Extractor ---

#[test]
async fn test_valid_token_resolves_role_and_permissions_from_store() {
    let repo = Arc::new(MemoryRepository::default());
    let asesor = add_user(
        &repo,
        "asesor",
        "asesor123",
        Role::Asesor,
        PermissionMap::default_template(),
    )
    .await;
    let app_state = create_test_state(repo);
    let token = auth::issue_token(asesor.id, &app_state.config).unwrap();

    let mut parts = get_request_parts(Some(&token));
    let user = AuthUser::from_request_parts(&mut parts, &app_state)
        .await
        .unwrap();

    assert_eq!(user.id, asesor.id);
    assert_eq!(user.role, Role::Asesor);
    assert!(user.can(Capability::ViewRecords));
    assert!(!user.can(Capability::AddRecords));
}

#[test]
async fn test_missing_header_is_unauthenticated() {
    let app_state = create_test_state(Arc::new(MemoryRepository::default()));
    let mut parts = get_request_parts(None);

    let result = AuthUser::from_request_parts(&mut parts, &app_state).await;
    assert!(matches!(result, Err(AppError::Unauthenticated)));
}

#[test]
async fn test_expired_token_is_unauthenticated() {
    let repo = Arc::new(MemoryRepository::default());
    let admin = add_user(&repo, "admin", "admin123", Role::Admin, PermissionMap::empty()).await;
    let app_state = create_test_state(repo);
    let token = expired_token(admin.id, &app_state);

    let mut parts = get_request_parts(Some(&token));
    let result = AuthUser::from_request_parts(&mut parts, &app_state).await;
    assert!(matches!(result, Err(AppError::Unauthenticated)));
}

#[test]
async fn test_token_of_deleted_user_stops_working() {
    let repo = Arc::new(MemoryRepository::default());
    let asesor = add_user(
        &repo,
        "asesor",
        "asesor123",
        Role::Asesor,
        PermissionMap::default_template(),
    )
    .await;
    let app_state = create_test_state(repo.clone());
    let token = auth::issue_token(asesor.id, &app_state.config).unwrap();

    assert!(repo.delete_user(asesor.id).await.unwrap());

    let mut parts = get_request_parts(Some(&token));
    let result = AuthUser::from_request_parts(&mut parts, &app_state).await;
    assert!(matches!(result, Err(AppError::Unauthenticated)));
}

#[test]
async fn test_permission_edits_apply_to_existing_sessions() {
    let repo = Arc::new(MemoryRepository::default());
    let asesor = add_user(
        &repo,
        "asesor",
        "asesor123",
        Role::Asesor,
        PermissionMap::default_template(),
    )
    .await;
    let app_state = create_test_state(repo.clone());
    let token = auth::issue_token(asesor.id, &app_state.config).unwrap();

    repo.update_user(
        asesor.id,
        ficha_portal::models::UserUpdate {
            username: "asesor".into(),
            password_hash: None,
            role: Role::Asesor,
            permissions: PermissionMap::from_grants(false, false, true, false),
        },
    )
    .await
    .unwrap();

    let mut parts = get_request_parts(Some(&token));
    let user = AuthUser::from_request_parts(&mut parts, &app_state)
        .await
        .unwrap();
    assert!(user.can(Capability::DeleteRecords));
}

// --- Login ---

#[test]
async fn test_login_errors_do_not_reveal_which_part_was_wrong() {
    let repo = Arc::new(MemoryRepository::default());
    add_user(&repo, "admin", "admin123", Role::Admin, PermissionMap::empty()).await;
    let state = create_test_state(repo);

    let unknown_user = handlers::login(
        State(state.clone()),
        Json(LoginRequest {
            username: "nadie".into(),
            password: "admin123".into(),
        }),
    )
    .await
    .unwrap_err();
    let wrong_password = handlers::login(
        State(state),
        Json(LoginRequest {
            username: "admin".into(),
            password: "incorrecta".into(),
        }),
    )
    .await
    .unwrap_err();

    assert!(matches!(unknown_user, AppError::InvalidCredentials));
    assert_eq!(unknown_user.to_string(), wrong_password.to_string());
    assert_eq!(unknown_user.status(), wrong_password.status());
}

#[test]
async fn test_login_returns_token_and_admin_capabilities() {
    let repo = Arc::new(MemoryRepository::default());
    let admin = add_user(&repo, "admin", "admin123", Role::Admin, PermissionMap::empty()).await;
    let state = create_test_state(repo);

    let response = handlers::login(
        State(state.clone()),
        Json(LoginRequest {
            username: " admin ".into(),
            password: "admin123".into(),
        }),
    )
    .await
    .unwrap();

    assert_eq!(
        auth::decode_token(&response.token, &state.config).unwrap(),
        admin.id
    );
    assert_eq!(response.user.capabilities.len(), Capability::ALL.len());
}
