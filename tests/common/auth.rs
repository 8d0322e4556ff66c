use axum::http::Method;
use serde_json::json;

use tutorlah_backend::auth::sign_jwt_for_user;

use super::app::TestApp;
use super::http::{call, assert_status_ok_json};

/// Token for an arbitrary external identity, as the identity provider would issue it.
pub fn token_for(app: &TestApp, user_id: &str) -> String {
    sign_jwt_for_user(user_id, &app.config.jwt_secret, 1).expect("sign test token")
}

pub fn auth_header(token: &str) -> String {
    format!("Bearer {token}")
}

/// A signed-in user with a profile of the given role. Returns `(user_id, token)`.
pub async fn register_profile(app: &TestApp, role: &str, name: &str) -> (String, String) {
    let user_id = format!("uid-{}", uuid::Uuid::new_v4().simple());
    let token = token_for(app, &user_id);

    let (status, body) = call(
        &app.app,
        Method::PUT,
        "/api/users/me",
        &token,
        Some(json!({ "role": role, "name": name })),
    )
    .await;
    assert_status_ok_json(status, &body);
    (user_id, token)
}
