use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;
use serde_json::json;

use super::{bad_body, failure, AppState};

#[derive(Deserialize)]
pub(super) struct LoginRequest {
    #[serde(default)]
    password: String,
}

#[derive(Deserialize)]
pub(super) struct ExecRequest {
    #[serde(default)]
    token: String,
    #[serde(default)]
    command: String,
}

#[derive(Deserialize)]
pub(super) struct LogoutRequest {
    #[serde(default)]
    token: String,
}

pub(super) async fn login(
    State(state): State<Arc<AppState>>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match body {
        Ok(b) => b,
        Err(rejection) => return bad_body(rejection),
    };
    match state.terminal.login(&req.password).await {
        Ok(session) => Json(json!({
            "success": true,
            "token": session.token,
            "cwd": session.cwd,
        }))
        .into_response(),
        Err(e) => failure(StatusCode::UNAUTHORIZED, e),
    }
}

pub(super) async fn exec(
    State(state): State<Arc<AppState>>,
    body: Result<Json<ExecRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match body {
        Ok(b) => b,
        Err(rejection) => return bad_body(rejection),
    };
    match state.terminal.exec(&req.token, &req.command).await {
        Ok(out) => Json(out).into_response(),
        Err(e) => failure(StatusCode::UNAUTHORIZED, e),
    }
}

/// Always succeeds, even for unknown tokens or unreadable bodies.
pub(super) async fn logout(
    State(state): State<Arc<AppState>>,
    body: Result<Json<LogoutRequest>, JsonRejection>,
) -> Json<serde_json::Value> {
    if let Ok(Json(req)) = body {
        state.terminal.logout(&req.token).await;
    }
    Json(json!({"success": true}))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::extract::FromRequest;
    use axum::http::Request;

    use crate::http::test_support::{body_json, test_state, PASSWORD};

    async fn json_body<T: serde::de::DeserializeOwned>(
        raw: &str,
    ) -> Result<Json<T>, JsonRejection> {
        let req = Request::builder()
            .method("POST")
            .header("content-type", "application/json")
            .body(Body::from(raw.to_string()))
            .unwrap();
        Json::<T>::from_request(req, &()).await
    }

    async fn login_token(state: &Arc<AppState>) -> String {
        let body = json_body(&format!(r#"{{"password":"{PASSWORD}"}}"#)).await;
        let v = body_json(login(State(state.clone()), body).await).await;
        v["token"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn login_success_and_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let state = test_state(&tmp);

        let body = json_body(&format!(r#"{{"password":"{PASSWORD}"}}"#)).await;
        let resp = login(State(state.clone()), body).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let v = body_json(resp).await;
        assert_eq!(v["success"], true);
        assert_eq!(v["cwd"], tmp.path().display().to_string());

        let body = json_body(r#"{"password":"nope"}"#).await;
        let resp = login(State(state), body).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let v = body_json(resp).await;
        assert_eq!(v, json!({"success": false, "error": "Invalid password"}));
    }

    #[tokio::test]
    async fn malformed_body_is_json_400() {
        let tmp = tempfile::tempdir().unwrap();
        let state = test_state(&tmp);

        let resp = login(State(state.clone()), json_body("{not json").await).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let v = body_json(resp).await;
        assert_eq!(v["success"], false);
        assert!(v["error"].is_string());

        let resp = exec(State(state), json_body("42").await).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn exec_with_token_and_without() {
        let tmp = tempfile::tempdir().unwrap();
        let state = test_state(&tmp);
        let token = login_token(&state).await;

        let body = json_body(&format!(r#"{{"token":"{token}","command":"cd /"}}"#)).await;
        let resp = exec(State(state.clone()), body).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let v = body_json(resp).await;
        assert_eq!(v, json!({"output": "", "cwd": "/"}));

        let body = json_body(r#"{"token":"bogus","command":"ls"}"#).await;
        let resp = exec(State(state), body).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let v = body_json(resp).await;
        assert_eq!(v, json!({"success": false, "error": "Unauthorized"}));
    }

    #[tokio::test]
    async fn logout_always_succeeds() {
        let tmp = tempfile::tempdir().unwrap();
        let state = test_state(&tmp);
        let token = login_token(&state).await;

        for _ in 0..2 {
            let body = json_body(&format!(r#"{{"token":"{token}"}}"#)).await;
            let Json(v) = logout(State(state.clone()), body).await;
            assert_eq!(v, json!({"success": true}));
        }
        let Json(v) = logout(State(state.clone()), json_body("garbage").await).await;
        assert_eq!(v, json!({"success": true}));
        assert_eq!(state.terminal.active_count().await, 0);
    }
}
