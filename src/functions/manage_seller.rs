//! manage-seller: list sellers, reset a seller's password, delete a seller

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::create_seller::MIN_PASSWORD_LEN;
use super::{Cors, FunctionContext, HandlerError, HandlerEvent, HandlerResponse};
use crate::backend::{extract_email, extract_user, filter_sellers, IdentityClient, Seller, SELLER_ROLE};

pub const NAME: &str = "manage-seller";

const CORS: Cors = Cors {
    allow_methods: "GET, PATCH, PUT, DELETE, OPTIONS",
};

/// Target identity, by id or by email
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SellerTarget {
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

impl SellerTarget {
    fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    fn email(&self) -> Option<&str> {
        self.email.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    fn has_identity(&self) -> bool {
        self.user_id().is_some() || self.email().is_some()
    }
}

pub async fn handle(ctx: &FunctionContext, event: HandlerEvent) -> HandlerResponse {
    let method = event.method();
    if method == "OPTIONS" {
        return HandlerResponse::empty(204, &CORS);
    }

    let result = match method.as_str() {
        "GET" => list(ctx, &event).await,
        "PATCH" | "PUT" => change_password(ctx, &event).await,
        "DELETE" => delete(ctx, &event).await,
        _ => return HandlerResponse::method_not_allowed(&CORS),
    };

    match result {
        Ok(body) => HandlerResponse::json(200, &body, &CORS),
        Err(e) => e.into_response(&CORS),
    }
}

async fn list(ctx: &FunctionContext, event: &HandlerEvent) -> Result<Value, HandlerError> {
    let client = ctx.identity()?;
    let query = event.query.get("q").map(String::as_str).unwrap_or("");

    let ids = client
        .profile_ids_with_role(SELLER_ROLE)
        .await
        .map_err(HandlerError::upstream("Could not list seller profiles"))?;

    let mut sellers = Vec::with_capacity(ids.len());
    for id in ids {
        // A profile whose identity cannot be read is still listed, without email.
        let email = match client.get_user(&id).await {
            Ok(user) => extract_email(&user).unwrap_or_default(),
            Err(e) => {
                debug!(user_id = %id, error = %e, "Could not read identity for profile");
                String::new()
            }
        };
        sellers.push(Seller { id, email });
    }

    let sellers = filter_sellers(sellers, query);
    debug!(count = sellers.len(), query = query, "Listed sellers");
    Ok(json!({ "ok": true, "sellers": sellers }))
}

async fn change_password(ctx: &FunctionContext, event: &HandlerEvent) -> Result<Value, HandlerError> {
    let client = ctx.identity()?;
    let target: SellerTarget = event.json_body()?;

    let password = target.password.clone().unwrap_or_default();
    if !target.has_identity() || password.chars().count() < MIN_PASSWORD_LEN {
        return Err(HandlerError::BadRequest(format!(
            "userId or email, and a password of at least {} characters, are required",
            MIN_PASSWORD_LEN
        )));
    }

    let id = resolve_id(&client, &target).await?;
    client
        .update_password(&id, &password)
        .await
        .map_err(HandlerError::Relay)?;

    info!(user_id = %id, "Seller password changed");
    Ok(json!({ "ok": true, "id": id }))
}

async fn delete(ctx: &FunctionContext, event: &HandlerEvent) -> Result<Value, HandlerError> {
    let client = ctx.identity()?;
    let target: SellerTarget = event.json_body()?;
    if !target.has_identity() {
        return Err(HandlerError::BadRequest("userId or email is required".to_string()));
    }

    let id = resolve_id(&client, &target).await?;

    // The profile row may not exist; only the identity deletion decides the outcome.
    if let Err(e) = client.delete_profile(&id).await {
        warn!(user_id = %id, error = %e, "Profile delete failed, continuing");
    }
    client.delete_user(&id).await.map_err(HandlerError::Relay)?;

    info!(user_id = %id, "Seller deleted");
    Ok(json!({ "ok": true }))
}

/// Explicit id wins; otherwise look the email up
async fn resolve_id(client: &IdentityClient, target: &SellerTarget) -> Result<String, HandlerError> {
    if let Some(id) = target.user_id() {
        return Ok(id.to_string());
    }
    let email = target.email().unwrap_or_default();
    let found = client
        .find_user_by_email(email)
        .await
        .map_err(HandlerError::upstream("User lookup failed"))?;
    extract_user(&found)
        .map(|user| user.id)
        .ok_or_else(|| HandlerError::NotFound("User not found".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::tests::{bare_context, unreachable_context, ScriptedBackend};

    #[tokio::test]
    async fn test_options_and_unsupported_method() {
        let ctx = bare_context();
        assert_eq!(handle(&ctx, HandlerEvent::new("OPTIONS")).await.status_code, 204);
        assert_eq!(handle(&ctx, HandlerEvent::new("POST")).await.status_code, 405);
    }

    #[tokio::test]
    async fn test_every_method_checks_credentials() {
        let ctx = bare_context();
        for method in ["GET", "PATCH", "PUT", "DELETE"] {
            let response = handle(&ctx, HandlerEvent::new(method)).await;
            assert_eq!(response.status_code, 500, "{}", method);
        }
    }

    #[tokio::test]
    async fn test_password_change_validation() {
        let ctx = unreachable_context();

        let event = HandlerEvent::new("PATCH").with_body(&json!({"password": "secret1"}));
        assert_eq!(handle(&ctx, event).await.status_code, 400);

        let event = HandlerEvent::new("PATCH").with_body(&json!({"userId": "u1", "password": "123"}));
        assert_eq!(handle(&ctx, event).await.status_code, 400);

        let event = HandlerEvent::new("PUT").with_body(&json!({"email": "  ", "password": "secret1"}));
        assert_eq!(handle(&ctx, event).await.status_code, 400);
    }

    #[tokio::test]
    async fn test_delete_requires_identity() {
        let ctx = unreachable_context();
        let event = HandlerEvent::new("DELETE").with_body(&json!({}));
        let response = handle(&ctx, event).await;
        assert_eq!(response.status_code, 400);
        assert_eq!(response.json_body()["error"], "userId or email is required");
    }

    #[test]
    fn test_explicit_id_wins_over_email() {
        let target: SellerTarget =
            serde_json::from_value(json!({"userId": " u1 ", "email": "a@b.c"})).unwrap();
        assert_eq!(target.user_id(), Some("u1"));
        assert!(target.has_identity());
    }

    #[tokio::test]
    async fn test_list_resolves_emails_and_filters() {
        let backend = ScriptedBackend::start(vec![
            ("GET", "/rest/v1/profiles?role=eq.seller", 200, r#"[{"id":"u1"},{"id":"u2"},{"id":"u3"}]"#),
            ("GET", "/auth/v1/admin/users/u1", 200, r#"{"id":"u1","email":"ana@shop.test"}"#),
            ("GET", "/auth/v1/admin/users/u2", 200, r#"{"user":{"id":"u2","email":"Luis@Market.test"}}"#),
        ])
        .await;
        let ctx = backend.context();

        let response = handle(&ctx, HandlerEvent::new("GET")).await;
        assert_eq!(response.status_code, 200);
        assert_eq!(
            response.json_body(),
            json!({"ok": true, "sellers": [
                {"id": "u1", "email": "ana@shop.test"},
                {"id": "u2", "email": "Luis@Market.test"},
                {"id": "u3", "email": ""}
            ]})
        );

        let mut event = HandlerEvent::new("GET");
        event.query.insert("q".to_string(), "market".to_string());
        let response = handle(&ctx, event).await;
        assert_eq!(
            response.json_body()["sellers"],
            json!([{"id": "u2", "email": "Luis@Market.test"}])
        );
    }

    #[tokio::test]
    async fn test_password_change_by_email() {
        let backend = ScriptedBackend::start(vec![
            ("GET", "/auth/v1/admin/users?email=", 200, r#"{"users":[{"id":"u9","email":"ana@shop.test"}]}"#),
            ("PUT", "/auth/v1/admin/users/u9", 200, r#"{"id":"u9"}"#),
        ])
        .await;

        let event = HandlerEvent::new("PATCH").with_body(&json!({"email": "ana@shop.test", "password": "secret1"}));
        let response = handle(&backend.context(), event).await;
        assert_eq!(response.status_code, 200);
        assert_eq!(response.json_body(), json!({"ok": true, "id": "u9"}));
        assert_eq!(
            backend.requests(),
            vec![
                "GET /auth/v1/admin/users?email=ana%40shop.test",
                "PUT /auth/v1/admin/users/u9",
            ]
        );
    }

    #[tokio::test]
    async fn test_password_change_relays_upstream_failure() {
        let backend = ScriptedBackend::start(vec![(
            "PUT",
            "/auth/v1/admin/users/u1",
            422,
            r#"{"msg":"weak password"}"#,
        )])
        .await;

        let event = HandlerEvent::new("PUT").with_body(&json!({"userId": "u1", "password": "secret1"}));
        let response = handle(&backend.context(), event).await;
        assert_eq!(response.status_code, 422);
        assert_eq!(response.json_body(), json!({"msg": "weak password"}));
    }

    #[tokio::test]
    async fn test_unknown_email_is_not_found() {
        let backend = ScriptedBackend::start(vec![(
            "GET",
            "/auth/v1/admin/users?email=",
            200,
            r#"{"users":[]}"#,
        )])
        .await;

        let event = HandlerEvent::new("DELETE").with_body(&json!({"email": "ghost@shop.test"}));
        let response = handle(&backend.context(), event).await;
        assert_eq!(response.status_code, 404);
        assert_eq!(response.json_body()["error"], "User not found");
    }

    #[tokio::test]
    async fn test_delete_continues_past_profile_failure() {
        let backend = ScriptedBackend::start(vec![
            ("DELETE", "/rest/v1/profiles", 500, r#"{"msg":"boom"}"#),
            ("DELETE", "/auth/v1/admin/users/u1", 200, "{}"),
        ])
        .await;

        let event = HandlerEvent::new("DELETE").with_body(&json!({"userId": "u1"}));
        let response = handle(&backend.context(), event).await;
        assert_eq!(response.status_code, 200);
        assert_eq!(response.json_body(), json!({"ok": true}));
        assert_eq!(
            backend.requests(),
            vec!["DELETE /rest/v1/profiles?id=eq.u1", "DELETE /auth/v1/admin/users/u1"]
        );
    }

    #[tokio::test]
    async fn test_delete_relays_identity_failure() {
        let backend = ScriptedBackend::start(vec![
            ("DELETE", "/rest/v1/profiles", 204, ""),
            ("DELETE", "/auth/v1/admin/users/u1", 404, "user gone"),
        ])
        .await;

        let event = HandlerEvent::new("DELETE").with_body(&json!({"userId": "u1"}));
        let response = handle(&backend.context(), event).await;
        assert_eq!(response.status_code, 404);
        assert_eq!(response.json_body(), json!({"raw": "user gone"}));
    }
}
