//! create-seller: provision a confirmed identity and give it the seller role

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info, warn};

use super::{Cors, FunctionContext, HandlerError, HandlerEvent, HandlerResponse};
use crate::backend::{extract_user_id, SELLER_ROLE};

pub const NAME: &str = "create-seller";

const CORS: Cors = Cors {
    allow_methods: "POST, OPTIONS",
};

/// Minimum accepted password length, in characters
pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Default, Deserialize)]
struct CreateSellerInput {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

pub async fn handle(ctx: &FunctionContext, event: HandlerEvent) -> HandlerResponse {
    match event.method().as_str() {
        "OPTIONS" => HandlerResponse::empty(204, &CORS),
        "POST" => match create(ctx, &event).await {
            Ok(body) => HandlerResponse::json(200, &body, &CORS),
            Err(e) => e.into_response(&CORS),
        },
        _ => HandlerResponse::method_not_allowed(&CORS),
    }
}

async fn create(ctx: &FunctionContext, event: &HandlerEvent) -> Result<Value, HandlerError> {
    let client = ctx.identity()?;

    let input: CreateSellerInput = event.json_body()?;
    let email = input.email.trim();
    if email.is_empty() || input.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(HandlerError::BadRequest(format!(
            "Email and password (at least {} characters) are required",
            MIN_PASSWORD_LEN
        )));
    }

    let created = client
        .create_user(email, &input.password)
        .await
        .map_err(HandlerError::upstream("Could not create user"))?;

    // The create payload does not always carry the id; fall back to a lookup.
    let mut user_id = extract_user_id(&created);
    if user_id.is_none() {
        match client.find_user_by_email(email).await {
            Ok(found) => user_id = extract_user_id(&found),
            Err(e) => warn!(email = email, error = %e, "Lookup by email failed"),
        }
    }

    let Some(user_id) = user_id else {
        error!(email = email, "No user id after create and lookup");
        return Err(HandlerError::Internal {
            message: "Could not resolve the new user's id".to_string(),
            detail: created,
        });
    };

    client
        .upsert_role(&user_id, SELLER_ROLE)
        .await
        .map_err(HandlerError::upstream("User created but seller role could not be assigned"))?;

    info!(user_id = %user_id, "Seller created");
    Ok(json!({ "ok": true, "userId": user_id }))
}
