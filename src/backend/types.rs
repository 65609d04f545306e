//! Identity platform wire types
//!
//! The admin API is inconsistent about envelopes: a user may come back bare,
//! wrapped in `{"user": ...}`, or as the first element of an array or of
//! `{"users": [...]}`. The helpers here accept all of them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Role stored on the profile row of a seller
pub const SELLER_ROLE: &str = "seller";

/// Minimal view of an identity record
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AdminUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// A row of the profiles table, as selected by id
#[derive(Debug, Clone, Deserialize)]
pub struct ProfileRow {
    pub id: String,
}

/// Body of the admin create-user call
#[derive(Debug, Serialize)]
pub struct CreateUserRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
    pub email_confirm: bool,
}

/// Body of the profile upsert
#[derive(Debug, Serialize)]
pub struct ProfileUpsert<'a> {
    pub id: &'a str,
    pub role: &'a str,
}

/// A listed seller
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Seller {
    pub id: String,
    pub email: String,
}

/// Pull a user id out of any of the known envelopes
pub fn extract_user_id(value: &Value) -> Option<String> {
    first_user(value).and_then(|user| user.get("id")).and_then(Value::as_str).map(String::from)
}

/// Pull a user's email out of any of the known envelopes
pub fn extract_email(value: &Value) -> Option<String> {
    first_user(value)
        .and_then(|user| user.get("email"))
        .and_then(Value::as_str)
        .map(String::from)
}

/// Parse the first user from any of the known envelopes
pub fn extract_user(value: &Value) -> Option<AdminUser> {
    first_user(value).and_then(|user| serde_json::from_value(user.clone()).ok())
}

fn first_user(value: &Value) -> Option<&Value> {
    match value {
        Value::Array(items) => items.first(),
        Value::Object(map) => {
            if map.contains_key("id") {
                Some(value)
            } else if let Some(user) = map.get("user").filter(|u| u.is_object()) {
                Some(user)
            } else if let Some(Value::Array(users)) = map.get("users") {
                users.first()
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Keep sellers whose email contains `query`, ignoring case. An empty query keeps all.
pub fn filter_sellers(sellers: Vec<Seller>, query: &str) -> Vec<Seller> {
    if query.is_empty() {
        return sellers;
    }
    let needle = query.to_lowercase();
    sellers
        .into_iter()
        .filter(|s| s.email.to_lowercase().contains(&needle))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_user_id_shapes() {
        assert_eq!(extract_user_id(&json!({"id": "u1", "email": "a@b.c"})).as_deref(), Some("u1"));
        assert_eq!(extract_user_id(&json!({"user": {"id": "u2"}})).as_deref(), Some("u2"));
        assert_eq!(extract_user_id(&json!([{"id": "u3"}, {"id": "u4"}])).as_deref(), Some("u3"));
        assert_eq!(extract_user_id(&json!({"users": [{"id": "u5"}]})).as_deref(), Some("u5"));
        assert_eq!(extract_user_id(&json!([])), None);
        assert_eq!(extract_user_id(&json!({"raw": "oops"})), None);
        assert_eq!(extract_user_id(&json!({"user": null})), None);
    }

    #[test]
    fn test_extract_email_and_user() {
        let value = json!({"user": {"id": "u1", "email": "Ana@Shop.test"}});
        assert_eq!(extract_email(&value).as_deref(), Some("Ana@Shop.test"));
        let user = extract_user(&value).unwrap();
        assert_eq!(user.id, "u1");
        assert_eq!(user.email.as_deref(), Some("Ana@Shop.test"));
    }

    #[test]
    fn test_filter_sellers_case_insensitive() {
        let sellers = vec![
            Seller { id: "1".into(), email: "ana@shop.test".into() },
            Seller { id: "2".into(), email: "Luis@Market.test".into() },
            Seller { id: "3".into(), email: String::new() },
        ];
        let found = filter_sellers(sellers.clone(), "MARKET");
        assert_eq!(found, vec![sellers[1].clone()]);
        assert_eq!(filter_sellers(sellers.clone(), "").len(), 3);
    }

    #[test]
    fn test_create_user_request_serialization() {
        let body = CreateUserRequest {
            email: "ana@shop.test",
            password: "secret1",
            email_confirm: true,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["email_confirm"], json!(true));
        assert_eq!(json["email"], json!("ana@shop.test"));
    }
}
