use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client as DynamoClient;
use std::collections::HashMap;

use crate::error::ApiError;
use crate::types::{PublicUser, User};

fn user_from_item(item: &HashMap<String, AttributeValue>) -> Option<User> {
    let pk = item.get("PK")?.as_s().ok()?;
    let user_id = pk.strip_prefix("USER#")?.to_string();
    Some(User {
        user_id,
        name: item
            .get("name")
            .and_then(|v| v.as_s().ok())
            .map(|s| s.to_string())
            .unwrap_or_default(),
        email: item
            .get("email")
            .and_then(|v| v.as_s().ok())
            .map(|s| s.to_string())
            .unwrap_or_default(),
        phone_number: item
            .get("phone_number")
            .and_then(|v| v.as_s().ok())
            .map(|s| s.to_string())
            .unwrap_or_default(),
        password_hash: item
            .get("password_hash")
            .and_then(|v| v.as_s().ok())
            .map(|s| s.to_string())
            .unwrap_or_default(),
        is_admin: item
            .get("is_admin")
            .and_then(|v| v.as_bool().ok())
            .copied()
            .unwrap_or(false),
        created_at: item
            .get("created_at")
            .and_then(|v| v.as_s().ok())
            .map(|s| s.to_string())
            .unwrap_or_default(),
    })
}

/// Store a new user. Email uniqueness is enforced at write time with a
/// conditional put on an EMAIL# lookup item keyed by the lowercased address.
pub async fn create_user(
    client: &DynamoClient,
    table_name: &str,
    name: &str,
    email: &str,
    phone_number: &str,
    password_hash: &str,
) -> Result<User, ApiError> {
    let email = email.to_lowercase();
    let user_id = uuid::Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();
    let email_key = format!("EMAIL#{}", email);

    let claim = client
        .put_item()
        .table_name(table_name)
        .item("PK", AttributeValue::S(email_key.clone()))
        .item("SK", AttributeValue::S(email_key))
        .item("user_id", AttributeValue::S(user_id.clone()))
        .condition_expression("attribute_not_exists(PK)")
        .send()
        .await;

    if let Err(err) = claim {
        if err
            .as_service_error()
            .map(|e| e.is_conditional_check_failed_exception())
            .unwrap_or(false)
        {
            return Err(ApiError::validation(
                "user with that email already exists. please use unique email",
            ));
        }
        return Err(err.into());
    }

    let pk = format!("USER#{}", user_id);
    client
        .put_item()
        .table_name(table_name)
        .item("PK", AttributeValue::S(pk.clone()))
        .item("SK", AttributeValue::S(pk))
        .item("name", AttributeValue::S(name.to_string()))
        .item("email", AttributeValue::S(email.clone()))
        .item("phone_number", AttributeValue::S(phone_number.to_string()))
        .item("password_hash", AttributeValue::S(password_hash.to_string()))
        .item("is_admin", AttributeValue::Bool(false))
        .item("created_at", AttributeValue::S(now.clone()))
        .send()
        .await?;

    tracing::info!("Created user {}", user_id);

    Ok(User {
        user_id,
        name: name.to_string(),
        email,
        phone_number: phone_number.to_string(),
        password_hash: password_hash.to_string(),
        is_admin: false,
        created_at: now,
    })
}

pub async fn find_user(
    client: &DynamoClient,
    table_name: &str,
    user_id: &str,
) -> Result<Option<User>, ApiError> {
    let pk = format!("USER#{}", user_id);
    let result = client
        .get_item()
        .table_name(table_name)
        .key("PK", AttributeValue::S(pk.clone()))
        .key("SK", AttributeValue::S(pk))
        .send()
        .await?;

    Ok(result.item().and_then(user_from_item))
}

pub async fn find_user_by_email(
    client: &DynamoClient,
    table_name: &str,
    email: &str,
) -> Result<Option<User>, ApiError> {
    let email_key = format!("EMAIL#{}", email.to_lowercase());
    let result = client
        .get_item()
        .table_name(table_name)
        .key("PK", AttributeValue::S(email_key.clone()))
        .key("SK", AttributeValue::S(email_key))
        .send()
        .await?;

    let Some(user_id) = result
        .item()
        .and_then(|item| item.get("user_id"))
        .and_then(|v| v.as_s().ok())
        .map(|s| s.to_string())
    else {
        return Ok(None);
    };

    find_user(client, table_name, &user_id).await
}

/// Minimal public identity, used to enrich report references
pub async fn get_public_user(
    client: &DynamoClient,
    table_name: &str,
    user_id: &str,
) -> Result<Option<PublicUser>, ApiError> {
    Ok(find_user(client, table_name, user_id)
        .await?
        .map(|u| u.public()))
}
