use aws_sdk_dynamodb::types::{AttributeValue, ReturnValue};
use aws_sdk_dynamodb::Client as DynamoClient;
use lambda_http::{http::StatusCode, Body, Error, Response};
use std::collections::HashMap;

use crate::error::ApiError;
use crate::types::{SaveLocationRequest, SavedLocation};

fn location_from_item(item: &HashMap<String, AttributeValue>) -> Option<SavedLocation> {
    let pk = item.get("PK")?.as_s().ok()?;
    let sk = item.get("SK")?.as_s().ok()?;
    Some(SavedLocation {
        location_id: sk.strip_prefix("LOCATION#")?.to_string(),
        user_id: pk.strip_prefix("USER#")?.to_string(),
        latitude: item.get("latitude")?.as_n().ok()?.parse().ok()?,
        longitude: item.get("longitude")?.as_n().ok()?.parse().ok()?,
        address: item
            .get("address")
            .and_then(|v| v.as_s().ok())
            .map(|s| s.to_string()),
        name: item
            .get("name")
            .and_then(|v| v.as_s().ok())
            .map(|s| s.to_string()),
        created_at: item
            .get("created_at")
            .and_then(|v| v.as_s().ok())
            .map(|s| s.to_string())
            .unwrap_or_default(),
    })
}

/// Save a point of interest for the calling user
pub async fn save_location(
    client: &DynamoClient,
    table_name: &str,
    user_id: &str,
    body: &[u8],
) -> Result<Response<Body>, Error> {
    let req: SaveLocationRequest = match serde_json::from_slice(body) {
        Ok(req) => req,
        Err(e) => return ApiError::from(e).response(),
    };

    let (Some(latitude), Some(longitude)) = (req.latitude, req.longitude) else {
        return ApiError::validation("latitude and longitude are required").response();
    };

    let location_id = uuid::Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();

    let mut put_request = client
        .put_item()
        .table_name(table_name)
        .item("PK", AttributeValue::S(format!("USER#{}", user_id)))
        .item("SK", AttributeValue::S(format!("LOCATION#{}", location_id)))
        .item("latitude", AttributeValue::N(latitude.to_string()))
        .item("longitude", AttributeValue::N(longitude.to_string()))
        .item("created_at", AttributeValue::S(now.clone()));

    if let Some(address) = &req.address {
        put_request = put_request.item("address", AttributeValue::S(address.clone()));
    }
    if let Some(name) = &req.name {
        put_request = put_request.item("name", AttributeValue::S(name.clone()));
    }

    if let Err(err) = put_request.send().await {
        return ApiError::from(err).response();
    }

    let location = SavedLocation {
        location_id,
        user_id: user_id.to_string(),
        latitude,
        longitude,
        address: req.address,
        name: req.name,
        created_at: now,
    };

    Ok(Response::builder()
        .status(StatusCode::CREATED)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(
            serde_json::json!({"success": true, "data": location})
                .to_string()
                .into(),
        )
        .map_err(Box::new)?)
}

/// List a user's saved locations, newest first
pub async fn list_user_locations(
    client: &DynamoClient,
    table_name: &str,
    user_id: &str,
) -> Result<Response<Body>, Error> {
    let result = client
        .query()
        .table_name(table_name)
        .key_condition_expression("PK = :pk AND begins_with(SK, :sk_prefix)")
        .expression_attribute_values(":pk", AttributeValue::S(format!("USER#{}", user_id)))
        .expression_attribute_values(":sk_prefix", AttributeValue::S("LOCATION#".to_string()));

    let result = match result.send().await {
        Ok(result) => result,
        Err(err) => return ApiError::from(err).response(),
    };

    let mut locations: Vec<SavedLocation> =
        result.items().iter().filter_map(location_from_item).collect();
    locations.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(
            serde_json::json!({"success": true, "data": locations})
                .to_string()
                .into(),
        )
        .map_err(Box::new)?)
}

/// Delete one of the calling user's saved locations
pub async fn delete_location(
    client: &DynamoClient,
    table_name: &str,
    user_id: &str,
    location_id: &str,
) -> Result<Response<Body>, Error> {
    let result = client
        .delete_item()
        .table_name(table_name)
        .key("PK", AttributeValue::S(format!("USER#{}", user_id)))
        .key("SK", AttributeValue::S(format!("LOCATION#{}", location_id)))
        .return_values(ReturnValue::AllOld)
        .send()
        .await;

    let result = match result {
        Ok(result) => result,
        Err(err) => return ApiError::from(err).response(),
    };

    let Some(deleted) = result.attributes().and_then(location_from_item) else {
        return ApiError::not_found("Location not found").response();
    };

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(
            serde_json::json!({"success": true, "data": deleted})
                .to_string()
                .into(),
        )
        .map_err(Box::new)?)
}
