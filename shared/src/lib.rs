pub mod auth;
pub mod error;
pub mod geocoder;
pub mod locations;
pub mod reports;
pub mod types;
pub mod users;

use aws_sdk_dynamodb::Client as DynamoClient;
use std::sync::Arc;

/// Shared application state
pub struct AppState {
    pub dynamo_client: DynamoClient,
    pub http_client: reqwest::Client,
}

impl AppState {
    pub fn new(dynamo_client: DynamoClient, http_client: reqwest::Client) -> Arc<Self> {
        Arc::new(Self {
            dynamo_client,
            http_client,
        })
    }
}
