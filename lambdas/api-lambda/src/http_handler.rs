use lambda_http::{
    http::{Method, StatusCode},
    Body, Error, Request, RequestExt, Response,
};
use roadreport_shared::{auth, geocoder, locations, reports, AppState};
use std::env;
use std::sync::Arc;

/// Main Lambda handler - routes requests to the service modules
pub(crate) async fn function_handler(
    event: Request,
    state: Arc<AppState>,
) -> Result<Response<Body>, Error> {
    let method = event.method();
    let path = event.uri().path();
    let body = event.body();
    tracing::info!("Roadreport API invoked - Method: {} Path: {}", method, path);

    // Handle CORS preflight
    if method == "OPTIONS" {
        return Ok(Response::builder()
            .status(StatusCode::OK)
            .header("Access-Control-Allow-Origin", "*")
            .header(
                "Access-Control-Allow-Methods",
                "GET,POST,PUT,DELETE,OPTIONS",
            )
            .header("Access-Control-Allow-Headers", "Content-Type,Authorization")
            .body(Body::Empty)
            .map_err(Box::new)?);
    }

    let table_name = env::var("TABLE_NAME").unwrap_or_else(|_| "roadreport".to_string());
    let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    match (method, parts.as_slice()) {
        // Health check
        (&Method::GET, []) => ok_json(serde_json::json!({"success": true, "message": "I am here"})),

        // --- AUTH (public) ---
        (&Method::POST, ["auth", "register"]) => {
            auth::register(&state.dynamo_client, &table_name, body).await
        }
        (&Method::POST, ["auth", "login"]) => {
            auth::login(&state.dynamo_client, &table_name, body).await
        }

        // --- GEOCODING (public, read-only) ---
        (&Method::GET, ["geocode", "forward"]) => {
            let Some(address) = event
                .query_string_parameters_ref()
                .and_then(|params| params.first("address"))
            else {
                return roadreport_shared::error::ApiError::validation(
                    "Missing 'address' query parameter",
                )
                .response();
            };
            match geocoder::forward_geocode(&state.http_client, address).await {
                Ok(point) => ok_json(serde_json::json!({"success": true, "data": point})),
                Err(e) => e.response(),
            }
        }
        (&Method::GET, ["geocode", "reverse"]) => {
            let coord = |key: &str| {
                event
                    .query_string_parameters_ref()
                    .and_then(|params| params.first(key))
                    .and_then(|v| v.parse::<f64>().ok())
            };
            let (Some(lat), Some(lng)) = (coord("lat"), coord("lng")) else {
                return roadreport_shared::error::ApiError::validation(
                    "Missing or malformed 'lat'/'lng' query parameters",
                )
                .response();
            };
            match geocoder::reverse_geocode(&state.http_client, lat, lng).await {
                Ok(address) => ok_json(serde_json::json!({"success": true, "data": address})),
                Err(e) => e.response(),
            }
        }

        // --- SAVED LOCATIONS (all authenticated) ---
        (&Method::POST, ["locations"]) => {
            let user = match auth::authenticate(&event, &state.dynamo_client, &table_name).await {
                Ok(user) => user,
                Err(e) => return e.response(),
            };
            locations::save_location(&state.dynamo_client, &table_name, &user.id, body).await
        }
        (&Method::GET, ["locations", "user", user_id]) => {
            if let Err(e) = auth::authenticate(&event, &state.dynamo_client, &table_name).await {
                return e.response();
            }
            locations::list_user_locations(&state.dynamo_client, &table_name, user_id).await
        }
        (&Method::DELETE, ["locations", location_id]) => {
            let user = match auth::authenticate(&event, &state.dynamo_client, &table_name).await {
                Ok(user) => user,
                Err(e) => return e.response(),
            };
            locations::delete_location(&state.dynamo_client, &table_name, &user.id, location_id)
                .await
        }

        // --- REPORTS ---
        // GET /reports - public listing with filters/sort/pagination/geo
        (&Method::GET, ["reports"]) => {
            reports::list_reports(
                &state.dynamo_client,
                &table_name,
                event.query_string_parameters_ref(),
            )
            .await
        }
        // POST /reports - create report
        (&Method::POST, ["reports"]) => {
            let user = match auth::authenticate(&event, &state.dynamo_client, &table_name).await {
                Ok(user) => user,
                Err(e) => return e.response(),
            };
            reports::create_report(&state.dynamo_client, &table_name, &user.id, body).await
        }
        // GET /reports/stats - public aggregate statistics
        (&Method::GET, ["reports", "stats"]) => {
            reports::get_statistics(&state.dynamo_client, &table_name).await
        }
        // GET /reports/{id} - public single report
        (&Method::GET, ["reports", report_id]) => {
            reports::get_report(&state.dynamo_client, &table_name, report_id).await
        }
        // PUT /reports/{id} - partial update (creator or admin)
        (&Method::PUT, ["reports", report_id]) => {
            let user = match auth::authenticate(&event, &state.dynamo_client, &table_name).await {
                Ok(user) => user,
                Err(e) => return e.response(),
            };
            reports::update_report(&state.dynamo_client, &table_name, report_id, &user, body).await
        }
        // DELETE /reports/{id} - delete (creator or admin)
        (&Method::DELETE, ["reports", report_id]) => {
            let user = match auth::authenticate(&event, &state.dynamo_client, &table_name).await {
                Ok(user) => user,
                Err(e) => return e.response(),
            };
            reports::delete_report(&state.dynamo_client, &table_name, report_id, &user).await
        }
        // PUT /reports/{id}/vote - cast/switch/retract a vote
        (&Method::PUT, ["reports", report_id, "vote"]) => {
            let user = match auth::authenticate(&event, &state.dynamo_client, &table_name).await {
                Ok(user) => user,
                Err(e) => return e.response(),
            };
            reports::vote_on_report(&state.dynamo_client, &table_name, report_id, &user.id, body)
                .await
        }
        // POST /reports/{id}/comments - append a comment
        (&Method::POST, ["reports", report_id, "comments"]) => {
            let user = match auth::authenticate(&event, &state.dynamo_client, &table_name).await {
                Ok(user) => user,
                Err(e) => return e.response(),
            };
            reports::add_comment(&state.dynamo_client, &table_name, report_id, &user, body).await
        }

        _ => {
            tracing::warn!("No route matched - Method: {} Path: {}", method, path);
            not_found()
        }
    }
}

fn ok_json(body: serde_json::Value) -> Result<Response<Body>, Error> {
    Ok(Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(body.to_string().into())
        .map_err(Box::new)?)
}

fn not_found() -> Result<Response<Body>, Error> {
    Ok(Response::builder()
        .status(StatusCode::NOT_FOUND)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(
            serde_json::json!({"success": false, "message": "Not found"})
                .to_string()
                .into(),
        )
        .map_err(Box::new)?)
}
