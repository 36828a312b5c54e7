use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client as DynamoClient;
use lambda_http::aws_lambda_events::query_map::QueryMap;
use lambda_http::{http::StatusCode, Body, Error, Response};
use std::cmp::Ordering;
use std::collections::HashMap;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::types::{
    Comment, CommentRequest, CreateReportRequest, GeoPoint, PublicUser, Report, Severity, Size,
    Statistics, Status, StatusStat, SeverityStat, UpdateReportRequest, VoteRecord, VoteRequest,
    VoteType, Votes,
};
use crate::users;

/// All reports share one partition so the collection can be listed with a
/// key-condition query.
const REPORT_PK: &str = "REPORT";

const DEFAULT_GEO_RADIUS_M: f64 = 5000.0;
const DEFAULT_PAGE_LIMIT: usize = 25;
const MAX_DESCRIPTION_CHARS: usize = 500;
/// Attempts per mutation before giving up on the version CAS
const MUTATION_RETRIES: usize = 3;

const EARTH_RADIUS_M: f64 = 6_371_000.0;

// ========== PURE CORE ==========

/// Allow-listed listing filters. Unknown query keys are ignored.
#[derive(Debug, Default)]
pub struct ReportFilter {
    pub status: Option<Status>,
    pub severity: Option<Severity>,
    pub created_by: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub distance: Option<f64>,
}

impl ReportFilter {
    pub fn matches(&self, report: &Report) -> bool {
        if let Some(status) = self.status {
            if report.status != status {
                return false;
            }
        }
        if let Some(severity) = self.severity {
            if report.severity != severity {
                return false;
            }
        }
        if let Some(created_by) = &self.created_by {
            if &report.created_by != created_by {
                return false;
            }
        }
        if let (Some(latitude), Some(longitude)) = (self.latitude, self.longitude) {
            let radius = self.distance.unwrap_or(DEFAULT_GEO_RADIUS_M);
            let meters = haversine_m(
                latitude,
                longitude,
                report.location.latitude(),
                report.location.longitude(),
            );
            if meters > radius {
                return false;
            }
        }
        true
    }
}

#[derive(Debug)]
pub struct ListQuery {
    pub filter: ReportFilter,
    pub sort: Option<String>,
    pub page: usize,
    pub limit: usize,
}

impl ListQuery {
    pub fn from_query(query: Option<&QueryMap>) -> Result<ListQuery, ApiError> {
        let first = |key: &str| query.and_then(|q| q.first(key)).map(|s| s.to_string());

        let status = match first("status") {
            Some(s) => Some(
                Status::parse(&s).ok_or_else(|| {
                    ApiError::validation(format!("Unknown status filter '{}'", s))
                })?,
            ),
            None => None,
        };
        let severity = match first("severity") {
            Some(s) => Some(Severity::parse(&s).ok_or_else(|| {
                ApiError::validation(format!("Unknown severity filter '{}'", s))
            })?),
            None => None,
        };

        let parse_f64 = |key: &str| -> Result<Option<f64>, ApiError> {
            match first(key) {
                Some(s) => s
                    .parse::<f64>()
                    .map(Some)
                    .map_err(|_| ApiError::validation(format!("'{}' must be a number", key))),
                None => Ok(None),
            }
        };

        Ok(ListQuery {
            filter: ReportFilter {
                status,
                severity,
                created_by: first("created_by"),
                latitude: parse_f64("latitude")?,
                longitude: parse_f64("longitude")?,
                distance: parse_f64("distance")?,
            },
            sort: first("sort"),
            page: first("page")
                .and_then(|s| s.parse::<usize>().ok())
                .filter(|p| *p > 0)
                .unwrap_or(1),
            limit: first("limit")
                .and_then(|s| s.parse::<usize>().ok())
                .filter(|l| *l > 0)
                .unwrap_or(DEFAULT_PAGE_LIMIT),
        })
    }
}

/// Great-circle distance between two (lat, lng) points in meters
pub fn haversine_m(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lng = (lng2 - lng1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * a.sqrt().asin() * EARTH_RADIUS_M
}

/// Sort per a comma-joined field list; a leading '-' means descending.
/// Unknown fields are ignored.
pub fn sort_reports(reports: &mut [Report], sort: &str) {
    let keys: Vec<&str> = sort
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    reports.sort_by(|a, b| {
        for key in &keys {
            let (field, descending) = match key.strip_prefix('-') {
                Some(field) => (field, true),
                None => (*key, false),
            };
            let ord = match field {
                "created_at" => a.created_at.cmp(&b.created_at),
                "updated_at" => a.updated_at.cmp(&b.updated_at),
                "severity" => a.severity.rank().cmp(&b.severity.rank()),
                "status" => a.status.rank().cmp(&b.status.rank()),
                "address" => a.address.cmp(&b.address),
                _ => Ordering::Equal,
            };
            let ord = if descending { ord.reverse() } else { ord };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
}

/// Pagination window: (records to skip, total page count)
pub fn page_bounds(total: usize, page: usize, limit: usize) -> (usize, usize) {
    let pages = total.div_ceil(limit);
    let skip = (page - 1) * limit;
    (skip, pages)
}

/// Mutation rights: the creator, or an admin
pub fn can_modify(report: &Report, requester_id: &str, is_admin: bool) -> bool {
    report.created_by == requester_id || is_admin
}

/// Apply one user's vote. Invariant: after every branch the tallies equal
/// the count of matching records, and the user appears at most once.
pub fn apply_vote(votes: &mut Votes, user_id: &str, vote_type: VoteType) {
    match votes.users.iter().position(|v| v.user == user_id) {
        // Same type again: un-vote
        Some(idx) if votes.users[idx].vote_type == vote_type => {
            votes.users.remove(idx);
            match vote_type {
                VoteType::Upvote => votes.upvotes -= 1,
                VoteType::Downvote => votes.downvotes -= 1,
            }
        }
        // Different type: switch
        Some(idx) => {
            votes.users[idx].vote_type = vote_type;
            match vote_type {
                VoteType::Upvote => {
                    votes.upvotes += 1;
                    votes.downvotes -= 1;
                }
                VoteType::Downvote => {
                    votes.downvotes += 1;
                    votes.upvotes -= 1;
                }
            }
        }
        None => {
            votes.users.push(VoteRecord {
                user: user_id.to_string(),
                vote_type,
            });
            match vote_type {
                VoteType::Upvote => votes.upvotes += 1,
                VoteType::Downvote => votes.downvotes += 1,
            }
        }
    }
}

/// Apply a partial update. Setting status to "verified" as an admin stamps
/// the verifier; "fixed" stamps the fixed timestamp for any requester.
/// A non-admin owner may still set "verified" without stamping - source
/// behavior kept as-is, flagged in DESIGN.md.
pub fn apply_update(
    report: &mut Report,
    patch: &UpdateReportRequest,
    requester_id: &str,
    is_admin: bool,
    now: &str,
) -> Result<(), ApiError> {
    if let Some(address) = &patch.address {
        if address.trim().is_empty() {
            return Err(ApiError::validation("Address cannot be empty"));
        }
        report.address = address.clone();
    }
    if let Some(description) = &patch.description {
        if description.chars().count() > MAX_DESCRIPTION_CHARS {
            return Err(ApiError::validation(
                "Description cannot be more than 500 characters",
            ));
        }
        report.description = Some(description.clone());
    }
    if let Some(severity) = patch.severity {
        report.severity = severity;
    }
    if let Some(size) = &patch.size {
        report.size = size.clone();
    }
    if let Some(images) = &patch.images {
        report.images = images.clone();
    }
    if let Some(status) = patch.status {
        report.status = status;
        if status == Status::Verified && is_admin {
            report.verified_by = Some(requester_id.to_string());
            report.verified_at = Some(now.to_string());
        }
        if status == Status::Fixed {
            report.fixed_at = Some(now.to_string());
        }
    }
    report.updated_at = now.to_string();
    Ok(())
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0u64), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

/// Full-collection aggregate: totals, per-severity counts with average
/// dimensions, per-status counts.
pub fn compute_stats(reports: &[Report]) -> Statistics {
    let mut by_severity = Vec::new();
    for severity in Severity::ALL {
        let group: Vec<&Report> = reports.iter().filter(|r| r.severity == severity).collect();
        if group.is_empty() {
            continue;
        }
        by_severity.push(SeverityStat {
            severity,
            count: group.len() as u64,
            avg_width: mean(group.iter().filter_map(|r| r.size.width)),
            avg_depth: mean(group.iter().filter_map(|r| r.size.depth)),
        });
    }

    let mut by_status = Vec::new();
    for status in Status::ALL {
        let count = reports.iter().filter(|r| r.status == status).count() as u64;
        if count > 0 {
            by_status.push(StatusStat { status, count });
        }
    }

    Statistics {
        total: reports.len() as u64,
        by_severity,
        by_status,
        avg_width: mean(reports.iter().filter_map(|r| r.size.width)),
        avg_depth: mean(reports.iter().filter_map(|r| r.size.depth)),
    }
}

// ========== PERSISTENCE ==========

fn json_attr<T: serde::de::DeserializeOwned>(
    item: &HashMap<String, AttributeValue>,
    key: &str,
) -> Option<T> {
    item.get(key)
        .and_then(|v| v.as_s().ok())
        .and_then(|s| serde_json::from_str(s).ok())
}

fn report_from_item(item: &HashMap<String, AttributeValue>) -> Option<Report> {
    let sk = item.get("SK")?.as_s().ok()?;
    let report_id = sk.strip_prefix("REPORT#")?.to_string();

    let get_s = |key: &str| {
        item.get(key)
            .and_then(|v| v.as_s().ok())
            .map(|s| s.to_string())
    };
    let get_n = |key: &str| {
        item.get(key)
            .and_then(|v| v.as_n().ok())
            .and_then(|n| n.parse::<f64>().ok())
    };

    Some(Report {
        report_id,
        created_by: get_s("created_by")?,
        location: GeoPoint::new(get_n("lng")?, get_n("lat")?),
        address: get_s("address")?,
        description: get_s("description"),
        severity: Severity::parse(&get_s("severity")?)?,
        size: Size {
            width: get_n("size_width"),
            depth: get_n("size_depth"),
        },
        status: Status::parse(&get_s("status")?)?,
        images: json_attr(item, "images").unwrap_or_default(),
        verified_by: get_s("verified_by"),
        verified_at: get_s("verified_at"),
        fixed_at: get_s("fixed_at"),
        votes: json_attr(item, "votes").unwrap_or_default(),
        comments: json_attr(item, "comments").unwrap_or_default(),
        created_at: get_s("created_at")?,
        updated_at: get_s("updated_at")?,
        version: item
            .get("version")
            .and_then(|v| v.as_n().ok())
            .and_then(|n| n.parse().ok())
            .unwrap_or(0),
    })
}

/// Write the full report item. With `expected_version` the put is
/// conditional on the stored version; Ok(false) signals a lost race.
async fn put_report(
    client: &DynamoClient,
    table_name: &str,
    report: &Report,
    expected_version: Option<i64>,
) -> Result<bool, ApiError> {
    let images = serde_json::to_string(&report.images)
        .map_err(|e| ApiError::internal(e.to_string()))?;
    let votes =
        serde_json::to_string(&report.votes).map_err(|e| ApiError::internal(e.to_string()))?;
    let comments =
        serde_json::to_string(&report.comments).map_err(|e| ApiError::internal(e.to_string()))?;

    let mut put_request = client
        .put_item()
        .table_name(table_name)
        .item("PK", AttributeValue::S(REPORT_PK.to_string()))
        .item(
            "SK",
            AttributeValue::S(format!("REPORT#{}", report.report_id)),
        )
        .item("created_by", AttributeValue::S(report.created_by.clone()))
        .item(
            "lng",
            AttributeValue::N(report.location.longitude().to_string()),
        )
        .item(
            "lat",
            AttributeValue::N(report.location.latitude().to_string()),
        )
        .item("address", AttributeValue::S(report.address.clone()))
        .item(
            "severity",
            AttributeValue::S(report.severity.as_str().to_string()),
        )
        .item(
            "status",
            AttributeValue::S(report.status.as_str().to_string()),
        )
        .item("images", AttributeValue::S(images))
        .item("votes", AttributeValue::S(votes))
        .item("comments", AttributeValue::S(comments))
        .item("created_at", AttributeValue::S(report.created_at.clone()))
        .item("updated_at", AttributeValue::S(report.updated_at.clone()))
        .item("version", AttributeValue::N(report.version.to_string()));

    if let Some(description) = &report.description {
        put_request = put_request.item("description", AttributeValue::S(description.clone()));
    }
    if let Some(width) = report.size.width {
        put_request = put_request.item("size_width", AttributeValue::N(width.to_string()));
    }
    if let Some(depth) = report.size.depth {
        put_request = put_request.item("size_depth", AttributeValue::N(depth.to_string()));
    }
    if let Some(verified_by) = &report.verified_by {
        put_request = put_request.item("verified_by", AttributeValue::S(verified_by.clone()));
    }
    if let Some(verified_at) = &report.verified_at {
        put_request = put_request.item("verified_at", AttributeValue::S(verified_at.clone()));
    }
    if let Some(fixed_at) = &report.fixed_at {
        put_request = put_request.item("fixed_at", AttributeValue::S(fixed_at.clone()));
    }

    if let Some(expected) = expected_version {
        put_request = put_request
            .condition_expression("version = :expected")
            .expression_attribute_values(":expected", AttributeValue::N(expected.to_string()));
    }

    match put_request.send().await {
        Ok(_) => Ok(true),
        Err(err)
            if err
                .as_service_error()
                .map(|e| e.is_conditional_check_failed_exception())
                .unwrap_or(false) =>
        {
            Ok(false)
        }
        Err(err) => Err(err.into()),
    }
}

async fn fetch_report(
    client: &DynamoClient,
    table_name: &str,
    report_id: &str,
) -> Result<Option<Report>, ApiError> {
    let result = client
        .get_item()
        .table_name(table_name)
        .key("PK", AttributeValue::S(REPORT_PK.to_string()))
        .key("SK", AttributeValue::S(format!("REPORT#{}", report_id)))
        .send()
        .await?;

    Ok(result.item().and_then(report_from_item))
}

async fn fetch_all_reports(
    client: &DynamoClient,
    table_name: &str,
) -> Result<Vec<Report>, ApiError> {
    let mut reports = Vec::new();
    let mut last_key: Option<HashMap<String, AttributeValue>> = None;

    loop {
        let mut query = client
            .query()
            .table_name(table_name)
            .key_condition_expression("PK = :pk AND begins_with(SK, :sk_prefix)")
            .expression_attribute_values(":pk", AttributeValue::S(REPORT_PK.to_string()))
            .expression_attribute_values(":sk_prefix", AttributeValue::S("REPORT#".to_string()));
        if let Some(key) = last_key.take() {
            query = query.set_exclusive_start_key(Some(key));
        }

        let result = query.send().await?;
        reports.extend(result.items().iter().filter_map(report_from_item));

        match result.last_evaluated_key() {
            Some(key) if !key.is_empty() => last_key = Some(key.clone()),
            _ => break,
        }
    }

    Ok(reports)
}

/// Read-transform-write with a bounded retry on the version condition, so
/// concurrent mutations of the same report never lose an update.
async fn mutate_report<F>(
    client: &DynamoClient,
    table_name: &str,
    report_id: &str,
    mut apply: F,
) -> Result<Report, ApiError>
where
    F: FnMut(&mut Report) -> Result<(), ApiError>,
{
    for _ in 0..MUTATION_RETRIES {
        let Some(mut report) = fetch_report(client, table_name, report_id).await? else {
            return Err(ApiError::not_found("Pothole not found"));
        };

        let expected = report.version;
        apply(&mut report)?;
        report.version = expected + 1;

        if put_report(client, table_name, &report, Some(expected)).await? {
            return Ok(report);
        }
        tracing::warn!("Version conflict on report {}, retrying", report_id);
    }

    Err(ApiError::internal(format!(
        "Report {} kept changing concurrently",
        report_id
    )))
}

// ========== ENRICHMENT ==========

type UserCache = HashMap<String, Option<PublicUser>>;

async fn lookup_public_user(
    client: &DynamoClient,
    table_name: &str,
    cache: &mut UserCache,
    user_id: &str,
) -> Result<Option<PublicUser>, ApiError> {
    if let Some(cached) = cache.get(user_id) {
        return Ok(cached.clone());
    }
    let user = users::get_public_user(client, table_name, user_id).await?;
    cache.insert(user_id.to_string(), user.clone());
    Ok(user)
}

fn user_ref(user_id: &str, resolved: Option<PublicUser>) -> serde_json::Value {
    match resolved {
        Some(user) => serde_json::json!(user),
        None => serde_json::json!(user_id),
    }
}

/// Serialize a report with creator (and, when `full`, verifier and comment
/// author) references resolved to minimal public identity fields.
async fn enrich_report(
    client: &DynamoClient,
    table_name: &str,
    cache: &mut UserCache,
    report: &Report,
    full: bool,
) -> Result<serde_json::Value, ApiError> {
    let mut value =
        serde_json::to_value(report).map_err(|e| ApiError::internal(e.to_string()))?;

    let creator = lookup_public_user(client, table_name, cache, &report.created_by).await?;
    value["created_by"] = user_ref(&report.created_by, creator);

    if full {
        if let Some(verified_by) = &report.verified_by {
            let verifier = lookup_public_user(client, table_name, cache, verified_by).await?;
            value["verified_by"] = user_ref(verified_by, verifier);
        }
        let mut comments = Vec::with_capacity(report.comments.len());
        for comment in &report.comments {
            let author = lookup_public_user(client, table_name, cache, &comment.user).await?;
            comments.push(serde_json::json!({
                "user": user_ref(&comment.user, author),
                "text": comment.text,
                "created_at": comment.created_at,
            }));
        }
        value["comments"] = serde_json::Value::Array(comments);
    }

    Ok(value)
}

// ========== HANDLERS ==========

fn json_response(
    status: StatusCode,
    body: serde_json::Value,
) -> Result<Response<Body>, Error> {
    Ok(Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(body.to_string().into())
        .map_err(Box::new)?)
}

/// Create a new pothole report owned by the calling user
pub async fn create_report(
    client: &DynamoClient,
    table_name: &str,
    user_id: &str,
    body: &[u8],
) -> Result<Response<Body>, Error> {
    let req: CreateReportRequest = match serde_json::from_slice(body) {
        Ok(req) => req,
        Err(e) => return ApiError::from(e).response(),
    };

    let (Some(latitude), Some(longitude), Some(address)) =
        (req.latitude, req.longitude, req.address)
    else {
        return ApiError::validation("Please provide latitude, longitude, and address").response();
    };

    if let Some(description) = &req.description {
        if description.chars().count() > MAX_DESCRIPTION_CHARS {
            return ApiError::validation("Description cannot be more than 500 characters")
                .response();
        }
    }

    let now = chrono::Utc::now().to_rfc3339();
    let report = Report {
        report_id: uuid::Uuid::new_v4().to_string(),
        created_by: user_id.to_string(),
        // GeoJSON order: longitude first
        location: GeoPoint::new(longitude, latitude),
        address,
        description: req.description,
        severity: req.severity.unwrap_or(Severity::Medium),
        size: req.size.unwrap_or_default(),
        status: Status::Reported,
        images: req.images.unwrap_or_default(),
        verified_by: None,
        verified_at: None,
        fixed_at: None,
        votes: Votes::default(),
        comments: Vec::new(),
        created_at: now.clone(),
        updated_at: now,
        version: 0,
    };

    if let Err(err) = put_report(client, table_name, &report, None).await {
        return err.response();
    }

    tracing::info!("Created report {} by {}", report.report_id, user_id);

    json_response(
        StatusCode::CREATED,
        serde_json::json!({"success": true, "data": report}),
    )
}

/// List reports with filtering, sorting, pagination and an optional
/// within-distance geospatial predicate
pub async fn list_reports(
    client: &DynamoClient,
    table_name: &str,
    query: Option<&QueryMap>,
) -> Result<Response<Body>, Error> {
    let list_query = match ListQuery::from_query(query) {
        Ok(q) => q,
        Err(e) => return e.response(),
    };

    let mut reports = match fetch_all_reports(client, table_name).await {
        Ok(reports) => reports,
        Err(e) => return e.response(),
    };
    reports.retain(|r| list_query.filter.matches(r));

    let sort = list_query.sort.as_deref().unwrap_or("-created_at");
    sort_reports(&mut reports, sort);

    let total = reports.len();
    let (skip, pages) = page_bounds(total, list_query.page, list_query.limit);
    let page: Vec<&Report> = reports.iter().skip(skip).take(list_query.limit).collect();

    let mut cache = UserCache::new();
    let mut data = Vec::with_capacity(page.len());
    for report in &page {
        match enrich_report(client, table_name, &mut cache, report, false).await {
            Ok(value) => data.push(value),
            Err(e) => return e.response(),
        }
    }

    json_response(
        StatusCode::OK,
        serde_json::json!({
            "success": true,
            "count": data.len(),
            "total": total,
            "pages": pages,
            "data": data,
        }),
    )
}

/// Get a single report with all user references resolved
pub async fn get_report(
    client: &DynamoClient,
    table_name: &str,
    report_id: &str,
) -> Result<Response<Body>, Error> {
    let report = match fetch_report(client, table_name, report_id).await {
        Ok(Some(report)) => report,
        Ok(None) => return ApiError::not_found("Pothole not found").response(),
        Err(e) => return e.response(),
    };

    let mut cache = UserCache::new();
    match enrich_report(client, table_name, &mut cache, &report, true).await {
        Ok(value) => json_response(
            StatusCode::OK,
            serde_json::json!({"success": true, "data": value}),
        ),
        Err(e) => e.response(),
    }
}

/// Partially update a report (creator or admin only)
pub async fn update_report(
    client: &DynamoClient,
    table_name: &str,
    report_id: &str,
    requester: &AuthUser,
    body: &[u8],
) -> Result<Response<Body>, Error> {
    let patch: UpdateReportRequest = match serde_json::from_slice(body) {
        Ok(patch) => patch,
        Err(e) => return ApiError::from(e).response(),
    };

    let now = chrono::Utc::now().to_rfc3339();
    let result = mutate_report(client, table_name, report_id, |report| {
        if !can_modify(report, &requester.id, requester.is_admin) {
            return Err(ApiError::forbidden("Not authorized to update this pothole"));
        }
        apply_update(report, &patch, &requester.id, requester.is_admin, &now)
    })
    .await;

    let report = match result {
        Ok(report) => report,
        Err(e) => return e.response(),
    };

    let mut cache = UserCache::new();
    match enrich_report(client, table_name, &mut cache, &report, true).await {
        Ok(value) => json_response(
            StatusCode::OK,
            serde_json::json!({"success": true, "data": value}),
        ),
        Err(e) => e.response(),
    }
}

/// Delete a report (creator or admin only)
pub async fn delete_report(
    client: &DynamoClient,
    table_name: &str,
    report_id: &str,
    requester: &AuthUser,
) -> Result<Response<Body>, Error> {
    let report = match fetch_report(client, table_name, report_id).await {
        Ok(Some(report)) => report,
        Ok(None) => return ApiError::not_found("Pothole not found").response(),
        Err(e) => return e.response(),
    };

    if !can_modify(&report, &requester.id, requester.is_admin) {
        return ApiError::forbidden("Not authorized to delete this pothole").response();
    }

    let result = client
        .delete_item()
        .table_name(table_name)
        .key("PK", AttributeValue::S(REPORT_PK.to_string()))
        .key("SK", AttributeValue::S(format!("REPORT#{}", report_id)))
        .send()
        .await;
    if let Err(err) = result {
        return ApiError::from(err).response();
    }

    tracing::info!("Deleted report {} by {}", report_id, requester.id);

    json_response(
        StatusCode::OK,
        serde_json::json!({"success": true, "data": {}}),
    )
}

/// Cast, switch or retract a vote; returns the updated tallies
pub async fn vote_on_report(
    client: &DynamoClient,
    table_name: &str,
    report_id: &str,
    user_id: &str,
    body: &[u8],
) -> Result<Response<Body>, Error> {
    let req: VoteRequest = match serde_json::from_slice(body) {
        Ok(req) => req,
        Err(e) => return ApiError::from(e).response(),
    };

    let vote_type = match req.vote_type.as_deref() {
        Some("upvote") => VoteType::Upvote,
        Some("downvote") => VoteType::Downvote,
        _ => {
            return ApiError::validation("Please provide either 'upvote' or 'downvote'")
                .response()
        }
    };

    let now = chrono::Utc::now().to_rfc3339();
    let result = mutate_report(client, table_name, report_id, |report| {
        apply_vote(&mut report.votes, user_id, vote_type);
        report.updated_at = now.clone();
        Ok(())
    })
    .await;

    match result {
        Ok(report) => json_response(
            StatusCode::OK,
            serde_json::json!({
                "success": true,
                "data": {
                    "upvotes": report.votes.upvotes,
                    "downvotes": report.votes.downvotes,
                },
            }),
        ),
        Err(e) => e.response(),
    }
}

/// Append a comment; comments are never edited or deleted
pub async fn add_comment(
    client: &DynamoClient,
    table_name: &str,
    report_id: &str,
    requester: &AuthUser,
    body: &[u8],
) -> Result<Response<Body>, Error> {
    let req: CommentRequest = match serde_json::from_slice(body) {
        Ok(req) => req,
        Err(e) => return ApiError::from(e).response(),
    };

    let text = match req.text {
        Some(text) if !text.trim().is_empty() => text,
        _ => return ApiError::validation("Please provide comment text").response(),
    };

    let comment = Comment {
        user: requester.id.clone(),
        text,
        created_at: chrono::Utc::now().to_rfc3339(),
    };

    let result = mutate_report(client, table_name, report_id, |report| {
        report.comments.push(comment.clone());
        report.updated_at = comment.created_at.clone();
        Ok(())
    })
    .await;

    if let Err(e) = result {
        return e.response();
    }

    json_response(
        StatusCode::CREATED,
        serde_json::json!({
            "success": true,
            "data": {
                "user": {
                    "user_id": requester.id,
                    "name": requester.name,
                    "email": requester.email,
                },
                "text": comment.text,
                "created_at": comment.created_at,
            },
        }),
    )
}

/// Aggregate statistics over the whole report collection
pub async fn get_statistics(
    client: &DynamoClient,
    table_name: &str,
) -> Result<Response<Body>, Error> {
    let reports = match fetch_all_reports(client, table_name).await {
        Ok(reports) => reports,
        Err(e) => return e.response(),
    };

    let stats = compute_stats(&reports);

    json_response(
        StatusCode::OK,
        serde_json::json!({"success": true, "data": stats}),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(id: &str, created_by: &str, lng: f64, lat: f64) -> Report {
        Report {
            report_id: id.to_string(),
            created_by: created_by.to_string(),
            location: GeoPoint::new(lng, lat),
            address: "5th Ave".to_string(),
            description: None,
            severity: Severity::Medium,
            size: Size::default(),
            status: Status::Reported,
            images: Vec::new(),
            verified_by: None,
            verified_at: None,
            fixed_at: None,
            votes: Votes::default(),
            comments: Vec::new(),
            created_at: "2026-01-01T00:00:00+00:00".to_string(),
            updated_at: "2026-01-01T00:00:00+00:00".to_string(),
            version: 0,
        }
    }

    fn admin(id: &str) -> AuthUser {
        AuthUser {
            id: id.to_string(),
            name: "Admin".to_string(),
            email: "admin@example.com".to_string(),
            is_admin: true,
        }
    }

    fn tally_matches_records(votes: &Votes) -> bool {
        let ups = votes
            .users
            .iter()
            .filter(|v| v.vote_type == VoteType::Upvote)
            .count() as i64;
        let downs = votes
            .users
            .iter()
            .filter(|v| v.vote_type == VoteType::Downvote)
            .count() as i64;
        votes.upvotes == ups && votes.downvotes == downs
    }

    #[test]
    fn first_vote_adds_a_record() {
        let mut votes = Votes::default();
        apply_vote(&mut votes, "a", VoteType::Upvote);
        assert_eq!(votes.upvotes, 1);
        assert_eq!(votes.downvotes, 0);
        assert!(tally_matches_records(&votes));
    }

    #[test]
    fn double_vote_of_same_type_cancels() {
        let mut votes = Votes::default();
        apply_vote(&mut votes, "a", VoteType::Upvote);
        apply_vote(&mut votes, "a", VoteType::Upvote);
        assert_eq!(votes.upvotes, 0);
        assert_eq!(votes.downvotes, 0);
        assert!(votes.users.is_empty());
    }

    #[test]
    fn switching_vote_moves_the_tally() {
        let mut votes = Votes::default();
        apply_vote(&mut votes, "a", VoteType::Upvote);
        assert_eq!((votes.upvotes, votes.downvotes), (1, 0));
        apply_vote(&mut votes, "a", VoteType::Downvote);
        assert_eq!((votes.upvotes, votes.downvotes), (0, 1));
        assert_eq!(votes.users.len(), 1);
        assert!(tally_matches_records(&votes));
    }

    #[test]
    fn tally_invariant_holds_over_mixed_sequences() {
        let mut votes = Votes::default();
        let sequence = [
            ("a", VoteType::Upvote),
            ("b", VoteType::Downvote),
            ("c", VoteType::Upvote),
            ("a", VoteType::Downvote),
            ("b", VoteType::Downvote),
            ("c", VoteType::Upvote),
            ("a", VoteType::Downvote),
        ];
        for (user, vote) in sequence {
            apply_vote(&mut votes, user, vote);
            assert!(tally_matches_records(&votes));
            let mut seen: Vec<&str> = votes.users.iter().map(|v| v.user.as_str()).collect();
            seen.sort_unstable();
            seen.dedup();
            assert_eq!(seen.len(), votes.users.len(), "a user voted twice");
        }
        // every user's last action repeated their standing vote, toggling it off
        assert_eq!((votes.upvotes, votes.downvotes), (0, 0));
        assert!(votes.users.is_empty());
    }

    #[test]
    fn pagination_of_25_records() {
        let (skip, pages) = page_bounds(25, 2, 10);
        assert_eq!(skip, 10);
        assert_eq!(pages, 3);
        let taken = (0..25).skip(skip).take(10).count();
        assert_eq!(taken, 10);
    }

    #[test]
    fn pagination_of_empty_collection() {
        let (skip, pages) = page_bounds(0, 1, 25);
        assert_eq!(skip, 0);
        assert_eq!(pages, 0);
    }

    #[test]
    fn geo_filter_includes_near_and_excludes_far() {
        let near = report("near", "u", -73.99, 40.73);
        let far = report("far", "u", -73.90, 41.5); // ~85 km north
        let filter = ReportFilter {
            latitude: Some(40.73),
            longitude: Some(-73.99),
            distance: Some(5000.0),
            ..Default::default()
        };
        assert!(filter.matches(&near));
        assert!(!filter.matches(&far));
    }

    #[test]
    fn equality_filters_match_fields() {
        let mut r = report("r", "creator", 0.0, 0.0);
        r.severity = Severity::High;
        r.status = Status::Verified;

        let filter = ReportFilter {
            severity: Some(Severity::High),
            status: Some(Status::Verified),
            created_by: Some("creator".to_string()),
            ..Default::default()
        };
        assert!(filter.matches(&r));

        let other = ReportFilter {
            severity: Some(Severity::Low),
            ..Default::default()
        };
        assert!(!other.matches(&r));
    }

    #[test]
    fn default_sort_is_newest_first() {
        let mut old = report("old", "u", 0.0, 0.0);
        old.created_at = "2026-01-01T00:00:00+00:00".to_string();
        let mut new = report("new", "u", 0.0, 0.0);
        new.created_at = "2026-02-01T00:00:00+00:00".to_string();

        let mut reports = vec![old, new];
        sort_reports(&mut reports, "-created_at");
        assert_eq!(reports[0].report_id, "new");
    }

    #[test]
    fn sort_accepts_comma_joined_fields() {
        let mut a = report("a", "u", 0.0, 0.0);
        a.severity = Severity::High;
        a.address = "Broadway".to_string();
        let mut b = report("b", "u", 0.0, 0.0);
        b.severity = Severity::High;
        b.address = "Alameda".to_string();
        let mut c = report("c", "u", 0.0, 0.0);
        c.severity = Severity::Low;

        let mut reports = vec![a, b, c];
        sort_reports(&mut reports, "-severity,address");
        assert_eq!(reports[0].report_id, "b");
        assert_eq!(reports[1].report_id, "a");
        assert_eq!(reports[2].report_id, "c");
    }

    #[test]
    fn fixed_status_always_stamps_timestamp() {
        let mut r = report("r", "owner", 0.0, 0.0);
        let patch = UpdateReportRequest {
            status: Some(Status::Fixed),
            ..Default::default()
        };
        apply_update(&mut r, &patch, "owner", false, "2026-03-01T00:00:00+00:00").unwrap();
        assert_eq!(r.status, Status::Fixed);
        assert_eq!(r.fixed_at.as_deref(), Some("2026-03-01T00:00:00+00:00"));
        assert_eq!(r.updated_at, "2026-03-01T00:00:00+00:00");
    }

    #[test]
    fn verified_by_non_admin_does_not_stamp() {
        let mut r = report("r", "owner", 0.0, 0.0);
        let patch = UpdateReportRequest {
            status: Some(Status::Verified),
            ..Default::default()
        };
        apply_update(&mut r, &patch, "owner", false, "now").unwrap();
        assert_eq!(r.status, Status::Verified);
        assert!(r.verified_by.is_none());
        assert!(r.verified_at.is_none());
    }

    #[test]
    fn verified_by_admin_stamps_verifier() {
        let mut r = report("r", "owner", 0.0, 0.0);
        let patch = UpdateReportRequest {
            status: Some(Status::Verified),
            ..Default::default()
        };
        let requester = admin("admin-1");
        apply_update(&mut r, &patch, &requester.id, true, "now").unwrap();
        assert_eq!(r.verified_by.as_deref(), Some("admin-1"));
        assert_eq!(r.verified_at.as_deref(), Some("now"));
    }

    #[test]
    fn overlong_description_is_rejected() {
        let mut r = report("r", "owner", 0.0, 0.0);
        let patch = UpdateReportRequest {
            description: Some("x".repeat(501)),
            ..Default::default()
        };
        let err = apply_update(&mut r, &patch, "owner", false, "now").unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
        assert!(r.description.is_none());
    }

    #[test]
    fn only_creator_or_admin_may_modify() {
        let r = report("r", "owner", 0.0, 0.0);
        assert!(can_modify(&r, "owner", false));
        assert!(can_modify(&r, "someone-else", true));
        assert!(!can_modify(&r, "someone-else", false));
    }

    #[test]
    fn statistics_group_by_severity_and_status() {
        let mut a = report("a", "u", 0.0, 0.0);
        a.severity = Severity::High;
        a.size = Size {
            width: Some(30.0),
            depth: Some(10.0),
        };
        let mut b = report("b", "u", 0.0, 0.0);
        b.severity = Severity::High;
        b.size = Size {
            width: Some(50.0),
            depth: None,
        };
        let mut c = report("c", "u", 0.0, 0.0);
        c.status = Status::Fixed;

        let stats = compute_stats(&[a, b, c]);
        assert_eq!(stats.total, 3);

        let high = stats
            .by_severity
            .iter()
            .find(|s| s.severity == Severity::High)
            .unwrap();
        assert_eq!(high.count, 2);
        assert_eq!(high.avg_width, Some(40.0));
        assert_eq!(high.avg_depth, Some(10.0));

        let fixed = stats
            .by_status
            .iter()
            .find(|s| s.status == Status::Fixed)
            .unwrap();
        assert_eq!(fixed.count, 1);
        assert_eq!(
            stats
                .by_status
                .iter()
                .find(|s| s.status == Status::Reported)
                .unwrap()
                .count,
            2
        );
    }

    #[test]
    fn statistics_of_empty_collection() {
        let stats = compute_stats(&[]);
        assert_eq!(stats.total, 0);
        assert!(stats.by_severity.is_empty());
        assert!(stats.by_status.is_empty());
        assert_eq!(stats.avg_width, None);
    }

    #[test]
    fn haversine_is_roughly_correct() {
        // One degree of latitude is about 111 km
        let d = haversine_m(40.0, -73.0, 41.0, -73.0);
        assert!((d - 111_000.0).abs() < 500.0, "got {}", d);
        assert!(haversine_m(40.0, -73.0, 40.0, -73.0) < 1e-6);
    }
}
