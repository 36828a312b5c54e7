use serde::{Deserialize, Serialize};

// ========== USER ==========
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct User {
    pub user_id: String,
    pub name: String,
    pub email: String,
    pub phone_number: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub is_admin: bool,
    pub created_at: String,
}

/// Identity fields safe to expose on other users' records
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PublicUser {
    pub user_id: String,
    pub name: String,
    pub email: String,
}

impl User {
    pub fn public(&self) -> PublicUser {
        PublicUser {
            user_id: self.user_id.clone(),
            name: self.name.clone(),
            email: self.email.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

// ========== SAVED LOCATION ==========
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SavedLocation {
    pub location_id: String,
    pub user_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub address: Option<String>,
    pub name: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Deserialize)]
pub struct SaveLocationRequest {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub address: Option<String>,
    pub name: Option<String>,
}

// ========== REPORT ==========
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub const ALL: [Severity; 3] = [Severity::Low, Severity::Medium, Severity::High];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }

    pub fn parse(s: &str) -> Option<Severity> {
        match s {
            "low" => Some(Severity::Low),
            "medium" => Some(Severity::Medium),
            "high" => Some(Severity::High),
            _ => None,
        }
    }

    /// Ordering rank for sorting (low < medium < high)
    pub fn rank(&self) -> u8 {
        match self {
            Severity::Low => 0,
            Severity::Medium => 1,
            Severity::High => 2,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Status {
    Reported,
    Verified,
    InProgress,
    Fixed,
}

impl Status {
    pub const ALL: [Status; 4] = [
        Status::Reported,
        Status::Verified,
        Status::InProgress,
        Status::Fixed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Reported => "reported",
            Status::Verified => "verified",
            Status::InProgress => "in-progress",
            Status::Fixed => "fixed",
        }
    }

    pub fn parse(s: &str) -> Option<Status> {
        match s {
            "reported" => Some(Status::Reported),
            "verified" => Some(Status::Verified),
            "in-progress" => Some(Status::InProgress),
            "fixed" => Some(Status::Fixed),
            _ => None,
        }
    }

    pub fn rank(&self) -> u8 {
        match self {
            Status::Reported => 0,
            Status::Verified => 1,
            Status::InProgress => 2,
            Status::Fixed => 3,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VoteType {
    Upvote,
    Downvote,
}

/// GeoJSON point. Coordinates are [longitude, latitude] - order matters.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GeoPoint {
    #[serde(rename = "type")]
    pub point_type: String,
    pub coordinates: [f64; 2],
}

impl GeoPoint {
    pub fn new(longitude: f64, latitude: f64) -> Self {
        Self {
            point_type: "Point".to_string(),
            coordinates: [longitude, latitude],
        }
    }

    pub fn longitude(&self) -> f64 {
        self.coordinates[0]
    }

    pub fn latitude(&self) -> f64 {
        self.coordinates[1]
    }
}

/// Pothole dimensions in centimeters
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Size {
    pub width: Option<f64>,
    pub depth: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct VoteRecord {
    pub user: String,
    pub vote_type: VoteType,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Votes {
    pub upvotes: i64,
    pub downvotes: i64,
    #[serde(default)]
    pub users: Vec<VoteRecord>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Comment {
    pub user: String,
    pub text: String,
    pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Report {
    pub report_id: String,
    pub created_by: String,
    pub location: GeoPoint,
    pub address: String,
    pub description: Option<String>,
    pub severity: Severity,
    pub size: Size,
    pub status: Status,
    pub images: Vec<String>,
    pub verified_by: Option<String>,
    pub verified_at: Option<String>,
    pub fixed_at: Option<String>,
    pub votes: Votes,
    pub comments: Vec<Comment>,
    pub created_at: String,
    pub updated_at: String,
    /// Optimistic-concurrency counter, bumped on every mutation
    #[serde(skip_serializing, default)]
    pub version: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateReportRequest {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub address: Option<String>,
    pub description: Option<String>,
    pub severity: Option<Severity>,
    pub size: Option<Size>,
    pub images: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
pub struct UpdateReportRequest {
    pub address: Option<String>,
    pub description: Option<String>,
    pub severity: Option<Severity>,
    pub size: Option<Size>,
    pub status: Option<Status>,
    pub images: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct VoteRequest {
    pub vote_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CommentRequest {
    pub text: Option<String>,
}

// ========== STATISTICS ==========
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SeverityStat {
    pub severity: Severity,
    pub count: u64,
    pub avg_width: Option<f64>,
    pub avg_depth: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StatusStat {
    pub status: Status,
    pub count: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Statistics {
    pub total: u64,
    pub by_severity: Vec<SeverityStat>,
    pub by_status: Vec<StatusStat>,
    pub avg_width: Option<f64>,
    pub avg_depth: Option<f64>,
}
