use serde::{Deserialize, Serialize};
use std::env;

use crate::error::ApiError;

const MAPQUEST_BASE: &str = "https://www.mapquestapi.com/geocoding/v1";
const NOMINATIM_BASE: &str = "https://nominatim.openstreetmap.org";
const USER_AGENT: &str = "roadreport/0.1";

#[derive(Debug, Serialize, Clone)]
pub struct GeocodedAddress {
    pub formatted_address: String,
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zipcode: Option<String>,
    pub country: Option<String>,
}

#[derive(Debug, Serialize, Clone)]
pub struct GeocodedPoint {
    pub lat: f64,
    pub lng: f64,
    pub formatted_address: String,
}

// ---- MapQuest response shapes (only the fields we read) ----

#[derive(Debug, Deserialize)]
struct MapquestResponse {
    results: Vec<MapquestResult>,
}

#[derive(Debug, Deserialize)]
struct MapquestResult {
    locations: Vec<MapquestLocation>,
}

#[derive(Debug, Deserialize)]
struct MapquestLocation {
    #[serde(rename = "latLng")]
    lat_lng: MapquestLatLng,
    street: Option<String>,
    /// City
    #[serde(rename = "adminArea5")]
    admin_area5: Option<String>,
    /// State
    #[serde(rename = "adminArea3")]
    admin_area3: Option<String>,
    /// Country
    #[serde(rename = "adminArea1")]
    admin_area1: Option<String>,
    #[serde(rename = "postalCode")]
    postal_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MapquestLatLng {
    lat: f64,
    lng: f64,
}

// ---- Nominatim response shapes ----

#[derive(Debug, Deserialize)]
struct NominatimSearchResult {
    lat: String,
    lon: String,
    display_name: String,
}

#[derive(Debug, Deserialize, Default)]
struct NominatimAddress {
    road: Option<String>,
    city: Option<String>,
    town: Option<String>,
    state: Option<String>,
    postcode: Option<String>,
    country: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NominatimReverseResult {
    display_name: String,
    #[serde(default)]
    address: NominatimAddress,
}

fn format_location(location: &MapquestLocation) -> GeocodedAddress {
    let parts: Vec<&str> = [
        location.street.as_deref(),
        location.admin_area5.as_deref(),
        location.admin_area3.as_deref(),
        location.postal_code.as_deref(),
        location.admin_area1.as_deref(),
    ]
    .into_iter()
    .flatten()
    .filter(|s| !s.is_empty())
    .collect();

    GeocodedAddress {
        formatted_address: parts.join(", "),
        street: location.street.clone(),
        city: location.admin_area5.clone(),
        state: location.admin_area3.clone(),
        zipcode: location.postal_code.clone(),
        country: location.admin_area1.clone(),
    }
}

fn address_from_nominatim(result: NominatimReverseResult) -> GeocodedAddress {
    let NominatimAddress {
        road,
        city,
        town,
        state,
        postcode,
        country,
    } = result.address;
    GeocodedAddress {
        formatted_address: result.display_name,
        street: road,
        city: city.or(town),
        state,
        zipcode: postcode,
        country,
    }
}

fn point_from_nominatim(result: &NominatimSearchResult) -> Result<GeocodedPoint, ApiError> {
    let lat = result
        .lat
        .parse::<f64>()
        .map_err(|_| ApiError::internal("Nominatim returned a malformed latitude"))?;
    let lng = result
        .lon
        .parse::<f64>()
        .map_err(|_| ApiError::internal("Nominatim returned a malformed longitude"))?;
    Ok(GeocodedPoint {
        lat,
        lng,
        formatted_address: result.display_name.clone(),
    })
}

fn api_key() -> Result<String, ApiError> {
    env::var("GEOCODER_API_KEY")
        .map_err(|_| ApiError::internal("GEOCODER_API_KEY must be set"))
}

async fn forward_mapquest(
    http: &reqwest::Client,
    address: &str,
) -> Result<GeocodedPoint, ApiError> {
    let key = api_key()?;
    let response: MapquestResponse = http
        .get(format!("{}/address", MAPQUEST_BASE))
        .query(&[("key", key.as_str()), ("location", address)])
        .send()
        .await
        .map_err(|e| ApiError::internal(format!("Geocoder request failed: {}", e)))?
        .error_for_status()
        .map_err(|e| ApiError::internal(format!("Geocoder returned an error: {}", e)))?
        .json()
        .await
        .map_err(|e| ApiError::internal(format!("Geocoder response unreadable: {}", e)))?;

    let location = response
        .results
        .into_iter()
        .flat_map(|r| r.locations)
        .next()
        .ok_or_else(|| ApiError::not_found("No coordinates found for this address"))?;

    let formatted = format_location(&location).formatted_address;
    Ok(GeocodedPoint {
        lat: location.lat_lng.lat,
        lng: location.lat_lng.lng,
        formatted_address: formatted,
    })
}

async fn forward_nominatim(
    http: &reqwest::Client,
    address: &str,
) -> Result<GeocodedPoint, ApiError> {
    let results: Vec<NominatimSearchResult> = http
        .get(format!("{}/search", NOMINATIM_BASE))
        .header("User-Agent", USER_AGENT)
        .query(&[("q", address), ("format", "json"), ("limit", "1")])
        .send()
        .await
        .map_err(|e| ApiError::internal(format!("OSM geocoder request failed: {}", e)))?
        .json()
        .await
        .map_err(|e| ApiError::internal(format!("OSM geocoder response unreadable: {}", e)))?;

    let first = results
        .first()
        .ok_or_else(|| ApiError::not_found("No coordinates found for this address"))?;
    point_from_nominatim(first)
}

async fn reverse_mapquest(
    http: &reqwest::Client,
    lat: f64,
    lng: f64,
) -> Result<GeocodedAddress, ApiError> {
    let key = api_key()?;
    let location = format!("{},{}", lat, lng);
    let response: MapquestResponse = http
        .get(format!("{}/reverse", MAPQUEST_BASE))
        .query(&[("key", key.as_str()), ("location", location.as_str())])
        .send()
        .await
        .map_err(|e| ApiError::internal(format!("Geocoder request failed: {}", e)))?
        .error_for_status()
        .map_err(|e| ApiError::internal(format!("Geocoder returned an error: {}", e)))?
        .json()
        .await
        .map_err(|e| ApiError::internal(format!("Geocoder response unreadable: {}", e)))?;

    let location = response
        .results
        .into_iter()
        .flat_map(|r| r.locations)
        .next()
        .ok_or_else(|| ApiError::not_found("No address found for these coordinates"))?;

    Ok(format_location(&location))
}

async fn reverse_nominatim(
    http: &reqwest::Client,
    lat: f64,
    lng: f64,
) -> Result<GeocodedAddress, ApiError> {
    let lat_param = lat.to_string();
    let lon_param = lng.to_string();
    let result: NominatimReverseResult = http
        .get(format!("{}/reverse", NOMINATIM_BASE))
        .header("User-Agent", USER_AGENT)
        .query(&[
            ("lat", lat_param.as_str()),
            ("lon", lon_param.as_str()),
            ("format", "json"),
        ])
        .send()
        .await
        .map_err(|e| ApiError::internal(format!("OSM geocoder request failed: {}", e)))?
        .json()
        .await
        .map_err(|e| ApiError::internal(format!("OSM geocoder response unreadable: {}", e)))?;

    Ok(address_from_nominatim(result))
}

/// Address to coordinates. The fallback provider is tried only when the
/// primary fails.
pub async fn forward_geocode(
    http: &reqwest::Client,
    address: &str,
) -> Result<GeocodedPoint, ApiError> {
    match forward_mapquest(http, address).await {
        Ok(point) => Ok(point),
        Err(err) => {
            tracing::warn!("Primary geocoder failed ({}), falling back to OSM", err);
            forward_nominatim(http, address).await
        }
    }
}

/// Coordinates to address fields, with the same fallback behavior
pub async fn reverse_geocode(
    http: &reqwest::Client,
    lat: f64,
    lng: f64,
) -> Result<GeocodedAddress, ApiError> {
    match reverse_mapquest(http, lat, lng).await {
        Ok(address) => Ok(address),
        Err(err) => {
            tracing::warn!("Primary geocoder failed ({}), falling back to OSM", err);
            reverse_nominatim(http, lat, lng).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mapquest_location() {
        let raw = r#"{
            "results": [{
                "locations": [{
                    "latLng": {"lat": 40.7128, "lng": -74.006},
                    "street": "123 Broadway",
                    "adminArea5": "New York",
                    "adminArea3": "NY",
                    "adminArea1": "US",
                    "postalCode": "10007"
                }]
            }]
        }"#;
        let response: MapquestResponse = serde_json::from_str(raw).unwrap();
        let location = &response.results[0].locations[0];
        assert_eq!(location.lat_lng.lat, 40.7128);

        let address = format_location(location);
        assert_eq!(address.city.as_deref(), Some("New York"));
        assert_eq!(
            address.formatted_address,
            "123 Broadway, New York, NY, 10007, US"
        );
    }

    #[test]
    fn parses_nominatim_search_result() {
        let raw = r#"[{"lat": "40.7128", "lon": "-74.0060", "display_name": "New York, USA"}]"#;
        let results: Vec<NominatimSearchResult> = serde_json::from_str(raw).unwrap();
        let point = point_from_nominatim(&results[0]).unwrap();
        assert_eq!(point.lat, 40.7128);
        assert_eq!(point.lng, -74.006);
        assert_eq!(point.formatted_address, "New York, USA");
    }

    #[test]
    fn parses_nominatim_reverse_result_without_address_block() {
        let raw = r#"{"display_name": "Somewhere"}"#;
        let result: NominatimReverseResult = serde_json::from_str(raw).unwrap();
        let address = address_from_nominatim(result);
        assert_eq!(address.formatted_address, "Somewhere");
        assert!(address.city.is_none());
    }
}
