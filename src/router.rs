//! Route lookups against an OSRM `/route/v1/driving` endpoint.

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

use crate::geo::GeoPoint;

#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    pub distance_km: f64,
    pub duration_min: i32,
    /// Encoded polyline, opaque to the core.
    pub geometry: String,
}

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("router request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("router returned an error: {0}")]
    Api(String),
    #[error("no route between the given points")]
    NoRoute,
}

#[async_trait]
pub trait Router: Send + Sync {
    async fn route(&self, src: GeoPoint, dest: GeoPoint) -> Result<Route, RouteError>;
}

#[derive(Debug, Clone)]
pub struct OsrmRouter {
    client: Client,
    endpoint: String,
}

impl OsrmRouter {
    pub fn new(endpoint: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }

    fn route_url(&self, src: GeoPoint, dest: GeoPoint) -> Result<Url, RouteError> {
        // OSRM expects lng,lat pairs
        let coords = format!("{},{};{},{}", src.lng, src.lat, dest.lng, dest.lat);
        let mut url = Url::parse(&format!("{}/route/v1/driving/{}", self.endpoint, coords))
            .map_err(|err| RouteError::Api(format!("failed to build OSRM URL: {}", err)))?;
        url.query_pairs_mut()
            .append_pair("overview", "full")
            .append_pair("geometries", "polyline")
            .append_pair("steps", "false");
        Ok(url)
    }
}

#[derive(Debug, Deserialize)]
struct OsrmResponse {
    code: String,
    message: Option<String>,
    routes: Option<Vec<OsrmRoute>>,
}

#[derive(Debug, Deserialize)]
struct OsrmRoute {
    /// meters
    distance: f64,
    /// seconds
    duration: f64,
    geometry: String,
}

#[async_trait]
impl Router for OsrmRouter {
    async fn route(&self, src: GeoPoint, dest: GeoPoint) -> Result<Route, RouteError> {
        let url = self.route_url(src, dest)?;
        let parsed: OsrmResponse = self.client.get(url).send().await?.json().await?;
        parse_route_response(parsed)
    }
}

fn parse_route_response(resp: OsrmResponse) -> Result<Route, RouteError> {
    if resp.code != "Ok" {
        return Err(RouteError::Api(resp.message.unwrap_or(resp.code)));
    }
    let route = resp
        .routes
        .and_then(|routes| routes.into_iter().next())
        .ok_or(RouteError::NoRoute)?;

    Ok(Route {
        distance_km: (route.distance / 1000.0 * 100.0).round() / 100.0,
        duration_min: (route.duration / 60.0).ceil() as i32,
        geometry: route.geometry,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_meters_and_seconds() {
        let resp: OsrmResponse = serde_json::from_str(
            r#"{"code":"Ok","routes":[{"distance":5234.6,"duration":701.2,"geometry":"_p~iF~ps|U_ulLnnqC"}]}"#,
        )
        .unwrap();

        let route = parse_route_response(resp).unwrap();
        assert_eq!(route.distance_km, 5.23);
        assert_eq!(route.duration_min, 12);
        assert_eq!(route.geometry, "_p~iF~ps|U_ulLnnqC");
    }

    #[test]
    fn empty_routes_is_no_route() {
        let resp: OsrmResponse = serde_json::from_str(r#"{"code":"Ok","routes":[]}"#).unwrap();
        assert!(matches!(parse_route_response(resp), Err(RouteError::NoRoute)));
    }

    #[test]
    fn api_error_code_is_surfaced() {
        let resp: OsrmResponse =
            serde_json::from_str(r#"{"code":"InvalidQuery","message":"Query string malformed"}"#)
                .unwrap();
        match parse_route_response(resp) {
            Err(RouteError::Api(msg)) => assert_eq!(msg, "Query string malformed"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn url_puts_longitude_first() {
        let router = OsrmRouter::new("http://osrm.local:5000/", Duration::from_secs(1)).unwrap();
        let url = router
            .route_url(GeoPoint::new(12.5, 77.25), GeoPoint::new(12.75, 77.5))
            .unwrap();
        assert_eq!(url.path(), "/route/v1/driving/77.25,12.5;77.5,12.75");
        assert!(url.query().unwrap().contains("geometries=polyline"));
    }
}
