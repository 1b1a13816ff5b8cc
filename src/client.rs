use log::{debug, error, info};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::TokenSource;
use crate::error::{Error, Result};
use crate::types::{
    format_energy_timestamp, EnergyData, EnergyQuery, Home, MpcData, Param, SystemDevices,
    SystemStatus, API_URL_BASE, HOTWATER_INDEX_DEFAULT, VETO_DURATION_DEFAULT,
    VETO_SETPOINT_DEFAULT, ZONE_INDEX_DEFAULT,
};

const SUBSCRIPTION_KEY: &str = "1e0a2f3511fb4c5bbb1c7f9fedd20b1c";

/// Transport settings for [`SensonetClient`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub base_url: String,
    /// Applies to every request; energy queries can take a while.
    pub timeout: Duration,
    /// Use this client instead of building one (proxies, custom TLS, ...).
    /// `timeout` is ignored when set.
    pub http_client: Option<reqwest::Client>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            base_url: API_URL_BASE.to_string(),
            timeout: Duration::from_secs(45),
            http_client: None,
        }
    }
}

/// Stateless access to the myVAILLANT end-user API.
///
/// Every method maps to exactly one HTTP request. Nothing is cached or
/// retried here; see [`crate::Controller`] for that.
pub struct SensonetClient {
    client: reqwest::Client,
    base_url: String,
    token_source: Arc<dyn TokenSource>,
}

impl SensonetClient {
    pub fn new(token_source: Arc<dyn TokenSource>) -> Result<Self> {
        Self::with_options(token_source, ClientOptions::default())
    }

    pub fn with_options(token_source: Arc<dyn TokenSource>, options: ClientOptions) -> Result<Self> {
        let client = match options.http_client {
            Some(client) => client,
            None => reqwest::Client::builder().timeout(options.timeout).build()?,
        };
        Ok(Self {
            client,
            base_url: options.base_url.trim_end_matches('/').to_string(),
            token_source,
        })
    }

    pub fn new_with_base_url(token_source: Arc<dyn TokenSource>, base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token_source,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-GB"));
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/json, text/plain, */*"),
        );
        headers.insert("x-app-identifier", HeaderValue::from_static("VAILLANT"));
        headers.insert("x-client-locale", HeaderValue::from_static("en-GB"));
        headers.insert("x-idm-identifier", HeaderValue::from_static("KEYCLOAK"));
        headers.insert(
            "ocp-apim-subscription-key",
            HeaderValue::from_static(SUBSCRIPTION_KEY),
        );

        let token = self.token_source.access_token().await?;
        let auth_value = format!("Bearer {}", token);
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&auth_value)?);

        Ok(headers)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        debug!("GET {}", url);

        let headers = self.get_headers().await?;
        let response = self
            .client
            .get(url)
            .headers(headers)
            .query(query)
            .send()
            .await?;

        let status = response.status();
        let response_text = response.text().await?;

        if !status.is_success() {
            error!("GET {} failed with status {}: {}", url, status, response_text);
            return Err(Error::Remote {
                status: status.as_u16(),
                body: response_text,
            });
        }

        serde_json::from_str::<T>(&response_text).map_err(|e| {
            error!("Failed to parse response of {}: {}", url, e);
            debug!("Raw response: {}", response_text);
            Error::Decode {
                message: e.to_string(),
                body: response_text,
            }
        })
    }

    async fn send_command(
        &self,
        method: Method,
        url: &str,
        body: Option<serde_json::Value>,
    ) -> Result<()> {
        info!("Sending {} request to {}", method, url);

        let mut headers = self.get_headers().await?;
        let mut request = self.client.request(method.clone(), url);
        if let Some(body) = body {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            request = request.json(&body);
        }

        let response = request.headers(headers).send().await?;

        let status = response.status();
        if status.is_success() {
            debug!("{} {} succeeded with status {}", method, url, status);
            Ok(())
        } else {
            let error_text = response.text().await.unwrap_or_default();
            error!("{} {} failed with status {}: {}", method, url, status, error_text);
            Err(Error::Remote {
                status: status.as_u16(),
                body: error_text,
            })
        }
    }

    pub async fn get_homes(&self) -> Result<Vec<Home>> {
        let url = format!("{}/homes", self.base_url);
        let homes: Vec<Home> = self.get_json(&url, &[]).await?;
        debug!("Found {} homes", homes.len());
        Ok(homes)
    }

    /// State, properties and configuration of one system.
    pub async fn get_system(&self, system_id: &str) -> Result<SystemStatus> {
        let url = format!("{}/systems/{}/tli", self.base_url, system_id);
        self.get_json(&url, &[]).await
    }

    pub async fn get_system_devices(&self, system_id: &str) -> Result<SystemDevices> {
        let url = format!("{}/emf/v2/{}/currentSystem", self.base_url, system_id);
        self.get_json(&url, &[]).await
    }

    pub async fn get_energy_data(&self, query: &EnergyQuery) -> Result<EnergyData> {
        let url = format!(
            "{}/emf/v2/{}/devices/{}/buckets",
            self.base_url, query.system_id, query.device_uuid
        );
        let params = [
            ("resolution", query.resolution.as_str().to_string()),
            ("operationMode", query.operation_mode.clone()),
            ("energyType", query.energy_type.clone()),
            ("startDate", format_energy_timestamp(&query.start)),
            ("endDate", format_energy_timestamp(&query.end)),
        ];
        self.get_json(&url, &params).await
    }

    /// Current power draw of the system's devices.
    pub async fn get_mpc_data(&self, system_id: &str) -> Result<MpcData> {
        let url = format!("{}/hem/{}/mpc", self.base_url, system_id);
        self.get_json(&url, &[]).await
    }

    fn quick_veto_url(&self, system_id: &str, zone: u32) -> String {
        format!(
            "{}/systems/{}/tli/zones/{}/quick-veto",
            self.base_url, system_id, zone
        )
    }

    fn hot_water_boost_url(&self, system_id: &str, index: u32) -> String {
        format!(
            "{}/systems/{}/tli/domestic-hot-water/{}/boost",
            self.base_url, system_id, index
        )
    }

    /// Overrides a zone's setpoint for `duration` hours.
    pub async fn start_zone_quick_veto(
        &self,
        system_id: &str,
        zone: Param<u32>,
        setpoint: Param<f64>,
        duration: Param<f64>,
    ) -> Result<()> {
        let zone = zone.or(ZONE_INDEX_DEFAULT);
        let body = json!({
            "desiredRoomTemperatureSetpoint": setpoint.or(VETO_SETPOINT_DEFAULT),
            "duration": duration.or(VETO_DURATION_DEFAULT),
        });
        let url = self.quick_veto_url(system_id, zone);
        self.send_command(Method::POST, &url, Some(body)).await
    }

    pub async fn stop_zone_quick_veto(&self, system_id: &str, zone: Param<u32>) -> Result<()> {
        let url = self.quick_veto_url(system_id, zone.or(ZONE_INDEX_DEFAULT));
        self.send_command(Method::DELETE, &url, None).await
    }

    pub async fn start_hot_water_boost(&self, system_id: &str, index: Param<u32>) -> Result<()> {
        let url = self.hot_water_boost_url(system_id, index.or(HOTWATER_INDEX_DEFAULT));
        self.send_command(Method::POST, &url, Some(json!({}))).await
    }

    pub async fn stop_hot_water_boost(&self, system_id: &str, index: Param<u32>) -> Result<()> {
        let url = self.hot_water_boost_url(system_id, index.or(HOTWATER_INDEX_DEFAULT));
        self.send_command(Method::DELETE, &url, None).await
    }
}
