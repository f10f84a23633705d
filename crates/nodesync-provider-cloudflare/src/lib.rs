// # Cloudflare DNS Provider
//
// This crate provides a Cloudflare implementation of nodesync's `DnsProvider`.
//
// ## Behavior
//
// - ✅ Paginated zone and record listing
// - ✅ Per-value records grouped into record sets (A and AAAA form one address set)
// - ✅ Upsert as a minimal plan: create missing values, patch TTLs, delete stale values
// - ✅ HTTP timeout configured (30 seconds)
// - ✅ Specific error mapping for HTTP status codes (401/403, 404, 429, 5xx)
// - ✅ Dry-run mode for safe testing
// - ❌ NO retry logic (a failed pass is retried on the next membership event)
// - ❌ NO caching (every pass reads the zone again)
// - ❌ NO background tasks
//
// ## Security Requirements
//
// - API token NEVER appears in logs
// - API token MUST be provided via environment variables only
// - Provider MUST fail fast if token is empty
//
// ## API Reference
//
// - Cloudflare API v4: https://developers.cloudflare.com/api/
// - List Zones: GET `/zones?page=N&per_page=50`
// - List DNS Records: GET `/zones/:zone_id/dns_records?page=N&per_page=100`
// - Create DNS Record: POST `/zones/:zone_id/dns_records`
// - Patch DNS Record: PATCH `/zones/:zone_id/dns_records/:record_id`
// - Delete DNS Record: DELETE `/zones/:zone_id/dns_records/:record_id`

pub mod plan;

use async_trait::async_trait;
use nodesync_core::traits::DnsProvider;
use nodesync_core::{Error, RecordSet, Result, Zone};
use plan::{CloudflareRecord, RecordChange, group_record_sets, plan_upsert};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Cloudflare API base URL
const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Default HTTP timeout for API requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

const ZONES_PER_PAGE: u32 = 50;
const RECORDS_PER_PAGE: u32 = 100;

/// Response envelope shared by every v4 endpoint
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: bool,
    result: Option<T>,
    result_info: Option<ResultInfo>,
    #[serde(default)]
    errors: Vec<ApiMessage>,
}

#[derive(Debug, Deserialize)]
struct ResultInfo {
    #[serde(default)]
    page: u32,
    #[serde(default)]
    total_pages: u32,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct CloudflareZone {
    id: String,
    name: String,
}

/// Map a failed HTTP status to an error
///
/// `context` names the operation for the message.
pub fn map_status(status: u16, context: &str, body: &str) -> Error {
    match status {
        401 | 403 => Error::auth(format!(
            "{}: invalid API token or insufficient permissions (status {})",
            context, status
        )),
        404 => Error::not_found(format!("{}: {}", context, body)),
        429 => Error::rate_limited(format!("{}: rate limit exceeded (status {})", context, status)),
        500..=599 => Error::provider(
            "cloudflare",
            format!("Cloudflare server error (transient): {} - {} - {}", context, status, body),
        ),
        _ => Error::provider("cloudflare", format!("{} failed: {} - {}", context, status, body)),
    }
}

/// Cloudflare DNS provider
///
/// # Trust Level: Untrusted
///
/// This provider is isolated, stateless, and single-shot. Scheduling and
/// change detection are owned by `SyncEngine`.
///
/// # Dry-Run Mode
///
/// When `dry_run` is true, the provider will:
/// - Perform all GET requests (zone and record listing)
/// - Log every intended POST/PATCH/DELETE
/// - **NOT** actually modify DNS records
///
/// # Security
///
/// The Debug implementation intentionally does NOT expose the API token.
pub struct CloudflareProvider {
    /// Cloudflare API token
    /// ⚠️ NEVER log this value
    api_token: String,

    /// HTTP client for API requests
    client: reqwest::Client,

    /// API base URL
    base_url: String,

    /// Dry-run mode: if true, perform reads but skip writes
    dry_run: bool,
}

// Custom Debug implementation that hides the API token
impl std::fmt::Debug for CloudflareProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudflareProvider")
            .field("api_token", &"<REDACTED>")
            .field("base_url", &self.base_url)
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl CloudflareProvider {
    /// Create a new Cloudflare provider
    ///
    /// # Parameters
    ///
    /// - `api_token`: Cloudflare API token with Zone:Read and DNS:Edit permissions
    /// - `dry_run`: If true, perform reads but skip writes
    ///
    /// # Errors
    ///
    /// Fails if the token is empty or the HTTP client cannot be built.
    pub fn new(api_token: impl Into<String>, dry_run: bool) -> Result<Self> {
        let api_token = api_token.into();
        if api_token.trim().is_empty() {
            return Err(Error::config("Cloudflare API token cannot be empty"));
        }

        // Build HTTP client with timeout
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        if dry_run {
            tracing::warn!("Cloudflare provider running in DRY-RUN mode - no changes will be made");
        }

        Ok(Self {
            api_token,
            client,
            base_url: CLOUDFLARE_API_BASE.to_string(),
            dry_run,
        })
    }

    /// Create a new Cloudflare provider (production/live mode)
    pub fn new_live(api_token: impl Into<String>) -> Result<Self> {
        Self::new(api_token, false)
    }

    /// Create a new Cloudflare provider (dry-run mode)
    pub fn new_dry_run(api_token: impl Into<String>) -> Result<Self> {
        Self::new(api_token, true)
    }

    /// Point the provider at another API endpoint (proxies, test servers)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Whether writes are skipped
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Send a request and decode the envelope
    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        context: &str,
    ) -> Result<Envelope<T>> {
        let response = request
            .bearer_auth(&self.api_token)
            .header("Content-Type", "application/json")
            .send()
            .await
            .map_err(|e| Error::http(format!("{}: request failed: {}", context, e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(map_status(status.as_u16(), context, &error_text));
        }

        let envelope: Envelope<T> = response.json().await.map_err(|e| {
            Error::provider("cloudflare", format!("{}: failed to parse response: {}", context, e))
        })?;

        if !envelope.success {
            let messages: Vec<String> = envelope
                .errors
                .iter()
                .map(|m| format!("{} ({})", m.message, m.code))
                .collect();
            return Err(Error::provider(
                "cloudflare",
                format!("{}: {}", context, messages.join("; ")),
            ));
        }

        Ok(envelope)
    }

    /// Fetch every page of a listing endpoint
    async fn list_all<T: DeserializeOwned>(
        &self,
        path: &str,
        per_page: u32,
        context: &str,
    ) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut page = 1;

        loop {
            let url = format!(
                "{}{}?page={}&per_page={}",
                self.base_url, path, page, per_page
            );
            let envelope: Envelope<Vec<T>> = self.send(self.client.get(&url), context).await?;
            items.extend(envelope.result.unwrap_or_default());

            match envelope.result_info {
                Some(info) if page < info.total_pages => page += 1,
                _ => break,
            }
        }

        Ok(items)
    }

    async fn list_records(&self, zone_id: &str) -> Result<Vec<CloudflareRecord>> {
        self.list_all(
            &format!("/zones/{}/dns_records", zone_id),
            RECORDS_PER_PAGE,
            "List DNS records",
        )
        .await
    }

    /// Execute one planned change (or log it in dry-run mode)
    async fn apply_change(&self, zone_id: &str, name: &str, change: &RecordChange) -> Result<()> {
        if self.dry_run {
            tracing::info!(zone_id, record = name, "[DRY-RUN] Would apply {:?}", change);
            return Ok(());
        }

        let records_url = format!("{}/zones/{}/dns_records", self.base_url, zone_id);
        match change {
            RecordChange::Create { kind, content, ttl } => {
                let payload = serde_json::json!({
                    "type": kind,
                    "name": name,
                    "content": content,
                    "ttl": ttl,
                });
                self.send::<serde_json::Value>(
                    self.client.post(&records_url).json(&payload),
                    "Create DNS record",
                )
                .await?;
                tracing::info!(record = name, kind, content = %content, "Created DNS record");
            }
            RecordChange::UpdateTtl { id, content, ttl } => {
                let payload = serde_json::json!({ "ttl": ttl });
                self.send::<serde_json::Value>(
                    self.client
                        .patch(format!("{}/{}", records_url, id))
                        .json(&payload),
                    "Update DNS record",
                )
                .await?;
                tracing::info!(record = name, content = %content, ttl, "Updated DNS record TTL");
            }
            RecordChange::Delete { id, content } => {
                self.send::<serde_json::Value>(
                    self.client.delete(format!("{}/{}", records_url, id)),
                    "Delete DNS record",
                )
                .await?;
                tracing::info!(record = name, content = %content, "Deleted DNS record");
            }
        }
        Ok(())
    }
}

#[async_trait]
impl DnsProvider for CloudflareProvider {
    async fn list_zones(&self) -> Result<Vec<Zone>> {
        let zones: Vec<CloudflareZone> = self.list_all("/zones", ZONES_PER_PAGE, "List zones").await?;
        tracing::debug!("Found {} zones", zones.len());
        Ok(zones
            .into_iter()
            .map(|zone| Zone::new(zone.id, &zone.name))
            .collect())
    }

    async fn list_record_sets(&self, zone_id: &str) -> Result<Vec<RecordSet>> {
        let records = self.list_records(zone_id).await?;
        Ok(group_record_sets(&records))
    }

    /// Make the name's A/AAAA records match `record_set`
    ///
    /// Reads the zone once, then issues one call per planned change. A
    /// failure part-way leaves earlier changes applied; the next pass
    /// recomputes the plan from whatever the zone then holds.
    async fn upsert_record_set(&self, zone_id: &str, record_set: &RecordSet) -> Result<()> {
        let name = record_set.name.relative();
        tracing::info!(
            "Upserting Cloudflare record set: {} -> {:?} (ttl {}) [mode: {}]",
            name,
            record_set.values,
            record_set.ttl,
            if self.dry_run { "DRY-RUN" } else { "LIVE" }
        );

        let existing = self.list_records(zone_id).await?;
        let changes = plan_upsert(&existing, record_set)?;

        if changes.is_empty() {
            tracing::info!("DNS records already match: {}", name);
            return Ok(());
        }

        for change in &changes {
            self.apply_change(zone_id, name, change).await?;
        }

        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "cloudflare"
    }
}
