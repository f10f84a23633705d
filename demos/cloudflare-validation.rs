// # Cloudflare Provider Real Environment Validation Tool
//
// Exercises zone discovery and record-set upserts against the real
// Cloudflare API.
//
// ## Usage
//
// ```bash
// # Dry-run mode (default - safe)
// CLOUDFLARE_API_TOKEN=your_token \
// NODESYNC_RECORD_NAME=nodesync-test.example.com \
// NODESYNC_TEST_ADDRESSES=192.0.2.10,192.0.2.11 \
// cargo run --bin cloudflare_validation
//
// # Live mode (makes actual changes!)
// NODESYNC_MODE=live \
// CLOUDFLARE_API_TOKEN=your_token \
// NODESYNC_RECORD_NAME=nodesync-test.example.com \
// NODESYNC_TEST_ADDRESSES=192.0.2.10,192.0.2.11 \
// cargo run --bin cloudflare_validation
// ```
//
// ## Environment Variables
//
// Required:
// - `CLOUDFLARE_API_TOKEN`: Cloudflare API token
// - `NODESYNC_RECORD_NAME`: Full record name (e.g., "nodesync-test.example.com")
// - `NODESYNC_TEST_ADDRESSES`: Comma-separated addresses to publish
//
// Optional:
// - `CLOUDFLARE_ZONE_ID`: Zone ID (if not provided, will auto-discover)
// - `NODESYNC_RECORD_TTL`: Record TTL (default: 300)
// - `NODESYNC_MODE`: "dry-run" or "live" (default: dry-run)

use nodesync_core::config::parse_ttl;
use nodesync_core::{DnsProvider, RecordLookup, RecordName, RecordSync, TargetAddressSet};
use nodesync_provider_cloudflare::CloudflareProvider;
use std::env;
use std::process::ExitCode;
use std::sync::Arc;

fn required(name: &str) -> Option<String> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => Some(value),
        _ => {
            tracing::error!("{} environment variable is required", name);
            None
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    tracing::info!("=== Cloudflare Provider Real Environment Validation ===");

    let (Some(api_token), Some(record_name), Some(addresses)) = (
        required("CLOUDFLARE_API_TOKEN"),
        required("NODESYNC_RECORD_NAME"),
        required("NODESYNC_TEST_ADDRESSES"),
    ) else {
        return ExitCode::from(1);
    };

    let zone_id = env::var("CLOUDFLARE_ZONE_ID").ok().filter(|z| !z.is_empty());
    let ttl = parse_ttl(env::var("NODESYNC_RECORD_TTL").ok().as_deref());
    let mode = env::var("NODESYNC_MODE").unwrap_or_else(|_| "dry-run".to_string());
    let dry_run = mode.to_lowercase() != "live";

    if dry_run {
        tracing::warn!("Running in DRY-RUN mode - no changes will be made");
    } else {
        tracing::warn!("Running in LIVE mode - will make actual DNS changes!");
    }

    let name = match RecordName::parse(&record_name) {
        Ok(name) => name,
        Err(e) => {
            tracing::error!("Invalid record name: {}", e);
            return ExitCode::from(1);
        }
    };
    let target = TargetAddressSet::from_addresses(addresses.split(','));
    if target.is_empty() {
        tracing::error!("NODESYNC_TEST_ADDRESSES contains no valid address");
        return ExitCode::from(1);
    }

    tracing::info!("Configuration:");
    tracing::info!("  Record: {}", name);
    tracing::info!("  Addresses: {}", target);
    tracing::info!("  TTL: {}", ttl);
    tracing::info!("  Mode: {}", mode);
    match zone_id {
        Some(ref zid) => tracing::info!("  Zone ID: {}", zid),
        None => tracing::info!("  Zone ID: (auto-discover)"),
    }

    tracing::info!("--- Step 1: Creating Cloudflare Provider ---");
    let provider = match CloudflareProvider::new(api_token, dry_run) {
        Ok(provider) => Arc::new(provider),
        Err(e) => {
            tracing::error!("✗ Provider creation failed: {}", e);
            return ExitCode::from(1);
        }
    };
    let sync = RecordSync::new(provider.clone());

    tracing::info!("--- Step 2: Resolving Zone ---");
    let zone_id = match zone_id {
        Some(zid) => zid,
        None => match sync.discover_zone(&name).await {
            Ok(zone) => {
                tracing::info!("✓ Zone discovered: {} ({})", zone.name, zone.id);
                zone.id
            }
            Err(e) => {
                tracing::error!("✗ Zone discovery failed: {}", e);
                return ExitCode::from(2);
            }
        },
    };

    tracing::info!("--- Step 3: Reading Current Records ---");
    match provider.list_record_sets(&zone_id).await {
        Ok(sets) => match RecordLookup::find(&sets, &name) {
            RecordLookup::Address(set) => tracing::info!("  Current values: {:?}", set.values),
            RecordLookup::Missing => tracing::info!("  Record does not exist yet"),
            RecordLookup::Conflict(set) => {
                tracing::error!("✗ {} already holds a {} record", name, set.record_type);
                return ExitCode::from(2);
            }
        },
        Err(e) => {
            tracing::error!("✗ Listing records failed: {}", e);
            return ExitCode::from(2);
        }
    }

    tracing::info!("--- Step 4: Upserting Record Set ---");
    let names = [name.clone()];
    if let Err(e) = sync.apply(&target, &names, ttl, Some(&zone_id)).await {
        tracing::error!("✗ Upsert failed: {}", e);
        tracing::error!("Error details: {:?}", e);
        return ExitCode::from(2);
    }
    tracing::info!("✓ Upsert succeeded");

    tracing::info!("--- Step 5: Testing Idempotency ---");
    if let Err(e) = sync.apply(&target, &names, ttl, Some(&zone_id)).await {
        tracing::error!("✗ Idempotency test failed: {}", e);
        return ExitCode::from(2);
    }
    tracing::info!("✓ Second upsert succeeded (no changes planned when records match)");

    if dry_run {
        tracing::info!("=== DRY-RUN COMPLETE ===");
        tracing::info!("No changes were made to DNS records.");
        tracing::info!("To make actual changes, set NODESYNC_MODE=live");
    } else {
        tracing::info!("=== LIVE MODE COMPLETE ===");
        tracing::info!("Verify at: https://dnschecker.org/#A/{}", record_name);
    }

    ExitCode::SUCCESS
}
