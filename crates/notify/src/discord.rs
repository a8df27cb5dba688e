use crate::render::{detail_lines, label};
use async_trait::async_trait;
use crush_core::notify::entity::ScanReport;
use crush_core::notify::error::NotifyError;
use crush_core::notify::port::NotificationSink;
use serde::Serialize;
use std::time::Duration;
use tracing::warn;

/// Embed sidebar colour (green).
pub const EMBED_COLOR: u32 = 3_066_993;

/// Discord rejects embeds with more fields than this.
const MAX_FIELDS: usize = 25;

/// # Summary
/// Payload for a Discord webhook execution.
#[derive(Serialize, Debug)]
pub struct WebhookPayload {
    pub embeds: Vec<Embed>,
}

#[derive(Serialize, Debug)]
pub struct Embed {
    pub title: String,
    pub color: u32,
    pub fields: Vec<EmbedField>,
    pub timestamp: String,
}

#[derive(Serialize, Debug, PartialEq)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

/// # Summary
/// Builds the embed for a scan report.
///
/// # Logic
/// 1. One field per ticker: Tier 1, then Tier 2, then near misses.
/// 2. Values are the entry's metric lines as a bulleted list.
/// 3. An empty report yields a single "No recommendations" field.
pub fn build_payload(report: &ScanReport) -> WebhookPayload {
    let mut fields: Vec<EmbedField> = report
        .tier1
        .iter()
        .chain(report.tier2.iter())
        .chain(report.near_misses.iter())
        .map(|entry| EmbedField {
            name: format!("{} - {}", label(entry), entry.ticker),
            value: detail_lines(entry)
                .iter()
                .map(|line| format!("• {}", line))
                .collect::<Vec<_>>()
                .join("\n"),
            inline: false,
        })
        .collect();

    if fields.len() > MAX_FIELDS {
        warn!(
            "Report has {} entries, only the first {} are sent to Discord",
            fields.len(),
            MAX_FIELDS
        );
        fields.truncate(MAX_FIELDS);
    }
    if fields.is_empty() {
        fields.push(EmbedField {
            name: "No recommendations".to_string(),
            value: "None found".to_string(),
            inline: false,
        });
    }

    WebhookPayload {
        embeds: vec![Embed {
            title: report.title.clone(),
            color: EMBED_COLOR,
            fields,
            timestamp: report.generated_at.to_rfc3339(),
        }],
    }
}

/// # Summary
/// A notification sink that posts scan reports to a Discord webhook.
///
/// # Invariants
/// - The webhook URL must be an absolute `https` URL.
pub struct DiscordSink {
    /// The webhook URL.
    webhook_url: String,
    /// The HTTP client used for requests.
    client: reqwest::Client,
}

impl DiscordSink {
    /// # Summary
    /// Creates a new `DiscordSink`.
    ///
    /// # Arguments
    /// * `webhook_url` - The Discord webhook URL.
    ///
    /// # Returns
    /// * `NotifyError::Config` if the URL is not https or the client cannot be built.
    pub fn new(webhook_url: impl Into<String>) -> Result<Self, NotifyError> {
        let webhook_url = webhook_url.into();
        if !webhook_url.starts_with("https://") {
            return Err(NotifyError::Config(format!(
                "Webhook URL must use https: {}",
                webhook_url
            )));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| NotifyError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            webhook_url,
            client,
        })
    }
}

#[async_trait]
impl NotificationSink for DiscordSink {
    fn name(&self) -> &str {
        "discord"
    }

    /// # Summary
    /// Posts the report embed to the webhook.
    ///
    /// # Returns
    /// * `Err(NotifyError::Platform)` when Discord answers with a 4xx/5xx status.
    async fn deliver(&self, report: &ScanReport) -> Result<(), NotifyError> {
        let payload = build_payload(report);
        let response = self
            .client
            .post(self.webhook_url.as_str())
            .json(&payload)
            .send()
            .await
            .map_err(|e| NotifyError::Network(e.to_string()))?;

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Platform {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}
