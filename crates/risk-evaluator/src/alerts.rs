use signal_core::Settings;

/// Internal webhook alerts for risk blocks. Disabled unless
/// `ALERT_WEBHOOK_URL` is configured; failures are logged and swallowed,
/// alerting never gates the pipeline.
pub struct RiskAlertService {
    webhook_url: Option<String>,
    client: reqwest::Client,
}

impl RiskAlertService {
    pub fn new(settings: &Settings) -> Self {
        Self {
            webhook_url: settings.alert_webhook_url.clone(),
            client: reqwest::Client::new(),
        }
    }

    pub fn enabled(&self) -> bool {
        self.webhook_url.is_some()
    }

    pub async fn send_risk_block(
        &self,
        user_id: &str,
        audit_type: &str,
        context: &serde_json::Value,
    ) {
        let Some(url) = &self.webhook_url else {
            return;
        };
        let payload = serde_json::json!({
            "text": format!("Risk block: {audit_type}"),
            "user_id": user_id,
            "audit_type": audit_type,
            "context": context,
        });
        match self
            .client
            .post(url)
            .json(&payload)
            .timeout(std::time::Duration::from_secs(10))
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => {
                tracing::info!(user_id, audit_type, "risk block alert sent");
            }
            Ok(response) => {
                tracing::warn!(
                    user_id,
                    audit_type,
                    status = %response.status(),
                    "risk block alert rejected by webhook"
                );
            }
            Err(e) => {
                tracing::warn!(user_id, audit_type, error = %e, "failed to send risk block alert");
            }
        }
    }

    pub async fn send_exposure_warning(&self, user_id: &str, multiplier: f64, limit: f64) {
        let Some(url) = &self.webhook_url else {
            return;
        };
        let payload = serde_json::json!({
            "text": "Exposure approaching limit",
            "user_id": user_id,
            "exposure_multiplier": multiplier,
            "limit_multiplier": limit,
        });
        if let Err(e) = self
            .client
            .post(url)
            .json(&payload)
            .timeout(std::time::Duration::from_secs(10))
            .send()
            .await
        {
            tracing::warn!(user_id, error = %e, "failed to send exposure warning");
        }
    }
}
