use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use bazaar_ports::{
    GatewayError, GatewayOutcome, GatewayPaymentStatus, PaymentGateway, PaymentInitiation,
};
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::config::GatewayConfig;

/// REST client for the mobile-money collection provider.
#[derive(Clone)]
pub struct HttpPaymentGateway {
    base_url: String,
    api_key: Option<String>,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct InitiateResponse {
    #[serde(alias = "payment_url", alias = "authorization_url")]
    collect_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: String,
    #[serde(default, alias = "phone")]
    payer_phone: Option<String>,
}

impl HttpPaymentGateway {
    pub fn new(config: &GatewayConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            client,
        })
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, GatewayError> {
        let response = self
            .authorized(builder)
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(GatewayError::Rejected { status, message });
        }
        Ok(response)
    }
}

fn transport_error(err: reqwest::Error) -> GatewayError {
    if err.is_timeout() {
        GatewayError::Timeout
    } else {
        GatewayError::Transport(err.to_string())
    }
}

pub(crate) fn parse_outcome(raw: &str) -> Result<GatewayOutcome, GatewayError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "success" | "successful" | "complete" | "completed" => Ok(GatewayOutcome::Success),
        "failed" | "failure" | "cancelled" | "canceled" | "expired" | "rejected" => {
            Ok(GatewayOutcome::Failed)
        }
        "pending" | "processing" | "initiated" => Ok(GatewayOutcome::Pending),
        other => Err(GatewayError::Malformed(format!("unknown payment status '{other}'"))),
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn initiate(&self, initiation: &PaymentInitiation) -> Result<String, GatewayError> {
        let url = format!("{}/payments/initiate", self.base_url);
        debug!("POST {} for {}", url, initiation.correlation_id);

        let response = self
            .send(self.client.post(&url).json(&json!({
                "amount": initiation.amount,
                "currency": initiation.currency,
                "reference": initiation.correlation_id,
                "success_url": initiation.success_url,
                "failure_url": initiation.failure_url,
            })))
            .await?;

        let body: InitiateResponse = response
            .json()
            .await
            .map_err(|err| GatewayError::Malformed(err.to_string()))?;
        body.collect_url
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| GatewayError::Malformed("initiate response has no collect url".to_string()))
    }

    async fn status(
        &self,
        currency: &str,
        correlation_id: &str,
    ) -> Result<GatewayPaymentStatus, GatewayError> {
        let url = format!("{}/payments/{}", self.base_url, correlation_id);
        debug!("GET {}", url);

        let response = self
            .send(self.client.get(&url).query(&[("currency", currency)]))
            .await?;
        let body: StatusResponse = response
            .json()
            .await
            .map_err(|err| GatewayError::Malformed(err.to_string()))?;

        Ok(GatewayPaymentStatus {
            outcome: parse_outcome(&body.status)?,
            payer_phone: body.payer_phone,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_provider_statuses() {
        assert_eq!(parse_outcome("SUCCESSFUL").unwrap(), GatewayOutcome::Success);
        assert_eq!(parse_outcome("cancelled").unwrap(), GatewayOutcome::Failed);
        assert_eq!(parse_outcome(" pending ").unwrap(), GatewayOutcome::Pending);
    }

    #[test]
    fn unknown_status_is_malformed() {
        assert!(matches!(
            parse_outcome("on_hold"),
            Err(GatewayError::Malformed(_))
        ));
    }

    #[test]
    fn status_body_accepts_phone_alias() {
        let body: StatusResponse =
            serde_json::from_str(r#"{"status":"success","phone":"+237699000000"}"#).unwrap();
        assert_eq!(body.payer_phone.as_deref(), Some("+237699000000"));

        let body: InitiateResponse =
            serde_json::from_str(r#"{"payment_url":"https://pay.example/c/1"}"#).unwrap();
        assert_eq!(body.collect_url.as_deref(), Some("https://pay.example/c/1"));
    }

    #[test]
    fn trims_base_url() {
        let gateway = HttpPaymentGateway::new(&GatewayConfig {
            base_url: "https://pay.example/api/".to_string(),
            api_key: None,
            timeout_secs: 5,
        })
        .unwrap();
        assert_eq!(gateway.base_url, "https://pay.example/api");
    }
}
