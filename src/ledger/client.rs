// 🌐 Fineract HTTP client
// Authenticated JSON calls against the ledger's loan endpoints

use super::retry::{with_retry, RetryPolicy};
use super::{LedgerApi, LedgerError, LedgerTransaction};
use crate::config::LedgerConfig;
use crate::dates::LedgerDateTime;
use crate::records::TransactionRecord;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, CACHE_CONTROL, CONTENT_TYPE};
use reqwest::{Client, Response};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::{debug, info};

const TENANT_HEADER: &str = "Fineract-Platform-TenantId";

pub struct FineractClient {
    client: Client,
    config: LedgerConfig,
    retry: RetryPolicy,
}

impl FineractClient {
    pub fn new(config: LedgerConfig) -> Result<Self, LedgerError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json, text/plain, */*"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json;charset=UTF-8"));
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        headers.insert(AUTHORIZATION, header_value("authorization token", &config.auth_token)?);
        headers.insert(
            HeaderName::from_static("fineract-platform-tenantid"),
            header_value("tenant id", &config.tenant_id)?,
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(|e| LedgerError::Setup(e.to_string()))?;

        let retry = RetryPolicy::new(config.max_retries, config.retry_delay);
        debug!(
            "Ledger client ready: {} (tenant header {}, {} attempts)",
            config.base_url,
            TENANT_HEADER,
            retry.max_attempts()
        );

        Ok(FineractClient { client, config, retry })
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url, path.trim_start_matches('/'))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, LedgerError> {
        let response = self.client.get(url).send().await.map_err(transport_error)?;
        read_json(response).await
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<T, LedgerError> {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;
        read_json(response).await
    }

    fn or_default(value: i64, default: i64) -> i64 {
        if value == 0 {
            default
        } else {
            value
        }
    }
}

#[async_trait]
impl LedgerApi for FineractClient {
    async fn loan_transactions(&self, loan_id: i64) -> Result<Vec<LedgerTransaction>, LedgerError> {
        let url = self.url(&format!("loans/{loan_id}?associations=all"));
        let what = format!("fetch loan {loan_id}");

        let details: LoanDetails = with_retry(&self.retry, &what, || self.get_json(&url)).await?;
        debug!("Loan {} lists {} transactions", loan_id, details.transactions.len());

        Ok(details.transactions.into_iter().map(WireTransaction::into_ledger).collect())
    }

    async fn undo_transaction(
        &self,
        loan_id: i64,
        transaction_id: i64,
        transaction_date: LedgerDateTime,
    ) -> Result<(), LedgerError> {
        let url = self.url(&format!("loans/{loan_id}/transactions/{transaction_id}?command=undo"));
        let what = format!("undo transaction {transaction_id}");
        // A zero amount makes the ledger reverse in place instead of posting
        // a compensating transaction.
        let body = UndoPayload {
            transaction_date: transaction_date.to_ledger_string(),
            transaction_amount: 0,
            date_format: &self.config.date_format,
            time_format: &self.config.time_format,
            locale: &self.config.locale,
        };

        let _: serde_json::Value = with_retry(&self.retry, &what, || self.post_json(&url, &body)).await?;
        info!("↩️  Undid transaction {} on loan {}", transaction_id, loan_id);
        Ok(())
    }

    async fn create_repayment(&self, record: &TransactionRecord) -> Result<Option<i64>, LedgerError> {
        let url = self.url(&format!("loans/{}/transactions?command=repayment", record.loan_id));
        let what = format!("repay transaction {}", record.transaction_id);
        let body = RepaymentPayload {
            is_use_hold_amount: false,
            transaction_amount: record.transaction_amount,
            npa_amount: Decimal::ZERO,
            transaction_date: record.transaction_date.to_ledger_string(),
            date_format: &self.config.date_format,
            time_format: &self.config.time_format,
            locale: &self.config.locale,
            payment_type_id: Self::or_default(record.payment_type_id, self.config.default_payment_type_id),
            channel_type_id: Self::or_default(record.channel_type_id, self.config.default_channel_type_id),
        };
        debug!(
            "Repayment payload for {}: paymentTypeId={}, channelTypeId={}",
            record.transaction_id, body.payment_type_id, body.channel_type_id
        );

        let created: CommandResult = with_retry(&self.retry, &what, || self.post_json(&url, &body)).await?;
        info!(
            "💸 Posted repayment for loan {} ({} on {}) -> {:?}",
            record.loan_id, record.transaction_amount, record.transaction_date, created.resource_id
        );
        Ok(created.resource_id)
    }
}

fn header_value(what: &str, raw: &str) -> Result<HeaderValue, LedgerError> {
    HeaderValue::from_str(raw).map_err(|_| LedgerError::Setup(format!("{what} is not a valid header value")))
}

fn transport_error(e: reqwest::Error) -> LedgerError {
    if e.is_builder() {
        LedgerError::Setup(e.to_string())
    } else {
        LedgerError::Network(e.to_string())
    }
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, LedgerError> {
    let status = response.status();
    let text = response.text().await.map_err(transport_error)?;

    if !status.is_success() {
        return Err(LedgerError::Rejected {
            status: status.as_u16(),
            message: error_message(&text),
        });
    }

    serde_json::from_str(&text).map_err(|e| LedgerError::Decode(e.to_string()))
}

/// Ledger error bodies carry a user-facing message and a developer one.
fn error_message(body: &str) -> String {
    let parsed: Option<ErrorBody> = serde_json::from_str(body).ok();
    parsed
        .and_then(|b| b.default_user_message.or(b.developer_message))
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| body.trim().to_string())
}

// ============================================================================
// WIRE TYPES
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    default_user_message: Option<String>,
    developer_message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommandResult {
    resource_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct LoanDetails {
    #[serde(default)]
    transactions: Vec<WireTransaction>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireTransaction {
    id: i64,
    #[serde(rename = "type", default)]
    kind: Option<WireType>,
    #[serde(default)]
    date: Option<serde_json::Value>,
    #[serde(default)]
    amount: Option<serde_json::Number>,
    #[serde(default)]
    manually_reversed: bool,
    #[serde(default)]
    payment_detail_data: Option<WirePaymentDetail>,
}

#[derive(Debug, Default, Deserialize)]
struct WireType {
    #[serde(default)]
    code: String,
    #[serde(default)]
    value: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePaymentDetail {
    payment_type: Option<WireRef>,
    channel_type: Option<WireRef>,
}

#[derive(Debug, Deserialize)]
struct WireRef {
    id: Option<i64>,
}

impl WireTransaction {
    fn into_ledger(self) -> LedgerTransaction {
        let detail = self.payment_detail_data.as_ref();
        let kind = self.kind.unwrap_or_default();
        let ref_id = |r: Option<&WireRef>| r.and_then(|r| r.id).unwrap_or(0);

        LedgerTransaction {
            id: self.id,
            type_code: kind.code,
            type_value: kind.value,
            manually_reversed: self.manually_reversed,
            date: self.date.as_ref().and_then(parse_wire_date),
            amount: self
                .amount
                .as_ref()
                .and_then(|n| Decimal::from_str(&n.to_string()).ok())
                .unwrap_or(Decimal::ZERO),
            payment_type_id: ref_id(detail.and_then(|d| d.payment_type.as_ref())),
            channel_type_id: ref_id(detail.and_then(|d| d.channel_type.as_ref())),
        }
    }
}

/// Dates come back as `[2024, 2, 20]` or as formatted strings.
fn parse_wire_date(value: &serde_json::Value) -> Option<LedgerDateTime> {
    match value {
        serde_json::Value::Array(parts) => {
            let parts: Option<Vec<i64>> = parts.iter().map(|p| p.as_i64()).collect();
            LedgerDateTime::from_parts(&parts?).ok()
        }
        serde_json::Value::String(s) => LedgerDateTime::parse(s).ok(),
        _ => None,
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UndoPayload<'a> {
    transaction_date: String,
    transaction_amount: u8,
    date_format: &'a str,
    time_format: &'a str,
    locale: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RepaymentPayload<'a> {
    is_use_hold_amount: bool,
    #[serde(with = "rust_decimal::serde::float")]
    transaction_amount: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    npa_amount: Decimal,
    transaction_date: String,
    date_format: &'a str,
    time_format: &'a str,
    locale: &'a str,
    payment_type_id: i64,
    channel_type_id: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_transaction_with_array_date() {
        let raw = json!({
            "id": 501,
            "type": {"code": "loanTransactionType.repayment", "value": "Repayment"},
            "date": [2024, 2, 20],
            "amount": 150.75,
            "manuallyReversed": false,
            "paymentDetailData": {"paymentType": {"id": 3}, "channelType": {"id": 2}}
        });
        let wire: WireTransaction = serde_json::from_value(raw).unwrap();
        let txn = wire.into_ledger();

        assert_eq!(txn.id, 501);
        assert!(txn.is_repayment());
        assert_eq!(txn.date.unwrap().to_string(), "20 February 2024 00:00:00");
        assert_eq!(txn.amount, Decimal::from_str("150.75").unwrap());
        assert_eq!(txn.payment_type_id, 3);
        assert_eq!(txn.channel_type_id, 2);
    }

    #[test]
    fn test_wire_transaction_with_missing_details() {
        let raw = json!({"id": 9, "date": "04 December 2025 15:37:46"});
        let txn: LedgerTransaction = serde_json::from_value::<WireTransaction>(raw)
            .unwrap()
            .into_ledger();

        assert_eq!(txn.type_code, "");
        assert_eq!(txn.type_value, "");
        assert_eq!(txn.amount, Decimal::ZERO);
        assert_eq!(txn.payment_type_id, 0);
        assert_eq!(txn.channel_type_id, 0);
        assert_eq!(txn.date.unwrap().to_string(), "04 December 2025 15:37:46");
    }

    #[test]
    fn test_unreadable_date_becomes_none() {
        assert!(parse_wire_date(&json!([2024])).is_none());
        assert!(parse_wire_date(&json!("someday")).is_none());
        assert!(parse_wire_date(&json!(17)).is_none());
    }

    #[test]
    fn test_error_message_prefers_user_message() {
        let body = r#"{"developerMessage":"dev","defaultUserMessage":"Loan is closed"}"#;
        assert_eq!(error_message(body), "Loan is closed");

        let body = r#"{"developerMessage":"The request was invalid"}"#;
        assert_eq!(error_message(body), "The request was invalid");

        assert_eq!(error_message("Bad Gateway\n"), "Bad Gateway");
    }

    #[test]
    fn test_repayment_payload_shape() {
        let payload = RepaymentPayload {
            is_use_hold_amount: false,
            transaction_amount: Decimal::from_str("150.75").unwrap(),
            npa_amount: Decimal::ZERO,
            transaction_date: "20 February 2024 00:00:00".to_string(),
            date_format: "dd MMMM yyyy",
            time_format: "dd MMMM yyyy HH:mm:ss",
            locale: "en",
            payment_type_id: 8,
            channel_type_id: 1,
        };
        let json = serde_json::to_value(&payload).unwrap();

        assert_eq!(json["isUseHoldAmount"], false);
        assert_eq!(json["transactionAmount"], 150.75);
        assert_eq!(json["npaAmount"], 0.0);
        assert_eq!(json["transactionDate"], "20 February 2024 00:00:00");
        assert_eq!(json["paymentTypeId"], 8);
        assert_eq!(json["channelTypeId"], 1);
    }

    #[test]
    fn test_zero_ids_fall_back_to_defaults() {
        assert_eq!(FineractClient::or_default(0, 8), 8);
        assert_eq!(FineractClient::or_default(4, 8), 4);
    }
}
