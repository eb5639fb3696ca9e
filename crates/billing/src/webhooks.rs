//! Stripe webhook handling
//!
//! Verifies event signatures at the boundary and dispatches verified events
//! to the reconciliation engine. An unverifiable payload never reaches the
//! engine and never touches the ledger.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use sqlx::PgPool;
use stripe::{Event, EventObject, EventType, Invoice, Subscription, Webhook};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};
use crate::reconcile::ReconciliationEngine;

type HmacSha256 = Hmac<Sha256>;

/// Signature timestamp tolerance in seconds
const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Webhook handler for Stripe events
#[derive(Clone)]
pub struct WebhookHandler {
    engine: ReconciliationEngine,
    pool: PgPool,
    webhook_secret: String,
}

impl WebhookHandler {
    pub fn new(engine: ReconciliationEngine, pool: PgPool, webhook_secret: String) -> Self {
        Self {
            engine,
            pool,
            webhook_secret,
        }
    }

    /// Verify and parse a Stripe webhook event
    ///
    /// Uses manual signature verification as a fallback to work around
    /// async-stripe version incompatibility with newer Stripe API versions.
    pub fn verify_event(&self, payload: &str, signature: &str) -> BillingResult<Event> {
        // Try the standard method first
        match Webhook::construct_event(payload, signature, &self.webhook_secret) {
            Ok(event) => return Ok(event),
            Err(e) => {
                tracing::debug!(
                    stripe_error = %e,
                    "Standard webhook parsing failed, trying manual verification"
                );
            }
        }

        verify_signature(&self.webhook_secret, payload, signature)?;

        let event: Event = serde_json::from_str(payload).map_err(|e| {
            tracing::error!(parse_error = %e, "Failed to parse webhook event JSON");
            BillingError::WebhookSignatureInvalid
        })?;

        Ok(event)
    }

    /// Handle a verified Stripe event
    ///
    /// The event id is claimed atomically in `stripe_webhook_events` with
    /// INSERT...ON CONFLICT...RETURNING. Only a row already marked
    /// `'success'` counts as a duplicate; an event stuck at `'processing'`
    /// (a crash mid-handling) or recorded as `'error'` is reclaimed and
    /// reprocessed on redelivery. Reprocessing is safe because reconciling
    /// the same subscription state twice is a ledger no-op.
    pub async fn handle_event(&self, event: Event) -> BillingResult<()> {
        let event_id = event.id.to_string();
        let event_type_str = event.type_.to_string();

        let event_timestamp = OffsetDateTime::from_unix_timestamp(event.created)
            .unwrap_or_else(|_| OffsetDateTime::now_utc());

        let claimed: Option<(Uuid,)> = sqlx::query_as(
            r#"
            INSERT INTO stripe_webhook_events
                (stripe_event_id, event_type, event_timestamp, processing_result)
            VALUES ($1, $2, $3, 'processing')
            ON CONFLICT (stripe_event_id) DO UPDATE
                SET processing_result = 'processing', error_message = NULL
                WHERE stripe_webhook_events.processing_result <> 'success'
            RETURNING id
            "#,
        )
        .bind(&event_id)
        .bind(&event_type_str)
        .bind(event_timestamp)
        .fetch_optional(&self.pool)
        .await?;

        if claimed.is_none() {
            tracing::info!(
                event_id = %event_id,
                event_type = %event_type_str,
                "Webhook event already processed, skipping"
            );
            return Ok(());
        }

        tracing::info!(
            event_type = %event.type_,
            event_id = %event.id,
            "Processing Stripe webhook event"
        );

        let result = self.process_event_internal(&event).await;

        let (processing_result, error_message) = match &result {
            Ok(()) => ("success", None),
            Err(e) => ("error", Some(e.to_string())),
        };

        if let Err(e) = sqlx::query(
            r#"
            UPDATE stripe_webhook_events
            SET processing_result = $1, error_message = $2
            WHERE stripe_event_id = $3
            "#,
        )
        .bind(processing_result)
        .bind(&error_message)
        .bind(&event_id)
        .execute(&self.pool)
        .await
        {
            tracing::warn!(
                event_id = %event_id,
                error = %e,
                "Failed to record webhook processing result"
            );
        }

        result
    }

    async fn process_event_internal(&self, event: &Event) -> BillingResult<()> {
        let event_id = event.id.to_string();

        match event.type_ {
            EventType::CustomerSubscriptionCreated | EventType::CustomerSubscriptionUpdated => {
                let subscription = extract_subscription(event)?;
                self.engine
                    .reconcile_subscription(&event_id, &subscription)
                    .await?;
            }
            EventType::CustomerSubscriptionDeleted => {
                let subscription = extract_subscription(event)?;
                self.engine
                    .reconcile_cancellation(&event_id, &subscription)
                    .await?;
            }
            EventType::InvoicePaid => {
                let invoice = extract_invoice(event)?;
                self.engine
                    .reconcile_invoice_paid(&event_id, &invoice)
                    .await?;
            }
            _ => {
                // Track which event types arrive without a handler
                tracing::info!(
                    event_type = %event.type_,
                    event_id = %event.id,
                    "Received unhandled Stripe event type"
                );
            }
        }

        Ok(())
    }
}

fn extract_subscription(event: &Event) -> BillingResult<Subscription> {
    match &event.data.object {
        EventObject::Subscription(subscription) => Ok(subscription.clone()),
        _ => Err(BillingError::Internal(format!(
            "expected subscription object on {} event",
            event.type_
        ))),
    }
}

fn extract_invoice(event: &Event) -> BillingResult<Invoice> {
    match &event.data.object {
        EventObject::Invoice(invoice) => Ok(invoice.clone()),
        _ => Err(BillingError::Internal(format!(
            "expected invoice object on {} event",
            event.type_
        ))),
    }
}

/// Manual HMAC-SHA256 verification of a `stripe-signature` header
///
/// Header format: `t=timestamp,v1=signature[,v0=signature]`. The signed
/// payload is `"{timestamp}.{payload}"`.
fn verify_signature(secret: &str, payload: &str, signature: &str) -> BillingResult<()> {
    let mut timestamp: Option<i64> = None;
    let mut v1_signature: Option<String> = None;

    for part in signature.split(',') {
        let kv: Vec<&str> = part.splitn(2, '=').collect();
        if kv.len() == 2 {
            match kv[0] {
                "t" => timestamp = kv[1].parse().ok(),
                "v1" => v1_signature = Some(kv[1].to_string()),
                _ => {}
            }
        }
    }

    let timestamp = timestamp.ok_or_else(|| {
        tracing::warn!("Missing timestamp in signature header");
        BillingError::WebhookSignatureInvalid
    })?;

    let v1_signature = v1_signature.ok_or_else(|| {
        tracing::warn!("Missing v1 signature in signature header");
        BillingError::WebhookSignatureInvalid
    })?;

    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_err(|e| {
            tracing::error!("System time error: {}", e);
            BillingError::WebhookSignatureInvalid
        })?
        .as_secs() as i64;

    if (now - timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
        tracing::warn!(
            timestamp = timestamp,
            now = now,
            "Webhook timestamp outside tolerance"
        );
        return Err(BillingError::WebhookSignatureInvalid);
    }

    let computed = compute_signature(secret, timestamp, payload)?;
    if computed != v1_signature {
        tracing::warn!("Webhook signature mismatch");
        return Err(BillingError::WebhookSignatureInvalid);
    }

    Ok(())
}

fn compute_signature(secret: &str, timestamp: i64, payload: &str) -> BillingResult<String> {
    // The secret carries a "whsec_" prefix
    let secret_key = secret.strip_prefix("whsec_").unwrap_or(secret);
    let signed_payload = format!("{}.{}", timestamp, payload);

    let mut mac = HmacSha256::new_from_slice(secret_key.as_bytes()).map_err(|_| {
        tracing::error!("Invalid webhook secret key");
        BillingError::WebhookSignatureInvalid
    })?;
    mac.update(signed_payload.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_testsecret";

    fn sign(payload: &str, timestamp: i64) -> String {
        let sig = compute_signature(SECRET, timestamp, payload).unwrap();
        format!("t={},v1={}", timestamp, sig)
    }

    fn now_ts() -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64
    }

    #[test]
    fn test_signature_round_trip() {
        let payload = r#"{"id":"evt_1"}"#;
        let ts = now_ts();
        let computed = compute_signature(SECRET, ts, payload).unwrap();
        assert_eq!(computed, compute_signature(SECRET, ts, payload).unwrap());
        // Different payload yields a different signature
        let other = compute_signature(SECRET, ts, r#"{"id":"evt_2"}"#).unwrap();
        assert_ne!(computed, other);
    }

    fn verify(payload: &str, signature: &str) -> BillingResult<()> {
        verify_signature(SECRET, payload, signature)
    }

    #[test]
    fn test_valid_signature_accepted() {
        let payload = r#"{"id":"evt_1","type":"invoice.paid"}"#;
        let header = sign(payload, now_ts());
        assert!(verify(payload, &header).is_ok());
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let payload = r#"{"id":"evt_1","type":"invoice.paid"}"#;
        let header = sign(payload, now_ts());
        let tampered = r#"{"id":"evt_1","type":"customer.subscription.deleted"}"#;
        assert!(matches!(
            verify(tampered, &header),
            Err(BillingError::WebhookSignatureInvalid)
        ));
    }

    #[test]
    fn test_expired_timestamp_rejected() {
        let payload = r#"{"id":"evt_1"}"#;
        let stale = now_ts() - SIGNATURE_TOLERANCE_SECS - 60;
        let header = sign(payload, stale);
        assert!(matches!(
            verify(payload, &header),
            Err(BillingError::WebhookSignatureInvalid)
        ));
    }

    #[test]
    fn test_malformed_header_rejected() {
        let payload = r#"{"id":"evt_1"}"#;
        assert!(verify(payload, "not-a-signature-header").is_err());
        assert!(verify(payload, "t=abc,v1=").is_err());
        assert!(verify(payload, "").is_err());
    }
}
