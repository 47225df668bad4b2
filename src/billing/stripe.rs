//! Minimal Stripe REST client for subscription checkout.
//!
//! Covers exactly what the API needs: customer lookup-or-create by email
//! and checkout-session creation in subscription mode. Form-encoded
//! requests with bearer auth, fixed timeout, no retries — a failed call
//! fails the request and the caller retries.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::time::Duration;

const STRIPE_API_URL: &str = "https://api.stripe.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Deserialize)]
struct Customer {
    id: String,
}

#[derive(Deserialize)]
struct CustomerList {
    data: Vec<Customer>,
}

#[derive(Deserialize)]
struct CheckoutSession {
    url: String,
}

pub struct StripeClient {
    http: reqwest::Client,
    secret_key: String,
    price_id: String,
    base_url: String,
}

impl StripeClient {
    pub fn new(secret_key: &str, price_id: &str) -> Self {
        Self::with_base_url(secret_key, price_id, STRIPE_API_URL)
    }

    /// Point the client at a different API host (tests).
    pub fn with_base_url(secret_key: &str, price_id: &str, base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            secret_key: secret_key.to_string(),
            price_id: price_id.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Look up a customer by email, creating one if none exists.
    pub async fn find_or_create_customer(&self, email: &str, name: &str) -> Result<String> {
        let response = self
            .http
            .get(format!("{}/v1/customers", self.base_url))
            .bearer_auth(&self.secret_key)
            .query(&[("email", email), ("limit", "1")])
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .context("failed to list Stripe customers")?;

        if !response.status().is_success() {
            bail!("Stripe customer lookup failed ({})", response.status());
        }

        let existing: CustomerList = response
            .json()
            .await
            .context("failed to parse Stripe customer list")?;
        if let Some(customer) = existing.data.into_iter().next() {
            return Ok(customer.id);
        }

        let response = self
            .http
            .post(format!("{}/v1/customers", self.base_url))
            .bearer_auth(&self.secret_key)
            .form(&[("email", email), ("name", name)])
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .context("failed to create Stripe customer")?;

        if !response.status().is_success() {
            bail!("Stripe customer creation failed ({})", response.status());
        }

        let customer: Customer = response
            .json()
            .await
            .context("failed to parse Stripe customer")?;
        Ok(customer.id)
    }

    /// Create a subscription checkout session and return the redirect URL.
    ///
    /// `origin` is where the payment flow sends the user back to.
    pub async fn create_checkout_session(&self, customer_id: &str, origin: &str) -> Result<String> {
        let success_url = format!("{origin}/subscription/success?session_id={{CHECKOUT_SESSION_ID}}");
        let cancel_url = format!("{origin}/subscription/cancel");

        let response = self
            .http
            .post(format!("{}/v1/checkout/sessions", self.base_url))
            .bearer_auth(&self.secret_key)
            .form(&[
                ("customer", customer_id),
                ("mode", "subscription"),
                ("line_items[0][price]", &self.price_id),
                ("line_items[0][quantity]", "1"),
                ("success_url", &success_url),
                ("cancel_url", &cancel_url),
            ])
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .context("failed to create Stripe checkout session")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "no body".to_string());
            bail!("Stripe checkout session failed ({status}): {body}");
        }

        let session: CheckoutSession = response
            .json()
            .await
            .context("failed to parse Stripe checkout session")?;
        Ok(session.url)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> StripeClient {
        StripeClient::with_base_url("sk_test_123", "price_test_456", &server.uri())
    }

    #[tokio::test]
    async fn test_existing_customer_is_reused() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/customers"))
            .and(query_param("email", "parent@example.com"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"id": "cus_existing"}]
            })))
            .mount(&server)
            .await;

        let id = client(&server)
            .find_or_create_customer("parent@example.com", "Parent")
            .await
            .unwrap();
        assert_eq!(id, "cus_existing");
    }

    #[tokio::test]
    async fn test_missing_customer_is_created() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/customers"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": []})),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/customers"))
            .and(body_string_contains("email=parent%40example.com"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "cus_new"
            })))
            .mount(&server)
            .await;

        let id = client(&server)
            .find_or_create_customer("parent@example.com", "Parent")
            .await
            .unwrap();
        assert_eq!(id, "cus_new");
    }

    #[tokio::test]
    async fn test_checkout_session_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/checkout/sessions"))
            .and(body_string_contains("mode=subscription"))
            .and(body_string_contains("customer=cus_123"))
            .and(body_string_contains("price_test_456"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "url": "https://checkout.stripe.com/c/pay/cs_test_abc"
            })))
            .mount(&server)
            .await;

        let url = client(&server)
            .create_checkout_session("cus_123", "https://play.example.com")
            .await
            .unwrap();
        assert_eq!(url, "https://checkout.stripe.com/c/pay/cs_test_abc");
    }

    #[tokio::test]
    async fn test_api_error_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/checkout/sessions"))
            .respond_with(ResponseTemplate::new(402).set_body_string("card declined"))
            .mount(&server)
            .await;

        let err = client(&server)
            .create_checkout_session("cus_123", "https://play.example.com")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("402"));
    }
}
