use serde::Deserialize;

use crate::error::Error;

const API_URL: &str = "https://api.stripe.com/v1";

/// Minimal Stripe client: the only call this service makes is creating a
/// payment intent; the charge itself is completed client-side with the
/// returned secret.
#[derive(Clone)]
pub struct StripeClient {
    http: reqwest::Client,
    base_url: String,
    secret_key: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct PaymentIntent {
    pub id: String,
    pub client_secret: String,
}

impl StripeClient {
    pub fn new(secret_key: String) -> Self {
        Self::with_base_url(secret_key, API_URL.to_string())
    }

    pub fn with_base_url(secret_key: String, base_url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            secret_key,
        }
    }

    pub fn new_from_env() -> Self {
        let secret_key = std::env::var("PAYMENT_GATEWAY_KEY")
            .expect("Cannot retreive PAYMENT_GATEWAY_KEY from environment variable.");

        Self::new(secret_key)
    }

    /// Creates a card payment intent for `amount` minor currency units.
    pub async fn create_payment_intent(&self, amount: i64) -> Result<PaymentIntent, Error> {
        let response = self
            .http
            .post(format!("{}/payment_intents", self.base_url))
            .bearer_auth(&self.secret_key)
            .form(&[
                ("amount", amount.to_string().as_str()),
                ("currency", "usd"),
                ("payment_method_types[]", "card"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();

            return Err(Error::PaymentGatewayError(anyhow::anyhow!(
                "stripe returned {}: {}",
                status,
                body
            )));
        }

        response.json::<PaymentIntent>().await.map_err(Into::into)
    }
}
