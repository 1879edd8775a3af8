use axum::extract::FromRef;

use crate::api::{
    parcel::ParcelCollection, payment::PaymentHistoryCollection, rider::RiderCollection,
    tracking::TrackingCollection, user::UserCollection, withdrawal::WithdrawalCollection,
};
use crate::{identity::IdentityVerifier, stripe::StripeClient};

#[derive(FromRef, Clone)]
pub struct AppState {
    pub identity_verifier: IdentityVerifier,
    pub stripe: StripeClient,

    pub mongo_client: mongodb::Client,
    pub parcel_collection: ParcelCollection,
    pub payment_collection: PaymentHistoryCollection,
    pub tracking_collection: TrackingCollection,
    pub user_collection: UserCollection,
    pub rider_collection: RiderCollection,
    pub withdrawal_collection: WithdrawalCollection,
}

impl AppState {
    pub async fn new(
        mongo_url: &str,
        database_name: &str,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let identity_verifier = IdentityVerifier::new_from_env();
        let stripe = StripeClient::new_from_env();

        let mongo_client_opt = mongodb::options::ClientOptions::parse(mongo_url).await?;
        let mongo_client = mongodb::Client::with_options(mongo_client_opt)?;

        let db = mongo_client.database(database_name);
        Ok(Self {
            identity_verifier,
            stripe,

            mongo_client,
            parcel_collection: ParcelCollection(db.collection("parcels").into()),
            payment_collection: PaymentHistoryCollection(db.collection("payments").into()),
            tracking_collection: TrackingCollection(db.collection("tracking").into()),
            user_collection: UserCollection(db.collection("users").into()),
            rider_collection: RiderCollection(db.collection("riders").into()),
            withdrawal_collection: WithdrawalCollection(db.collection("withdrawals").into()),
        })
    }

    pub async fn new_from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let mongodb_url = &std::env::var("MONGODB_URI")
            .expect("Cannot retreive MONGODB_URI from environment variable.");

        Self::new(mongodb_url, "pro-fast").await
    }
}
