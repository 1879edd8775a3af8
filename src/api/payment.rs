use axum::{
    extract::{Query, State},
    Json,
};
use bson::oid::ObjectId;
use mongodb::options::FindOptions;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tap::TapFallible;
use time::OffsetDateTime;

use crate::{
    error::{Error, ForbiddenType},
    identity::VerifiedIdentity,
    mongo_ext::Collection,
    stripe::StripeClient,
    util::{DecimalString, FormattedDateTime, ObjectIdString},
};

use super::parcel::{ParcelCollection, PAYMENT_STATUS_PAID};

#[derive(Clone)]
pub struct PaymentHistoryCollection(pub Collection<PaymentHistoryModel>);

impl std::ops::Deref for PaymentHistoryCollection {
    type Target = Collection<PaymentHistoryModel>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Append-only payment record. Field names are camelCase because that is how
/// the collection has always been written.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PaymentHistoryModel {
    #[serde(rename = "_id")]
    pub id: ObjectId,

    #[serde(rename = "parcelId")]
    pub parcel_id: ObjectId,

    #[serde(rename = "userEmail")]
    pub user_email: String,

    pub amount: Decimal,

    #[serde(rename = "paymentMethod")]
    pub payment_method: String,

    #[serde(rename = "transactionId")]
    pub transaction_id: Option<String>,

    #[serde(rename = "paymentDate")]
    pub payment_date: bson::DateTime,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PaymentHistory {
    pub id: ObjectIdString,

    #[serde(rename = "parcelId")]
    pub parcel_id: ObjectIdString,

    #[serde(rename = "userEmail")]
    pub user_email: String,

    pub amount: DecimalString,

    #[serde(rename = "paymentMethod")]
    pub payment_method: String,

    #[serde(rename = "transactionId")]
    pub transaction_id: Option<String>,

    #[serde(rename = "paymentDate")]
    pub payment_date: FormattedDateTime,
}

impl From<PaymentHistoryModel> for PaymentHistory {
    fn from(value: PaymentHistoryModel) -> Self {
        Self {
            id: value.id.into(),
            parcel_id: value.parcel_id.into(),
            user_email: value.user_email,
            amount: value.amount.into(),
            payment_method: value.payment_method,
            transaction_id: value.transaction_id,
            payment_date: value.payment_date.into(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ConfirmRequest {
    #[serde(rename = "parcelId")]
    pub parcel_id: ObjectIdString,

    #[serde(rename = "userEmail")]
    pub user_email: String,

    pub amount: DecimalString,

    #[serde(rename = "paymentMethod")]
    pub payment_method: String,

    #[serde(rename = "transactionId", default)]
    pub transaction_id: Option<String>,

    #[serde(rename = "paymentDate", default)]
    pub payment_date: Option<FormattedDateTime>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ConfirmResponse {
    pub message: String,

    #[serde(rename = "paymentHistoryId")]
    pub payment_history_id: ObjectIdString,
}

/// Payment confirmation: two dependent writes, not a transaction. The
/// conditional update only matches when the parcel id and owning email pair
/// up, which is the whole authorization check; the history insert happens
/// only after a match. The predicate ignores the current payment status, so
/// a repeated confirmation appends another history row (pinned by a test).
#[tracing::instrument(skip_all, fields(parcel = %request.parcel_id, user = %request.user_email))]
pub async fn confirm(
    State(parcels): State<ParcelCollection>,
    State(payments): State<PaymentHistoryCollection>,
    Json(request): Json<ConfirmRequest>,
) -> Result<Json<ConfirmResponse>, Error> {
    let update = parcels
        .update_one(
            bson::doc! {
                "_id": *request.parcel_id,
                "created_by": &request.user_email,
            },
            bson::doc! {
                "$set": {
                    "payment_status": PAYMENT_STATUS_PAID
                }
            },
            None,
        )
        .await?;

    if update.matched_count == 0 {
        return Err(Error::NotFoundOrUnauthorized)
            .tap_err(|_| tracing::debug!("parcel missing or owned by someone else"));
    }

    let model = PaymentHistoryModel {
        id: ObjectId::new(),
        parcel_id: *request.parcel_id,
        user_email: request.user_email,
        amount: request.amount.into(),
        payment_method: request.payment_method,
        transaction_id: request.transaction_id,
        payment_date: request
            .payment_date
            .map(Into::into)
            .unwrap_or_else(|| OffsetDateTime::now_utc().into()),
    };
    payments.insert_one(&model, None).await?;

    Ok(Json(ConfirmResponse {
        message: "Payment confirmed and history saved".to_string(),
        payment_history_id: model.id.into(),
    }))
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HistoryQuery {
    pub email: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HistoryResponse {
    pub payments: Vec<PaymentHistory>,
}

/// Payment history is private: the queried email must be the caller's own.
pub async fn index(
    State(payments): State<PaymentHistoryCollection>,
    identity: VerifiedIdentity,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, Error> {
    let email = query.email.ok_or(Error::MissingField("email"))?;

    if email != identity.email {
        return Err(Error::Forbidden(ForbiddenType::EmailMismatch))
            .tap_err(|_| tracing::debug!("tried reading another user's payment history"));
    }

    let found = payments
        .collect(
            bson::doc! { "userEmail": email },
            FindOptions::builder()
                .sort(bson::doc! { "paymentDate": -1 })
                .build(),
        )
        .await?;

    Ok(Json(HistoryResponse {
        payments: found.into_iter().map(Into::into).collect(),
    }))
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CreateIntentRequest {
    #[serde(rename = "amountInCents")]
    pub amount_in_cents: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CreateIntentResponse {
    #[serde(rename = "clientSecret")]
    pub client_secret: String,
}

/// Requests a card authorization from the gateway and hands the client the
/// secret it needs to complete the charge out-of-band. Nothing is persisted
/// here; the client calls `POST /payments` once the charge went through.
pub async fn create_intent(
    State(stripe): State<StripeClient>,
    _identity: VerifiedIdentity,
    Json(request): Json<CreateIntentRequest>,
) -> Result<Json<CreateIntentResponse>, Error> {
    let intent = stripe.create_payment_intent(request.amount_in_cents).await?;

    Ok(Json(CreateIntentResponse {
        client_secret: intent.client_secret,
    }))
}
