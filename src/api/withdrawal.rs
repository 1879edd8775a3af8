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
    error::Error,
    mongo_ext::Collection,
    util::{DecimalString, FormattedDateTime, ObjectIdString, PathObjectId},
};

use super::{
    parcel::{ParcelCollection, DELIVERY_STATUS_DELIVERED},
    user::{AdminAccess, RiderAccess},
};

pub const STATUS_PENDING: &str = "pending";

#[derive(Clone)]
pub struct WithdrawalCollection(pub Collection<WithdrawalModel>);

impl std::ops::Deref for WithdrawalCollection {
    type Target = Collection<WithdrawalModel>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct WithdrawalModel {
    #[serde(rename = "_id")]
    pub id: ObjectId,

    #[serde(rename = "riderEmail")]
    pub rider_email: String,

    pub amount: Decimal,

    pub timestamp: bson::DateTime,

    pub status: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Withdrawal {
    pub id: ObjectIdString,

    #[serde(rename = "riderEmail")]
    pub rider_email: String,

    pub amount: DecimalString,

    pub timestamp: FormattedDateTime,

    pub status: String,
}

impl From<WithdrawalModel> for Withdrawal {
    fn from(value: WithdrawalModel) -> Self {
        Self {
            id: value.id.into(),
            rider_email: value.rider_email,
            amount: value.amount.into(),
            timestamp: value.timestamp.into(),
            status: value.status,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct WithdrawRequest {
    #[serde(rename = "riderEmail")]
    pub rider_email: String,

    pub amount: DecimalString,

    #[serde(default)]
    pub timestamp: Option<FormattedDateTime>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct WithdrawResponse {
    pub updated_count: u64,

    pub withdrawal_id: ObjectIdString,
}

/// Withdrawal flow: bulk-mark the rider's delivered, not-yet-cashed-out
/// parcels, then record a pending withdrawal. Two sequential writes, no
/// transaction. The amount is taken from the caller, not recomputed from the
/// matched parcels.
#[tracing::instrument(skip_all, fields(rider = %request.rider_email))]
pub async fn withdraw(
    State(parcels): State<ParcelCollection>,
    State(withdrawals): State<WithdrawalCollection>,
    _rider: RiderAccess,
    Json(request): Json<WithdrawRequest>,
) -> Result<Json<WithdrawResponse>, Error> {
    let update = parcels
        .update_many(
            bson::doc! {
                "assigned_rider_email": &request.rider_email,
                "delivery_status": DELIVERY_STATUS_DELIVERED,
                "is_earning_cashed_out": { "$ne": true },
            },
            bson::doc! {
                "$set": {
                    "is_earning_cashed_out": true
                }
            },
            None,
        )
        .await?;

    let model = WithdrawalModel {
        id: ObjectId::new(),
        rider_email: request.rider_email,
        amount: request.amount.into(),
        timestamp: request
            .timestamp
            .map(Into::into)
            .unwrap_or_else(|| OffsetDateTime::now_utc().into()),
        status: STATUS_PENDING.to_string(),
    };
    withdrawals.insert_one(&model, None).await?;

    Ok(Json(WithdrawResponse {
        updated_count: update.modified_count,
        withdrawal_id: model.id.into(),
    }))
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RiderQuery {
    pub email: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct IndexResponse {
    pub withdrawals: Vec<Withdrawal>,
}

pub async fn index_for_rider(
    State(withdrawals): State<WithdrawalCollection>,
    Query(query): Query<RiderQuery>,
) -> Result<Json<IndexResponse>, Error> {
    let email = query.email.ok_or(Error::MissingField("email"))?;

    let found = withdrawals
        .collect(
            bson::doc! { "riderEmail": email },
            FindOptions::builder()
                .sort(bson::doc! { "timestamp": -1 })
                .build(),
        )
        .await?;

    Ok(Json(IndexResponse {
        withdrawals: found.into_iter().map(Into::into).collect(),
    }))
}

pub async fn index_all(
    State(withdrawals): State<WithdrawalCollection>,
    _admin: AdminAccess,
) -> Result<Json<IndexResponse>, Error> {
    let found = withdrawals
        .collect(
            None,
            FindOptions::builder()
                .sort(bson::doc! { "timestamp": -1 })
                .build(),
        )
        .await?;

    Ok(Json(IndexResponse {
        withdrawals: found.into_iter().map(Into::into).collect(),
    }))
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct UpdateStatusRequest {
    pub status: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct UpdateStatusResponse {
    pub modified_count: u64,
}

/// Admin settles a withdrawal by writing any status string; no enumerated
/// set is enforced.
pub async fn update_status(
    State(withdrawals): State<WithdrawalCollection>,
    PathObjectId(withdrawal_id): PathObjectId,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<UpdateStatusResponse>, Error> {
    let result = withdrawals
        .update_one_by_id(
            withdrawal_id,
            bson::doc! {
                "$set": {
                    "status": request.status
                }
            },
        )
        .await?;

    if result.matched_count == 0 {
        return Err(Error::NoResource)
            .tap_err(|_| tracing::debug!("tried updating non existing withdrawal"));
    }

    Ok(Json(UpdateStatusResponse {
        modified_count: result.modified_count,
    }))
}
