use axum::{
    extract::{Query, State},
    Json,
};
use bson::oid::ObjectId;
use mongodb::options::FindOptions;
use serde::{Deserialize, Serialize};
use tap::TapFallible;

use crate::{
    error::Error,
    identity::VerifiedIdentity,
    mongo_ext::Collection,
    util::{ObjectIdString, PathObjectId},
};

use super::user::AdminAccess;

pub const PAYMENT_STATUS_PAID: &str = "Paid";

pub const DELIVERY_STATUS_NOT_COLLECTED: &str = "Not Collected";
pub const DELIVERY_STATUS_ASSIGNED: &str = "Assigned to Rider";
pub const DELIVERY_STATUS_IN_TRANSIT: &str = "In Transit";
pub const DELIVERY_STATUS_DELIVERED: &str = "Delivered";

#[derive(Clone)]
pub struct ParcelCollection(pub Collection<ParcelModel>);

impl std::ops::Deref for ParcelCollection {
    type Target = Collection<ParcelModel>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Parcels are schemaless: creation stores the request body verbatim, so
/// every field the flows depend on is optional here and anything else rides
/// along in `extra`.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ParcelModel {
    #[serde(rename = "_id")]
    pub id: ObjectId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_date: Option<bson::Bson>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_status: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_status: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_rider_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_rider_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_rider_email: Option<String>,

    #[serde(default)]
    pub is_earning_cashed_out: bool,

    #[serde(flatten)]
    pub extra: bson::Document,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Parcel {
    pub id: ObjectIdString,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub creation_date: Option<bson::Bson>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_status: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_status: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_rider_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_rider_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_rider_email: Option<String>,

    pub is_earning_cashed_out: bool,

    #[serde(flatten)]
    pub extra: bson::Document,
}

impl From<ParcelModel> for Parcel {
    fn from(value: ParcelModel) -> Self {
        Self {
            id: value.id.into(),
            created_by: value.created_by,
            creation_date: value.creation_date,
            payment_status: value.payment_status,
            delivery_status: value.delivery_status,
            assigned_rider_id: value.assigned_rider_id,
            assigned_rider_name: value.assigned_rider_name,
            assigned_rider_email: value.assigned_rider_email,
            is_earning_cashed_out: value.is_earning_cashed_out,
            extra: value.extra,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct InsertResponse {
    pub inserted_id: ObjectIdString,
}

/// Stores the caller-supplied fields verbatim with a generated id. The open
/// shape is deliberate; the client owns the parcel schema.
#[tracing::instrument(skip_all, fields(user = %identity.email))]
pub async fn create(
    State(parcels): State<ParcelCollection>,
    identity: VerifiedIdentity,
    Json(request): Json<bson::Document>,
) -> Result<Json<InsertResponse>, Error> {
    let id = ObjectId::new();

    let mut document = request;
    document.insert("_id", id);

    tracing::debug!("creating parcel {:?}", document);
    parcels.insert_document(document).await?;

    Ok(Json(InsertResponse {
        inserted_id: id.into(),
    }))
}

pub async fn show(
    State(parcels): State<ParcelCollection>,
    _identity: VerifiedIdentity,
    PathObjectId(parcel_id): PathObjectId,
) -> Result<Json<Parcel>, Error> {
    let parcel = parcels
        .find_one_by_id(parcel_id)
        .await?
        .ok_or(Error::NoResource)
        .tap_err(|_| tracing::debug!("tried accessing non existing parcel"))?;

    Ok(Json(parcel.into()))
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct OwnerQuery {
    pub email: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct IndexResponse {
    pub parcels: Vec<Parcel>,
}

/// Lists parcels, optionally narrowed to one owner, newest first.
pub async fn index(
    State(parcels): State<ParcelCollection>,
    _identity: VerifiedIdentity,
    Query(query): Query<OwnerQuery>,
) -> Result<Json<IndexResponse>, Error> {
    let filter = match query.email {
        Some(email) => bson::doc! { "created_by": email },
        None => bson::doc! {},
    };

    let found = parcels
        .collect(
            filter,
            FindOptions::builder()
                .sort(bson::doc! { "creation_date": -1 })
                .build(),
        )
        .await?;

    Ok(Json(IndexResponse {
        parcels: found.into_iter().map(Into::into).collect(),
    }))
}

/// Admin listing of parcels ready for rider assignment: paid for but not yet
/// collected.
pub async fn assignable(
    State(parcels): State<ParcelCollection>,
    _admin: AdminAccess,
) -> Result<Json<IndexResponse>, Error> {
    let found = parcels
        .collect(
            bson::doc! {
                "payment_status": PAYMENT_STATUS_PAID,
                "delivery_status": DELIVERY_STATUS_NOT_COLLECTED,
            },
            None,
        )
        .await?;

    Ok(Json(IndexResponse {
        parcels: found.into_iter().map(Into::into).collect(),
    }))
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct UpdateStatusRequest {
    pub delivery_status: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct UpdateResponse {
    pub modified_count: u64,
}

/// Stores whatever status string the caller sends; there is no transition
/// graph.
pub async fn update_status(
    State(parcels): State<ParcelCollection>,
    PathObjectId(parcel_id): PathObjectId,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<UpdateResponse>, Error> {
    let result = parcels
        .update_one_by_id(
            parcel_id,
            bson::doc! {
                "$set": {
                    "delivery_status": request.delivery_status
                }
            },
        )
        .await?;

    if result.matched_count == 0 {
        return Err(Error::NoResource)
            .tap_err(|_| tracing::debug!("tried updating status of non existing parcel"));
    }

    Ok(Json(UpdateResponse {
        modified_count: result.modified_count,
    }))
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AssignRiderRequest {
    pub rider_id: String,
    pub rider_name: String,
    pub rider_email: String,
}

/// Sets the rider identity fields and the assigned status in one update, so
/// the parcel never shows a rider without the matching status.
pub async fn assign_rider(
    State(parcels): State<ParcelCollection>,
    PathObjectId(parcel_id): PathObjectId,
    Json(request): Json<AssignRiderRequest>,
) -> Result<Json<UpdateResponse>, Error> {
    let result = parcels
        .update_one_by_id(
            parcel_id,
            bson::doc! {
                "$set": {
                    "delivery_status": DELIVERY_STATUS_ASSIGNED,
                    "assigned_rider_id": request.rider_id,
                    "assigned_rider_name": request.rider_name,
                    "assigned_rider_email": request.rider_email,
                }
            },
        )
        .await?;

    if result.matched_count == 0 {
        return Err(Error::NoResource)
            .tap_err(|_| tracing::debug!("tried assigning rider to non existing parcel"));
    }

    Ok(Json(UpdateResponse {
        modified_count: result.modified_count,
    }))
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DeleteResponse {
    pub deleted_count: u64,
}

pub async fn delete(
    State(parcels): State<ParcelCollection>,
    PathObjectId(parcel_id): PathObjectId,
) -> Result<Json<DeleteResponse>, Error> {
    let result = parcels.delete_one_by_id(parcel_id).await?;

    if result.deleted_count == 0 {
        return Err(Error::NoResource)
            .tap_err(|_| tracing::debug!("tried deleting non existing parcel"));
    }

    Ok(Json(DeleteResponse {
        deleted_count: result.deleted_count,
    }))
}
