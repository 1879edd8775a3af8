use axum::{
    extract::{Query, State},
    Json,
};
use bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use tap::TapFallible;

use crate::{
    error::Error,
    identity::VerifiedIdentity,
    mongo_ext::Collection,
    util::{ObjectIdString, PathObjectId},
};

use super::{
    parcel::{
        Parcel, ParcelCollection, DELIVERY_STATUS_ASSIGNED, DELIVERY_STATUS_DELIVERED,
        DELIVERY_STATUS_IN_TRANSIT,
    },
    user::{AdminAccess, RiderAccess, UserCollection, UserRole},
};

pub const STATUS_PENDING: &str = "Pending";
pub const STATUS_ACTIVE: &str = "active";
pub const STATUS_DEACTIVATED: &str = "deactivate";

#[derive(Clone)]
pub struct RiderCollection(pub Collection<RiderModel>);

impl std::ops::Deref for RiderCollection {
    type Target = Collection<RiderModel>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Rider applications are stored verbatim, like parcels; only the fields the
/// lifecycle touches are typed.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RiderModel {
    #[serde(rename = "_id")]
    pub id: ObjectId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub district: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    #[serde(flatten)]
    pub extra: bson::Document,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Rider {
    pub id: ObjectIdString,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub district: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    #[serde(flatten)]
    pub extra: bson::Document,
}

impl From<RiderModel> for Rider {
    fn from(value: RiderModel) -> Self {
        Self {
            id: value.id.into(),
            name: value.name,
            email: value.email,
            district: value.district,
            status: value.status,
            extra: value.extra,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct InsertResponse {
    pub inserted_id: ObjectIdString,
}

/// Rider application; the applicant fields (and the initial status, usually
/// "Pending") come from the caller as-is.
#[tracing::instrument(skip_all, fields(user = %identity.email))]
pub async fn apply(
    State(riders): State<RiderCollection>,
    identity: VerifiedIdentity,
    Json(request): Json<bson::Document>,
) -> Result<Json<InsertResponse>, Error> {
    let id = ObjectId::new();

    let mut document = request;
    document.insert("_id", id);

    tracing::debug!("creating rider application {:?}", document);
    riders.insert_document(document).await?;

    Ok(Json(InsertResponse {
        inserted_id: id.into(),
    }))
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct IndexResponse {
    pub riders: Vec<Rider>,
}

async fn list_by_status(riders: &RiderCollection, status: &str) -> Result<IndexResponse, Error> {
    let found = riders.collect(bson::doc! { "status": status }, None).await?;

    Ok(IndexResponse {
        riders: found.into_iter().map(Into::into).collect(),
    })
}

pub async fn index_pending(
    State(riders): State<RiderCollection>,
    _admin: AdminAccess,
) -> Result<Json<IndexResponse>, Error> {
    list_by_status(&riders, STATUS_PENDING).await.map(Json)
}

pub async fn index_active(
    State(riders): State<RiderCollection>,
    _admin: AdminAccess,
) -> Result<Json<IndexResponse>, Error> {
    list_by_status(&riders, STATUS_ACTIVE).await.map(Json)
}

pub async fn index_deactivated(
    State(riders): State<RiderCollection>,
    _admin: AdminAccess,
) -> Result<Json<IndexResponse>, Error> {
    list_by_status(&riders, STATUS_DEACTIVATED).await.map(Json)
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AvailableQuery {
    pub district: Option<String>,
}

/// Active riders in a district, for the assignment picker.
pub async fn index_available(
    State(riders): State<RiderCollection>,
    Query(query): Query<AvailableQuery>,
) -> Result<Json<IndexResponse>, Error> {
    let district = query.district.ok_or(Error::MissingField("district"))?;

    let found = riders
        .collect(
            bson::doc! {
                "district": district,
                "status": STATUS_ACTIVE,
            },
            None,
        )
        .await?;

    Ok(Json(IndexResponse {
        riders: found.into_iter().map(Into::into).collect(),
    }))
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct UpdateStatusRequest {
    pub status: String,

    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct UpdateStatusResponse {
    pub modified_count: u64,
}

/// Stores the caller's status string verbatim. When the new status is
/// exactly "active" and an email is co-supplied, the matching user account
/// is promoted to the rider role. The promotion is a second, best-effort
/// write; there is no transaction tying the two together.
pub async fn update_status(
    State(riders): State<RiderCollection>,
    State(users): State<UserCollection>,
    PathObjectId(rider_id): PathObjectId,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<UpdateStatusResponse>, Error> {
    let result = riders
        .update_one_by_id(
            rider_id,
            bson::doc! {
                "$set": {
                    "status": &request.status
                }
            },
        )
        .await?;

    if result.matched_count == 0 {
        return Err(Error::NoResource)
            .tap_err(|_| tracing::debug!("tried updating status of non existing rider"));
    }

    if request.status == STATUS_ACTIVE {
        if let Some(email) = &request.email {
            users
                .update_one(
                    bson::doc! { "email": email },
                    bson::doc! {
                        "$set": {
                            "role": bson::to_bson(&UserRole::Rider)?
                        }
                    },
                    None,
                )
                .await?;
        }
    }

    Ok(Json(UpdateStatusResponse {
        modified_count: result.modified_count,
    }))
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DeleteResponse {
    pub deleted_count: u64,
}

pub async fn delete(
    State(riders): State<RiderCollection>,
    PathObjectId(rider_id): PathObjectId,
) -> Result<Json<DeleteResponse>, Error> {
    let result = riders.delete_one_by_id(rider_id).await?;

    if result.deleted_count == 0 {
        return Err(Error::NoResource)
            .tap_err(|_| tracing::debug!("tried deleting non existing rider"));
    }

    Ok(Json(DeleteResponse {
        deleted_count: result.deleted_count,
    }))
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RiderParcelQuery {
    pub email: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RiderParcelResponse {
    pub parcels: Vec<Parcel>,
}

/// A rider's in-flight workload: assigned or currently in transit.
pub async fn index_parcels(
    State(parcels): State<ParcelCollection>,
    _rider: RiderAccess,
    Query(query): Query<RiderParcelQuery>,
) -> Result<Json<RiderParcelResponse>, Error> {
    let email = query.email.ok_or(Error::MissingField("email"))?;

    let found = parcels
        .collect(
            bson::doc! {
                "assigned_rider_email": email,
                "delivery_status": {
                    "$in": [DELIVERY_STATUS_ASSIGNED, DELIVERY_STATUS_IN_TRANSIT]
                },
            },
            None,
        )
        .await?;

    Ok(Json(RiderParcelResponse {
        parcels: found.into_iter().map(Into::into).collect(),
    }))
}

pub async fn index_completed_parcels(
    State(parcels): State<ParcelCollection>,
    Query(query): Query<RiderParcelQuery>,
) -> Result<Json<RiderParcelResponse>, Error> {
    let email = query.email.ok_or(Error::MissingField("email"))?;

    let found = parcels
        .collect(
            bson::doc! {
                "assigned_rider_email": email,
                "delivery_status": DELIVERY_STATUS_DELIVERED,
            },
            None,
        )
        .await?;

    Ok(Json(RiderParcelResponse {
        parcels: found.into_iter().map(Into::into).collect(),
    }))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use axum::{extract::Query, Json};
    use bson::oid::ObjectId;

    use crate::{
        api::{tests::bootstrap, user::UserRole},
        error::Error,
        util::PathObjectId,
    };

    async fn apply(bootstrap: &crate::api::tests::Bootstrap, email: &str, district: &str) -> ObjectId {
        let Json(inserted) = super::apply(
            bootstrap.rider_collection(),
            bootstrap.identity(email),
            Json(bson::doc! {
                "name": "some rider",
                "email": email,
                "district": district,
                "status": super::STATUS_PENDING,
                "bike_registration": "DH-1234",
            }),
        )
        .await
        .unwrap();

        *inserted.inserted_id
    }

    #[tokio::test]
    async fn test_apply_and_list_pending() {
        let bootstrap = bootstrap().await;
        let admin = bootstrap.admin("boss@test.com").await;

        apply(&bootstrap, "rider@test.com", "Dhaka").await;

        let Json(response) = super::index_pending(bootstrap.rider_collection(), admin)
            .await
            .unwrap();
        assert_eq!(response.riders.len(), 1);
        assert_eq!(response.riders[0].email.as_deref(), Some("rider@test.com"));
        assert_eq!(
            response.riders[0].extra.get_str("bike_registration").unwrap(),
            "DH-1234"
        );
    }

    #[tokio::test]
    async fn test_activation_promotes_matching_user() {
        let bootstrap = bootstrap().await;
        bootstrap.create_user("rider@test.com", UserRole::User).await;
        let rider_id = apply(&bootstrap, "rider@test.com", "Dhaka").await;

        super::update_status(
            bootstrap.rider_collection(),
            bootstrap.user_collection(),
            PathObjectId(rider_id),
            Json(super::UpdateStatusRequest {
                status: super::STATUS_ACTIVE.to_string(),
                email: Some("rider@test.com".to_string()),
            }),
        )
        .await
        .unwrap();

        let rider = bootstrap
            .app_state
            .rider_collection
            .find_one_by_id(rider_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(rider.status.as_deref(), Some("active"));

        let user = bootstrap
            .app_state
            .user_collection
            .find_one(bson::doc! { "email": "rider@test.com" }, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(user.role, UserRole::Rider);
    }

    #[tokio::test]
    async fn test_non_active_status_leaves_role_alone() {
        let bootstrap = bootstrap().await;
        bootstrap.create_user("rider@test.com", UserRole::User).await;
        let rider_id = apply(&bootstrap, "rider@test.com", "Dhaka").await;

        super::update_status(
            bootstrap.rider_collection(),
            bootstrap.user_collection(),
            PathObjectId(rider_id),
            Json(super::UpdateStatusRequest {
                // close, but not the exact trigger string
                status: "Active".to_string(),
                email: Some("rider@test.com".to_string()),
            }),
        )
        .await
        .unwrap();

        let rider = bootstrap
            .app_state
            .rider_collection
            .find_one_by_id(rider_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(rider.status.as_deref(), Some("Active"));

        let user = bootstrap
            .app_state
            .user_collection
            .find_one(bson::doc! { "email": "rider@test.com" }, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(user.role, UserRole::User);
    }

    #[tokio::test]
    async fn test_update_status_non_existing_rider() {
        let bootstrap = bootstrap().await;

        let error = super::update_status(
            bootstrap.rider_collection(),
            bootstrap.user_collection(),
            PathObjectId(ObjectId::new()),
            Json(super::UpdateStatusRequest {
                status: super::STATUS_ACTIVE.to_string(),
                email: None,
            }),
        )
        .await
        .unwrap_err();
        assert_matches!(error, Error::NoResource);
    }

    #[tokio::test]
    async fn test_available_filters_district_and_active() {
        let bootstrap = bootstrap().await;

        let in_district = apply(&bootstrap, "active@test.com", "Dhaka").await;
        apply(&bootstrap, "pending@test.com", "Dhaka").await;
        let elsewhere = apply(&bootstrap, "far@test.com", "Sylhet").await;

        for id in [in_district, elsewhere] {
            super::update_status(
                bootstrap.rider_collection(),
                bootstrap.user_collection(),
                PathObjectId(id),
                Json(super::UpdateStatusRequest {
                    status: super::STATUS_ACTIVE.to_string(),
                    email: None,
                }),
            )
            .await
            .unwrap();
        }

        let Json(response) = super::index_available(
            bootstrap.rider_collection(),
            Query(super::AvailableQuery {
                district: Some("Dhaka".to_string()),
            }),
        )
        .await
        .unwrap();

        assert_eq!(response.riders.len(), 1);
        assert_eq!(response.riders[0].email.as_deref(), Some("active@test.com"));
    }

    #[tokio::test]
    async fn test_delete() {
        let bootstrap = bootstrap().await;
        let rider_id = apply(&bootstrap, "rider@test.com", "Dhaka").await;

        super::delete(bootstrap.rider_collection(), PathObjectId(rider_id))
            .await
            .unwrap();

        let error = super::delete(bootstrap.rider_collection(), PathObjectId(rider_id))
            .await
            .unwrap_err();
        assert_matches!(error, Error::NoResource);
    }

    #[tokio::test]
    async fn test_rider_parcels_split_by_status() {
        let bootstrap = bootstrap().await;
        let rider = bootstrap.rider("rider@test.com").await;

        for status in ["Assigned to Rider", "In Transit", "Delivered", "Not Collected"] {
            crate::api::parcel::create(
                bootstrap.parcel_collection(),
                bootstrap.identity("sender@test.com"),
                Json(bson::doc! {
                    "created_by": "sender@test.com",
                    "assigned_rider_email": "rider@test.com",
                    "delivery_status": status,
                }),
            )
            .await
            .unwrap();
        }

        let Json(in_flight) = super::index_parcels(
            bootstrap.parcel_collection(),
            rider,
            Query(super::RiderParcelQuery {
                email: Some("rider@test.com".to_string()),
            }),
        )
        .await
        .unwrap();
        assert_eq!(in_flight.parcels.len(), 2);

        let Json(completed) = super::index_completed_parcels(
            bootstrap.parcel_collection(),
            Query(super::RiderParcelQuery {
                email: Some("rider@test.com".to_string()),
            }),
        )
        .await
        .unwrap();
        assert_eq!(completed.parcels.len(), 1);
        assert_eq!(
            completed.parcels[0].delivery_status.as_deref(),
            Some("Delivered")
        );
    }
}
