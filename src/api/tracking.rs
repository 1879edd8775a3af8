use axum::{extract::State, Json};
use bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{
    error::Error,
    mongo_ext::Collection,
    util::{FormattedDateTime, ObjectIdString},
};

#[derive(Clone)]
pub struct TrackingCollection(pub Collection<TrackingEventModel>);

impl std::ops::Deref for TrackingCollection {
    type Target = Collection<TrackingEventModel>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Append-only delivery log. There is no read endpoint; the collection is
/// consumed out-of-band.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TrackingEventModel {
    #[serde(rename = "_id")]
    pub id: ObjectId,

    pub tracking_id: String,

    pub parcel_id: Option<ObjectId>,

    pub status: String,

    pub message: Option<String>,

    pub time: bson::DateTime,

    pub updated_by: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CreateRequest {
    pub tracking_id: String,

    #[serde(default)]
    pub parcel_id: Option<ObjectIdString>,

    pub status: String,

    #[serde(default)]
    pub message: Option<String>,

    #[serde(default)]
    pub updated_by: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CreateResponse {
    pub inserted_id: ObjectIdString,
    pub time: FormattedDateTime,
}

/// The event timestamp is always server-set; callers cannot backdate the log.
pub async fn create(
    State(tracking): State<TrackingCollection>,
    Json(request): Json<CreateRequest>,
) -> Result<Json<CreateResponse>, Error> {
    let model = TrackingEventModel {
        id: ObjectId::new(),
        tracking_id: request.tracking_id,
        parcel_id: request.parcel_id.map(|it| *it),
        status: request.status,
        message: request.message,
        time: OffsetDateTime::now_utc().into(),
        updated_by: request.updated_by,
    };

    tracking.insert_one(&model, None).await?;

    Ok(Json(CreateResponse {
        inserted_id: model.id.into(),
        time: model.time.into(),
    }))
}
