use axum::{
    extract::{FromRef, FromRequestParts, Path, Query, State},
    http::request::Parts,
    Json, RequestPartsExt,
};
use bson::oid::ObjectId;
use mongodb::options::FindOptions;
use serde::{Deserialize, Serialize};
use tap::TapFallible;
use time::OffsetDateTime;
use validator::Validate;

use crate::{
    error::{Error, ForbiddenType},
    identity::{IdentityVerifier, VerifiedIdentity},
    mongo_ext::Collection,
    util::{FormattedDateTime, ObjectIdString, PathObjectId},
};

#[derive(Clone)]
pub struct UserCollection(pub Collection<UserModel>);

impl std::ops::Deref for UserCollection {
    type Target = Collection<UserModel>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct UserModel {
    #[serde(rename = "_id")]
    pub id: ObjectId,

    pub email: String,

    // documents written before roles existed have no role field
    #[serde(default)]
    pub role: UserRole,

    pub created_at: bson::DateTime,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    #[default]
    User,
    Rider,
    Admin,
}

/// Role gate: the verified identity must map to a stored user whose role is
/// `admin`. Runs strictly after credential verification since it embeds
/// [`VerifiedIdentity`].
#[derive(Debug, Clone)]
pub struct AdminAccess(pub VerifiedIdentity);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AdminAccess
where
    IdentityVerifier: FromRef<S>,
    UserCollection: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let identity = parts.extract_with_state::<VerifiedIdentity, _>(state).await?;

        require_role(&UserCollection::from_ref(state), &identity, UserRole::Admin).await?;

        Ok(Self(identity))
    }
}

/// Role gate for `rider`, same shape as [`AdminAccess`].
#[derive(Debug, Clone)]
pub struct RiderAccess(pub VerifiedIdentity);

#[axum::async_trait]
impl<S> FromRequestParts<S> for RiderAccess
where
    IdentityVerifier: FromRef<S>,
    UserCollection: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let identity = parts.extract_with_state::<VerifiedIdentity, _>(state).await?;

        require_role(&UserCollection::from_ref(state), &identity, UserRole::Rider).await?;

        Ok(Self(identity))
    }
}

async fn require_role(
    users: &UserCollection,
    identity: &VerifiedIdentity,
    role: UserRole,
) -> Result<(), Error> {
    let user = users
        .find_one(
            bson::doc! {
                "email": &identity.email
            },
            None,
        )
        .await?;

    match user {
        Some(user) if user.role == role => Ok(()),
        _ => Err(Error::Forbidden(ForbiddenType::NoPermission)).tap_err(|_| {
            tracing::debug!("{} does not hold the {:?} role", identity.email, role)
        }),
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct User {
    pub id: ObjectIdString,
    pub email: String,
    pub role: UserRole,
    pub created_at: FormattedDateTime,
}

impl From<UserModel> for User {
    fn from(value: UserModel) -> Self {
        Self {
            id: value.id.into(),
            email: value.email,
            role: value.role,
            created_at: value.created_at.into(),
        }
    }
}

#[derive(Validate, Serialize, Deserialize, Debug, Clone)]
pub struct CreateRequest {
    #[validate(email)]
    pub email: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CreateResponse {
    pub inserted: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub inserted_id: Option<ObjectIdString>,

    pub message: String,
}

/// First sign-in registration: creates the user only when the email is not
/// stored yet, otherwise reports the existing account without failing.
pub async fn create(
    State(users): State<UserCollection>,
    Json(request): Json<CreateRequest>,
) -> Result<Json<CreateResponse>, Error> {
    request.validate()?;

    let count = users
        .count_documents(
            bson::doc! {
                "email": &request.email
            },
            None,
        )
        .await?;

    if count > 0 {
        return Ok(Json(CreateResponse {
            inserted: false,
            inserted_id: None,
            message: "user already exists".to_string(),
        }));
    }

    let model = UserModel {
        id: ObjectId::new(),
        email: request.email,
        role: UserRole::User,
        created_at: OffsetDateTime::now_utc().into(),
    };
    users.insert_one(&model, None).await?;

    Ok(Json(CreateResponse {
        inserted: true,
        inserted_id: Some(model.id.into()),
        message: "user created".to_string(),
    }))
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SearchQuery {
    pub email: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SearchResponse {
    pub users: Vec<User>,
}

/// Partial, case-insensitive email search, capped at 10 matches.
pub async fn search(
    State(users): State<UserCollection>,
    _identity: VerifiedIdentity,
    Query(query): Query<SearchQuery>,
) -> Result<Json<SearchResponse>, Error> {
    let email = query.email.ok_or(Error::MissingField("email"))?;

    let found = users
        .collect(
            bson::doc! {
                "email": bson::Regex {
                    pattern: email,
                    options: "i".to_string(),
                }
            },
            FindOptions::builder().limit(10).build(),
        )
        .await?;

    Ok(Json(SearchResponse {
        users: found.into_iter().map(Into::into).collect(),
    }))
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RoleResponse {
    pub role: UserRole,
}

/// Unknown emails report the default role instead of failing; the client
/// treats every signed-in account as a plain user until told otherwise.
pub async fn role(
    State(users): State<UserCollection>,
    _identity: VerifiedIdentity,
    Path(email): Path<String>,
) -> Result<Json<RoleResponse>, Error> {
    let user = users
        .find_one(
            bson::doc! {
                "email": &email
            },
            None,
        )
        .await?;

    Ok(Json(RoleResponse {
        role: user.map(|it| it.role).unwrap_or_default(),
    }))
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct UpdateRoleRequest {
    pub role: UserRole,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct UpdateRoleResponse {
    pub modified_count: u64,
}

pub async fn update_role(
    State(users): State<UserCollection>,
    _admin: AdminAccess,
    PathObjectId(user_id): PathObjectId,
    Json(request): Json<UpdateRoleRequest>,
) -> Result<Json<UpdateRoleResponse>, Error> {
    let result = users
        .update_one_by_id(
            user_id,
            bson::doc! {
                "$set": {
                    "role": bson::to_bson(&request.role)?
                }
            },
        )
        .await?;

    if result.matched_count == 0 {
        return Err(Error::NoResource)
            .tap_err(|_| tracing::debug!("tried changing role of non existing user"));
    }

    Ok(Json(UpdateRoleResponse {
        modified_count: result.modified_count,
    }))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use axum::{extract::FromRequestParts, Json};

    use crate::{
        api::tests::bootstrap,
        error::{Error, ForbiddenType},
    };

    use super::UserRole;

    #[test]
    fn test_role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&UserRole::User).unwrap(), "\"user\"");
        assert_eq!(
            serde_json::to_string(&UserRole::Rider).unwrap(),
            "\"rider\""
        );
        assert_eq!(
            serde_json::to_string(&UserRole::Admin).unwrap(),
            "\"admin\""
        );
    }

    #[tokio::test]
    async fn test_create_is_idempotent_on_email() {
        let bootstrap = bootstrap().await;

        let Json(first) = super::create(
            bootstrap.user_collection(),
            Json(super::CreateRequest {
                email: "someone@test.com".to_string(),
            }),
        )
        .await
        .unwrap();
        assert!(first.inserted);

        let Json(second) = super::create(
            bootstrap.user_collection(),
            Json(super::CreateRequest {
                email: "someone@test.com".to_string(),
            }),
        )
        .await
        .unwrap();
        assert!(!second.inserted);
        assert!(second.inserted_id.is_none());
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_email() {
        let bootstrap = bootstrap().await;

        let error = super::create(
            bootstrap.user_collection(),
            Json(super::CreateRequest {
                email: "not an email".to_string(),
            }),
        )
        .await
        .unwrap_err();
        assert_matches!(error, Error::ValidationError(_));
    }

    #[tokio::test]
    async fn test_role_defaults_to_user_for_unknown_email() {
        let bootstrap = bootstrap().await;

        let Json(response) = super::role(
            bootstrap.user_collection(),
            bootstrap.identity("whoever@test.com"),
            axum::extract::Path("unknown@test.com".to_string()),
        )
        .await
        .unwrap();

        assert_eq!(response.role, UserRole::User);
    }

    #[tokio::test]
    async fn test_admin_gate_rejects_plain_user() {
        let bootstrap = bootstrap().await;
        bootstrap.create_user("plain@test.com", UserRole::User).await;

        let mut parts = bootstrap.authorized_request("plain@test.com");

        let error = super::AdminAccess::from_request_parts(&mut parts, &bootstrap.app_state)
            .await
            .unwrap_err();
        assert_matches!(error, Error::Forbidden(ForbiddenType::NoPermission));
    }

    #[tokio::test]
    async fn test_admin_gate_rejects_unknown_user() {
        let bootstrap = bootstrap().await;

        let mut parts = bootstrap.authorized_request("ghost@test.com");

        let error = super::AdminAccess::from_request_parts(&mut parts, &bootstrap.app_state)
            .await
            .unwrap_err();
        assert_matches!(error, Error::Forbidden(ForbiddenType::NoPermission));
    }

    #[tokio::test]
    async fn test_admin_gate_passes_admin() {
        let bootstrap = bootstrap().await;
        bootstrap.create_user("boss@test.com", UserRole::Admin).await;

        let mut parts = bootstrap.authorized_request("boss@test.com");

        let admin = super::AdminAccess::from_request_parts(&mut parts, &bootstrap.app_state)
            .await
            .unwrap();
        assert_eq!(admin.0.email, "boss@test.com");
    }

    #[tokio::test]
    async fn test_rider_gate_rejects_admin() {
        let bootstrap = bootstrap().await;
        bootstrap.create_user("boss@test.com", UserRole::Admin).await;

        let mut parts = bootstrap.authorized_request("boss@test.com");

        let error = super::RiderAccess::from_request_parts(&mut parts, &bootstrap.app_state)
            .await
            .unwrap_err();
        assert_matches!(error, Error::Forbidden(ForbiddenType::NoPermission));
    }

    #[tokio::test]
    async fn test_update_role_requires_existing_user() {
        let bootstrap = bootstrap().await;
        let admin = bootstrap.admin("boss@test.com").await;

        let error = super::update_role(
            bootstrap.user_collection(),
            admin,
            crate::util::PathObjectId(bson::oid::ObjectId::new()),
            Json(super::UpdateRoleRequest {
                role: UserRole::Rider,
            }),
        )
        .await
        .unwrap_err();
        assert_matches!(error, Error::NoResource);
    }

    #[tokio::test]
    async fn test_update_role() {
        let bootstrap = bootstrap().await;
        let admin = bootstrap.admin("boss@test.com").await;
        let user = bootstrap.create_user("plain@test.com", UserRole::User).await;

        let Json(response) = super::update_role(
            bootstrap.user_collection(),
            admin,
            crate::util::PathObjectId(user.id),
            Json(super::UpdateRoleRequest {
                role: UserRole::Rider,
            }),
        )
        .await
        .unwrap();
        assert_eq!(response.modified_count, 1);

        let updated = bootstrap
            .app_state
            .user_collection
            .find_one_by_id(user.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.role, UserRole::Rider);
    }

    #[tokio::test]
    async fn test_search_requires_email_parameter() {
        let bootstrap = bootstrap().await;

        let error = super::search(
            bootstrap.user_collection(),
            bootstrap.identity("whoever@test.com"),
            axum::extract::Query(super::SearchQuery { email: None }),
        )
        .await
        .unwrap_err();
        assert_matches!(error, Error::MissingField("email"));
    }

    #[tokio::test]
    async fn test_search_matches_partial_case_insensitive() {
        let bootstrap = bootstrap().await;
        bootstrap.create_user("Alice@Test.com", UserRole::User).await;
        bootstrap.create_user("bob@other.org", UserRole::User).await;

        let Json(response) = super::search(
            bootstrap.user_collection(),
            bootstrap.identity("whoever@test.com"),
            axum::extract::Query(super::SearchQuery {
                email: Some("alice".to_string()),
            }),
        )
        .await
        .unwrap();

        assert_eq!(response.users.len(), 1);
        assert_eq!(response.users[0].email, "Alice@Test.com");
    }
}
