use axum::{
    extract::{FromRef, FromRequestParts},
    headers::{authorization::Bearer, Authorization},
    http::request::Parts,
    RequestPartsExt, TypedHeader,
};
use base64::{engine::general_purpose, Engine as _};
use jsonwebtoken::TokenData;
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::error::{Error, ForbiddenType};

/// Verifies bearer credentials issued by the identity provider. The decoding
/// key is the provider's public key; the encoding key mirrors the
/// service-account credential and is what token minting (and the tests) use.
#[derive(Clone)]
pub struct IdentityVerifier {
    validation: jsonwebtoken::Validation,
    header: jsonwebtoken::Header,

    encoding_key: jsonwebtoken::EncodingKey,
    decoding_key: jsonwebtoken::DecodingKey,
}

impl IdentityVerifier {
    pub fn new_from_env() -> Self {
        let secret_key = std::env::var("IDENTITY_SECRET_KEY")
            .expect("Cannot retreive IDENTITY_SECRET_KEY from environment variable.");
        let secret_key = general_purpose::STANDARD.decode(secret_key).unwrap();
        let encoding_key = jsonwebtoken::EncodingKey::from_rsa_pem(&secret_key).unwrap();

        let public_key = std::env::var("IDENTITY_PUBLIC_KEY")
            .expect("Cannot retreive IDENTITY_PUBLIC_KEY from environment variable.");
        let public_key = general_purpose::STANDARD.decode(public_key).unwrap();
        let decoding_key = jsonwebtoken::DecodingKey::from_rsa_pem(&public_key).unwrap();

        let header = jsonwebtoken::Header::new(jsonwebtoken::Algorithm::RS256);
        let mut validation = jsonwebtoken::Validation::new(jsonwebtoken::Algorithm::RS256);
        // expiry is checked manually so an expired token maps to Forbidden
        validation.validate_exp = false;

        Self {
            header,
            validation,

            encoding_key,
            decoding_key,
        }
    }
}

pub fn current_timestamp() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct IdentityClaims {
    pub sub: String,
    pub email: String,
    pub exp: i64,
}

impl IdentityClaims {
    pub fn is_expired(&self) -> bool {
        self.exp < current_timestamp().unix_timestamp()
    }
}

pub fn mint_identity_token(
    verifier: &IdentityVerifier,
    uid: &str,
    email: &str,
) -> Result<String, Error> {
    let expired_at = current_timestamp() + Duration::hours(1);

    mint_identity_token_with_exp(verifier, uid, email, expired_at.unix_timestamp())
}

pub fn mint_identity_token_with_exp(
    verifier: &IdentityVerifier,
    uid: &str,
    email: &str,
    exp: i64,
) -> Result<String, Error> {
    let claims = IdentityClaims {
        sub: uid.to_string(),
        email: email.to_string(),
        exp,
    };

    jsonwebtoken::encode(&verifier.header, &claims, &verifier.encoding_key).map_err(Into::into)
}

pub fn decode_identity_token(
    verifier: &IdentityVerifier,
    token: &str,
) -> Result<TokenData<IdentityClaims>, Error> {
    jsonwebtoken::decode(token, &verifier.decoding_key, &verifier.validation).map_err(Into::into)
}

/// The verified identity attached to a request once its bearer credential
/// checks out. Role gates build on top of this.
#[derive(Debug, Clone)]
pub struct VerifiedIdentity {
    pub uid: String,
    pub email: String,
}

impl VerifiedIdentity {
    pub fn from_token(verifier: &IdentityVerifier, token: &str) -> Result<Self, Error> {
        let token = decode_identity_token(verifier, token)?;

        if token.claims.is_expired() {
            return Err(Error::Forbidden(ForbiddenType::InvalidCredential));
        }

        Ok(Self {
            uid: token.claims.sub,
            email: token.claims.email,
        })
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for VerifiedIdentity
where
    IdentityVerifier: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(token)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|_| Error::MissingCredential)?;

        let verifier = IdentityVerifier::from_ref(state);

        Self::from_token(&verifier, token.token())
    }
}
