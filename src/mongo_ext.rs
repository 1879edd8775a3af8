use std::ops::{Deref, DerefMut};

use bson::oid::ObjectId;
use serde::de::DeserializeOwned;

use crate::error::Error;

pub struct Collection<T>(pub mongodb::Collection<T>);

impl<T> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> Deref for Collection<T> {
    type Target = mongodb::Collection<T>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T> DerefMut for Collection<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl<T> From<mongodb::Collection<T>> for Collection<T> {
    fn from(value: mongodb::Collection<T>) -> Self {
        Self(value)
    }
}

impl<T> Collection<T> {
    /// Inserts a caller-shaped document as-is, bypassing the typed model.
    /// Collections holding schemaless records (parcels, riders) store the
    /// request body verbatim plus a generated `_id`.
    pub async fn insert_document(
        &self,
        document: bson::Document,
    ) -> Result<mongodb::results::InsertOneResult, Error> {
        self.0
            .clone_with_type::<bson::Document>()
            .insert_one(document, None)
            .await
            .map_err(Into::into)
    }
}

impl<T> Collection<T>
where
    T: DeserializeOwned + Send + Sync + Unpin,
{
    pub async fn find_one_by_id(&self, id: ObjectId) -> Result<Option<T>, Error> {
        self.find_one(
            bson::doc! {
                "_id": id
            },
            None,
        )
        .await
        .map_err(Into::into)
    }

    pub async fn update_one_by_id(
        &self,
        id: ObjectId,
        update: impl Into<mongodb::options::UpdateModifications>,
    ) -> Result<mongodb::results::UpdateResult, Error> {
        self.update_one(
            bson::doc! {
                "_id": id
            },
            update,
            None,
        )
        .await
        .map_err(Into::into)
    }

    pub async fn delete_one_by_id(
        &self,
        id: ObjectId,
    ) -> Result<mongodb::results::DeleteResult, Error> {
        self.delete_one(
            bson::doc! {
                "_id": id
            },
            None,
        )
        .await
        .map_err(Into::into)
    }

    /// Runs a find and drains the cursor into a vec.
    pub async fn collect(
        &self,
        filter: impl Into<Option<bson::Document>>,
        options: impl Into<Option<mongodb::options::FindOptions>>,
    ) -> Result<Vec<T>, Error> {
        let mut cursor = self.find(filter, options).await?;

        let mut items = vec![];

        while cursor.advance().await? {
            items.push(cursor.deserialize_current()?);
        }

        Ok(items)
    }
}
