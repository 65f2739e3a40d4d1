use async_trait::async_trait;
use futures::stream::TryStreamExt;
use mongodb::{
    bson::doc,
    error::{ErrorKind, WriteFailure},
    options::{FindOptions, IndexOptions, ReplaceOptions},
    Client, Collection, IndexModel,
};

use super::{IdentityStore, StoreError};
use crate::misc::IdentityRecord;

const COLLECTION: &str = "users";
const DUPLICATE_KEY: i32 = 11000;

pub struct MongoStore {
    collection: Collection<IdentityRecord>,
}

impl MongoStore {
    /// Connects and makes sure `actor_id` is uniquely indexed.
    pub async fn connect(uri: &str, database: &str) -> Result<Self, StoreError> {
        let client = Client::with_uri_str(uri).await?;
        let collection: Collection<IdentityRecord> =
            client.database(database).collection(COLLECTION);
        let index = IndexModel::builder()
            .keys(doc! {"actor_id": 1})
            .options(IndexOptions::builder().unique(true).build())
            .build();
        collection.create_index(index, None).await?;
        let by_code = IndexModel::builder()
            .keys(doc! {"role": 1, "link_code": 1})
            .build();
        collection.create_index(by_code, None).await?;
        log::info!("Connected to MongoDB database `{database}`");
        Ok(MongoStore { collection })
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(e)) if e.code == DUPLICATE_KEY
    )
}

#[async_trait]
impl IdentityStore for MongoStore {
    async fn find(&self, actor_id: i64) -> Result<Option<IdentityRecord>, StoreError> {
        Ok(self
            .collection
            .find_one(doc! {"actor_id": actor_id}, None)
            .await?)
    }

    async fn register(&self, record: &IdentityRecord) -> Result<bool, StoreError> {
        // Only an absent or role-less document matches; anything else makes the
        // upsert collide with the unique index.
        let filter = doc! {"actor_id": record.actor_id, "role": "unset"};
        let options = ReplaceOptions::builder().upsert(true).build();
        match self.collection.replace_one(filter, record, options).await {
            Ok(_) => Ok(true),
            Err(e) if is_duplicate_key(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn find_tutor_by_code(&self, code: &str) -> Result<Option<IdentityRecord>, StoreError> {
        Ok(self
            .collection
            .find_one(doc! {"role": "tutor", "link_code": code}, None)
            .await?)
    }

    async fn students_of(&self, code: &str) -> Result<Vec<IdentityRecord>, StoreError> {
        let options = FindOptions::builder()
            .sort(doc! {"registered_at": 1, "actor_id": 1})
            .build();
        let mut cursor = self
            .collection
            .find(doc! {"role": "student", "link_code": code}, options)
            .await?;
        let mut students = Vec::new();
        while let Some(student) = cursor.try_next().await? {
            students.push(student);
        }
        Ok(students)
    }
}
