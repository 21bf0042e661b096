use async_trait::async_trait;
use futures::TryStreamExt;
use bson::{Document, doc};
use mongodb::{
    Client, Collection as MongoCollection, IndexModel,
    error::{Error as MongoError, ErrorKind, WriteFailure},
    options::{ClientOptions, IndexOptions},
};
use tracing::debug;
use docbridge_core::{
    backend::{StoreBackend, StoreBackendBuilder},
    error::{DocumentStoreError, DocumentStoreResult},
    extjson,
};

const DUPLICATE_KEY: i32 = 11000;

#[derive(Debug)]
pub struct MongoDbStore {
    client: Client,
    database: String,
}

impl MongoDbStore {
    pub fn new(client: Client, database: String) -> Self {
        Self { client, database }
    }

    pub fn builder(dsn: &str, database: &str) -> MongoDbStoreBuilder {
        MongoDbStoreBuilder::new(dsn, database)
    }

    fn get_collection(&self, collection_name: &str) -> MongoCollection<Document> {
        self.client
            .database(&self.database)
            .collection(collection_name)
    }
}

/// Returns the server message of a duplicate key failure, if `err` is one.
fn duplicate_key_message(err: &MongoError) -> Option<String> {
    match err.kind.as_ref() {
        ErrorKind::InsertMany(failure) => failure
            .write_errors
            .as_ref()?
            .iter()
            .find(|write| write.code == DUPLICATE_KEY)
            .map(|write| write.message.clone()),
        ErrorKind::Write(WriteFailure::WriteError(write)) if write.code == DUPLICATE_KEY => {
            Some(write.message.clone())
        }
        _ => None,
    }
}

fn backend_error(err: MongoError) -> DocumentStoreError {
    DocumentStoreError::Backend(err.to_string())
}

#[async_trait]
impl StoreBackend for MongoDbStore {
    async fn insert_documents(&self, documents: Vec<Document>, collection: &str) -> DocumentStoreResult<()> {
        if documents.is_empty() {
            return Ok(());
        }

        let count = documents.len();
        self.get_collection(collection)
            .insert_many(documents)
            .await
            .map_err(|e| match duplicate_key_message(&e) {
                Some(message) => DocumentStoreError::DocumentAlreadyExists(message, collection.to_string()),
                None => backend_error(e),
            })?;

        debug!(target: "docbridge::mongodb", collection, count, "Inserted documents");

        Ok(())
    }

    async fn insert_keyed_documents(
        &self,
        documents: Vec<Document>,
        key: &str,
        collection: &str,
    ) -> DocumentStoreResult<()> {
        if key != "_id" {
            // Creating an existing index is a no-op on the server.
            let index = IndexModel::builder()
                .keys(doc! { key: 1 })
                .options(IndexOptions::builder().unique(true).sparse(true).build())
                .build();

            self.get_collection(collection)
                .create_index(index)
                .await
                .map_err(backend_error)?;
        }

        self.insert_documents(documents, collection).await
    }

    async fn replace_document(
        &self,
        filter: Document,
        document: Document,
        collection: &str,
    ) -> DocumentStoreResult<bool> {
        debug!(
            target: "docbridge::mongodb",
            collection,
            filter = %extjson::document_to_text(&filter),
            "Replacing document"
        );

        let result = self.get_collection(collection)
            .replace_one(filter, document)
            .await
            .map_err(backend_error)?;

        Ok(result.matched_count > 0)
    }

    async fn find_documents(&self, filter: Document, collection: &str) -> DocumentStoreResult<Vec<Document>> {
        self.get_collection(collection)
            .find(filter)
            .await
            .map_err(backend_error)?
            .try_collect::<Vec<Document>>()
            .await
            .map_err(backend_error)
    }

    async fn delete_documents(&self, filter: Document, collection: &str) -> DocumentStoreResult<u64> {
        let result = self.get_collection(collection)
            .delete_many(filter)
            .await
            .map_err(backend_error)?;

        debug!(
            target: "docbridge::mongodb",
            collection,
            deleted = result.deleted_count,
            "Deleted documents"
        );

        Ok(result.deleted_count)
    }

    async fn count_documents(&self, filter: Document, collection: &str) -> DocumentStoreResult<u64> {
        self.get_collection(collection)
            .count_documents(filter)
            .await
            .map_err(backend_error)
    }

    async fn drop_collection(&self, name: &str) -> DocumentStoreResult<()> {
        self.get_collection(name)
            .drop()
            .await
            .map_err(backend_error)?;

        Ok(())
    }

    async fn list_collections(&self) -> DocumentStoreResult<Vec<String>> {
        self.client
            .database(&self.database)
            .list_collection_names()
            .await
            .map_err(backend_error)
    }

    async fn shutdown(self) -> DocumentStoreResult<()> {
        self.client.shutdown().await;

        Ok(())
    }
}

pub struct MongoDbStoreBuilder {
    dsn: String,
    database: String,
}

impl MongoDbStoreBuilder {
    pub fn new(dsn: &str, database: &str) -> Self {
        Self {
            dsn: dsn.to_string(),
            database: database.to_string(),
        }
    }
}

#[async_trait]
impl StoreBackendBuilder for MongoDbStoreBuilder {
    type Backend = MongoDbStore;

    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        debug!(target: "docbridge::mongodb", database = %self.database, "Connecting");

        Ok(MongoDbStore::new(
            Client::with_options(
                ClientOptions::parse(&self.dsn)
                    .await
                    .map_err(|e| DocumentStoreError::Initialization(e.to_string()))?,
            )
            .map_err(|e| DocumentStoreError::Initialization(e.to_string()))?,
            self.database,
        ))
    }
}
