//! MongoDB storage backend

use crate::adapters::database::traits::{ChangeFeedSource, StorageBackend};
use crate::adapters::mongodb::change_stream::MongoFeedSource;
use crate::adapters::mongodb::query::{
    document_to_record, filter_to_document, id_to_string, projection, record_to_document,
    sort_to_document,
};
use crate::config::{DatabaseTarget, MongoDbConfig};
use crate::domain::{BridgeError, Filter, FindOptions, Record, Result, StorageError};
use async_trait::async_trait;
use bson::{doc, Document};
use futures::TryStreamExt;
use mongodb::error::{Error as MongoError, ErrorKind};
use mongodb::options::{ClientOptions, FindOneOptions, FindOptions as MongoFindOptions};
use mongodb::{Client, Collection};
use secrecy::ExposeSecret;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;

/// Connection handle shared by the backend and its change-feed source
pub(crate) struct MongoConnection {
    config: MongoDbConfig,
    client: OnceCell<Client>,
    closed: AtomicBool,
}

impl MongoConnection {
    fn new(config: MongoDbConfig) -> Self {
        Self {
            config,
            client: OnceCell::new(),
            closed: AtomicBool::new(false),
        }
    }

    async fn connect(&self) -> Result<&Client> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BridgeError::Connection("MongoDB backend is closed".to_string()));
        }

        self.client
            .get_or_try_init(|| async {
                let mut options = ClientOptions::parse(self.config.uri.expose_secret().as_str())
                    .await
                    .map_err(|e| {
                        BridgeError::Configuration(format!("Invalid MongoDB URI: {e}"))
                    })?;
                options.app_name = Some("ckg-bridge".to_string());
                options.min_pool_size = Some(self.config.min_pool_size);
                options.retry_writes = Some(true);
                options.retry_reads = Some(true);
                options.connect_timeout =
                    Some(Duration::from_secs(self.config.connect_timeout_seconds));
                options.server_selection_timeout =
                    Some(Duration::from_secs(self.config.connect_timeout_seconds));

                let client = Client::with_options(options).map_err(|e| {
                    BridgeError::Connection(format!("Failed to create MongoDB client: {e}"))
                })?;
                tracing::info!(database = %self.config.database, "MongoDB client created");
                Ok(client)
            })
            .await
    }

    /// The live client; fails when not connected or already closed
    pub(crate) fn client(&self) -> Result<&Client> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BridgeError::Connection("MongoDB backend is closed".to_string()));
        }
        self.client.get().ok_or_else(|| {
            BridgeError::Connection("MongoDB backend is not connected".to_string())
        })
    }

    pub(crate) fn collection(&self, table: &str) -> Result<Collection<Document>> {
        Ok(self
            .client()?
            .database(&self.config.database)
            .collection::<Document>(table))
    }

    pub(crate) async fn ping(&self) -> Result<()> {
        self.client()?
            .database(&self.config.database)
            .run_command(doc! {"ping": 1}, None)
            .await
            .map_err(|e| BridgeError::Connection(format!("MongoDB ping failed: {e}")))?;
        Ok(())
    }
}

/// True when the driver lost its connection rather than rejecting the request
pub(crate) fn is_disconnect(err: &MongoError) -> bool {
    matches!(
        *err.kind,
        ErrorKind::Io(_)
            | ErrorKind::ServerSelection { .. }
            | ErrorKind::ConnectionPoolCleared { .. }
            | ErrorKind::Shutdown
    )
}

fn driver_error(table: &str, operation: &str, err: MongoError) -> BridgeError {
    if is_disconnect(&err) {
        BridgeError::Connection(format!("{operation} on '{table}': {err}"))
    } else {
        StorageError::query(table, operation, err).into()
    }
}

/// Document-store variant of [`StorageBackend`]
pub struct MongoBackend {
    connection: Arc<MongoConnection>,
}

impl MongoBackend {
    pub fn new(config: MongoDbConfig) -> Self {
        Self {
            connection: Arc::new(MongoConnection::new(config)),
        }
    }
}

#[async_trait]
impl StorageBackend for MongoBackend {
    fn kind(&self) -> DatabaseTarget {
        DatabaseTarget::MongoDB
    }

    async fn connect(&self) -> Result<()> {
        self.connection.connect().await?;
        self.connection.ping().await?;
        tracing::info!("Successfully connected to MongoDB");
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        self.connection.ping().await
    }

    async fn close(&self) -> Result<()> {
        if self.connection.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        if let Some(client) = self.connection.client.get() {
            client.clone().shutdown_immediate().await;
            tracing::info!("Disconnected from MongoDB");
        }
        Ok(())
    }

    async fn find(
        &self,
        table: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> Result<Vec<Record>> {
        let collection = self.connection.collection(table)?;
        let query = filter_to_document(filter)?;

        let mut find_options = MongoFindOptions::default();
        find_options.projection = projection(&options.columns);
        find_options.sort = sort_to_document(&options.sort);
        if options.limit > 0 {
            find_options.limit = Some(options.limit as i64);
        }
        if options.skip > 0 {
            find_options.skip = Some(options.skip);
        }

        let cursor = collection
            .find(query, find_options)
            .await
            .map_err(|e| driver_error(table, "find", e))?;
        let documents: Vec<Document> = cursor
            .try_collect()
            .await
            .map_err(|e| driver_error(table, "find", e))?;

        Ok(documents.into_iter().map(document_to_record).collect())
    }

    async fn find_one(
        &self,
        table: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> Result<Record> {
        let collection = self.connection.collection(table)?;
        let query = filter_to_document(filter)?;

        let mut find_options = FindOneOptions::default();
        find_options.projection = projection(&options.columns);
        find_options.sort = sort_to_document(&options.sort);

        collection
            .find_one(query, find_options)
            .await
            .map_err(|e| driver_error(table, "find_one", e))?
            .map(document_to_record)
            .ok_or_else(|| BridgeError::NotFound(format!("no record in '{table}' matches filter")))
    }

    async fn insert_one(&self, table: &str, record: Record) -> Result<String> {
        let collection = self.connection.collection(table)?;
        let document = record_to_document(&record)?;
        let result = collection
            .insert_one(document, None)
            .await
            .map_err(|e| driver_error(table, "insert_one", e))?;
        Ok(id_to_string(result.inserted_id))
    }

    async fn update_one(&self, table: &str, filter: &Filter, fields: Record) -> Result<u64> {
        let collection = self.connection.collection(table)?;
        let query = filter_to_document(filter)?;
        let update = doc! {"$set": record_to_document(&fields)?};
        let result = collection
            .update_one(query, update, None)
            .await
            .map_err(|e| driver_error(table, "update_one", e))?;
        Ok(result.matched_count)
    }

    async fn delete_one(&self, table: &str, filter: &Filter) -> Result<u64> {
        let collection = self.connection.collection(table)?;
        let query = filter_to_document(filter)?;
        let result = collection
            .delete_one(query, None)
            .await
            .map_err(|e| driver_error(table, "delete_one", e))?;
        Ok(result.deleted_count)
    }

    async fn delete_many(&self, table: &str, filter: &Filter) -> Result<u64> {
        let collection = self.connection.collection(table)?;
        let query = filter_to_document(filter)?;
        let result = collection
            .delete_many(query, None)
            .await
            .map_err(|e| driver_error(table, "delete_many", e))?;
        Ok(result.deleted_count)
    }

    fn change_feed_source(&self) -> Option<Arc<dyn ChangeFeedSource>> {
        Some(Arc::new(MongoFeedSource::new(self.connection.clone())))
    }
}
