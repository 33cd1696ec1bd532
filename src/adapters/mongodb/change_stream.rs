//! MongoDB change streams behind the change-feed traits

use crate::adapters::database::traits::{
    ChangeEvent, ChangeFeed, ChangeFeedSource, ChangeOperation, FeedError, ResumePoint,
};
use crate::adapters::mongodb::backend::{is_disconnect, MongoConnection};
use crate::adapters::mongodb::query::{bson_to_json, document_to_record};
use async_trait::async_trait;
use bson::{Bson, Document};
use mongodb::change_stream::event::{ChangeStreamEvent, OperationType, ResumeToken};
use mongodb::change_stream::ChangeStream;
use mongodb::error::Error as MongoError;
use mongodb::options::{ChangeStreamOptions, FullDocumentType};
use serde_json::Value;
use std::sync::Arc;

fn classify(err: MongoError) -> FeedError {
    if is_disconnect(&err) {
        FeedError::Disconnected(err.to_string())
    } else {
        FeedError::Other(err.to_string())
    }
}

fn token_to_point(token: ResumeToken) -> Option<ResumePoint> {
    bson::to_bson(&token)
        .ok()
        .map(|b| ResumePoint(b.into_relaxed_extjson()))
}

fn point_to_token(point: ResumePoint) -> Option<ResumeToken> {
    let bson = Bson::try_from(point.0).ok()?;
    bson::from_bson(bson).ok()
}

fn operation_name(operation: &OperationType) -> ChangeOperation {
    match operation {
        OperationType::Insert => ChangeOperation::Insert,
        OperationType::Update => ChangeOperation::Update,
        OperationType::Replace => ChangeOperation::Replace,
        OperationType::Delete => ChangeOperation::Other("delete".to_string()),
        OperationType::Drop => ChangeOperation::Other("drop".to_string()),
        OperationType::Rename => ChangeOperation::Other("rename".to_string()),
        OperationType::DropDatabase => ChangeOperation::Other("dropDatabase".to_string()),
        OperationType::Invalidate => ChangeOperation::Other("invalidate".to_string()),
        OperationType::Other(name) => ChangeOperation::from_name(name),
        other => ChangeOperation::Other(format!("{other:?}")),
    }
}

fn to_change_event(event: ChangeStreamEvent<Document>) -> ChangeEvent {
    let operation = operation_name(&event.operation_type);
    let document_key = match event.document_key {
        Some(mut key) => match key.remove("_id") {
            Some(id) => bson_to_json(id),
            None => Value::Object(document_to_record(key)),
        },
        None => Value::Null,
    };
    let full_document = if operation.carries_document() {
        event.full_document.map(document_to_record)
    } else {
        None
    };

    ChangeEvent {
        operation,
        document_key,
        full_document,
    }
}

/// Opens change streams on the shared MongoDB connection
pub struct MongoFeedSource {
    connection: Arc<MongoConnection>,
}

impl MongoFeedSource {
    pub(crate) fn new(connection: Arc<MongoConnection>) -> Self {
        Self { connection }
    }
}

#[async_trait]
impl ChangeFeedSource for MongoFeedSource {
    async fn open_feed(
        &self,
        table: &str,
        resume: Option<ResumePoint>,
    ) -> Result<Box<dyn ChangeFeed>, FeedError> {
        let collection = self
            .connection
            .collection(table)
            .map_err(|e| FeedError::Disconnected(e.to_string()))?;

        let mut options = ChangeStreamOptions::default();
        options.full_document = Some(FullDocumentType::UpdateLookup);
        options.resume_after = match resume {
            Some(point) => {
                let token = point_to_token(point);
                if token.is_none() {
                    tracing::warn!(table, "Stored resume point is unreadable, resuming from now");
                }
                token
            }
            None => None,
        };

        let stream = collection
            .watch(Vec::<Document>::new(), options)
            .await
            .map_err(classify)?;

        tracing::info!(table, "Change stream opened");
        Ok(Box::new(MongoChangeFeed {
            table: table.to_string(),
            stream,
        }))
    }

    async fn ping(&self) -> Result<(), FeedError> {
        self.connection
            .ping()
            .await
            .map_err(|e| FeedError::Disconnected(e.to_string()))
    }
}

/// One open change stream
pub struct MongoChangeFeed {
    table: String,
    stream: ChangeStream<ChangeStreamEvent<Document>>,
}

#[async_trait]
impl ChangeFeed for MongoChangeFeed {
    async fn next_event(&mut self) -> Result<Option<ChangeEvent>, FeedError> {
        match self.stream.next_if_any().await {
            Ok(Some(event)) => Ok(Some(to_change_event(event))),
            Ok(None) => Ok(None),
            Err(e) => Err(classify(e)),
        }
    }

    fn resume_token(&self) -> Option<ResumePoint> {
        self.stream.resume_token().and_then(token_to_point)
    }

    async fn close(self: Box<Self>) {
        // Dropping the stream kills the server-side cursor
        let MongoChangeFeed { table, stream } = *self;
        drop(stream);
        tracing::debug!(table = %table, "Change stream closed");
    }
}
