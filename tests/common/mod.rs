//! In-memory collaborators shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ckg_bridge::adapters::database::{
    ChangeEvent, ChangeFeed, ChangeFeedSource, ChangeOperation, FeedError, ResumePoint,
    StorageBackend,
};
use ckg_bridge::adapters::pubsub::{MessageBus, OutgoingMessage, ReceivedMessage};
use ckg_bridge::config::{AckPolicy, DatabaseTarget};
use ckg_bridge::core::receiver::ReceiverSettings;
use ckg_bridge::core::transmitter::TransmitterSettings;
use ckg_bridge::domain::record::format_timestamp;
use ckg_bridge::domain::{
    BridgeError, Filter, FindOptions, MessageBusError, Record, Result, StorageError,
};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const INBOX: &str = "ckg_pubsub_incoming";
pub const OUTBOX: &str = "ckg_pubsub_outgoing";
pub const SCREENING: &str = "skrining_tb";
pub const PATIENT_STATUS: &str = "pasien_tb";
pub const MARKER_FIELD: &str = "transactionSource";
pub const MARKER_CONSUME: &str = "STATUS-PASIEN-TB";
pub const MARKER_PRODUCE: &str = "SKRINING-CKG-TB";

pub fn record(value: Value) -> Record {
    value.as_object().cloned().unwrap_or_default()
}

/// Storage backend over a map of tables, evaluated with the shared filter grammar
#[derive(Default)]
pub struct MemoryStorage {
    tables: Mutex<HashMap<String, Vec<Record>>>,
    failing_inserts: Mutex<HashSet<String>>,
    inserts: Mutex<HashMap<String, usize>>,
    updates: Mutex<HashMap<String, usize>>,
    unreachable: AtomicBool,
    next_id: AtomicU64,
    feed: Option<Arc<FakeFeedSource>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_feed(feed: Arc<FakeFeedSource>) -> Self {
        Self {
            feed: Some(feed),
            ..Self::default()
        }
    }

    pub fn seed(&self, table: &str, rows: Vec<Record>) {
        self.tables
            .lock()
            .unwrap()
            .entry(table.to_string())
            .or_default()
            .extend(rows);
    }

    pub fn rows(&self, table: &str) -> Vec<Record> {
        self.tables
            .lock()
            .unwrap()
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    pub fn inserts(&self, table: &str) -> usize {
        self.inserts.lock().unwrap().get(table).copied().unwrap_or(0)
    }

    pub fn updates(&self, table: &str) -> usize {
        self.updates.lock().unwrap().get(table).copied().unwrap_or(0)
    }

    pub fn fail_inserts_on(&self, table: &str) {
        self.failing_inserts.lock().unwrap().insert(table.to_string());
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    fn matching(&self, table: &str, filter: &Filter, options: &FindOptions) -> Vec<Record> {
        let mut rows: Vec<Record> = self
            .rows(table)
            .into_iter()
            .filter(|row| filter.matches(row))
            .collect();
        if !options.sort.is_empty() {
            rows.sort_by(|a, b| options.sort.compare(a, b));
        }
        if !options.columns.is_empty() {
            for row in rows.iter_mut() {
                row.retain(|key, _| options.columns.iter().any(|c| c == key));
            }
        }
        rows
    }

    fn check_reachable(&self) -> Result<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            Err(BridgeError::Connection("memory storage unreachable".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    fn kind(&self) -> DatabaseTarget {
        DatabaseTarget::MongoDB
    }

    async fn connect(&self) -> Result<()> {
        self.check_reachable()
    }

    async fn ping(&self) -> Result<()> {
        self.check_reachable()
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }

    async fn find(&self, table: &str, filter: &Filter, options: &FindOptions) -> Result<Vec<Record>> {
        self.check_reachable()?;
        let rows = self.matching(table, filter, options);
        let skip = options.skip as usize;
        let take = if options.limit == 0 {
            usize::MAX
        } else {
            options.limit as usize
        };
        Ok(rows.into_iter().skip(skip).take(take).collect())
    }

    async fn find_one(&self, table: &str, filter: &Filter, options: &FindOptions) -> Result<Record> {
        self.check_reachable()?;
        self.matching(table, filter, options)
            .into_iter()
            .next()
            .ok_or_else(|| BridgeError::NotFound(format!("no match in {table}")))
    }

    async fn insert_one(&self, table: &str, record: Record) -> Result<String> {
        self.check_reachable()?;
        if self.failing_inserts.lock().unwrap().contains(table) {
            return Err(StorageError::query(table, "insert_one", "injected failure").into());
        }
        let id = match record.get("id") {
            Some(Value::String(id)) => id.clone(),
            _ => format!("row-{}", self.next_id.fetch_add(1, Ordering::SeqCst)),
        };
        self.tables
            .lock()
            .unwrap()
            .entry(table.to_string())
            .or_default()
            .push(record);
        *self.inserts.lock().unwrap().entry(table.to_string()).or_default() += 1;
        Ok(id)
    }

    async fn update_one(&self, table: &str, filter: &Filter, fields: Record) -> Result<u64> {
        self.check_reachable()?;
        let mut tables = self.tables.lock().unwrap();
        let Some(row) = tables
            .get_mut(table)
            .and_then(|rows| rows.iter_mut().find(|row| filter.matches(row)))
        else {
            return Ok(0);
        };
        row.extend(fields);
        *self.updates.lock().unwrap().entry(table.to_string()).or_default() += 1;
        Ok(1)
    }

    async fn delete_one(&self, table: &str, filter: &Filter) -> Result<u64> {
        self.check_reachable()?;
        let mut tables = self.tables.lock().unwrap();
        let Some(rows) = tables.get_mut(table) else {
            return Ok(0);
        };
        match rows.iter().position(|row| filter.matches(row)) {
            Some(index) => {
                rows.remove(index);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn delete_many(&self, table: &str, filter: &Filter) -> Result<u64> {
        self.check_reachable()?;
        let mut tables = self.tables.lock().unwrap();
        let Some(rows) = tables.get_mut(table) else {
            return Ok(0);
        };
        let before = rows.len();
        rows.retain(|row| !filter.matches(row));
        Ok((before - rows.len()) as u64)
    }

    fn change_feed_source(&self) -> Option<Arc<dyn ChangeFeedSource>> {
        self.feed
            .clone()
            .map(|feed| feed as Arc<dyn ChangeFeedSource>)
    }
}

/// Message bus with scripted pulls and recorded publishes and acknowledgements
pub struct FakeBus {
    pulls: Mutex<VecDeque<Result<Vec<ReceivedMessage>>>>,
    published: Mutex<Vec<OutgoingMessage>>,
    acked: Mutex<Vec<String>>,
    pull_calls: AtomicU64,
    next_message_id: AtomicU64,
    fail_publish: AtomicBool,
    topic_exists: AtomicBool,
}

impl Default for FakeBus {
    fn default() -> Self {
        Self {
            pulls: Mutex::new(VecDeque::new()),
            published: Mutex::new(Vec::new()),
            acked: Mutex::new(Vec::new()),
            pull_calls: AtomicU64::new(0),
            next_message_id: AtomicU64::new(1),
            fail_publish: AtomicBool::new(false),
            topic_exists: AtomicBool::new(true),
        }
    }
}

impl FakeBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_pull(&self, messages: Vec<ReceivedMessage>) {
        self.pulls.lock().unwrap().push_back(Ok(messages));
    }

    pub fn queue_pull_error(&self) {
        self.pulls
            .lock()
            .unwrap()
            .push_back(Err(MessageBusError::PullFailed("injected".to_string()).into()));
    }

    pub fn published(&self) -> Vec<OutgoingMessage> {
        self.published.lock().unwrap().clone()
    }

    /// Data arrays of every published envelope, in publish order
    pub fn published_items(&self) -> Vec<Vec<Value>> {
        self.published()
            .iter()
            .map(|message| {
                let envelope: Value = serde_json::from_slice(&message.data).unwrap();
                envelope["data"].as_array().cloned().unwrap_or_default()
            })
            .collect()
    }

    pub fn acked(&self) -> Vec<String> {
        self.acked.lock().unwrap().clone()
    }

    pub fn pull_calls(&self) -> u64 {
        self.pull_calls.load(Ordering::SeqCst)
    }

    pub fn set_fail_publish(&self, fail: bool) {
        self.fail_publish.store(fail, Ordering::SeqCst);
    }

    pub fn set_topic_exists(&self, exists: bool) {
        self.topic_exists.store(exists, Ordering::SeqCst);
    }
}

#[async_trait]
impl MessageBus for FakeBus {
    fn topic(&self) -> &str {
        "projects/test/topics/CKG-SITB"
    }

    fn subscription(&self) -> &str {
        "projects/test/subscriptions/CKG-SITB-sub"
    }

    async fn topic_exists(&self) -> Result<bool> {
        Ok(self.topic_exists.load(Ordering::SeqCst))
    }

    async fn subscription_exists(&self) -> Result<bool> {
        Ok(true)
    }

    async fn publish(&self, message: OutgoingMessage) -> Result<String> {
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(MessageBusError::PublishFailed("injected".to_string()).into());
        }
        let id = self.next_message_id.fetch_add(1, Ordering::SeqCst);
        self.published.lock().unwrap().push(message);
        Ok(format!("msg-{id}"))
    }

    async fn pull(&self, _max_messages: u32) -> Result<Vec<ReceivedMessage>> {
        self.pull_calls.fetch_add(1, Ordering::SeqCst);
        self.pulls
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn acknowledge(&self, ack_ids: &[String]) -> Result<()> {
        self.acked.lock().unwrap().extend_from_slice(ack_ids);
        Ok(())
    }
}

/// One scripted step of a fake change feed
pub type FeedStep = std::result::Result<Option<ChangeEvent>, FeedError>;

/// Change feed source whose feeds replay scripted steps
///
/// Each `open_feed` consumes the next script; once the scripts run out, feeds
/// stay idle. Pings answer from a queue and succeed when it is empty, unless
/// `ping_always_fails` is set.
#[derive(Default)]
pub struct FakeFeedSource {
    scripts: Mutex<VecDeque<Vec<FeedStep>>>,
    failing_opens: Mutex<VecDeque<FeedError>>,
    pings: Mutex<VecDeque<std::result::Result<(), FeedError>>>,
    ping_always_fails: AtomicBool,
    resumes: Mutex<Vec<Option<ResumePoint>>>,
    opened: AtomicU64,
    closed: Arc<AtomicU64>,
    ping_calls: AtomicU64,
}

impl FakeFeedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, steps: Vec<FeedStep>) {
        self.scripts.lock().unwrap().push_back(steps);
    }

    pub fn fail_next_open(&self, error: FeedError) {
        self.failing_opens.lock().unwrap().push_back(error);
    }

    pub fn queue_ping(&self, result: std::result::Result<(), FeedError>) {
        self.pings.lock().unwrap().push_back(result);
    }

    pub fn set_ping_always_fails(&self, fails: bool) {
        self.ping_always_fails.store(fails, Ordering::SeqCst);
    }

    /// Resume argument of every successful open, in order
    pub fn resumes(&self) -> Vec<Option<ResumePoint>> {
        self.resumes.lock().unwrap().clone()
    }

    pub fn opened(&self) -> u64 {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> u64 {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn ping_calls(&self) -> u64 {
        self.ping_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChangeFeedSource for FakeFeedSource {
    async fn open_feed(
        &self,
        _table: &str,
        resume: Option<ResumePoint>,
    ) -> std::result::Result<Box<dyn ChangeFeed>, FeedError> {
        if let Some(error) = self.failing_opens.lock().unwrap().pop_front() {
            return Err(error);
        }
        let steps = self.scripts.lock().unwrap().pop_front().unwrap_or_default();
        let position = match &resume {
            Some(ResumePoint(Value::Number(n))) => n.as_u64().unwrap_or(0),
            _ => 0,
        };
        self.resumes.lock().unwrap().push(resume);
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeFeed {
            steps: steps.into(),
            position,
            closed: self.closed.clone(),
        }))
    }

    async fn ping(&self) -> std::result::Result<(), FeedError> {
        self.ping_calls.fetch_add(1, Ordering::SeqCst);
        if self.ping_always_fails.load(Ordering::SeqCst) {
            return Err(FeedError::Disconnected("still down".to_string()));
        }
        self.pings.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }
}

pub struct FakeFeed {
    steps: VecDeque<FeedStep>,
    position: u64,
    closed: Arc<AtomicU64>,
}

#[async_trait]
impl ChangeFeed for FakeFeed {
    async fn next_event(&mut self) -> std::result::Result<Option<ChangeEvent>, FeedError> {
        match self.steps.pop_front() {
            Some(Ok(Some(event))) => {
                self.position += 1;
                Ok(Some(event))
            }
            Some(other) => other,
            None => {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Ok(None)
            }
        }
    }

    fn resume_token(&self) -> Option<ResumePoint> {
        (self.position > 0).then(|| ResumePoint(json!(self.position)))
    }

    async fn close(self: Box<Self>) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn change(operation: ChangeOperation, document: Option<Record>) -> ChangeEvent {
    let key = document
        .as_ref()
        .and_then(|d| d.get("pasien_id").cloned())
        .unwrap_or(Value::Null);
    ChangeEvent {
        operation,
        document_key: json!({ "_id": key }),
        full_document: document,
    }
}

pub fn received(id: &str, payload: &Value) -> ReceivedMessage {
    ReceivedMessage {
        ack_id: format!("ack-{id}"),
        message_id: id.to_string(),
        data: serde_json::to_vec(payload).unwrap(),
        attributes: BTreeMap::new(),
        publish_time: None,
    }
}

pub fn status_envelope(items: Vec<Value>) -> Value {
    json!({ MARKER_FIELD: MARKER_CONSUME, "data": items })
}

pub fn status_item(terduga_id: &str, nik: &str) -> Value {
    json!({ "terduga_id": terduga_id, "pasien_nik": nik })
}

/// Screening row stamped `updated_at = at`; presumptive rows report a cough
pub fn screening_row(patient_id: &str, at: DateTime<Utc>, presumptive: bool) -> Record {
    record(json!({
        "pasien_id": patient_id,
        "nik": format!("NIK-{patient_id}"),
        "pasien_name": "Pasien",
        "usia": 34,
        "gejala_dan_tanda_batuk": if presumptive { "Ya" } else { "Tidak" },
        "updated_at": format_timestamp(&at),
    }))
}

pub fn receiver_settings(ack_policy: AckPolicy) -> ReceiverSettings {
    ReceiverSettings {
        max_messages: 10,
        sleep_time: Duration::from_millis(10),
        ack_policy,
        max_in_flight_batches: 2,
        drain_on_shutdown: true,
        shutdown_timeout: Duration::from_secs(5),
        marker_field: MARKER_FIELD.to_string(),
        marker_consume: MARKER_CONSUME.to_string(),
    }
}

pub fn transmitter_settings() -> TransmitterSettings {
    TransmitterSettings {
        source_table: SCREENING.to_string(),
        timestamp_field: "updated_at".to_string(),
        batch_size: 10,
        fetch_limit: 1000,
        lookback: chrono::Duration::hours(48),
        poll_interval: Duration::from_millis(20),
        pause_every_chunks: 10,
        pause: Duration::from_millis(1),
        environment: "staging".to_string(),
        attributes: BTreeMap::new(),
        ordering_key: None,
        marker_field: MARKER_FIELD.to_string(),
        marker_produce: MARKER_PRODUCE.to_string(),
        watch_retry_delay: Duration::from_millis(10),
    }
}
