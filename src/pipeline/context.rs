//! # Application Context
//!
//! External collaborators that operators may need, injected at engine
//! construction. Each operator factory checks for the collaborators its type
//! requires while the plan is compiled; a missing one is a plan-build error.
//!
//! | Collaborator | Used by |
//! |---|---|
//! | [`DataSourceCache`] | `DataFetcher` |
//! | [`EventStore`] | `EventFetcher`, `EventTrigger` |
//! | [`SqlEngine`] | `SqlExecution` |
//! | [`DetectorRegistry`] | `AnomalyDetector` |
//! | [`PostProcessorRegistry`] | `PostProcessor` |

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::components::{DetectorRegistry, PostProcessorRegistry};
use super::data_table::DataTable;
use super::errors::BoxError;
use super::plan::DetectionInterval;

/// What a data fetcher asks a data source for
#[derive(Debug, Clone, PartialEq)]
pub struct DataFetchRequest {
    /// `component.*` params of the fetcher node, prefix stripped
    pub spec: Map<String, Value>,
    pub interval: Option<DetectionInterval>,
}

#[async_trait]
pub trait DataSource: Send + Sync {
    async fn fetch(&self, request: &DataFetchRequest) -> Result<DataTable, BoxError>;
}

pub trait DataSourceCache: Send + Sync {
    fn get_data_source(&self, name: &str) -> Option<Arc<dyn DataSource>>;
}

/// A persisted platform event (holiday, deployment, incident, ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub name: String,
    pub event_type: String,
    pub start_time: i64,
    pub end_time: i64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventQuery {
    /// Empty means every type
    pub event_types: Vec<String>,
    pub start: i64,
    pub end: i64,
}

impl EventQuery {
    pub fn matches(&self, event: &Event) -> bool {
        let type_matches =
            self.event_types.is_empty() || self.event_types.contains(&event.event_type);
        type_matches && event.start_time < self.end && event.end_time > self.start
    }
}

#[async_trait]
pub trait EventStore: Send + Sync {
    async fn fetch_events(&self, query: &EventQuery) -> Result<Vec<Event>, BoxError>;
    async fn save_events(&self, events: Vec<Event>) -> Result<(), BoxError>;
}

/// Executes SQL over tables bound by name
#[async_trait]
pub trait SqlEngine: Send + Sync {
    async fn execute(
        &self,
        sql: &str,
        tables: &BTreeMap<String, DataTable>,
    ) -> Result<DataTable, BoxError>;
}

pub struct ApplicationContext {
    pub data_source_cache: Option<Arc<dyn DataSourceCache>>,
    pub event_store: Option<Arc<dyn EventStore>>,
    pub sql_engine: Option<Arc<dyn SqlEngine>>,
    pub detector_registry: Arc<DetectorRegistry>,
    pub post_processor_registry: Arc<PostProcessorRegistry>,
}

impl ApplicationContext {
    /// Context with the builtin detectors and post-processors and no external collaborators
    pub fn new() -> Self {
        Self {
            data_source_cache: None,
            event_store: None,
            sql_engine: None,
            detector_registry: Arc::new(DetectorRegistry::with_builtin_detectors()),
            post_processor_registry: Arc::new(PostProcessorRegistry::with_builtin_post_processors()),
        }
    }

    pub fn with_data_source_cache(mut self, cache: Arc<dyn DataSourceCache>) -> Self {
        self.data_source_cache = Some(cache);
        self
    }

    pub fn with_event_store(mut self, store: Arc<dyn EventStore>) -> Self {
        self.event_store = Some(store);
        self
    }

    pub fn with_sql_engine(mut self, engine: Arc<dyn SqlEngine>) -> Self {
        self.sql_engine = Some(engine);
        self
    }

    pub fn with_detector_registry(mut self, registry: DetectorRegistry) -> Self {
        self.detector_registry = Arc::new(registry);
        self
    }

    pub fn with_post_processor_registry(mut self, registry: PostProcessorRegistry) -> Self {
        self.post_processor_registry = Arc::new(registry);
        self
    }
}

impl Default for ApplicationContext {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ApplicationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApplicationContext")
            .field("data_source_cache", &self.data_source_cache.is_some())
            .field("event_store", &self.event_store.is_some())
            .field("sql_engine", &self.sql_engine.is_some())
            .field("detectors", &self.detector_registry.detector_types())
            .field("post_processors", &self.post_processor_registry.post_processor_types())
            .finish()
    }
}
