//! In-process collaborator implementations for tests and embedded use.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};

use super::context::{DataFetchRequest, DataSource, DataSourceCache, Event, EventQuery, EventStore};
use super::data_table::DataTable;
use super::errors::BoxError;

/// A data source that always returns the same table, filtered to the request
/// interval when `time_column` is set
#[derive(Debug, Clone)]
pub struct StaticDataSource {
    table: DataTable,
    time_column: Option<String>,
}

impl StaticDataSource {
    pub fn new(table: DataTable) -> Self {
        Self {
            table,
            time_column: None,
        }
    }

    pub fn with_time_column(mut self, column: impl Into<String>) -> Self {
        self.time_column = Some(column.into());
        self
    }
}

#[async_trait]
impl DataSource for StaticDataSource {
    async fn fetch(&self, request: &DataFetchRequest) -> Result<DataTable, BoxError> {
        let (Some(column), Some(interval)) = (&self.time_column, request.interval) else {
            return Ok(self.table.clone());
        };
        let index = self
            .table
            .column_index(column)
            .ok_or_else(|| format!("missing time column '{column}'"))?;
        let rows = self
            .table
            .rows
            .iter()
            .filter(|row| {
                row.get(index)
                    .and_then(|v| v.as_i64())
                    .is_some_and(|ts| interval.contains(ts))
            })
            .cloned()
            .collect();
        Ok(DataTable::with_rows(self.table.columns.clone(), rows))
    }
}

#[derive(Default)]
pub struct InMemoryDataSourceCache {
    sources: RwLock<HashMap<String, Arc<dyn DataSource>>>,
}

impl InMemoryDataSourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: &str, source: Arc<dyn DataSource>) {
        self.sources.write().insert(name.to_string(), source);
    }
}

impl DataSourceCache for InMemoryDataSourceCache {
    fn get_data_source(&self, name: &str) -> Option<Arc<dyn DataSource>> {
        self.sources.read().get(name).cloned()
    }
}

#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    events: Mutex<Vec<Event>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn fetch_events(&self, query: &EventQuery) -> Result<Vec<Event>, BoxError> {
        Ok(self
            .events
            .lock()
            .iter()
            .filter(|e| query.matches(e))
            .cloned()
            .collect())
    }

    async fn save_events(&self, events: Vec<Event>) -> Result<(), BoxError> {
        self.events.lock().extend(events);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::plan::DetectionInterval;
    use serde_json::json;

    #[tokio::test]
    async fn test_static_source_filters_to_interval() {
        let table = DataTable::with_rows(
            vec!["ts".into(), "met".into()],
            vec![
                vec![json!(5), json!(1)],
                vec![json!(15), json!(2)],
                vec![json!(25), json!(3)],
            ],
        );
        let source = StaticDataSource::new(table).with_time_column("ts");
        let fetched = source
            .fetch(&DataFetchRequest {
                spec: Default::default(),
                interval: Some(DetectionInterval::new(10, 25)),
            })
            .await
            .unwrap();
        assert_eq!(fetched.row_count(), 1);
        assert_eq!(fetched.i64_value(0, "ts"), Some(15));
    }
}
