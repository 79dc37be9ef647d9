//! In-process task table.
//!
//! Mirrors the Postgres claim discipline: a claimed row stays in the table
//! locked by its transaction (so concurrent claimers skip it and listings
//! still see it) and is only removed when that transaction commits. Rolling
//! back, explicitly or by dropping the [`MemoryTx`], unlocks it again.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::debug;

use crate::error::StoreError;
use crate::models::{ListTasksParams, Task, TaskFilter};
use crate::payload::StoreConfig;
use crate::repository::{TaskRepository, UnitOfWork};

const DEFAULT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
struct Row {
    task_type: String,
    payload: serde_json::Value,
    error: Option<serde_json::Value>,
    created_at: DateTime<Utc>,
    locked_by: Option<u64>,
}

impl Row {
    fn to_task(&self, id: i64) -> Task {
        Task {
            id,
            task_type: self.task_type.clone(),
            payload: self.payload.clone(),
            error: self.error.clone(),
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Default)]
struct Table {
    rows: BTreeMap<i64, Row>,
    next_id: i64,
    next_tx: u64,
}

impl Table {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Clone)]
pub struct MemoryStore {
    table: Arc<Mutex<Table>>,
    changes: broadcast::Sender<()>,
    config: StoreConfig,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}

impl MemoryStore {
    pub fn new(config: StoreConfig) -> Self {
        let (changes, _) = broadcast::channel(DEFAULT_CHANNEL_CAPACITY);
        Self {
            table: Arc::new(Mutex::new(Table::default())),
            changes,
            config,
        }
    }

    /// Signals every time a row becomes claimable: a committed pending insert
    /// or a cleared error.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.changes.subscribe()
    }

    fn lock(&self) -> MutexGuard<'_, Table> {
        lock_table(&self.table)
    }

    fn publish(&self) {
        let _ = self.changes.send(());
    }
}

fn lock_table(table: &Mutex<Table>) -> MutexGuard<'_, Table> {
    table.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Unit of work for [`MemoryStore`].
pub struct MemoryTx {
    id: u64,
    table: Arc<Mutex<Table>>,
    changes: broadcast::Sender<()>,
    claimed: Vec<i64>,
    staged: Vec<(i64, Row)>,
    savepoints: Vec<Savepoint>,
    finished: bool,
}

struct Savepoint {
    name: String,
    claimed: usize,
    staged: usize,
}

impl MemoryTx {
    fn stage(
        &mut self,
        task_type: &str,
        payload: &serde_json::Value,
        error: Option<&serde_json::Value>,
    ) -> i64 {
        let id = lock_table(&self.table).allocate_id();
        self.staged.push((
            id,
            Row {
                task_type: task_type.to_string(),
                payload: payload.clone(),
                error: error.cloned(),
                created_at: Utc::now(),
                locked_by: None,
            },
        ));
        id
    }

    fn unlock(&self, table: &mut Table, ids: impl IntoIterator<Item = i64>) {
        for id in ids {
            if let Some(row) = table.rows.get_mut(&id)
                && row.locked_by == Some(self.id)
            {
                row.locked_by = None;
            }
        }
    }

    fn release(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;

        let claimed = std::mem::take(&mut self.claimed);
        let table = self.table.clone();
        self.unlock(&mut lock_table(&table), claimed);
        self.staged.clear();
        self.savepoints.clear();
    }
}

impl Drop for MemoryTx {
    fn drop(&mut self) {
        self.release();
    }
}

#[async_trait]
impl UnitOfWork for MemoryTx {
    async fn commit(mut self) -> Result<(), StoreError> {
        let mut table = lock_table(&self.table);
        for id in self.claimed.drain(..) {
            table.rows.remove(&id);
        }

        let mut wake = false;
        for (id, row) in self.staged.drain(..) {
            wake |= row.error.is_none();
            table.rows.insert(id, row);
        }
        drop(table);

        self.finished = true;
        if wake {
            let _ = self.changes.send(());
        }
        Ok(())
    }

    async fn rollback(mut self) -> Result<(), StoreError> {
        self.release();
        Ok(())
    }

    async fn savepoint(&mut self, name: &str) -> Result<(), StoreError> {
        self.savepoints.push(Savepoint {
            name: name.to_string(),
            claimed: self.claimed.len(),
            staged: self.staged.len(),
        });
        Ok(())
    }

    async fn rollback_to_savepoint(&mut self, name: &str) -> Result<(), StoreError> {
        let Some(position) = self.savepoints.iter().rposition(|sp| sp.name == name) else {
            return Err(StoreError::not_found("Savepoint", name));
        };
        self.savepoints.truncate(position + 1);

        let (claimed, staged) = {
            let savepoint = &self.savepoints[position];
            (savepoint.claimed, savepoint.staged)
        };
        self.staged.truncate(staged);
        let released = self.claimed.split_off(claimed);
        let table = self.table.clone();
        self.unlock(&mut lock_table(&table), released);
        Ok(())
    }
}

#[async_trait]
impl TaskRepository for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> Result<MemoryTx, StoreError> {
        let id = {
            let mut table = self.lock();
            table.next_tx += 1;
            table.next_tx
        };

        Ok(MemoryTx {
            id,
            table: self.table.clone(),
            changes: self.changes.clone(),
            claimed: Vec::new(),
            staged: Vec::new(),
            savepoints: Vec::new(),
            finished: false,
        })
    }

    async fn enqueue(
        &self,
        task_type: &str,
        payload: &serde_json::Value,
    ) -> Result<i64, StoreError> {
        self.config.validate_payload(payload, "Task payload")?;

        let id = {
            let mut table = self.lock();
            let id = table.allocate_id();
            table.rows.insert(
                id,
                Row {
                    task_type: task_type.to_string(),
                    payload: payload.clone(),
                    error: None,
                    created_at: Utc::now(),
                    locked_by: None,
                },
            );
            id
        };

        debug!(task_id = id, task_type, "Enqueued task");
        self.publish();
        Ok(id)
    }

    async fn enqueue_in(
        &self,
        tx: &mut MemoryTx,
        task_type: &str,
        payload: &serde_json::Value,
    ) -> Result<i64, StoreError> {
        self.config.validate_payload(payload, "Task payload")?;
        Ok(tx.stage(task_type, payload, None))
    }

    async fn claim_next(&self, tx: &mut MemoryTx) -> Result<Option<Task>, StoreError> {
        let mut table = self.lock();
        let claimed = table
            .rows
            .iter_mut()
            .find(|(_, row)| row.error.is_none() && row.locked_by.is_none())
            .map(|(id, row)| {
                row.locked_by = Some(tx.id);
                row.to_task(*id)
            });

        if let Some(task) = &claimed {
            tx.claimed.push(task.id);
        }

        Ok(claimed)
    }

    async fn quarantine(
        &self,
        tx: &mut MemoryTx,
        task_type: &str,
        payload: &serde_json::Value,
        error: &serde_json::Value,
    ) -> Result<i64, StoreError> {
        Ok(tx.stage(task_type, payload, Some(error)))
    }

    async fn list(&self, params: ListTasksParams) -> Result<Vec<Task>, StoreError> {
        let table = self.lock();
        let limit = params
            .limit
            .map_or(usize::MAX, |limit| usize::try_from(limit).unwrap_or(0));

        Ok(table
            .rows
            .iter()
            .map(|(id, row)| row.to_task(*id))
            .filter(|task| params.matches(task))
            .take(limit)
            .collect())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Task>, StoreError> {
        Ok(self.lock().rows.get(&id).map(|row| row.to_task(id)))
    }

    async fn count(&self, filter: TaskFilter) -> Result<i64, StoreError> {
        let table = self.lock();
        let count = table
            .rows
            .iter()
            .filter(|(id, row)| filter.matches(&row.to_task(**id)))
            .count();
        Ok(count as i64)
    }

    async fn clear_error(&self, id: i64) -> Result<bool, StoreError> {
        {
            let mut table = self.lock();
            let Some(row) = table.rows.get_mut(&id) else {
                return Ok(false);
            };
            if row.locked_by.is_some() {
                return Err(StoreError::lock_conflict(format!(
                    "task {id} is claimed by an open transaction"
                )));
            }
            row.error = None;
        }

        self.publish();
        Ok(true)
    }

    async fn delete(&self, id: i64) -> Result<bool, StoreError> {
        let mut table = self.lock();
        match table.rows.get(&id) {
            None => Ok(false),
            Some(row) if row.locked_by.is_some() => Err(StoreError::lock_conflict(format!(
                "task {id} is claimed by an open transaction"
            ))),
            Some(_) => {
                table.rows.remove(&id);
                Ok(true)
            }
        }
    }
}
