use async_trait::async_trait;
use sqlx::{FromRow, PgExecutor, Postgres, QueryBuilder, Transaction};
use tracing::{debug, instrument};

use super::{PgStore, PgTx};
use crate::error::StoreError;
use crate::models::{ListTasksParams, Task, TaskFilter};
use crate::repository::{TaskRepository, UnitOfWork};

const TASK_COLUMNS: &str = "id, task_type, payload, error, created_at";

#[derive(FromRow)]
struct TaskRow {
    id: i64,
    task_type: String,
    payload: serde_json::Value,
    error: Option<serde_json::Value>,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl TaskRow {
    fn into_model(self) -> Task {
        Task {
            id: self.id,
            task_type: self.task_type,
            payload: self.payload,
            error: self.error,
            created_at: self.created_at,
        }
    }
}

async fn insert_task<'e, E: PgExecutor<'e>>(
    executor: E,
    task_type: &str,
    payload: &serde_json::Value,
    error: Option<&serde_json::Value>,
) -> Result<i64, StoreError> {
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO taskq.tasks (task_type, payload, error)
        VALUES ($1, $2, $3)
        RETURNING id
        "#,
    )
    .bind(task_type)
    .bind(payload)
    .bind(error)
    .fetch_one(executor)
    .await?;

    Ok(id)
}

fn push_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: TaskFilter) {
    match filter {
        TaskFilter::All => builder.push(" WHERE TRUE"),
        TaskFilter::Pending => builder.push(" WHERE error IS NULL"),
        TaskFilter::Quarantined => builder.push(" WHERE error IS NOT NULL"),
    };
}

#[async_trait]
impl UnitOfWork for Transaction<'static, Postgres> {
    async fn commit(self) -> Result<(), StoreError> {
        Transaction::commit(self).await?;
        Ok(())
    }

    async fn rollback(self) -> Result<(), StoreError> {
        Transaction::rollback(self).await?;
        Ok(())
    }

    async fn savepoint(&mut self, name: &str) -> Result<(), StoreError> {
        sqlx::query(&format!("SAVEPOINT {name}"))
            .execute(&mut **self)
            .await?;
        Ok(())
    }

    async fn rollback_to_savepoint(&mut self, name: &str) -> Result<(), StoreError> {
        sqlx::query(&format!("ROLLBACK TO SAVEPOINT {name}"))
            .execute(&mut **self)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl TaskRepository for PgStore {
    type Tx = PgTx;

    async fn begin(&self) -> Result<PgTx, StoreError> {
        Ok(self.pool.begin().await?)
    }

    #[instrument(skip(self, payload))]
    async fn enqueue(
        &self,
        task_type: &str,
        payload: &serde_json::Value,
    ) -> Result<i64, StoreError> {
        self.config.validate_payload(payload, "Task payload")?;
        let id = insert_task(&self.pool, task_type, payload, None).await?;
        debug!(task_id = id, "Enqueued task");
        Ok(id)
    }

    #[instrument(skip(self, tx, payload))]
    async fn enqueue_in(
        &self,
        tx: &mut PgTx,
        task_type: &str,
        payload: &serde_json::Value,
    ) -> Result<i64, StoreError> {
        self.config.validate_payload(payload, "Task payload")?;
        let id = insert_task(&mut **tx, task_type, payload, None).await?;
        debug!(task_id = id, "Enqueued task in caller transaction");
        Ok(id)
    }

    async fn claim_next(&self, tx: &mut PgTx) -> Result<Option<Task>, StoreError> {
        let row = sqlx::query_as::<_, TaskRow>(
            r#"
            DELETE FROM taskq.tasks
            WHERE id = (
                SELECT id
                FROM taskq.tasks
                WHERE error IS NULL
                ORDER BY id ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id, task_type, payload, error, created_at
            "#,
        )
        .fetch_optional(&mut **tx)
        .await?;

        Ok(row.map(TaskRow::into_model))
    }

    #[instrument(skip(self, tx, payload, error))]
    async fn quarantine(
        &self,
        tx: &mut PgTx,
        task_type: &str,
        payload: &serde_json::Value,
        error: &serde_json::Value,
    ) -> Result<i64, StoreError> {
        insert_task(&mut **tx, task_type, payload, Some(error)).await
    }

    async fn list(&self, params: ListTasksParams) -> Result<Vec<Task>, StoreError> {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT ");
        builder.push(TASK_COLUMNS).push(" FROM taskq.tasks");
        push_filter(&mut builder, params.filter);

        if let Some(task_type) = params.task_type {
            builder.push(" AND task_type = ").push_bind(task_type);
        }

        builder.push(" ORDER BY id ASC");

        if let Some(limit) = params.limit {
            builder.push(" LIMIT ").push_bind(limit.max(0));
        }

        let rows = builder
            .build_query_as::<TaskRow>()
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(TaskRow::into_model).collect())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Task>, StoreError> {
        let row = sqlx::query_as::<_, TaskRow>(&format!(
            "SELECT {TASK_COLUMNS} FROM taskq.tasks WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(TaskRow::into_model))
    }

    async fn count(&self, filter: TaskFilter) -> Result<i64, StoreError> {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM taskq.tasks");
        push_filter(&mut builder, filter);

        let count: i64 = builder
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    #[instrument(skip(self))]
    async fn clear_error(&self, id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE taskq.tasks
            SET error = NULL
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM taskq.tasks WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
