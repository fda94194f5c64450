//! DataFusion-backed executor.
//!
//! `prepare` only parses and plans into a `LogicalPlan`, so DDL such as
//! `CREATE TABLE ... AS` or `CREATE EXTERNAL TABLE` takes effect on the runner.
//! Execution is dropped (cancelling all DataFusion work) as soon as the
//! cancellation token fires.

use std::sync::Arc;

use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use datafusion::datasource::MemTable;
use datafusion::error::DataFusionError;
use datafusion::logical_expr::LogicalPlan;
use datafusion::prelude::SessionContext;
use tokio_util::sync::CancellationToken;

use super::{ExecutorError, PreparedStatement, QueryExecutor, QueryOutput};

/// SQL engine over an in-process DataFusion `SessionContext`.
///
/// Table registration is outside the statement hot path: callers register
/// in-memory tables up front, or submit `CREATE EXTERNAL TABLE` statements.
pub struct DataFusionExecutor {
    ctx: SessionContext,
}

impl DataFusionExecutor {
    pub fn new() -> Self {
        Self::with_context(SessionContext::new())
    }

    pub fn with_context(ctx: SessionContext) -> Self {
        Self { ctx }
    }

    /// Register a single batch as table `name`, replacing any previous table.
    pub fn register_batch(&self, name: &str, batch: RecordBatch) -> Result<(), ExecutorError> {
        let schema = batch.schema();
        self.register_table(name, schema, vec![batch])
    }

    /// Register `batches` (possibly none) under `name` with an explicit schema.
    pub fn register_table(
        &self,
        name: &str,
        schema: SchemaRef,
        batches: Vec<RecordBatch>,
    ) -> Result<(), ExecutorError> {
        let table = MemTable::try_new(schema, vec![batches])
            .map_err(|e| ExecutorError::internal(format!("Cannot build table '{name}': {e}")))?;
        self.ctx
            .deregister_table(name)
            .map_err(|e| ExecutorError::internal(e.to_string()))?;
        self.ctx
            .register_table(name, Arc::new(table))
            .map_err(|e| ExecutorError::internal(e.to_string()))?;
        tracing::debug!(table = name, "table_registered");
        Ok(())
    }
}

impl Default for DataFusionExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueryExecutor for DataFusionExecutor {
    async fn prepare(&self, sql: &str) -> Result<Box<dyn PreparedStatement>, ExecutorError> {
        let plan = self
            .ctx
            .state()
            .create_logical_plan(sql)
            .await
            .map_err(planning_error)?;
        Ok(Box::new(DataFusionStatement {
            ctx: self.ctx.clone(),
            plan,
        }))
    }
}

struct DataFusionStatement {
    ctx: SessionContext,
    plan: LogicalPlan,
}

#[async_trait]
impl PreparedStatement for DataFusionStatement {
    async fn execute(
        self: Box<Self>,
        cancel: CancellationToken,
    ) -> Result<QueryOutput, ExecutorError> {
        let Self { ctx, plan } = *self;
        let run = async move {
            let frame = ctx.execute_logical_plan(plan).await?;
            let schema = frame.schema().inner().clone();
            let batches = frame.collect().await?;
            Ok::<_, DataFusionError>(QueryOutput::new(schema, batches))
        };
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(ExecutorError::Cancelled),
            output = run => output.map_err(|e| ExecutorError::execution(e.to_string())),
        }
    }
}

fn planning_error(err: DataFusionError) -> ExecutorError {
    ExecutorError::planning(err.to_string())
}
