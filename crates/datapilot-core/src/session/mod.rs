//! One isolated unit of agent work: dataset bindings, a private execution
//! context, and the append-only execution history.

pub mod events;
pub mod state;

pub use events::{RunStage, SessionEvent};
pub use state::{CapturedFigure, ExecutionHistory, ExecutionRecord};

use std::time::Duration;

use tracing::info;
use uuid::Uuid;

use crate::config::Config;
use crate::datasets::{DataTable, DatasetBinding, DatasetError, DatasetResolver};
use crate::sandbox::{SandboxError, SandboxHandle};
use datapilot_tools::result::DatasetSummaryResult;

pub struct Session {
    id: String,
    dataset_name: String,
    bindings: Vec<DatasetBinding>,
    resolver: DatasetResolver,
    sandbox: SandboxHandle,
    history: ExecutionHistory,
    exec_timeout: Duration,
}

impl Session {
    /// Resolve the datasets, spin up a fresh execution context and inject the
    /// bindings. Each session owns its context exclusively; nothing is shared
    /// between sessions running in the same process.
    pub async fn start(config: &Config, identifiers: &[String]) -> crate::Result<Self> {
        let resolver = DatasetResolver::new(&config.datasets_dir);
        let bindings = resolver.load_bindings(identifiers)?;

        let sandbox = SandboxHandle::spawn()?;
        sandbox.initialize().await?;
        sandbox.bind_datasets(&bindings).await?;

        let dataset_name = bindings
            .iter()
            .map(|b| b.name.as_str())
            .collect::<Vec<_>>()
            .join("_");
        let id = Uuid::new_v4().simple().to_string();

        info!(
            target: "session",
            session_id = %id,
            datasets = %dataset_name,
            "session started"
        );

        Ok(Self {
            id,
            dataset_name,
            bindings,
            resolver,
            sandbox,
            history: ExecutionHistory::new(),
            exec_timeout: config.exec_timeout,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn dataset_name(&self) -> &str {
        &self.dataset_name
    }

    pub fn bindings(&self) -> &[DatasetBinding] {
        &self.bindings
    }

    pub fn history(&self) -> &ExecutionHistory {
        &self.history
    }

    /// Run one fragment against the persistent context and log the record.
    /// In-fragment failures come back inside the record; only a dead context
    /// is an `Err`.
    pub async fn execute_fragment(&mut self, code: &str) -> Result<&ExecutionRecord, SandboxError> {
        let outcome = self.sandbox.execute(code, self.exec_timeout).await?;
        Ok(self.history.push_outcome(code, outcome))
    }

    /// Summarize a dataset: bound tables are served from memory, anything
    /// else goes through the resolver.
    pub fn describe_dataset(&self, identifier: &str) -> Result<DatasetSummaryResult, DatasetError> {
        if let Some(binding) = self
            .bindings
            .iter()
            .find(|b| b.name == identifier || b.table.name == identifier || b.var_name == identifier)
        {
            return Ok(binding.table.summarize());
        }
        let path = self.resolver.resolve(identifier)?;
        Ok(DataTable::load(&path)?.summarize())
    }

    /// repr() of a context variable, mainly for diagnostics.
    pub async fn get_variable(&self, name: &str) -> Result<Option<String>, SandboxError> {
        self.sandbox.get_variable(name).await
    }

    pub async fn shutdown(&self) -> Result<(), SandboxError> {
        self.sandbox.shutdown().await
    }
}
