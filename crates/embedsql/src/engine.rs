use std::sync::Arc;

use embedsql_analyzer::{Analyzer, AnalyzerContext};
use embedsql_catalog::{Catalog, SessionManager};
use embedsql_core::{CatalogHandle, Context, Database, PlanNode, ProcessRow, RowIter, Schema, Session};
use embedsql_exec::execute;
use embedsql_helpers::Config;
use smol_str::SmolStr;
use tracing::instrument;

use crate::config::EngineConfig;
use crate::error::EngineResult;

/// The embeddable query lifecycle engine: one catalog, one session manager,
/// one analyzer, built from a single `EngineConfig`. A front-end owns the
/// tokio runtime the engine's index registry schedules background work on
/// and hands the engine a `Handle` rather than the engine owning a runtime
/// itself, so embedding an `Engine` in an already-async host never starts a
/// second runtime.
pub struct Engine {
    catalog: Arc<Catalog>,
    sessions: SessionManager,
    analyzer: Analyzer,
    config: EngineConfig,
}

impl Engine {
    pub fn new(runtime: tokio::runtime::Handle, config: EngineConfig) -> Self {
        let catalog = Catalog::new(runtime).config(|c| c.case_sensitive = config.case_sensitive_identifiers);
        Engine {
            catalog: Arc::new(catalog),
            sessions: SessionManager::new(config.memory_soft_limit_bytes),
            analyzer: Analyzer::with_max_iterations(config.max_analyzer_iterations),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Registers a database with the catalog. If this database's name
    /// matches `EngineConfig::default_database`, it becomes the engine's
    /// current database regardless of registration order.
    pub fn add_database(&self, database: Arc<dyn Database>) {
        let name = database.name().to_string();
        self.catalog.add_database(database);
        if self.config.default_database.as_deref() == Some(name.as_str()) {
            let _ = self.catalog.use_database(&name);
        }
    }

    pub fn new_session(
        &self,
        server_address: impl Into<SmolStr>,
        client_address: impl Into<SmolStr>,
        user: impl Into<SmolStr>,
    ) -> Arc<Session> {
        self.sessions.new_session(server_address, client_address, user)
    }

    /// Allocates a fresh pid-scoped context for one statement and registers
    /// it with the catalog's process list, so it's visible to `SHOW
    /// PROCESSLIST` for its whole lifetime, from before analysis starts
    /// through to whichever iterator (or `CREATE INDEX` build) marks it done.
    pub fn new_context(&self, session: Arc<Session>, query_text: impl Into<SmolStr>) -> Context {
        let query_text: SmolStr = query_text.into();
        let ctx = self.sessions.new_context(session.clone(), query_text.clone());
        self.catalog
            .process_list()
            .add_process(ctx.pid, session.connection_id, session.user.clone(), query_text);
        ctx
    }

    /// Resolves `plan` against the current catalog state and executes it,
    /// returning the row stream alongside the schema the caller should bind
    /// result columns to.
    #[instrument(skip_all, fields(pid = ctx.pid))]
    pub fn analyze_and_execute(&self, ctx: &Context, plan: PlanNode) -> EngineResult<(Box<dyn RowIter>, Schema)> {
        let actx = AnalyzerContext::new(ctx.clone(), self.catalog.clone());
        let resolved = self.analyzer.analyze(plan, &actx)?;
        let schema = resolved.schema()?;
        let iter = execute(&resolved, ctx)?;
        Ok((iter, schema))
    }

    /// A snapshot of every live query, for `SHOW PROCESSLIST` front-ends and
    /// operator dashboards alike.
    pub fn process_list(&self) -> Vec<ProcessRow> {
        self.catalog.process_snapshot()
    }
}
