use embedsql_helpers::Config;

/// Engine-wide knobs threaded through the session manager and the analyzer.
/// One `Engine` owns exactly one `EngineConfig`; there is no global mutable
/// configuration state.
///
/// ```
/// use embedsql::EngineConfig;
/// use embedsql_helpers::Config;
///
/// let config = EngineConfig::default().config(|c| {
///     c.max_analyzer_iterations = 200;
///     c.memory_soft_limit_bytes = 64 << 20;
/// });
/// assert_eq!(config.max_analyzer_iterations, 200);
/// ```
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Safety bound on a fixed-point analyzer batch before it gives up with
    /// `ErrAnalyzerIterationsExceeded`.
    pub max_analyzer_iterations: usize,
    /// Soft limit consulted by memory-heavy operators (sort, group-by,
    /// hash-join accumulation). Crossing it fails with `ErrMemoryExceeded`.
    pub memory_soft_limit_bytes: u64,
    /// Whether identifier lookups (database, table, column names) are
    /// case-sensitive. MySQL's default is case-insensitive on most
    /// platforms, so that is the default here too.
    pub case_sensitive_identifiers: bool,
    /// The database new sessions start in, absent an explicit `USE`.
    pub default_database: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            max_analyzer_iterations: embedsql_analyzer::MAX_BATCH_ITERATIONS,
            memory_soft_limit_bytes: 256 << 20,
            case_sensitive_identifiers: false,
            default_database: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_analyzer_safety_bound() {
        let config = EngineConfig::default();
        assert_eq!(config.max_analyzer_iterations, 1000);
        assert!(!config.case_sensitive_identifiers);
    }

    #[test]
    fn builder_round_trips_overrides() {
        let config = EngineConfig::default().config(|c| {
            c.max_analyzer_iterations = 3;
            c.default_database = Some("demo".into());
        });
        assert_eq!(config.max_analyzer_iterations, 3);
        assert_eq!(config.default_database.as_deref(), Some("demo"));
    }
}
