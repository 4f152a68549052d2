//! Neo4j connection management and shared graph client.

use std::future::Future;

use neo4rs::{ConfigBuilder, Graph};

use scoregraph_core::config::{Neo4jSettings, RetryPolicy, Settings};
use scoregraph_core::ScoregraphError;

use crate::store::Statement;

/// Errors from graph operations.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("Neo4j connection error: {0}")]
    Connection(String),

    #[error("Neo4j query error: {0}")]
    Query(#[from] neo4rs::Error),

    #[error("{operation} failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        #[source]
        source: neo4rs::Error,
    },

    #[error("{kind} not found with id {id}")]
    NotFound { kind: String, id: i64 },

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Staged data does not line up with what the store accepted.
    #[error("Consistency error: {0}")]
    Consistency(String),

    #[error("Usage error: {0}")]
    Usage(String),

    #[error("Query compilation error: {0}")]
    QueryCompilation(String),

    #[error(transparent)]
    Core(#[from] ScoregraphError),
}

/// Configuration for connecting to Neo4j.
#[derive(Debug, Clone)]
pub struct GraphConfig {
    pub uri: String,
    pub user: String,
    pub password: String,
    pub max_connections: u32,
    pub fetch_size: usize,
    pub retry: RetryPolicy,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self::from(&Settings::default())
    }
}

impl From<&Settings> for GraphConfig {
    fn from(settings: &Settings) -> Self {
        let Neo4jSettings {
            uri,
            user,
            password,
            max_connections,
            fetch_size,
        } = settings.neo4j.clone();
        Self {
            uri,
            user,
            password,
            max_connections,
            fetch_size,
            retry: settings.retry.clone(),
        }
    }
}

/// Thread-safe Neo4j graph client with connection pooling.
///
/// Every call goes through the configured [`RetryPolicy`]. Clone is cheap (inner Arc).
#[derive(Clone)]
pub struct GraphClient {
    graph: Graph,
    retry: RetryPolicy,
}

impl GraphClient {
    /// Connect to Neo4j with the given configuration and check the session with a ping.
    pub async fn connect(config: &GraphConfig) -> Result<Self, GraphError> {
        let neo_config = ConfigBuilder::default()
            .uri(&config.uri)
            .user(&config.user)
            .password(&config.password)
            .max_connections(config.max_connections as usize)
            .fetch_size(config.fetch_size)
            .build()
            .map_err(|e| GraphError::Connection(e.to_string()))?;

        let graph = Graph::connect(neo_config)
            .await
            .map_err(|e| GraphError::Connection(e.to_string()))?;

        let client = Self {
            graph,
            retry: config.retry.clone(),
        };
        client
            .run(&Statement::new("ping", "RETURN 1"))
            .await
            .map_err(|e| GraphError::Connection(e.to_string()))?;

        tracing::info!(uri = %config.uri, "Connected to Neo4j");
        Ok(client)
    }

    /// Get a reference to the underlying neo4rs Graph for direct operations.
    pub fn inner(&self) -> &Graph {
        &self.graph
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Execute a write-only statement (CREATE, MERGE, DELETE, SET).
    pub async fn run(&self, stmt: &Statement) -> Result<(), GraphError> {
        let graph = &self.graph;
        retrying(&self.retry, stmt.name, || graph.run(stmt.to_query())).await
    }

    /// Execute a read statement and collect all rows.
    pub async fn query_rows(&self, stmt: &Statement) -> Result<Vec<neo4rs::Row>, GraphError> {
        let graph = &self.graph;
        retrying(&self.retry, stmt.name, || async move {
            let mut stream = graph.execute(stmt.to_query()).await?;
            let mut rows = Vec::new();
            while let Some(row) = stream.next().await? {
                rows.push(row);
            }
            Ok::<_, neo4rs::Error>(rows)
        })
        .await
    }

    /// Execute a read statement and return the first row, if any.
    pub async fn query_one(&self, stmt: &Statement) -> Result<Option<neo4rs::Row>, GraphError> {
        let graph = &self.graph;
        retrying(&self.retry, stmt.name, || async move {
            let mut stream = graph.execute(stmt.to_query()).await?;
            stream.next().await
        })
        .await
    }
}

/// Run `attempt` until it succeeds, fails permanently, or `policy` is used up.
pub(crate) async fn retrying<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut attempt: F,
) -> Result<T, GraphError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, neo4rs::Error>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut tries = 1;
    loop {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(e) if is_transient(&e) => {
                if tries >= max_attempts {
                    return Err(GraphError::RetriesExhausted {
                        operation: operation.to_string(),
                        attempts: tries,
                        source: e,
                    });
                }
                let delay = policy.backoff(tries);
                tracing::warn!(
                    operation,
                    attempt = tries,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Transient Neo4j failure, retrying"
                );
                tokio::time::sleep(delay).await;
                tries += 1;
            }
            Err(e) => return Err(GraphError::Query(e)),
        }
    }
}

/// Failures worth retrying: the request may not have reached the server.
fn is_transient(err: &neo4rs::Error) -> bool {
    matches!(
        err,
        neo4rs::Error::IOError { .. } | neo4rs::Error::ConnectionError
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn instant_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
            ..RetryPolicy::default()
        }
    }

    #[tokio::test]
    async fn test_retry_recovers_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = retrying(&instant_policy(3), "flaky", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(neo4rs::Error::ConnectionError)
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retrying(&instant_policy(3), "down", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(neo4rs::Error::ConnectionError) }
        })
        .await;

        match result {
            Err(GraphError::RetriesExhausted {
                operation,
                attempts,
                ..
            }) => {
                assert_eq!(operation, "down");
                assert_eq!(attempts, 3);
            }
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retrying(&instant_policy(5), "bad", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(neo4rs::Error::InvalidConfig) }
        })
        .await;

        assert!(matches!(
            result,
            Err(GraphError::Query(neo4rs::Error::InvalidConfig))
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_no_retry_policy_stops_at_first_failure() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retrying(&RetryPolicy::no_retry(), "once", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(neo4rs::Error::ConnectionError) }
        })
        .await;

        assert!(matches!(
            result,
            Err(GraphError::RetriesExhausted { attempts: 1, .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
