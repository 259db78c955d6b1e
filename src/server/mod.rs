//! `dicod`: a small DICT server hosting dictionary modules.

pub mod database;
pub mod session;

use crate::config::DictdSettings;
use crate::core::strategy::StrategyRegistry;
use crate::modules::{ModuleError, DEFAULT_MARKUP};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinSet;

pub use database::Database;
pub use session::Session;

/// Errors raised while starting or running the server
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database {name}: {source}")]
    Module {
        name: String,
        #[source]
        source: ModuleError,
    },

    #[error("Configuration error: {0}")]
    Config(String),
}

/// State shared by all connections
#[derive(Debug)]
pub struct ServerState {
    pub hostname: String,
    pub databases: Vec<Database>,
    pub strategies: StrategyRegistry,
    pub lev_distance: usize,
    pub inactivity_timeout: Duration,
    started: Instant,
    connections: AtomicU64,
}

impl ServerState {
    pub fn new(settings: &DictdSettings, databases: Vec<Database>) -> Result<Self, ServerError> {
        let mut strategies = StrategyRegistry::builtin();
        if !strategies.set_default(&settings.default_strategy) {
            return Err(ServerError::Config(format!(
                "unknown default strategy {:?}",
                settings.default_strategy
            )));
        }

        for (i, db) in databases.iter().enumerate() {
            if databases[..i].iter().any(|other| other.name() == db.name()) {
                return Err(ServerError::Config(format!(
                    "database {} defined twice",
                    db.name()
                )));
            }
        }

        Ok(Self {
            hostname: settings.hostname.clone(),
            databases,
            strategies,
            lev_distance: settings.lev_distance,
            inactivity_timeout: Duration::from_secs(settings.inactivity_timeout_secs),
            started: Instant::now(),
            connections: AtomicU64::new(0),
        })
    }

    pub fn find_database(&self, name: &str) -> Option<&Database> {
        self.databases.iter().find(|db| db.name() == name)
    }

    /// Markups the hosted modules can produce, `none` first
    pub fn markups(&self) -> Vec<&'static str> {
        let mut markups = vec![DEFAULT_MARKUP];
        for db in &self.databases {
            for &markup in db.module().markups() {
                if !markups.contains(&markup) {
                    markups.push(markup);
                }
            }
        }
        markups
    }

    /// Capabilities announced in the greeting
    pub fn capabilities(&self) -> Vec<String> {
        let mut capas = vec!["mime".to_string(), "markup".to_string()];
        capas.extend(
            self.markups()
                .into_iter()
                .filter(|m| *m != DEFAULT_MARKUP)
                .map(|m| format!("markup-{}", m)),
        );
        capas.push("xlev".to_string());
        capas
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn connection_count(&self) -> u64 {
        self.connections.load(Ordering::Relaxed)
    }

    fn next_connection(&self) -> u64 {
        self.connections.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Close the module of every database
    pub async fn close(mut self) {
        for db in &mut self.databases {
            db.close().await;
        }
    }
}

/// A bound DICT server
pub struct DictServer {
    listener: TcpListener,
    state: Arc<ServerState>,
}

impl DictServer {
    /// Open every configured database and bind the listening socket
    pub async fn bind(settings: &DictdSettings) -> Result<Self, ServerError> {
        let mut databases = Vec::with_capacity(settings.databases.len());
        for db in &settings.databases {
            databases.push(Database::open(db).await?);
        }
        Self::with_databases(settings, databases).await
    }

    /// Bind with databases opened by the caller
    pub async fn with_databases(
        settings: &DictdSettings,
        databases: Vec<Database>,
    ) -> Result<Self, ServerError> {
        let state = ServerState::new(settings, databases)?;
        let listener = TcpListener::bind((settings.host.as_str(), settings.port)).await?;
        tracing::info!(
            "dicod listening on {} with {} database(s)",
            listener.local_addr()?,
            state.databases.len()
        );
        Ok(Self {
            listener,
            state: Arc::new(state),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until the process is stopped
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_until(std::future::pending()).await
    }

    /// Accept connections until `shutdown` resolves, then drop the open
    /// connections and close every database
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            tracing::warn!("Failed to accept connection: {}", e);
                            continue;
                        }
                    };
                    let state = Arc::clone(&self.state);
                    let id = state.next_connection();
                    tracing::debug!("Connection {} from {}", id, peer);

                    connections.spawn(async move {
                        if let Err(e) = session::serve(stream, state, id).await {
                            tracing::debug!("Connection {} from {} ended: {}", id, peer, e);
                        }
                    });
                }
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        }

        tracing::info!("dicod shutting down, dropping {} connection(s)", connections.len());
        connections.shutdown().await;
        drop(self.listener);

        match Arc::try_unwrap(self.state) {
            Ok(state) => state.close().await,
            Err(_) => tracing::warn!("Server state still in use, databases left open"),
        }
        Ok(())
    }
}
