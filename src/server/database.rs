use super::ServerError;
use crate::config::DatabaseSettings;
use crate::modules::{self, DictionaryModule};

/// A database served by `dicod`: a name bound to an open module
pub struct Database {
    name: String,
    descr: Option<String>,
    module: Box<dyn DictionaryModule>,
}

impl Database {
    /// Create and open the module configured for `settings`
    pub async fn open(settings: &DatabaseSettings) -> Result<Self, ServerError> {
        let module = modules::create_module(&settings.handler).map_err(|source| {
            ServerError::Module {
                name: settings.name.clone(),
                source,
            }
        })?;
        Self::with_module(&settings.name, settings.descr.clone(), module).await
    }

    /// Open an already constructed module under `name`
    pub async fn with_module(
        name: &str,
        descr: Option<String>,
        mut module: Box<dyn DictionaryModule>,
    ) -> Result<Self, ServerError> {
        if name.is_empty() || name == "*" || name == "!" || name.contains(char::is_whitespace) {
            return Err(ServerError::Config(format!("invalid database name {:?}", name)));
        }
        module
            .open(name)
            .await
            .map_err(|source| ServerError::Module {
                name: name.to_string(),
                source,
            })?;
        Ok(Self {
            name: name.to_string(),
            descr,
            module,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Configured description, else the module's own, else the name
    pub fn descr(&self) -> String {
        self.descr
            .clone()
            .or_else(|| self.module.descr())
            .unwrap_or_else(|| self.name.clone())
    }

    pub fn info(&self) -> String {
        self.module.info().unwrap_or_else(|| self.descr())
    }

    pub fn module(&self) -> &dyn DictionaryModule {
        self.module.as_ref()
    }

    pub async fn close(&mut self) {
        if let Err(e) = self.module.close().await {
            tracing::warn!("Failed to close database {}: {}", self.name, e);
        }
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.name)
            .field("descr", &self.descr)
            .finish_non_exhaustive()
    }
}
