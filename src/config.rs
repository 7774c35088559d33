use serde::Deserialize;

/// Policy switches of the document workflow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct WorkflowPolicy {
    /// When set, REVISION -> SUBMITTED requires a version created after the
    /// revision was requested.
    #[serde(default)]
    pub require_new_version_on_resubmit: bool,
}

/// Where records are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Mongo,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub mongodb_uri: String,
    pub mongodb_database: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub bind_addr: String,
}

/// Full service configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub workflow: WorkflowPolicy,
    pub log_filter: String,
}

#[cfg(feature = "server")]
impl AppConfig {
    /// Environment variable prefix; nested keys use `__`, e.g.
    /// `MONOGRAPH__STORAGE__BACKEND=memory`.
    pub const ENV_PREFIX: &'static str = "MONOGRAPH";

    /// Load defaults, then the optional file at `path`, then the environment.
    pub fn load(path: Option<&std::path::Path>) -> Result<Self, config::ConfigError> {
        let file = match path {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name("monograph").required(false),
        };

        Self::builder()?
            .add_source(file)
            .add_source(
                config::Environment::with_prefix(Self::ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()
    }

    fn builder() -> Result<config::ConfigBuilder<config::builder::DefaultState>, config::ConfigError>
    {
        config::Config::builder()
            .set_default("server.bind_addr", "127.0.0.1:3000")?
            .set_default("storage.backend", "mongo")?
            .set_default("storage.mongodb_uri", "mongodb://localhost:27017")?
            .set_default("storage.mongodb_database", "monograph")?
            .set_default("workflow.require_new_version_on_resubmit", false)?
            .set_default("log_filter", "monograph=info,tower_http=info")
    }
}
