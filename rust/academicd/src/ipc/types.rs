use std::collections::HashMap;
use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

use crate::api::{ApiError, FormsApi, HttpFormsApi};
use crate::config::BackendConfig;
use crate::forms::SubmissionFlow;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    /// Environment defaults, before any workspace override.
    pub base_config: BackendConfig,
    pub config: BackendConfig,
    /// Built from `config` on first use; dropped whenever `config` changes.
    pub api: Option<Box<dyn FormsApi>>,
    /// Open form flows, keyed by flow id.
    pub flows: HashMap<String, SubmissionFlow>,
}

impl AppState {
    pub fn new(config: BackendConfig) -> Self {
        Self {
            workspace: None,
            db: None,
            base_config: config.clone(),
            config,
            api: None,
            flows: HashMap::new(),
        }
    }

    pub fn ensure_api(&mut self) -> Result<&dyn FormsApi, ApiError> {
        if self.api.is_none() {
            self.api = Some(Box::new(HttpFormsApi::new(&self.config)?));
        }
        match self.api.as_deref() {
            Some(api) => Ok(api),
            None => Err(ApiError::Config("backend client unavailable".into())),
        }
    }

    pub fn set_config(&mut self, config: BackendConfig) {
        if config != self.config {
            self.api = None;
        }
        self.config = config;
    }
}
