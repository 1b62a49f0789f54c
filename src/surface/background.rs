use std::sync::Arc;

use serde_json::{json, Value};
use thiserror::Error;

use crate::history::{HistoryFilter, OperationType, StateStore};
use crate::pipeline::orchestrator::{OperationError, OperationOrchestrator};
use crate::pipeline::request::OperationRequest;
use crate::platform::{Platform, PlatformCallError};
use crate::provider::local_backend::user_limits;
use crate::session::Session;
use crate::settings::{ImageFormat, SettingsPatch, SettingsStore, SETTINGS_KEYS};
use crate::surface::menu::{lens_search_url, menu_catalog, parse_menu_command, MenuCommand};

// Event fan-in for the long-lived background process: menu clicks and
// popup/page messages both land here and run on the blocking pool.
pub struct BackgroundDispatcher {
    orchestrator: Arc<OperationOrchestrator>,
    settings: SettingsStore,
    state: StateStore,
    session: Arc<Session>,
    platform: Platform,
}

impl BackgroundDispatcher {
    pub fn new(
        orchestrator: Arc<OperationOrchestrator>,
        settings: SettingsStore,
        state: StateStore,
        session: Arc<Session>,
        platform: Platform,
    ) -> Self {
        Self {
            orchestrator,
            settings,
            state,
            session,
            platform,
        }
    }

    pub async fn startup(&self) -> Result<(), DispatchError> {
        let session = self.session.clone();
        run_blocking(move || session.load())
            .await?
            .map_err(state_error)?;

        let menus = self.platform.menus.clone();
        run_blocking(move || menus.rebuild(&menu_catalog())).await??;
        self.subscribe_menu_rebuild();

        let orchestrator = self.orchestrator.clone();
        let available = run_blocking(move || orchestrator.check_health()).await?;
        tracing::info!(available, "background surface ready");
        Ok(())
    }

    pub async fn handle_menu_click(
        &self,
        menu_id: &str,
        image_url: &str,
        tab_id: Option<i64>,
    ) -> Result<(), DispatchError> {
        let Some(command) = parse_menu_command(menu_id) else {
            tracing::warn!(menu_id, "ignoring unknown menu item");
            return Ok(());
        };
        match command {
            MenuCommand::OpenInNewTab => self.open_tab(image_url.to_string()).await,
            MenuCommand::SearchWithLens => self.open_tab(lens_search_url(image_url)).await,
            MenuCommand::Convert(format) => {
                self.run_operation(OperationRequest::convert(image_url, format), tab_id)
                    .await
            }
            MenuCommand::Copy(format) => {
                self.run_operation(OperationRequest::copy(image_url, format), tab_id)
                    .await
            }
            MenuCommand::RemoveBackground => {
                self.run_operation(OperationRequest::remove_background(image_url), tab_id)
                    .await
            }
        }
    }

    pub async fn handle_message(&self, message: Value) -> Value {
        let Some(action) = message.get("action").and_then(Value::as_str) else {
            return err_envelope("message missing action");
        };
        let action = action.to_string();
        match self.dispatch_message(action.as_str(), &message).await {
            Ok(data) => ok_envelope(data),
            Err(error) => {
                tracing::warn!(action = action.as_str(), error = %error, "message failed");
                err_envelope(error)
            }
        }
    }

    async fn dispatch_message(
        &self,
        action: &str,
        message: &Value,
    ) -> Result<Value, DispatchError> {
        match action {
            "login" => {
                let email = require_str(message, "email")?;
                let password = require_str(message, "password")?;
                let orchestrator = self.orchestrator.clone();
                let user =
                    run_blocking(move || orchestrator.login(email.as_str(), password.as_str()))
                        .await??;
                Ok(json!({ "user": user }))
            }
            "register" => {
                let name = require_str(message, "name")?;
                let email = require_str(message, "email")?;
                let password = require_str(message, "password")?;
                let orchestrator = self.orchestrator.clone();
                let user = run_blocking(move || {
                    orchestrator.register(name.as_str(), email.as_str(), password.as_str())
                })
                .await??;
                Ok(json!({ "user": user }))
            }
            "logout" => {
                let orchestrator = self.orchestrator.clone();
                run_blocking(move || orchestrator.logout()).await??;
                Ok(Value::Null)
            }
            "getCurrentUser" => {
                let orchestrator = self.orchestrator.clone();
                let user = run_blocking(move || orchestrator.current_user()).await??;
                let limits = user_limits(&user);
                Ok(json!({ "user": user, "limits": limits }))
            }
            "checkBackendHealth" => {
                let orchestrator = self.orchestrator.clone();
                let available = run_blocking(move || orchestrator.check_health()).await?;
                Ok(json!({ "available": available }))
            }
            "updateSettings" => {
                let payload = message.get("settings").ok_or_else(|| {
                    DispatchError::InvalidMessage(String::from("settings payload required"))
                })?;
                let patch = SettingsPatch::from_value(payload)
                    .map_err(|e| DispatchError::InvalidMessage(e.to_string()))?;
                let settings = self.settings.clone();
                let updated = run_blocking(move || settings.set(&patch))
                    .await?
                    .map_err(state_error)?;
                Ok(updated.to_value())
            }
            "getSettings" => {
                let settings = self.settings.clone();
                let current = run_blocking(move || settings.get())
                    .await?
                    .map_err(state_error)?;
                Ok(current.to_value())
            }
            "getStatistics" => {
                let state = self.state.clone();
                let statistics = run_blocking(move || state.statistics())
                    .await?
                    .map_err(state_error)?;
                encode(statistics)
            }
            "getHistory" => {
                let filter = history_filter_from_message(message)?;
                let state = self.state.clone();
                let entries = run_blocking(move || state.list(&filter))
                    .await?
                    .map_err(state_error)?;
                encode(entries)
            }
            other => Err(DispatchError::InvalidMessage(format!(
                "unknown action: {other}"
            ))),
        }
    }

    async fn open_tab(&self, url: String) -> Result<(), DispatchError> {
        let tabs = self.platform.tabs.clone();
        run_blocking(move || tabs.open(url.as_str())).await??;
        Ok(())
    }

    async fn run_operation(
        &self,
        request: OperationRequest,
        tab_id: Option<i64>,
    ) -> Result<(), DispatchError> {
        let request = match tab_id {
            Some(tab) => request.with_tab(tab),
            None => request,
        };
        let orchestrator = self.orchestrator.clone();
        run_blocking(move || orchestrator.execute(&request)).await??;
        Ok(())
    }

    fn subscribe_menu_rebuild(&self) {
        let menus = self.platform.menus.clone();
        self.platform.sync_storage.subscribe(Arc::new(move |key: &str| {
            if SETTINGS_KEYS.contains(&key) {
                if let Err(error) = menus.rebuild(&menu_catalog()) {
                    tracing::warn!(key, error = %error, "menu rebuild failed");
                }
            }
        }));
    }
}

async fn run_blocking<T, F>(task: F) -> Result<T, DispatchError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| DispatchError::Task(e.to_string()))
}

fn require_str(message: &Value, field: &str) -> Result<String, DispatchError> {
    message
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| DispatchError::InvalidMessage(format!("field '{field}' is required")))
}

fn optional_str(message: &Value, field: &str) -> Option<String> {
    message
        .get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn history_filter_from_message(message: &Value) -> Result<HistoryFilter, DispatchError> {
    let mut filter = HistoryFilter::default();
    if let Some(kind) = optional_str(message, "type") {
        filter.kind = Some(OperationType::parse(kind.as_str()).ok_or_else(|| {
            DispatchError::InvalidMessage(format!("unknown operation type '{kind}'"))
        })?);
    }
    if let Some(format) = optional_str(message, "format") {
        filter.format = Some(
            ImageFormat::parse(format.as_str())
                .ok_or_else(|| DispatchError::InvalidMessage(format!("unknown format '{format}'")))?,
        );
    }
    filter.date_prefix = optional_str(message, "date");
    filter.search = optional_str(message, "search");
    Ok(filter)
}

fn encode<T: serde::Serialize>(payload: T) -> Result<Value, DispatchError> {
    serde_json::to_value(payload).map_err(|e| DispatchError::State(e.to_string()))
}

fn state_error(error: impl std::fmt::Display) -> DispatchError {
    DispatchError::State(error.to_string())
}

fn ok_envelope(data: Value) -> Value {
    json!({ "success": true, "data": data })
}

fn err_envelope(error: impl std::fmt::Display) -> Value {
    json!({ "success": false, "error": error.to_string() })
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("{0}")]
    InvalidMessage(String),
    #[error(transparent)]
    Operation(#[from] OperationError),
    #[error(transparent)]
    Platform(#[from] PlatformCallError),
    #[error("{0}")]
    State(String),
    #[error("background task failed: {0}")]
    Task(String),
}
