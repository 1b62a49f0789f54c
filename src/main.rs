use std::sync::Arc;

use imagecraft_core::db::kv::{SqliteStorageArea, StorageScope};
use imagecraft_core::db::resolve_state_config;
use imagecraft_core::history::StateStore;
use imagecraft_core::pipeline::orchestrator::OperationOrchestrator;
use imagecraft_core::pipeline::request::OperationRequest;
use imagecraft_core::platform::headless::{
    LogContextMenus, LogNotifications, LogPageScripting, LogTabs,
};
use imagecraft_core::platform::http::{DiskDownloads, HttpResourceFetcher};
use imagecraft_core::platform::{MenuItemKind, Platform, SharedStorageArea};
use imagecraft_core::provider::default_provider_factory;
use imagecraft_core::provider::local_backend::default_backend_auth_ops;
use imagecraft_core::session::Session;
use imagecraft_core::settings::{ImageFormat, Settings, SettingsStore};
use imagecraft_core::surface::background::BackgroundDispatcher;
use imagecraft_core::surface::menu::menu_catalog;
use serde_json::{json, Value};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

// The orchestration core runs against headless adapters here: downloads land
// in a local directory, page overlays and notifications go to the log.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let cli_args = std::env::args().skip(1).collect::<Vec<_>>();
    let Some(command) = cli_args.first().map(String::as_str) else {
        print_usage();
        return Err(std::io::Error::other("Missing command").into());
    };
    if matches!(command, "-h" | "--help" | "help") {
        print_usage();
        return Ok(());
    }
    if command == "menu" {
        print_menu_catalog()?;
        return Ok(());
    }

    let rest = cli_args.iter().skip(1).cloned().collect::<Vec<_>>();
    if rest
        .iter()
        .any(|arg| matches!(arg.as_str(), "-h" | "--help"))
    {
        print_usage();
        return Ok(());
    }

    let host = Host::open()?;
    match command {
        "startup" => run_startup(&host).await,
        "health" => print_envelope(
            host.dispatcher
                .handle_message(json!({"action": "checkBackendHealth"}))
                .await,
        ),
        "login" => {
            let parsed = parse_login_cli_args(rest.as_slice())?;
            print_envelope(
                host.dispatcher
                    .handle_message(json!({
                        "action": "login",
                        "email": parsed.email,
                        "password": parsed.password,
                    }))
                    .await,
            )
        }
        "register" => {
            let parsed = parse_register_cli_args(rest.as_slice())?;
            print_envelope(
                host.dispatcher
                    .handle_message(json!({
                        "action": "register",
                        "name": parsed.name,
                        "email": parsed.email,
                        "password": parsed.password,
                    }))
                    .await,
            )
        }
        "logout" => print_envelope(
            host.dispatcher
                .handle_message(json!({"action": "logout"}))
                .await,
        ),
        "whoami" => print_envelope(
            host.dispatcher
                .handle_message(json!({"action": "getCurrentUser"}))
                .await,
        ),
        "convert" => {
            let parsed = parse_operation_cli_args(rest.as_slice())?;
            let format = resolve_format(&host, parsed.format).await?;
            run_operation(&host, OperationRequest::convert(parsed.url, format).with_tab(0)).await
        }
        "copy" => {
            let parsed = parse_operation_cli_args(rest.as_slice())?;
            let format = resolve_format(&host, parsed.format).await?;
            run_operation(&host, OperationRequest::copy(parsed.url, format).with_tab(0)).await
        }
        "remove-bg" => {
            let parsed = parse_remove_bg_cli_args(rest.as_slice())?;
            run_operation(
                &host,
                OperationRequest::remove_background(parsed.url).with_tab(0),
            )
            .await
        }
        "history" => {
            let parsed = parse_history_cli_args(rest.as_slice())?;
            let mut message = json!({"action": "getHistory"});
            set_field(&mut message, "type", parsed.kind);
            set_field(&mut message, "format", parsed.format);
            set_field(&mut message, "date", parsed.date);
            set_field(&mut message, "search", parsed.search);
            print_envelope(host.dispatcher.handle_message(message).await)
        }
        "history-remove" => {
            let parsed = parse_history_remove_cli_args(rest.as_slice())?;
            let state = host.state.clone();
            let removed =
                tokio::task::spawn_blocking(move || state.remove(parsed.id.as_str())).await??;
            print_value(&json!({"ok": true, "removed": removed}))
        }
        "history-clear" => {
            let state = host.state.clone();
            tokio::task::spawn_blocking(move || state.clear()).await??;
            print_value(&json!({"ok": true}))
        }
        "stats" => print_envelope(
            host.dispatcher
                .handle_message(json!({"action": "getStatistics"}))
                .await,
        ),
        "stats-reset" => {
            let state = host.state.clone();
            tokio::task::spawn_blocking(move || state.reset_statistics()).await??;
            print_value(&json!({"ok": true}))
        }
        "settings-show" => print_envelope(
            host.dispatcher
                .handle_message(json!({"action": "getSettings"}))
                .await,
        ),
        "settings-set" => {
            let patch = parse_settings_set_cli_args(rest.as_slice())?;
            print_envelope(
                host.dispatcher
                    .handle_message(json!({"action": "updateSettings", "settings": patch}))
                    .await,
            )
        }
        "settings-reset" => {
            let settings = host.settings.clone();
            tokio::task::spawn_blocking(move || settings.reset()).await??;
            print_value(&json!({"ok": true, "settings": Settings::default().to_value()}))
        }
        unknown => {
            print_usage();
            Err(std::io::Error::other(format!("Unknown command: {unknown}")).into())
        }
    }
}

struct Host {
    dispatcher: BackgroundDispatcher,
    orchestrator: Arc<OperationOrchestrator>,
    settings: SettingsStore,
    state: StateStore,
    session: Arc<Session>,
}

impl Host {
    fn open() -> Result<Self, Box<dyn std::error::Error>> {
        let cwd = std::env::current_dir()?;
        let config = resolve_state_config(cwd.as_path());
        std::fs::create_dir_all(config.data_dir.as_path())?;

        let sync_db = SqliteStorageArea::new(config.db_path.clone(), StorageScope::Sync);
        sync_db.initialize()?;
        let local_db = SqliteStorageArea::new(config.db_path.clone(), StorageScope::Local);
        local_db.initialize()?;
        let sync_area: SharedStorageArea = Arc::new(sync_db);
        let local_area: SharedStorageArea = Arc::new(local_db);

        let platform = Platform {
            sync_storage: sync_area.clone(),
            local_storage: local_area.clone(),
            downloads: Arc::new(DiskDownloads::new(config.downloads_dir.clone())),
            scripting: Arc::new(LogPageScripting),
            notifications: Some(Arc::new(LogNotifications)),
            tabs: Arc::new(LogTabs),
            menus: Arc::new(LogContextMenus),
            fetcher: Arc::new(HttpResourceFetcher),
        };

        let settings = SettingsStore::new(sync_area);
        let state = StateStore::new(local_area.clone());
        let session = Arc::new(Session::new(local_area));
        let orchestrator = Arc::new(OperationOrchestrator::new(
            platform.clone(),
            settings.clone(),
            state.clone(),
            session.clone(),
            default_provider_factory(config.backend_origin.clone()),
            default_backend_auth_ops(config.backend_origin),
        ));
        let dispatcher = BackgroundDispatcher::new(
            orchestrator.clone(),
            settings.clone(),
            state.clone(),
            session.clone(),
            platform,
        );

        Ok(Self {
            dispatcher,
            orchestrator,
            settings,
            state,
            session,
        })
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .try_init();
}

async fn run_startup(host: &Host) -> Result<(), Box<dyn std::error::Error>> {
    host.dispatcher.startup().await?;
    print_value(&json!({
        "ok": true,
        "backendAvailable": host.session.backend_available(),
    }))
}

async fn run_operation(
    host: &Host,
    request: OperationRequest,
) -> Result<(), Box<dyn std::error::Error>> {
    let orchestrator = host.orchestrator.clone();
    let outcome = tokio::task::spawn_blocking(move || orchestrator.execute(&request)).await??;
    print_value(&json!({
        "ok": true,
        "type": outcome.kind.as_str(),
        "processedUrl": outcome.processed_url,
        "downloadedAs": outcome.downloaded_as,
        "entryId": outcome.entry_id,
    }))
}

async fn resolve_format(
    host: &Host,
    raw: Option<String>,
) -> Result<ImageFormat, Box<dyn std::error::Error>> {
    match raw {
        Some(raw) => ImageFormat::parse(raw.as_str())
            .ok_or_else(|| std::io::Error::other(format!("Unknown format: {raw}")).into()),
        None => {
            let settings = host.settings.clone();
            let current = tokio::task::spawn_blocking(move || settings.get()).await??;
            Ok(current.default_format)
        }
    }
}

fn print_menu_catalog() -> Result<(), Box<dyn std::error::Error>> {
    let items = menu_catalog()
        .iter()
        .map(|item| {
            json!({
                "id": item.id,
                "parentId": item.parent_id,
                "title": item.title,
                "kind": match item.kind {
                    MenuItemKind::Action => "action",
                    MenuItemKind::Separator => "separator",
                },
            })
        })
        .collect::<Vec<_>>();
    print_value(&Value::Array(items))
}

fn print_value(value: &Value) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// Response envelopes carry their own failure flag; surface it as exit status.
fn print_envelope(envelope: Value) -> Result<(), Box<dyn std::error::Error>> {
    print_value(&envelope)?;
    if envelope["success"].as_bool() == Some(false) {
        let message = envelope["error"].as_str().unwrap_or("request failed");
        return Err(std::io::Error::other(message.to_string()).into());
    }
    Ok(())
}

fn set_field(message: &mut Value, field: &str, value: Option<String>) {
    if let (Some(value), Some(object)) = (value, message.as_object_mut()) {
        object.insert(field.to_string(), Value::String(value));
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct LoginCliArgs {
    email: String,
    password: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct RegisterCliArgs {
    name: String,
    email: String,
    password: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct OperationCliArgs {
    url: String,
    format: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct RemoveBgCliArgs {
    url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct HistoryCliArgs {
    kind: Option<String>,
    format: Option<String>,
    date: Option<String>,
    search: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct HistoryRemoveCliArgs {
    id: String,
}

fn parse_login_cli_args(args: &[String]) -> Result<LoginCliArgs, Box<dyn std::error::Error>> {
    let mut email = None::<String>;
    let mut password = None::<String>;
    let mut i = 0usize;
    while i < args.len() {
        let flag = args[i].as_str();
        let needs_value = |idx: usize| -> Result<String, Box<dyn std::error::Error>> {
            let Some(value) = args.get(idx + 1) else {
                return Err(std::io::Error::other(format!("Missing value for {flag}")).into());
            };
            Ok(value.clone())
        };

        match flag {
            "--email" => {
                email = Some(needs_value(i)?);
                i += 2;
            }
            "--password" => {
                password = Some(needs_value(i)?);
                i += 2;
            }
            unknown => {
                return Err(std::io::Error::other(format!(
                    "Unknown argument: {unknown}\n\nUse --help for usage."
                ))
                .into());
            }
        }
    }

    let email = require_flag(email, "--email")?;
    let password = require_flag(password, "--password")?;
    Ok(LoginCliArgs { email, password })
}

fn parse_register_cli_args(
    args: &[String],
) -> Result<RegisterCliArgs, Box<dyn std::error::Error>> {
    let mut name = None::<String>;
    let mut email = None::<String>;
    let mut password = None::<String>;
    let mut i = 0usize;
    while i < args.len() {
        let flag = args[i].as_str();
        let needs_value = |idx: usize| -> Result<String, Box<dyn std::error::Error>> {
            let Some(value) = args.get(idx + 1) else {
                return Err(std::io::Error::other(format!("Missing value for {flag}")).into());
            };
            Ok(value.clone())
        };

        match flag {
            "--name" => {
                name = Some(needs_value(i)?);
                i += 2;
            }
            "--email" => {
                email = Some(needs_value(i)?);
                i += 2;
            }
            "--password" => {
                password = Some(needs_value(i)?);
                i += 2;
            }
            unknown => {
                return Err(std::io::Error::other(format!(
                    "Unknown argument: {unknown}\n\nUse --help for usage."
                ))
                .into());
            }
        }
    }

    let name = require_flag(name, "--name")?;
    let email = require_flag(email, "--email")?;
    let password = require_flag(password, "--password")?;
    Ok(RegisterCliArgs {
        name,
        email,
        password,
    })
}

fn parse_operation_cli_args(
    args: &[String],
) -> Result<OperationCliArgs, Box<dyn std::error::Error>> {
    let mut url = None::<String>;
    let mut format = None::<String>;
    let mut i = 0usize;
    while i < args.len() {
        let flag = args[i].as_str();
        let needs_value = |idx: usize| -> Result<String, Box<dyn std::error::Error>> {
            let Some(value) = args.get(idx + 1) else {
                return Err(std::io::Error::other(format!("Missing value for {flag}")).into());
            };
            Ok(value.clone())
        };

        match flag {
            "--url" => {
                url = Some(needs_value(i)?);
                i += 2;
            }
            "--format" => {
                format = Some(needs_value(i)?);
                i += 2;
            }
            unknown => {
                return Err(std::io::Error::other(format!(
                    "Unknown argument: {unknown}\n\nUse --help for usage."
                ))
                .into());
            }
        }
    }

    let url = require_flag(url, "--url")?;
    Ok(OperationCliArgs { url, format })
}

fn parse_remove_bg_cli_args(
    args: &[String],
) -> Result<RemoveBgCliArgs, Box<dyn std::error::Error>> {
    let mut url = None::<String>;
    let mut i = 0usize;
    while i < args.len() {
        let flag = args[i].as_str();
        let needs_value = |idx: usize| -> Result<String, Box<dyn std::error::Error>> {
            let Some(value) = args.get(idx + 1) else {
                return Err(std::io::Error::other(format!("Missing value for {flag}")).into());
            };
            Ok(value.clone())
        };

        match flag {
            "--url" => {
                url = Some(needs_value(i)?);
                i += 2;
            }
            unknown => {
                return Err(std::io::Error::other(format!(
                    "Unknown argument: {unknown}\n\nUse --help for usage."
                ))
                .into());
            }
        }
    }

    let url = require_flag(url, "--url")?;
    Ok(RemoveBgCliArgs { url })
}

fn parse_history_cli_args(args: &[String]) -> Result<HistoryCliArgs, Box<dyn std::error::Error>> {
    let mut parsed = HistoryCliArgs::default();
    let mut i = 0usize;
    while i < args.len() {
        let flag = args[i].as_str();
        let needs_value = |idx: usize| -> Result<String, Box<dyn std::error::Error>> {
            let Some(value) = args.get(idx + 1) else {
                return Err(std::io::Error::other(format!("Missing value for {flag}")).into());
            };
            Ok(value.clone())
        };

        match flag {
            "--type" => {
                parsed.kind = Some(needs_value(i)?);
                i += 2;
            }
            "--format" => {
                parsed.format = Some(needs_value(i)?);
                i += 2;
            }
            "--date" => {
                parsed.date = Some(needs_value(i)?);
                i += 2;
            }
            "--search" => {
                parsed.search = Some(needs_value(i)?);
                i += 2;
            }
            unknown => {
                return Err(std::io::Error::other(format!(
                    "Unknown argument: {unknown}\n\nUse --help for usage."
                ))
                .into());
            }
        }
    }
    Ok(parsed)
}

fn parse_history_remove_cli_args(
    args: &[String],
) -> Result<HistoryRemoveCliArgs, Box<dyn std::error::Error>> {
    let mut id = None::<String>;
    let mut i = 0usize;
    while i < args.len() {
        let flag = args[i].as_str();
        let needs_value = |idx: usize| -> Result<String, Box<dyn std::error::Error>> {
            let Some(value) = args.get(idx + 1) else {
                return Err(std::io::Error::other(format!("Missing value for {flag}")).into());
            };
            Ok(value.clone())
        };

        match flag {
            "--id" => {
                id = Some(needs_value(i)?);
                i += 2;
            }
            unknown => {
                return Err(std::io::Error::other(format!(
                    "Unknown argument: {unknown}\n\nUse --help for usage."
                ))
                .into());
            }
        }
    }

    let id = require_flag(id, "--id")?;
    Ok(HistoryRemoveCliArgs { id })
}

fn parse_settings_set_cli_args(args: &[String]) -> Result<Value, Box<dyn std::error::Error>> {
    let mut patch = serde_json::Map::new();
    let mut i = 0usize;
    while i < args.len() {
        let flag = args[i].as_str();
        let needs_value = |idx: usize| -> Result<String, Box<dyn std::error::Error>> {
            let Some(value) = args.get(idx + 1) else {
                return Err(std::io::Error::other(format!("Missing value for {flag}")).into());
            };
            Ok(value.clone())
        };

        match flag {
            "--provider" => {
                patch.insert(String::from("provider"), Value::String(needs_value(i)?));
                i += 2;
            }
            "--cloud-name" => {
                patch.insert(
                    String::from("cloudinaryCloudName"),
                    Value::String(needs_value(i)?),
                );
                i += 2;
            }
            "--upload-preset" => {
                patch.insert(
                    String::from("cloudinaryUploadPreset"),
                    Value::String(needs_value(i)?),
                );
                i += 2;
            }
            "--remove-bg-key" => {
                patch.insert(
                    String::from("removeBgApiKey"),
                    Value::String(needs_value(i)?),
                );
                i += 2;
            }
            "--default-format" => {
                patch.insert(
                    String::from("defaultFormat"),
                    Value::String(needs_value(i)?),
                );
                i += 2;
            }
            "--auto-download" => {
                patch.insert(
                    String::from("autoDownload"),
                    Value::Bool(parse_bool_flag(flag, needs_value(i)?.as_str())?),
                );
                i += 2;
            }
            "--show-notifications" => {
                patch.insert(
                    String::from("showNotifications"),
                    Value::Bool(parse_bool_flag(flag, needs_value(i)?.as_str())?),
                );
                i += 2;
            }
            unknown => {
                return Err(std::io::Error::other(format!(
                    "Unknown argument: {unknown}\n\nUse --help for usage."
                ))
                .into());
            }
        }
    }

    if patch.is_empty() {
        return Err(std::io::Error::other("Nothing to update; pass at least one flag.").into());
    }
    Ok(Value::Object(patch))
}

fn parse_bool_flag(flag: &str, raw: &str) -> Result<bool, Box<dyn std::error::Error>> {
    match raw {
        "true" => Ok(true),
        "false" => Ok(false),
        other => {
            Err(std::io::Error::other(format!("{flag} expects true or false, got {other}")).into())
        }
    }
}

fn require_flag(
    value: Option<String>,
    flag: &str,
) -> Result<String, Box<dyn std::error::Error>> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| std::io::Error::other(format!("Missing required {flag}")).into())
}

fn print_usage() {
    eprintln!(concat!(
        "Usage:\n",
        "  imagecraft-core <command> [flags]\n\n",
        "Commands:\n",
        "  startup                          restore session, rebuild menu, probe backend\n",
        "  health                           probe backend availability\n",
        "  login --email E --password P     sign in against the local backend\n",
        "  register --name N --email E --password P\n",
        "  logout                           revoke and clear the stored token\n",
        "  whoami                           show the signed-in user and limits\n",
        "  convert --url U [--format F]     convert an image (png/jpg/webp)\n",
        "  copy --url U [--format F]        convert and copy to the clipboard\n",
        "  remove-bg --url U                remove the background (PNG result)\n",
        "  history [--type T] [--format F] [--date D] [--search S]\n",
        "  history-remove --id ID           delete one history entry\n",
        "  history-clear                    delete all history entries\n",
        "  stats                            show usage counters\n",
        "  stats-reset                      zero the usage counters\n",
        "  settings-show                    print current settings\n",
        "  settings-set [--provider P] [--cloud-name C] [--upload-preset U]\n",
        "               [--remove-bg-key K] [--default-format F]\n",
        "               [--auto-download B] [--show-notifications B]\n",
        "  settings-reset                   restore default settings\n",
        "  menu                             print the context-menu catalog\n\n",
        "State lives under IMAGECRAFT_DATA_DIR (default: ./var/imagecraft);\n",
        "the backend origin comes from IMAGECRAFT_BACKEND_URL.\n"
    ));
}
