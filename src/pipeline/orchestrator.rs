use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;

use crate::history::{HistoryDraft, OperationType, StatCounter, StateStore};
use crate::pipeline::naming::download_filename;
use crate::pipeline::request::{
    validate_operation_request, OperationRequest, OperationRequestError,
};
use crate::platform::{DownloadRequest, Platform};
use crate::provider::local_backend::{SharedBackendAuthOps, User};
use crate::provider::{ProviderBuildError, ProviderCallError, SharedProviderFactory};
use crate::session::{Session, SessionError};
use crate::settings::{ImageFormat, ProviderKind, Settings, SettingsStore};

pub const NOTIFY_TITLE: &str = "ImageCraft";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationOutcome {
    pub kind: OperationType,
    pub processed_url: String,
    // Set when a file actually reached the downloads surface.
    pub downloaded_as: Option<String>,
    pub entry_id: Option<String>,
}

pub struct OperationOrchestrator {
    platform: Platform,
    settings: SettingsStore,
    state: StateStore,
    session: Arc<Session>,
    providers: SharedProviderFactory,
    auth: SharedBackendAuthOps,
}

impl OperationOrchestrator {
    pub fn new(
        platform: Platform,
        settings: SettingsStore,
        state: StateStore,
        session: Arc<Session>,
        providers: SharedProviderFactory,
        auth: SharedBackendAuthOps,
    ) -> Self {
        Self {
            platform,
            settings,
            state,
            session,
            providers,
            auth,
        }
    }

    pub fn execute(&self, request: &OperationRequest) -> Result<OperationOutcome, OperationError> {
        validate_operation_request(request)?;
        self.show_loading_indicator(request);
        let result = self.process(request);
        self.hide_page_indicator(request);
        match &result {
            Ok(outcome) => {
                tracing::info!(
                    kind = outcome.kind.as_str(),
                    url = request.source_url.as_str(),
                    "operation finished"
                );
                self.notify(success_message(outcome.kind));
            }
            Err(error) => {
                tracing::warn!(
                    kind = request.kind.as_str(),
                    url = request.source_url.as_str(),
                    error = %error,
                    "operation failed"
                );
                self.show_error_indicator(request, &error.to_string());
                self.notify(&format!("Image processing failed: {error}"));
            }
        }
        result
    }

    fn process(&self, request: &OperationRequest) -> Result<OperationOutcome, OperationError> {
        let settings = self
            .settings
            .get()
            .map_err(|e| OperationError::Platform(e.to_string()))?;

        if settings.provider == ProviderKind::LocalBackend && !self.session.backend_available() {
            return Err(OperationError::BackendUnavailable);
        }

        let token = self.session.token();
        let provider = self
            .providers
            .build(&settings, token.as_deref())
            .map_err(build_error)?;

        let source_url = request.source_url.as_str();
        let processed_url = match (request.kind, request.format) {
            (OperationType::BgRemoved, _) => provider.remove_background(source_url),
            (_, Some(format)) => provider.convert(source_url, format),
            (kind, None) => {
                return Err(OperationError::Configuration(format!(
                    "target format is required for '{}' operations",
                    kind.as_str()
                )))
            }
        }
        .map_err(provider_error)?;

        let filename = download_filename(
            request.kind,
            source_url,
            request.output_extension(),
            Utc::now().timestamp_millis(),
        );

        let downloaded_as = match request.kind {
            OperationType::Converted => {
                self.platform
                    .downloads
                    .download(&DownloadRequest {
                        url: processed_url.clone(),
                        filename: filename.clone(),
                        save_as: !settings.auto_download,
                    })
                    .map_err(|e| OperationError::Platform(e.to_string()))?;
                Some(filename.clone())
            }
            OperationType::Copied | OperationType::BgRemoved => {
                self.copy_to_clipboard(request, processed_url.as_str())?;
                self.best_effort_download(&settings, processed_url.as_str(), filename.as_str())
            }
        };

        let entry_id = self.record_history(request, processed_url.as_str(), filename.as_str());

        Ok(OperationOutcome {
            kind: request.kind,
            processed_url,
            downloaded_as,
            entry_id,
        })
    }

    fn copy_to_clipboard(
        &self,
        request: &OperationRequest,
        processed_url: &str,
    ) -> Result<(), OperationError> {
        let resource = self
            .platform
            .fetcher
            .fetch(processed_url)
            .map_err(|e| OperationError::Platform(e.to_string()))?;
        let Some(tab_id) = request.tab_id else {
            return Err(OperationError::Platform(String::from(
                "no page available for clipboard write",
            )));
        };
        self.platform
            .scripting
            .write_clipboard(tab_id, resource.bytes.as_slice(), resource.mime.as_str())
            .map_err(|e| OperationError::Platform(e.to_string()))
    }

    fn best_effort_download(
        &self,
        settings: &Settings,
        url: &str,
        filename: &str,
    ) -> Option<String> {
        if !settings.auto_download {
            return None;
        }
        let request = DownloadRequest {
            url: url.to_string(),
            filename: filename.to_string(),
            save_as: false,
        };
        match self.platform.downloads.download(&request) {
            Ok(_) => Some(filename.to_string()),
            Err(error) => {
                tracing::warn!(filename, error = %error, "optional download failed");
                None
            }
        }
    }

    fn record_history(
        &self,
        request: &OperationRequest,
        processed_url: &str,
        filename: &str,
    ) -> Option<String> {
        let draft = HistoryDraft {
            url: processed_url.to_string(),
            original_url: request.source_url.clone(),
            format: request.format.unwrap_or(ImageFormat::Png),
            filename: filename.to_string(),
            kind: request.kind,
        };
        let entry_id = match self.state.append(draft) {
            Ok(entry) => Some(entry.id),
            Err(error) => {
                tracing::warn!(error = %error, "history append failed");
                None
            }
        };
        let counter = match request.kind {
            OperationType::BgRemoved => StatCounter::BackgroundsRemoved,
            _ => StatCounter::ImagesProcessed,
        };
        if let Err(error) = self.state.increment(counter) {
            tracing::warn!(error = %error, "statistics update failed");
        }
        entry_id
    }

    pub fn login(&self, email: &str, password: &str) -> Result<User, OperationError> {
        let auth = self.auth.login(email, password).map_err(provider_error)?;
        self.session
            .store_token(auth.token.as_str())
            .map_err(session_error)?;
        tracing::info!(email, "logged in");
        Ok(auth.user)
    }

    pub fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<User, OperationError> {
        let auth = self
            .auth
            .register(name, email, password)
            .map_err(provider_error)?;
        self.session
            .store_token(auth.token.as_str())
            .map_err(session_error)?;
        tracing::info!(email, "registered");
        Ok(auth.user)
    }

    pub fn logout(&self) -> Result<(), OperationError> {
        if let Some(token) = self.session.token() {
            if let Err(error) = self.auth.revoke_session(token.as_str()) {
                tracing::warn!(error = %error, "remote logout failed");
            }
        }
        self.session.clear_token().map_err(session_error)
    }

    pub fn current_user(&self) -> Result<User, OperationError> {
        let token = self
            .session
            .token()
            .ok_or_else(|| OperationError::Authentication(String::from("not logged in")))?;
        match self.auth.fetch_current_user(token.as_str()) {
            Ok(user) => Ok(user),
            Err(ProviderCallError::Unauthorized(message)) => {
                if let Err(error) = self.session.clear_token() {
                    tracing::warn!(error = %error, "failed to drop stale token");
                }
                Err(OperationError::Authentication(message))
            }
            Err(error) => Err(provider_error(error)),
        }
    }

    pub fn check_health(&self) -> bool {
        let available = self.auth.probe_health();
        self.session.set_backend_available(available);
        tracing::info!(available, "backend health probe");
        available
    }

    fn show_loading_indicator(&self, request: &OperationRequest) {
        let Some(tab_id) = request.tab_id else { return };
        let message = match request.kind {
            OperationType::Converted => "Converting image...",
            OperationType::Copied => "Copying image...",
            OperationType::BgRemoved => "Removing background...",
        };
        if let Err(error) = self.platform.scripting.show_loading(tab_id, message) {
            tracing::warn!(tab_id, error = %error, "loading indicator failed");
        }
    }

    fn hide_page_indicator(&self, request: &OperationRequest) {
        let Some(tab_id) = request.tab_id else { return };
        if let Err(error) = self.platform.scripting.hide_indicator(tab_id) {
            tracing::warn!(tab_id, error = %error, "indicator teardown failed");
        }
    }

    fn show_error_indicator(&self, request: &OperationRequest, message: &str) {
        let Some(tab_id) = request.tab_id else { return };
        if let Err(error) = self.platform.scripting.show_error(tab_id, message) {
            tracing::warn!(tab_id, error = %error, "error indicator failed");
        }
    }

    fn notify(&self, message: &str) {
        let Some(notifications) = self.platform.notifications.as_ref() else {
            return;
        };
        let enabled = self
            .settings
            .get()
            .map(|settings| settings.show_notifications)
            .unwrap_or(true);
        if !enabled {
            return;
        }
        if let Err(error) = notifications.notify(NOTIFY_TITLE, message) {
            tracing::warn!(error = %error, "notification failed");
        }
    }
}

fn success_message(kind: OperationType) -> &'static str {
    match kind {
        OperationType::Converted => "Image converted and downloaded",
        OperationType::Copied => "Image copied to clipboard",
        OperationType::BgRemoved => "Background removed and image copied",
    }
}

fn build_error(error: ProviderBuildError) -> OperationError {
    match error {
        ProviderBuildError::Configuration(message) => OperationError::Configuration(message),
        ProviderBuildError::NotLoggedIn => {
            OperationError::Authentication(String::from("not logged in"))
        }
    }
}

fn provider_error(error: ProviderCallError) -> OperationError {
    match error {
        ProviderCallError::Unauthorized(message) => OperationError::Authentication(message),
        other => OperationError::Provider(other.to_string()),
    }
}

fn session_error(error: SessionError) -> OperationError {
    OperationError::Platform(error.to_string())
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OperationError {
    #[error("{0}")]
    Configuration(String),
    #[error("backend server is not available")]
    BackendUnavailable,
    #[error("{0}")]
    Authentication(String),
    #[error("{0}")]
    Provider(String),
    #[error("{0}")]
    Platform(String),
}

impl From<OperationRequestError> for OperationError {
    fn from(error: OperationRequestError) -> Self {
        OperationError::Configuration(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::HistoryFilter;
    use crate::platform::memory::MemoryStorageArea;
    use crate::platform::{
        ContextMenus, Downloads, FetchedResource, MenuItem, Notifications, PageScripting,
        PlatformCallError, ResourceFetcher, SharedStorageArea, Tabs,
    };
    use crate::provider::local_backend::{AuthSession, BackendAuthOps};
    use crate::provider::{ProviderClient, ProviderFactory, SharedProviderClient};
    use crate::settings::SettingsPatch;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct FakeScripting {
        events: Mutex<Vec<String>>,
    }

    impl FakeScripting {
        fn push(&self, event: String) {
            self.events
                .lock()
                .expect("fake scripting mutex poisoned")
                .push(event);
        }

        fn take_events(&self) -> Vec<String> {
            std::mem::take(&mut *self.events.lock().expect("fake scripting mutex poisoned"))
        }
    }

    impl PageScripting for FakeScripting {
        fn show_loading(&self, tab_id: i64, message: &str) -> Result<(), PlatformCallError> {
            self.push(format!("loading:{tab_id}:{message}"));
            Ok(())
        }

        fn show_error(&self, tab_id: i64, message: &str) -> Result<(), PlatformCallError> {
            self.push(format!("error:{tab_id}:{message}"));
            Ok(())
        }

        fn hide_indicator(&self, tab_id: i64) -> Result<(), PlatformCallError> {
            self.push(format!("hide:{tab_id}"));
            Ok(())
        }

        fn write_clipboard(
            &self,
            tab_id: i64,
            bytes: &[u8],
            mime: &str,
        ) -> Result<(), PlatformCallError> {
            self.push(format!("clipboard:{tab_id}:{mime}:{}", bytes.len()));
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeDownloads {
        seen: Mutex<Vec<DownloadRequest>>,
        fail: AtomicBool,
    }

    impl FakeDownloads {
        fn failing() -> Self {
            let downloads = Self::default();
            downloads.fail.store(true, Ordering::SeqCst);
            downloads
        }

        fn take_seen(&self) -> Vec<DownloadRequest> {
            std::mem::take(&mut *self.seen.lock().expect("fake downloads mutex poisoned"))
        }
    }

    impl Downloads for FakeDownloads {
        fn download(&self, request: &DownloadRequest) -> Result<u64, PlatformCallError> {
            self.seen
                .lock()
                .expect("fake downloads mutex poisoned")
                .push(request.clone());
            if self.fail.load(Ordering::SeqCst) {
                return Err(PlatformCallError::Download(String::from("disk full")));
            }
            Ok(1)
        }
    }

    #[derive(Default)]
    struct FakeNotifications {
        seen: Mutex<Vec<(String, String)>>,
    }

    impl FakeNotifications {
        fn take_seen(&self) -> Vec<(String, String)> {
            std::mem::take(
                &mut *self
                    .seen
                    .lock()
                    .expect("fake notifications mutex poisoned"),
            )
        }
    }

    impl Notifications for FakeNotifications {
        fn notify(&self, title: &str, message: &str) -> Result<(), PlatformCallError> {
            self.seen
                .lock()
                .expect("fake notifications mutex poisoned")
                .push((title.to_string(), message.to_string()));
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeFetcher {
        seen: Mutex<Vec<String>>,
    }

    impl FakeFetcher {
        fn take_seen(&self) -> Vec<String> {
            std::mem::take(&mut *self.seen.lock().expect("fake fetcher mutex poisoned"))
        }
    }

    impl ResourceFetcher for FakeFetcher {
        fn fetch(&self, url: &str) -> Result<FetchedResource, PlatformCallError> {
            self.seen
                .lock()
                .expect("fake fetcher mutex poisoned")
                .push(url.to_string());
            Ok(FetchedResource {
                bytes: vec![1, 2, 3],
                mime: String::from("image/png"),
            })
        }
    }

    struct FakeTabs;

    impl Tabs for FakeTabs {
        fn open(&self, _url: &str) -> Result<(), PlatformCallError> {
            Ok(())
        }
    }

    struct FakeMenus;

    impl ContextMenus for FakeMenus {
        fn rebuild(&self, _items: &[MenuItem]) -> Result<(), PlatformCallError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeProvider {
        convert_seen: Mutex<Vec<(String, ImageFormat)>>,
        remove_seen: Mutex<Vec<String>>,
        next: Mutex<Option<Result<String, ProviderCallError>>>,
    }

    impl FakeProvider {
        fn with_next(result: Result<String, ProviderCallError>) -> Self {
            Self {
                next: Mutex::new(Some(result)),
                ..Self::default()
            }
        }

        fn take_converts(&self) -> Vec<(String, ImageFormat)> {
            std::mem::take(
                &mut *self
                    .convert_seen
                    .lock()
                    .expect("fake provider mutex poisoned"),
            )
        }

        fn take_removes(&self) -> Vec<String> {
            std::mem::take(
                &mut *self
                    .remove_seen
                    .lock()
                    .expect("fake provider mutex poisoned"),
            )
        }

        fn pop_next(&self) -> Result<String, ProviderCallError> {
            self.next
                .lock()
                .expect("fake provider mutex poisoned")
                .take()
                .unwrap_or_else(|| Ok(String::from("https://cdn.example.com/out.png")))
        }
    }

    impl ProviderClient for FakeProvider {
        fn convert(
            &self,
            image_url: &str,
            format: ImageFormat,
        ) -> Result<String, ProviderCallError> {
            self.convert_seen
                .lock()
                .expect("fake provider mutex poisoned")
                .push((image_url.to_string(), format));
            self.pop_next()
        }

        fn remove_background(&self, image_url: &str) -> Result<String, ProviderCallError> {
            self.remove_seen
                .lock()
                .expect("fake provider mutex poisoned")
                .push(image_url.to_string());
            self.pop_next()
        }

        fn health_check(&self) -> bool {
            true
        }
    }

    struct FakeFactory {
        provider: Arc<FakeProvider>,
        seen_tokens: Mutex<Vec<Option<String>>>,
        fail: Mutex<Option<ProviderBuildError>>,
    }

    impl FakeFactory {
        fn new(provider: Arc<FakeProvider>) -> Self {
            Self {
                provider,
                seen_tokens: Mutex::new(Vec::new()),
                fail: Mutex::new(None),
            }
        }

        fn take_tokens(&self) -> Vec<Option<String>> {
            std::mem::take(&mut *self.seen_tokens.lock().expect("fake factory mutex poisoned"))
        }
    }

    impl ProviderFactory for FakeFactory {
        fn build(
            &self,
            _settings: &Settings,
            auth_token: Option<&str>,
        ) -> Result<SharedProviderClient, ProviderBuildError> {
            self.seen_tokens
                .lock()
                .expect("fake factory mutex poisoned")
                .push(auth_token.map(String::from));
            if let Some(error) = self.fail.lock().expect("fake factory mutex poisoned").take() {
                return Err(error);
            }
            Ok(self.provider.clone())
        }
    }

    #[derive(Default)]
    struct FakeAuth {
        next_session: Mutex<Option<Result<AuthSession, ProviderCallError>>>,
        next_user: Mutex<Option<Result<User, ProviderCallError>>>,
        revoked: Mutex<Vec<String>>,
        healthy: AtomicBool,
    }

    impl FakeAuth {
        fn take_revoked(&self) -> Vec<String> {
            std::mem::take(&mut *self.revoked.lock().expect("fake auth mutex poisoned"))
        }
    }

    impl BackendAuthOps for FakeAuth {
        fn login(&self, email: &str, _password: &str) -> Result<AuthSession, ProviderCallError> {
            self.next_session
                .lock()
                .expect("fake auth mutex poisoned")
                .take()
                .unwrap_or_else(|| {
                    Ok(AuthSession {
                        token: String::from("tok-1"),
                        user: User {
                            email: email.to_string(),
                            ..User::default()
                        },
                    })
                })
        }

        fn register(
            &self,
            _name: &str,
            email: &str,
            _password: &str,
        ) -> Result<AuthSession, ProviderCallError> {
            self.next_session
                .lock()
                .expect("fake auth mutex poisoned")
                .take()
                .unwrap_or_else(|| {
                    Ok(AuthSession {
                        token: String::from("tok-2"),
                        user: User {
                            email: email.to_string(),
                            ..User::default()
                        },
                    })
                })
        }

        fn fetch_current_user(&self, _token: &str) -> Result<User, ProviderCallError> {
            self.next_user
                .lock()
                .expect("fake auth mutex poisoned")
                .take()
                .unwrap_or_else(|| Ok(User::default()))
        }

        fn revoke_session(&self, token: &str) -> Result<(), ProviderCallError> {
            self.revoked
                .lock()
                .expect("fake auth mutex poisoned")
                .push(token.to_string());
            Ok(())
        }

        fn probe_health(&self) -> bool {
            self.healthy.load(Ordering::SeqCst)
        }
    }

    struct Harness {
        orchestrator: OperationOrchestrator,
        scripting: Arc<FakeScripting>,
        downloads: Arc<FakeDownloads>,
        notifications: Arc<FakeNotifications>,
        fetcher: Arc<FakeFetcher>,
        provider: Arc<FakeProvider>,
        factory: Arc<FakeFactory>,
        auth: Arc<FakeAuth>,
        settings: SettingsStore,
        state: StateStore,
        session: Arc<Session>,
    }

    fn harness_with(provider: Arc<FakeProvider>, downloads: Arc<FakeDownloads>) -> Harness {
        let sync_area: SharedStorageArea = Arc::new(MemoryStorageArea::new());
        let local_area: SharedStorageArea = Arc::new(MemoryStorageArea::new());
        let scripting = Arc::new(FakeScripting::default());
        let notifications = Arc::new(FakeNotifications::default());
        let fetcher = Arc::new(FakeFetcher::default());
        let factory = Arc::new(FakeFactory::new(provider.clone()));
        let auth = Arc::new(FakeAuth::default());

        let settings = SettingsStore::new(sync_area.clone());
        let state = StateStore::new(local_area.clone());
        let session = Arc::new(Session::new(local_area.clone()));
        session.set_backend_available(true);

        let platform = Platform {
            sync_storage: sync_area,
            local_storage: local_area,
            downloads: downloads.clone(),
            scripting: scripting.clone(),
            notifications: Some(notifications.clone()),
            tabs: Arc::new(FakeTabs),
            menus: Arc::new(FakeMenus),
            fetcher: fetcher.clone(),
        };
        let orchestrator = OperationOrchestrator::new(
            platform,
            settings.clone(),
            state.clone(),
            session.clone(),
            factory.clone(),
            auth.clone(),
        );

        Harness {
            orchestrator,
            scripting,
            downloads,
            notifications,
            fetcher,
            provider,
            factory,
            auth,
            settings,
            state,
            session,
        }
    }

    fn harness() -> Harness {
        harness_with(
            Arc::new(FakeProvider::default()),
            Arc::new(FakeDownloads::default()),
        )
    }

    #[test]
    fn convert_downloads_and_records() {
        let h = harness();
        let request =
            OperationRequest::convert("https://pics.example.com/sunset.png", ImageFormat::Jpg)
                .with_tab(7);

        let outcome = h.orchestrator.execute(&request).expect("convert should succeed");
        assert_eq!(outcome.kind, OperationType::Converted);
        assert_eq!(outcome.processed_url, "https://cdn.example.com/out.png");
        let downloaded = outcome.downloaded_as.expect("convert should download");
        assert!(downloaded.starts_with("sunset_"));
        assert!(downloaded.ends_with(".jpg"));

        let converts = h.provider.take_converts();
        assert_eq!(
            converts,
            vec![(
                String::from("https://pics.example.com/sunset.png"),
                ImageFormat::Jpg
            )]
        );

        let downloads = h.downloads.take_seen();
        assert_eq!(downloads.len(), 1);
        assert_eq!(downloads[0].url, "https://cdn.example.com/out.png");
        assert!(!downloads[0].save_as);

        let entries = h
            .state
            .list(&HistoryFilter::default())
            .expect("history should list");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, OperationType::Converted);
        assert_eq!(entries[0].format, ImageFormat::Jpg);
        assert_eq!(entries[0].original_url, "https://pics.example.com/sunset.png");
        assert_eq!(Some(entries[0].id.clone()), outcome.entry_id);

        let stats = h.state.statistics().expect("statistics should load");
        assert_eq!(stats.images_processed, 1);
        assert_eq!(stats.backgrounds_removed, 0);

        assert_eq!(
            h.scripting.take_events(),
            vec![
                String::from("loading:7:Converting image..."),
                String::from("hide:7"),
            ]
        );
        assert_eq!(
            h.notifications.take_seen(),
            vec![(
                String::from("ImageCraft"),
                String::from("Image converted and downloaded")
            )]
        );
    }

    #[test]
    fn convert_prompts_for_location_when_auto_download_is_off() {
        let h = harness();
        h.settings
            .set(&SettingsPatch {
                auto_download: Some(false),
                ..SettingsPatch::default()
            })
            .expect("settings update should succeed");

        h.orchestrator
            .execute(
                &OperationRequest::convert("https://pics.example.com/a.png", ImageFormat::Png)
                    .with_tab(1),
            )
            .expect("convert should succeed");

        let downloads = h.downloads.take_seen();
        assert_eq!(downloads.len(), 1);
        assert!(downloads[0].save_as);
    }

    #[test]
    fn copy_writes_clipboard_then_downloads() {
        let h = harness();
        let outcome = h
            .orchestrator
            .execute(
                &OperationRequest::copy("https://pics.example.com/cat.png", ImageFormat::Png)
                    .with_tab(3),
            )
            .expect("copy should succeed");

        assert_eq!(
            h.fetcher.take_seen(),
            vec![String::from("https://cdn.example.com/out.png")]
        );
        let events = h.scripting.take_events();
        assert!(events.contains(&String::from("clipboard:3:image/png:3")));

        let downloads = h.downloads.take_seen();
        assert_eq!(downloads.len(), 1);
        assert!(downloads[0].filename.starts_with("copied_cat_"));
        assert_eq!(
            outcome.downloaded_as.as_deref(),
            Some(downloads[0].filename.as_str())
        );

        let stats = h.state.statistics().expect("statistics should load");
        assert_eq!(stats.images_processed, 1);
    }

    #[test]
    fn copy_skips_download_when_disabled() {
        let h = harness();
        h.settings
            .set(&SettingsPatch {
                auto_download: Some(false),
                ..SettingsPatch::default()
            })
            .expect("settings update should succeed");

        let outcome = h
            .orchestrator
            .execute(
                &OperationRequest::copy("https://pics.example.com/cat.png", ImageFormat::Png)
                    .with_tab(3),
            )
            .expect("copy should succeed");

        assert!(h.downloads.take_seen().is_empty());
        assert_eq!(outcome.downloaded_as, None);
        // The clipboard write still happened.
        assert!(h
            .scripting
            .take_events()
            .contains(&String::from("clipboard:3:image/png:3")));
    }

    #[test]
    fn background_removal_uses_its_own_counter() {
        let h = harness();
        let outcome = h
            .orchestrator
            .execute(
                &OperationRequest::remove_background("https://pics.example.com/cat.png")
                    .with_tab(1),
            )
            .expect("background removal should succeed");

        assert_eq!(
            h.provider.take_removes(),
            vec![String::from("https://pics.example.com/cat.png")]
        );
        assert!(outcome
            .downloaded_as
            .expect("download should run")
            .starts_with("no_bg_cat_"));

        let stats = h.state.statistics().expect("statistics should load");
        assert_eq!(stats.images_processed, 0);
        assert_eq!(stats.backgrounds_removed, 1);

        let entries = h
            .state
            .list(&HistoryFilter::default())
            .expect("history should list");
        assert_eq!(entries[0].kind, OperationType::BgRemoved);
        assert_eq!(entries[0].format, ImageFormat::Png);
    }

    #[test]
    fn unavailable_backend_fails_fast() {
        let h = harness();
        h.session.set_backend_available(false);

        let err = h
            .orchestrator
            .execute(
                &OperationRequest::convert("https://pics.example.com/a.png", ImageFormat::Png)
                    .with_tab(2),
            )
            .expect_err("gated operation should fail");

        assert_eq!(err, OperationError::BackendUnavailable);
        assert!(h.factory.take_tokens().is_empty());
        assert!(h
            .state
            .list(&HistoryFilter::default())
            .expect("history should list")
            .is_empty());
        assert_eq!(
            h.scripting.take_events(),
            vec![
                String::from("loading:2:Converting image..."),
                String::from("hide:2"),
                String::from("error:2:backend server is not available"),
            ]
        );
        let notified = h.notifications.take_seen();
        assert_eq!(notified.len(), 1);
        assert!(notified[0].1.contains("backend server is not available"));
    }

    #[test]
    fn provider_failure_leaves_no_trace() {
        let provider = Arc::new(FakeProvider::with_next(Err(ProviderCallError::Upstream(
            String::from("HTTP 500: boom"),
        ))));
        let h = harness_with(provider, Arc::new(FakeDownloads::default()));

        let err = h
            .orchestrator
            .execute(
                &OperationRequest::convert("https://pics.example.com/a.png", ImageFormat::Png)
                    .with_tab(4),
            )
            .expect_err("provider failure should propagate");

        assert!(matches!(err, OperationError::Provider(_)));
        assert!(h.downloads.take_seen().is_empty());
        assert!(h
            .state
            .list(&HistoryFilter::default())
            .expect("history should list")
            .is_empty());
        let stats = h.state.statistics().expect("statistics should load");
        assert_eq!(stats.images_processed, 0);
    }

    #[test]
    fn download_failure_fails_the_conversion() {
        let h = harness_with(
            Arc::new(FakeProvider::default()),
            Arc::new(FakeDownloads::failing()),
        );

        let err = h
            .orchestrator
            .execute(
                &OperationRequest::convert("https://pics.example.com/a.png", ImageFormat::Png)
                    .with_tab(1),
            )
            .expect_err("failed download should fail the operation");

        assert!(matches!(err, OperationError::Platform(_)));
        assert!(h
            .state
            .list(&HistoryFilter::default())
            .expect("history should list")
            .is_empty());
    }

    #[test]
    fn optional_download_failure_keeps_the_copy() {
        let h = harness_with(
            Arc::new(FakeProvider::default()),
            Arc::new(FakeDownloads::failing()),
        );

        let outcome = h
            .orchestrator
            .execute(
                &OperationRequest::copy("https://pics.example.com/a.png", ImageFormat::Png)
                    .with_tab(1),
            )
            .expect("copy should survive a failed optional download");

        assert_eq!(outcome.downloaded_as, None);
        let entries = h
            .state
            .list(&HistoryFilter::default())
            .expect("history should list");
        assert_eq!(entries.len(), 1);
        let stats = h.state.statistics().expect("statistics should load");
        assert_eq!(stats.images_processed, 1);
    }

    #[test]
    fn missing_login_maps_to_authentication() {
        let provider = Arc::new(FakeProvider::default());
        let h = harness_with(provider.clone(), Arc::new(FakeDownloads::default()));
        *h.factory.fail.lock().expect("fake factory mutex poisoned") =
            Some(ProviderBuildError::NotLoggedIn);

        let err = h
            .orchestrator
            .execute(
                &OperationRequest::convert("https://pics.example.com/a.png", ImageFormat::Png)
                    .with_tab(1),
            )
            .expect_err("missing login should fail");

        assert_eq!(err, OperationError::Authentication(String::from("not logged in")));
        assert!(provider.take_converts().is_empty());
    }

    #[test]
    fn invalid_request_never_touches_the_page() {
        let h = harness();
        let err = h
            .orchestrator
            .execute(&OperationRequest::convert("   ", ImageFormat::Png).with_tab(1))
            .expect_err("blank source url should fail");

        assert!(matches!(err, OperationError::Configuration(_)));
        assert!(h.scripting.take_events().is_empty());
        assert!(h.factory.take_tokens().is_empty());
    }

    #[test]
    fn notifications_honor_the_settings_toggle() {
        let h = harness();
        h.settings
            .set(&SettingsPatch {
                show_notifications: Some(false),
                ..SettingsPatch::default()
            })
            .expect("settings update should succeed");

        h.orchestrator
            .execute(
                &OperationRequest::convert("https://pics.example.com/a.png", ImageFormat::Png)
                    .with_tab(1),
            )
            .expect("convert should succeed");

        assert!(h.notifications.take_seen().is_empty());
    }

    #[test]
    fn login_stores_the_session_token() {
        let h = harness();
        let user = h
            .orchestrator
            .login("ada@example.com", "hunter2")
            .expect("login should succeed");
        assert_eq!(user.email, "ada@example.com");
        assert_eq!(h.session.token().as_deref(), Some("tok-1"));
    }

    #[test]
    fn logout_revokes_and_clears_the_token() {
        let h = harness();
        h.session.store_token("tok-9").expect("token should store");

        h.orchestrator.logout().expect("logout should succeed");

        assert_eq!(h.auth.take_revoked(), vec![String::from("tok-9")]);
        assert_eq!(h.session.token(), None);
    }

    #[test]
    fn current_user_requires_a_token() {
        let h = harness();
        let err = h
            .orchestrator
            .current_user()
            .expect_err("missing token should fail");
        assert_eq!(
            err,
            OperationError::Authentication(String::from("not logged in"))
        );
    }

    #[test]
    fn stale_token_is_dropped_on_rejection() {
        let h = harness();
        h.session.store_token("tok-old").expect("token should store");
        *h.auth.next_user.lock().expect("fake auth mutex poisoned") =
            Some(Err(ProviderCallError::Unauthorized(String::from("expired"))));

        let err = h
            .orchestrator
            .current_user()
            .expect_err("stale token should fail");

        assert_eq!(err, OperationError::Authentication(String::from("expired")));
        assert_eq!(h.session.token(), None);
    }

    #[test]
    fn health_probe_updates_the_session_flag() {
        let h = harness();
        h.auth.healthy.store(true, Ordering::SeqCst);
        assert!(h.orchestrator.check_health());
        assert!(h.session.backend_available());

        h.auth.healthy.store(false, Ordering::SeqCst);
        assert!(!h.orchestrator.check_health());
        assert!(!h.session.backend_available());
    }
}
