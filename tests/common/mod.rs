#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Semaphore};

use fluxsync::db::{self, Pool};
use fluxsync::error::ClientError;
use fluxsync::model::{LocalId, PostModel, RemoteId, SiteModel, ThemeModel};
use fluxsync::network::{PostClient, PostsPage, SiteClient, ThemeClient};
use fluxsync::Clients;

pub const WAIT: Duration = Duration::from_secs(5);

/// A file-backed cache in a temp dir, migrated. Keep the `TempDir` alive for the test.
pub async fn setup_pool() -> (Pool, tempfile::TempDir) {
    let td = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", td.path().join("cache.db").display());
    let pool = db::init_pool(&url).await.unwrap();
    db::run_migrations(&pool).await.unwrap();
    (pool, td)
}

pub fn wpcom_site() -> SiteModel {
    SiteModel {
        site_id: Some(RemoteId(556)),
        name: "A WP.com site".into(),
        url: "https://pony.wordpress.com".into(),
        is_wpcom: true,
        is_visible: true,
        ..Default::default()
    }
}

pub fn self_hosted_site() -> SiteModel {
    SiteModel {
        self_hosted_site_id: Some(6),
        name: "A self-hosted site".into(),
        url: "http://some.url".into(),
        xmlrpc_url: Some("http://some.url/xmlrpc.php".into()),
        is_visible: true,
        ..Default::default()
    }
}

pub fn jetpack_site() -> SiteModel {
    SiteModel {
        site_id: Some(RemoteId(982)),
        self_hosted_site_id: Some(8),
        name: "A Jetpack site".into(),
        url: "http://jetpack.url".into(),
        xmlrpc_url: Some("http://jetpack.url/xmlrpc.php".into()),
        is_jetpack_connected: true,
        is_visible: true,
        ..Default::default()
    }
}

pub fn jetpack_rest_site() -> SiteModel {
    SiteModel {
        site_id: Some(RemoteId(5623)),
        name: "A Jetpack site over REST".into(),
        url: "http://jetpack-rest.url".into(),
        is_jetpack_connected: true,
        is_visible: true,
        ..Default::default()
    }
}

pub async fn stored(pool: &Pool, site: SiteModel) -> SiteModel {
    let (site, _) = db::site::insert_or_update_site(pool, &site).await.unwrap();
    site
}

pub fn uploaded_post(site: LocalId, remote: i64) -> PostModel {
    PostModel {
        remote_post_id: Some(RemoteId(remote)),
        title: "A test post".into(),
        content: "Bunch of content here".into(),
        status: "publish".into(),
        date_created: "1955-11-05T14:15:00+0000".into(),
        ..PostModel::new(site)
    }
}

pub fn local_draft(site: LocalId) -> PostModel {
    PostModel {
        title: "A local draft".into(),
        content: "Not uploaded yet".into(),
        status: "draft".into(),
        is_local_draft: true,
        ..PostModel::new(site)
    }
}

pub fn locally_changed(site: LocalId, remote: i64) -> PostModel {
    PostModel {
        title: "A test post (edited)".into(),
        is_locally_changed: true,
        ..uploaded_post(site, remote)
    }
}

pub fn theme(theme_id: &str, name: &str) -> ThemeModel {
    ThemeModel::new(theme_id, name)
}

pub fn rejected(message: &str) -> ClientError {
    ClientError::RemoteRejection {
        code: "unknown_error".into(),
        message: message.into(),
    }
}

/// Scripted client: each call pops the next queued response and records its name.
#[derive(Clone, Default)]
pub struct RecordingClient {
    sites: Arc<Mutex<VecDeque<Result<Vec<SiteModel>, ClientError>>>>,
    theme_lists: Arc<Mutex<VecDeque<Result<Vec<ThemeModel>, ClientError>>>>,
    themes: Arc<Mutex<VecDeque<Result<ThemeModel, ClientError>>>>,
    post_pages: Arc<Mutex<VecDeque<Result<PostsPage, ClientError>>>>,
    posts: Arc<Mutex<VecDeque<Result<PostModel, ClientError>>>>,
    calls: Arc<Mutex<Vec<String>>>,
    offsets: Arc<Mutex<Vec<u32>>>,
}

impl RecordingClient {
    pub fn clients(&self) -> Clients {
        let client = Arc::new(self.clone());
        Clients {
            site: client.clone(),
            theme: client.clone(),
            post: client,
        }
    }

    pub async fn push_sites(&self, r: Result<Vec<SiteModel>, ClientError>) {
        self.sites.lock().await.push_back(r);
    }

    pub async fn push_theme_list(&self, r: Result<Vec<ThemeModel>, ClientError>) {
        self.theme_lists.lock().await.push_back(r);
    }

    pub async fn push_theme(&self, r: Result<ThemeModel, ClientError>) {
        self.themes.lock().await.push_back(r);
    }

    pub async fn push_post_page(&self, r: Result<PostsPage, ClientError>) {
        self.post_pages.lock().await.push_back(r);
    }

    pub async fn push_post(&self, r: Result<PostModel, ClientError>) {
        self.posts.lock().await.push_back(r);
    }

    pub async fn calls(&self) -> Vec<String> {
        self.calls.lock().await.clone()
    }

    pub async fn offsets(&self) -> Vec<u32> {
        self.offsets.lock().await.clone()
    }

    async fn record(&self, call: &str) {
        self.calls.lock().await.push(call.to_string());
    }

    async fn pop<T>(queue: &Mutex<VecDeque<Result<T, ClientError>>>) -> Result<T, ClientError> {
        queue
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Err(ClientError::Network("no scripted response".into())))
    }
}

#[async_trait]
impl SiteClient for RecordingClient {
    async fn fetch_sites(&self) -> Result<Vec<SiteModel>, ClientError> {
        self.record("fetch_sites").await;
        Self::pop(&self.sites).await
    }
}

#[async_trait]
impl ThemeClient for RecordingClient {
    async fn fetch_wpcom_themes(&self) -> Result<Vec<ThemeModel>, ClientError> {
        self.record("fetch_wpcom_themes").await;
        Self::pop(&self.theme_lists).await
    }

    async fn fetch_installed_themes(&self, _site: &SiteModel) -> Result<Vec<ThemeModel>, ClientError> {
        self.record("fetch_installed_themes").await;
        Self::pop(&self.theme_lists).await
    }

    async fn fetch_current_theme(&self, _site: &SiteModel) -> Result<ThemeModel, ClientError> {
        self.record("fetch_current_theme").await;
        Self::pop(&self.themes).await
    }

    async fn activate_theme(
        &self,
        _site: &SiteModel,
        _theme: &ThemeModel,
    ) -> Result<ThemeModel, ClientError> {
        self.record("activate_theme").await;
        Self::pop(&self.themes).await
    }

    async fn install_theme(
        &self,
        _site: &SiteModel,
        _theme: &ThemeModel,
    ) -> Result<ThemeModel, ClientError> {
        self.record("install_theme").await;
        Self::pop(&self.themes).await
    }

    async fn delete_theme(
        &self,
        _site: &SiteModel,
        _theme: &ThemeModel,
    ) -> Result<ThemeModel, ClientError> {
        self.record("delete_theme").await;
        Self::pop(&self.themes).await
    }
}

#[async_trait]
impl PostClient for RecordingClient {
    async fn fetch_posts(
        &self,
        _site: &SiteModel,
        pages: bool,
        offset: u32,
    ) -> Result<PostsPage, ClientError> {
        self.record(if pages { "fetch_pages" } else { "fetch_posts" }).await;
        self.offsets.lock().await.push(offset);
        Self::pop(&self.post_pages).await
    }

    async fn fetch_post(&self, _site: &SiteModel, _remote_id: RemoteId) -> Result<PostModel, ClientError> {
        self.record("fetch_post").await;
        Self::pop(&self.posts).await
    }

    async fn push_post(&self, _site: &SiteModel, _post: &PostModel) -> Result<PostModel, ClientError> {
        self.record("push_post").await;
        Self::pop(&self.posts).await
    }

    async fn delete_post(&self, _site: &SiteModel, _post: &PostModel) -> Result<PostModel, ClientError> {
        self.record("delete_post").await;
        Self::pop(&self.posts).await
    }
}

/// Theme client whose installed-themes call for one site blocks until [`release`](Self::release).
/// Everything else goes straight to the wrapped [`RecordingClient`].
#[derive(Clone)]
pub struct GatedThemeClient {
    inner: RecordingClient,
    gated_url: String,
    gate: Arc<Semaphore>,
}

impl GatedThemeClient {
    pub fn new(inner: RecordingClient, gated: &SiteModel) -> Self {
        Self {
            inner,
            gated_url: gated.url.clone(),
            gate: Arc::new(Semaphore::new(0)),
        }
    }

    pub fn release(&self) {
        self.gate.add_permits(1);
    }

    pub fn clients(&self) -> Clients {
        Clients {
            theme: Arc::new(self.clone()),
            ..self.inner.clients()
        }
    }
}

#[async_trait]
impl ThemeClient for GatedThemeClient {
    async fn fetch_wpcom_themes(&self) -> Result<Vec<ThemeModel>, ClientError> {
        self.inner.fetch_wpcom_themes().await
    }

    async fn fetch_installed_themes(&self, site: &SiteModel) -> Result<Vec<ThemeModel>, ClientError> {
        if site.url == self.gated_url {
            let _permit = self.gate.acquire().await;
        }
        self.inner.fetch_installed_themes(site).await
    }

    async fn fetch_current_theme(&self, site: &SiteModel) -> Result<ThemeModel, ClientError> {
        self.inner.fetch_current_theme(site).await
    }

    async fn activate_theme(&self, site: &SiteModel, theme: &ThemeModel) -> Result<ThemeModel, ClientError> {
        self.inner.activate_theme(site, theme).await
    }

    async fn install_theme(&self, site: &SiteModel, theme: &ThemeModel) -> Result<ThemeModel, ClientError> {
        self.inner.install_theme(site, theme).await
    }

    async fn delete_theme(&self, site: &SiteModel, theme: &ThemeModel) -> Result<ThemeModel, ClientError> {
        self.inner.delete_theme(site, theme).await
    }
}
