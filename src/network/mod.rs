//! Network clients: one async trait per domain, one remote round trip per call.
//!
//! Clients map wire responses to domain records and classify failures into
//! [`ClientError`]s. They never touch the local cache.

use async_trait::async_trait;

use crate::error::ClientError;
use crate::model::{PostModel, RemoteId, SiteModel, ThemeModel};

pub mod model;
pub mod rest;

pub use rest::{RestClient, POSTS_PAGE_SIZE};

#[async_trait]
pub trait SiteClient: Send + Sync {
    /// Sites the authenticated account can reach over the REST API.
    async fn fetch_sites(&self) -> Result<Vec<SiteModel>, ClientError>;
}

#[async_trait]
pub trait ThemeClient: Send + Sync {
    async fn fetch_wpcom_themes(&self) -> Result<Vec<ThemeModel>, ClientError>;

    async fn fetch_installed_themes(&self, site: &SiteModel) -> Result<Vec<ThemeModel>, ClientError>;

    async fn fetch_current_theme(&self, site: &SiteModel) -> Result<ThemeModel, ClientError>;

    async fn activate_theme(
        &self,
        site: &SiteModel,
        theme: &ThemeModel,
    ) -> Result<ThemeModel, ClientError>;

    async fn install_theme(
        &self,
        site: &SiteModel,
        theme: &ThemeModel,
    ) -> Result<ThemeModel, ClientError>;

    async fn delete_theme(
        &self,
        site: &SiteModel,
        theme: &ThemeModel,
    ) -> Result<ThemeModel, ClientError>;
}

/// One page of a post listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostsPage {
    pub posts: Vec<PostModel>,
    pub can_load_more: bool,
}

#[async_trait]
pub trait PostClient: Send + Sync {
    /// Lists posts (or pages when `pages` is set) starting at `offset`.
    async fn fetch_posts(
        &self,
        site: &SiteModel,
        pages: bool,
        offset: u32,
    ) -> Result<PostsPage, ClientError>;

    async fn fetch_post(&self, site: &SiteModel, remote_id: RemoteId) -> Result<PostModel, ClientError>;

    /// Creates the post remotely when it has no remote id yet, otherwise updates it.
    async fn push_post(&self, site: &SiteModel, post: &PostModel) -> Result<PostModel, ClientError>;

    async fn delete_post(&self, site: &SiteModel, post: &PostModel) -> Result<PostModel, ClientError>;
}
