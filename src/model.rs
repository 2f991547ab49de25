//! Domain records shared by the network clients, the local cache and the stores.
//!
//! Every record carries an optional local identity (assigned by the cache on
//! first insert) and, where the remote system has one, an optional remote
//! identity. Neither uses sentinel values.

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity assigned by the local cache. Stable for the local lifetime of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LocalId(pub i64);

/// Identity assigned by the remote system. Absent until the record is synced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RemoteId(pub i64);

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteModel {
    pub id: Option<LocalId>,
    /// WordPress.com / Jetpack blog id.
    pub site_id: Option<RemoteId>,
    pub self_hosted_site_id: Option<i64>,
    pub name: String,
    pub url: String,
    pub xmlrpc_url: Option<String>,
    pub is_wpcom: bool,
    pub is_jetpack_connected: bool,
    pub is_visible: bool,
}

impl SiteModel {
    /// True when the site can be reached through the WordPress.com REST API.
    pub fn uses_rest_api(&self) -> bool {
        self.site_id.is_some() && (self.is_wpcom || self.is_jetpack_connected)
    }

    /// Themes can only be installed or deleted on self-hosted Jetpack sites.
    pub fn supports_theme_management(&self) -> bool {
        self.is_jetpack_connected && !self.is_wpcom
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThemeModel {
    pub id: Option<LocalId>,
    /// `None` for the WordPress.com catalogue, which is not scoped to a site.
    pub local_site_id: Option<LocalId>,
    pub theme_id: String,
    pub name: String,
    pub description: String,
    pub author_name: String,
    pub author_url: String,
    pub screenshot_url: String,
    pub demo_url: String,
    pub version: String,
    pub stylesheet: String,
    pub price_text: String,
    pub free: bool,
    pub active: bool,
    pub is_wpcom_theme: bool,
}

impl ThemeModel {
    pub fn new(theme_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            theme_id: theme_id.into(),
            name: name.into(),
            free: true,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostModel {
    pub id: Option<LocalId>,
    pub local_site_id: LocalId,
    pub remote_post_id: Option<RemoteId>,
    pub title: String,
    pub content: String,
    pub excerpt: String,
    /// Wire status string, see [`PostStatus::from_wire`].
    pub status: String,
    /// ISO-8601 creation date; empty for drafts that were never dated.
    pub date_created: String,
    pub is_page: bool,
    pub is_local_draft: bool,
    pub is_locally_changed: bool,
}

impl PostModel {
    pub fn new(local_site_id: LocalId) -> Self {
        Self {
            id: None,
            local_site_id,
            remote_post_id: None,
            title: String::new(),
            content: String::new(),
            excerpt: String::new(),
            status: String::new(),
            date_created: String::new(),
            is_page: false,
            is_local_draft: false,
            is_locally_changed: false,
        }
    }

    /// Compares every synced field, ignoring the local identity.
    pub fn same_content(&self, other: &PostModel) -> bool {
        Self { id: None, ..self.clone() } == Self { id: None, ..other.clone() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PostStatus {
    Unknown,
    Published,
    Draft,
    Private,
    Pending,
    Trashed,
    Scheduled,
}

impl PostStatus {
    pub fn from_wire(status: &str) -> Self {
        match status.trim().to_ascii_lowercase().as_str() {
            "publish" => PostStatus::Published,
            "draft" => PostStatus::Draft,
            "private" => PostStatus::Private,
            "pending" => PostStatus::Pending,
            "trash" => PostStatus::Trashed,
            "future" => PostStatus::Scheduled,
            _ => PostStatus::Unknown,
        }
    }

    pub fn as_wire(&self) -> &'static str {
        match self {
            PostStatus::Unknown => "",
            PostStatus::Published => "publish",
            PostStatus::Draft => "draft",
            PostStatus::Private => "private",
            PostStatus::Pending => "pending",
            PostStatus::Trashed => "trash",
            PostStatus::Scheduled => "future",
        }
    }

    /// A published post dated in the future is reported as scheduled.
    pub fn from_post(post: &PostModel) -> Self {
        Self::from_post_at(post, Utc::now())
    }

    pub fn from_post_at(post: &PostModel, now: DateTime<Utc>) -> Self {
        let status = Self::from_wire(&post.status);
        if status != PostStatus::Published {
            return status;
        }
        match parse_iso8601(&post.date_created) {
            Some(date) if date > now => PostStatus::Scheduled,
            _ => PostStatus::Published,
        }
    }
}

/// Accepts both RFC 3339 (`+00:00`) and compact (`+0000`) offsets.
pub fn parse_iso8601(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc3339(value)
        .or_else(|_| DateTime::<FixedOffset>::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%z"))
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

pub fn format_iso8601(date: DateTime<Utc>) -> String {
    date.format("%Y-%m-%dT%H:%M:%S%z").to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PluginDirectoryType {
    Featured,
    New,
    Popular,
    Site,
}

impl PluginDirectoryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PluginDirectoryType::Featured => "featured",
            PluginDirectoryType::New => "new",
            PluginDirectoryType::Popular => "popular",
            PluginDirectoryType::Site => "site",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "featured" => Some(PluginDirectoryType::Featured),
            "new" => Some(PluginDirectoryType::New),
            "popular" => Some(PluginDirectoryType::Popular),
            "site" => Some(PluginDirectoryType::Site),
            _ => None,
        }
    }
}

/// Entry of a plugin directory listing, keyed by plugin slug.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginDirectoryModel {
    pub id: Option<LocalId>,
    pub name: String,
    pub directory_type: PluginDirectoryType,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn published(date_created: &str) -> PostModel {
        let mut post = PostModel::new(LocalId(6));
        post.status = "publish".into();
        post.date_created = date_created.into();
        post
    }

    #[test]
    fn published_post_with_past_date_is_published() {
        let post = published(&format_iso8601(Utc::now()));
        assert_eq!(PostStatus::from_post(&post), PostStatus::Published);
    }

    #[test]
    fn published_post_with_future_date_is_scheduled() {
        let post = published(&format_iso8601(Utc::now() + Duration::seconds(500)));
        assert_eq!(PostStatus::from_post(&post), PostStatus::Scheduled);
    }

    #[test]
    fn published_post_without_date_is_published() {
        assert_eq!(PostStatus::from_post(&published("")), PostStatus::Published);
    }

    #[test]
    fn rfc3339_dates_are_understood() {
        let now = Utc::now();
        let post = published("2999-01-01T00:00:00+00:00");
        assert_eq!(PostStatus::from_post_at(&post, now), PostStatus::Scheduled);
    }

    #[test]
    fn non_published_status_is_kept() {
        let mut post = published("2999-01-01T00:00:00+0000");
        post.status = "draft".into();
        assert_eq!(PostStatus::from_post(&post), PostStatus::Draft);
        post.status = "something".into();
        assert_eq!(PostStatus::from_post(&post), PostStatus::Unknown);
    }

    #[test]
    fn rest_reachability() {
        let mut site = SiteModel {
            site_id: Some(RemoteId(982)),
            is_jetpack_connected: true,
            ..Default::default()
        };
        assert!(site.uses_rest_api());
        assert!(site.supports_theme_management());
        site.site_id = None;
        assert!(!site.uses_rest_api());
    }

    #[test]
    fn same_content_ignores_local_id() {
        let mut a = published("");
        let mut b = a.clone();
        a.id = Some(LocalId(1));
        b.id = Some(LocalId(2));
        assert!(a.same_content(&b));
        b.title = "other".into();
        assert!(!a.same_content(&b));
    }
}
