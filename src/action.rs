//! Actions: immutable requests routed by the dispatcher to exactly one store.

use std::fmt;

use uuid::Uuid;

use crate::model::{PostModel, SiteModel, ThemeModel};

/// Identifies one dispatched action; events emitted while handling it carry it on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ActionId(Uuid);

impl ActionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ActionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Routing key: every action belongs to the store that owns its domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionDomain {
    Site,
    Theme,
    Post,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionType {
    FetchSites,
    UpdateSite,
    RemoveSite,
    RemoveWpComAndJetpackSites,

    FetchWpComThemes,
    FetchInstalledThemes,
    FetchCurrentTheme,
    ActivateTheme,
    InstallTheme,
    DeleteTheme,
    RemoveTheme,
    RemoveSiteThemes,

    FetchPosts,
    FetchPages,
    FetchPost,
    PushPost,
    DeletePost,
    UpdatePost,
    RemovePost,
    RemoveAllPosts,
}

impl ActionType {
    pub fn domain(self) -> ActionDomain {
        use ActionType::*;
        match self {
            FetchSites | UpdateSite | RemoveSite | RemoveWpComAndJetpackSites => ActionDomain::Site,
            FetchWpComThemes | FetchInstalledThemes | FetchCurrentTheme | ActivateTheme
            | InstallTheme | DeleteTheme | RemoveTheme | RemoveSiteThemes => ActionDomain::Theme,
            FetchPosts | FetchPages | FetchPost | PushPost | DeletePost | UpdatePost
            | RemovePost | RemoveAllPosts => ActionDomain::Post,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteThemePayload {
    pub site: SiteModel,
    pub theme: ThemeModel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchPostsPayload {
    pub site: SiteModel,
    /// Continue from the already cached page instead of starting over.
    pub load_more: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemotePostPayload {
    pub site: SiteModel,
    pub post: PostModel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SiteAction {
    FetchSites,
    UpdateSite(SiteModel),
    RemoveSite(SiteModel),
    RemoveWpComAndJetpackSites,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThemeAction {
    FetchWpComThemes,
    FetchInstalledThemes(SiteModel),
    FetchCurrentTheme(SiteModel),
    ActivateTheme(SiteThemePayload),
    InstallTheme(SiteThemePayload),
    DeleteTheme(SiteThemePayload),
    /// Local only.
    RemoveTheme(ThemeModel),
    /// Local only; the WordPress.com catalogue is left alone.
    RemoveSiteThemes(SiteModel),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostAction {
    FetchPosts(FetchPostsPayload),
    FetchPages(FetchPostsPayload),
    FetchPost(RemotePostPayload),
    PushPost(RemotePostPayload),
    DeletePost(RemotePostPayload),
    UpdatePost(PostModel),
    RemovePost(PostModel),
    RemoveAllPosts,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Site(SiteAction),
    Theme(ThemeAction),
    Post(PostAction),
}

impl Action {
    pub fn action_type(&self) -> ActionType {
        match self {
            Action::Site(a) => match a {
                SiteAction::FetchSites => ActionType::FetchSites,
                SiteAction::UpdateSite(_) => ActionType::UpdateSite,
                SiteAction::RemoveSite(_) => ActionType::RemoveSite,
                SiteAction::RemoveWpComAndJetpackSites => ActionType::RemoveWpComAndJetpackSites,
            },
            Action::Theme(a) => match a {
                ThemeAction::FetchWpComThemes => ActionType::FetchWpComThemes,
                ThemeAction::FetchInstalledThemes(_) => ActionType::FetchInstalledThemes,
                ThemeAction::FetchCurrentTheme(_) => ActionType::FetchCurrentTheme,
                ThemeAction::ActivateTheme(_) => ActionType::ActivateTheme,
                ThemeAction::InstallTheme(_) => ActionType::InstallTheme,
                ThemeAction::DeleteTheme(_) => ActionType::DeleteTheme,
                ThemeAction::RemoveTheme(_) => ActionType::RemoveTheme,
                ThemeAction::RemoveSiteThemes(_) => ActionType::RemoveSiteThemes,
            },
            Action::Post(a) => match a {
                PostAction::FetchPosts(_) => ActionType::FetchPosts,
                PostAction::FetchPages(_) => ActionType::FetchPages,
                PostAction::FetchPost(_) => ActionType::FetchPost,
                PostAction::PushPost(_) => ActionType::PushPost,
                PostAction::DeletePost(_) => ActionType::DeletePost,
                PostAction::UpdatePost(_) => ActionType::UpdatePost,
                PostAction::RemovePost(_) => ActionType::RemovePost,
                PostAction::RemoveAllPosts => ActionType::RemoveAllPosts,
            },
        }
    }

    pub fn domain(&self) -> ActionDomain {
        self.action_type().domain()
    }
}

impl From<SiteAction> for Action {
    fn from(a: SiteAction) -> Self {
        Action::Site(a)
    }
}

impl From<ThemeAction> for Action {
    fn from(a: ThemeAction) -> Self {
        Action::Theme(a)
    }
}

impl From<PostAction> for Action {
    fn from(a: PostAction) -> Self {
        Action::Post(a)
    }
}

impl ThemeAction {
    pub fn activate(site: SiteModel, theme: ThemeModel) -> Self {
        ThemeAction::ActivateTheme(SiteThemePayload { site, theme })
    }

    pub fn install(site: SiteModel, theme: ThemeModel) -> Self {
        ThemeAction::InstallTheme(SiteThemePayload { site, theme })
    }

    pub fn delete(site: SiteModel, theme: ThemeModel) -> Self {
        ThemeAction::DeleteTheme(SiteThemePayload { site, theme })
    }
}

impl PostAction {
    pub fn fetch_posts(site: SiteModel, load_more: bool) -> Self {
        PostAction::FetchPosts(FetchPostsPayload { site, load_more })
    }

    pub fn fetch_pages(site: SiteModel, load_more: bool) -> Self {
        PostAction::FetchPages(FetchPostsPayload { site, load_more })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actions_route_by_domain() {
        let site = SiteModel::default();
        let a: Action = ThemeAction::activate(site.clone(), ThemeModel::new("edin", "Edin")).into();
        assert_eq!(a.action_type(), ActionType::ActivateTheme);
        assert_eq!(a.domain(), ActionDomain::Theme);

        let a: Action = PostAction::fetch_pages(site, true).into();
        assert_eq!(a.action_type(), ActionType::FetchPages);
        assert_eq!(a.domain(), ActionDomain::Post);

        assert_eq!(Action::from(SiteAction::FetchSites).domain(), ActionDomain::Site);
    }
}
