//! Change-events emitted by stores after an action has been handled.

use crate::action::ActionType;
use crate::error::SyncError;
use crate::model::{PostModel, SiteModel, ThemeModel};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    SiteChanged,
    SiteRemoved,
    WpComThemesChanged,
    SiteThemesChanged,
    CurrentThemeFetched,
    ThemeActivated,
    ThemeInstalled,
    ThemeDeleted,
    ThemeRemoved,
    PostChanged,
    PostUploaded,
    PostDeleted,
}

impl EventType {
    pub const ALL: [EventType; 12] = [
        EventType::SiteChanged,
        EventType::SiteRemoved,
        EventType::WpComThemesChanged,
        EventType::SiteThemesChanged,
        EventType::CurrentThemeFetched,
        EventType::ThemeActivated,
        EventType::ThemeInstalled,
        EventType::ThemeDeleted,
        EventType::ThemeRemoved,
        EventType::PostChanged,
        EventType::PostUploaded,
        EventType::PostDeleted,
    ];
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnSitesChanged {
    pub origin: ActionType,
    pub rows_affected: u64,
    pub error: Option<SyncError>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnThemesChanged {
    pub origin: ActionType,
    /// Absent for the WordPress.com catalogue.
    pub site: Option<SiteModel>,
    pub rows_affected: u64,
    pub error: Option<SyncError>,
}

/// Result of a single-theme operation against a site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnThemeResult {
    pub origin: ActionType,
    pub site: SiteModel,
    pub theme: Option<ThemeModel>,
    pub error: Option<SyncError>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnThemeRemoved {
    pub origin: ActionType,
    pub theme: ThemeModel,
    pub error: Option<SyncError>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnPostChanged {
    pub origin: ActionType,
    pub rows_affected: u64,
    pub can_load_more: bool,
    pub error: Option<SyncError>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnPostResult {
    pub origin: ActionType,
    pub post: Option<PostModel>,
    pub error: Option<SyncError>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    SiteChanged(OnSitesChanged),
    SiteRemoved(OnSitesChanged),
    WpComThemesChanged(OnThemesChanged),
    SiteThemesChanged(OnThemesChanged),
    CurrentThemeFetched(OnThemeResult),
    ThemeActivated(OnThemeResult),
    ThemeInstalled(OnThemeResult),
    ThemeDeleted(OnThemeResult),
    ThemeRemoved(OnThemeRemoved),
    PostChanged(OnPostChanged),
    PostUploaded(OnPostResult),
    PostDeleted(OnPostResult),
}

impl ChangeEvent {
    pub fn event_type(&self) -> EventType {
        match self {
            ChangeEvent::SiteChanged(_) => EventType::SiteChanged,
            ChangeEvent::SiteRemoved(_) => EventType::SiteRemoved,
            ChangeEvent::WpComThemesChanged(_) => EventType::WpComThemesChanged,
            ChangeEvent::SiteThemesChanged(_) => EventType::SiteThemesChanged,
            ChangeEvent::CurrentThemeFetched(_) => EventType::CurrentThemeFetched,
            ChangeEvent::ThemeActivated(_) => EventType::ThemeActivated,
            ChangeEvent::ThemeInstalled(_) => EventType::ThemeInstalled,
            ChangeEvent::ThemeDeleted(_) => EventType::ThemeDeleted,
            ChangeEvent::ThemeRemoved(_) => EventType::ThemeRemoved,
            ChangeEvent::PostChanged(_) => EventType::PostChanged,
            ChangeEvent::PostUploaded(_) => EventType::PostUploaded,
            ChangeEvent::PostDeleted(_) => EventType::PostDeleted,
        }
    }

    pub fn origin(&self) -> ActionType {
        match self {
            ChangeEvent::SiteChanged(e) | ChangeEvent::SiteRemoved(e) => e.origin,
            ChangeEvent::WpComThemesChanged(e) | ChangeEvent::SiteThemesChanged(e) => e.origin,
            ChangeEvent::CurrentThemeFetched(e)
            | ChangeEvent::ThemeActivated(e)
            | ChangeEvent::ThemeInstalled(e)
            | ChangeEvent::ThemeDeleted(e) => e.origin,
            ChangeEvent::ThemeRemoved(e) => e.origin,
            ChangeEvent::PostChanged(e) => e.origin,
            ChangeEvent::PostUploaded(e) | ChangeEvent::PostDeleted(e) => e.origin,
        }
    }

    pub fn error(&self) -> Option<&SyncError> {
        match self {
            ChangeEvent::SiteChanged(e) | ChangeEvent::SiteRemoved(e) => e.error.as_ref(),
            ChangeEvent::WpComThemesChanged(e) | ChangeEvent::SiteThemesChanged(e) => {
                e.error.as_ref()
            }
            ChangeEvent::CurrentThemeFetched(e)
            | ChangeEvent::ThemeActivated(e)
            | ChangeEvent::ThemeInstalled(e)
            | ChangeEvent::ThemeDeleted(e) => e.error.as_ref(),
            ChangeEvent::ThemeRemoved(e) => e.error.as_ref(),
            ChangeEvent::PostChanged(e) => e.error.as_ref(),
            ChangeEvent::PostUploaded(e) | ChangeEvent::PostDeleted(e) => e.error.as_ref(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error().is_some()
    }
}
