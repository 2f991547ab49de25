pub mod action;
pub mod bus;
pub mod config;
pub mod context;
pub mod db;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod lock;
pub mod model;
pub mod network;
pub mod store;

pub use action::{Action, ActionDomain, ActionId, ActionType, PostAction, SiteAction, ThemeAction};
pub use bus::{EventBus, MainLooper, Subscriber, SubscriptionId, ThreadAffinity};
pub use context::{Clients, FluxContext};
pub use dispatcher::{ActionHandler, DispatchError, Dispatcher, WaitOutcome};
pub use error::{ClientBuildError, ClientError, SyncError, SyncErrorKind};
pub use event::{ChangeEvent, EventType};
