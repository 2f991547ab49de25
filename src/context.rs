use std::sync::Arc;

use anyhow::Result;
use tokio::task::JoinHandle;

use crate::bus::EventBus;
use crate::db::Pool;
use crate::dispatcher::Dispatcher;
use crate::lock::SiteLocks;
use crate::network::{PostClient, RestClient, SiteClient, ThemeClient};
use crate::store::{PostStore, SiteStore, ThemeStore};

/// Network clients handed to the stores.
#[derive(Clone)]
pub struct Clients {
    pub site: Arc<dyn SiteClient>,
    pub theme: Arc<dyn ThemeClient>,
    pub post: Arc<dyn PostClient>,
}

impl Clients {
    pub fn rest(client: RestClient) -> Self {
        let client = Arc::new(client);
        Self {
            site: client.clone(),
            theme: client.clone(),
            post: client,
        }
    }
}

/// Everything an application needs, wired together: one bus, one dispatcher,
/// one set of site locks and a store per domain registered as that domain's handler.
pub struct FluxContext {
    pub dispatcher: Dispatcher,
    pub bus: Arc<EventBus>,
    pub sites: Arc<SiteStore>,
    pub themes: Arc<ThemeStore>,
    pub posts: Arc<PostStore>,
    worker: JoinHandle<()>,
}

impl FluxContext {
    /// Must be called from within a Tokio runtime.
    pub fn new(pool: Pool, clients: Clients) -> Result<Self> {
        let bus = Arc::new(EventBus::new());
        let (dispatcher, worker) = Dispatcher::spawn(Arc::clone(&bus));

        let locks = Arc::new(SiteLocks::new());

        let sites = Arc::new(SiteStore::new(
            pool.clone(),
            clients.site,
            Arc::clone(&bus),
            Arc::clone(&locks),
        ));
        let themes = Arc::new(ThemeStore::new(
            pool.clone(),
            clients.theme,
            Arc::clone(&bus),
            Arc::clone(&locks),
        ));
        let posts = Arc::new(PostStore::new(pool, clients.post, Arc::clone(&bus), locks));
        dispatcher.register_handler(sites.clone())?;
        dispatcher.register_handler(themes.clone())?;
        dispatcher.register_handler(posts.clone())?;

        Ok(Self {
            dispatcher,
            bus,
            sites,
            themes,
            posts,
            worker,
        })
    }

    /// Stops the dispatcher and waits for queued actions to be handed out.
    pub async fn shutdown(self) {
        self.dispatcher.shutdown();
        drop(self.dispatcher);
        let _ = self.worker.await;
    }
}
