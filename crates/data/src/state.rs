//! Application state shared by everything built on the data layer.

use std::sync::Arc;

use tracing::{info, warn};

use atelier_core::{Employee, Order, Service, Template};

use crate::clients::ClientRepository;
use crate::config::{DataConfig, StoreBackend};
use crate::directory::ClientDirectory;
use crate::error::DataError;
use crate::links::ClientLinks;
use crate::mirror::{LiveMirror, MirrorDriver};
use crate::repository::Repository;
use crate::session::Session;
use crate::store::{MemoryStore, PgDocumentStore, SharedStore};

/// The store, session, repositories and live mirror of one process.
///
/// This struct is cheaply cloneable via `Arc`; every component shares the
/// same store handle and session.
#[derive(Clone, Debug)]
pub struct Studio {
    inner: Arc<StudioInner>,
}

#[derive(Debug)]
struct StudioInner {
    store: SharedStore,
    session: Session,
    clients: ClientRepository,
    orders: Repository<Order>,
    employees: Repository<Employee>,
    services: Repository<Service>,
    templates: Repository<Template>,
    links: ClientLinks,
    directory: ClientDirectory,
    mirror: Arc<LiveMirror>,
}

impl Studio {
    /// Build every component around `store` with a signed-out session.
    #[must_use]
    pub fn new(store: SharedStore) -> Self {
        let session = Session::new();
        let clients = ClientRepository::new(Arc::clone(&store), session.clone());
        let links = ClientLinks::new(Arc::clone(&store), clients.records().clone());

        Self {
            inner: Arc::new(StudioInner {
                orders: Repository::new(Arc::clone(&store), session.clone()),
                employees: Repository::new(Arc::clone(&store), session.clone()),
                services: Repository::new(Arc::clone(&store), session.clone()),
                templates: Repository::new(Arc::clone(&store), session.clone()),
                directory: ClientDirectory::new(Arc::clone(&store)),
                mirror: Arc::new(LiveMirror::new(&store, session.clone())),
                clients,
                links,
                session,
                store,
            }),
        }
    }

    /// Open the configured store and build the studio around it.
    ///
    /// When the configuration names a development owner, it is signed in
    /// immediately, bypassing authentication.
    ///
    /// # Errors
    ///
    /// Returns `DataError::Config` if the postgres backend has no database
    /// URL, `DataError::Store` if connecting or migrating fails.
    pub async fn connect(config: &DataConfig) -> Result<Self, DataError> {
        let store: SharedStore = match config.store {
            StoreBackend::Memory => {
                info!("using in-memory document store");
                Arc::new(MemoryStore::new())
            }
            StoreBackend::Postgres => {
                let url = config.database_url.as_ref().ok_or_else(|| {
                    crate::config::ConfigError::MissingEnvVar("ATELIER_DATABASE_URL".to_string())
                })?;
                let store = PgDocumentStore::connect(url, config.max_connections).await?;
                store.migrate().await?;
                info!("using postgres document store");
                Arc::new(store)
            }
        };

        let studio = Self::new(store);
        if let Some(owner) = &config.dev_owner {
            warn!(owner = %owner, "authentication bypassed with development owner");
            studio.session().sign_in(owner.clone());
        }
        Ok(studio)
    }

    /// Start keeping the live mirror in step with the session.
    #[must_use]
    pub fn start(&self) -> MirrorDriver {
        self.inner.mirror.follow()
    }

    /// Get a reference to the document store.
    #[must_use]
    pub fn store(&self) -> &SharedStore {
        &self.inner.store
    }

    /// Get a reference to the session.
    #[must_use]
    pub fn session(&self) -> &Session {
        &self.inner.session
    }

    /// Get a reference to the client repository.
    #[must_use]
    pub fn clients(&self) -> &ClientRepository {
        &self.inner.clients
    }

    /// Get a reference to the order repository.
    #[must_use]
    pub fn orders(&self) -> &Repository<Order> {
        &self.inner.orders
    }

    /// Get a reference to the employee repository.
    #[must_use]
    pub fn employees(&self) -> &Repository<Employee> {
        &self.inner.employees
    }

    /// Get a reference to the service repository.
    #[must_use]
    pub fn services(&self) -> &Repository<Service> {
        &self.inner.services
    }

    /// Get a reference to the template repository.
    #[must_use]
    pub fn templates(&self) -> &Repository<Template> {
        &self.inner.templates
    }

    /// Get a reference to the client link helper.
    #[must_use]
    pub fn links(&self) -> &ClientLinks {
        &self.inner.links
    }

    /// Get a reference to the code lookup.
    #[must_use]
    pub fn directory(&self) -> &ClientDirectory {
        &self.inner.directory
    }

    /// Get a reference to the live mirror.
    #[must_use]
    pub fn mirror(&self) -> &LiveMirror {
        &self.inner.mirror
    }
}
