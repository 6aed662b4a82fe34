//! Live mirror of the signed-in owner's collections.
//!
//! The mirror owns one view per entity kind and at most one set of
//! subscriptions, all for the same owner. Switching owner tears the old set
//! down before anything for the new owner is opened, and resets every view
//! in between, so a view tagged with one owner never holds another owner's
//! records.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument};

use atelier_core::{Client, ClientId, Employee, Order, OwnerId, Service, Template};

use crate::entity::Entity;
use crate::error::DataError;
use crate::live::{LiveView, Snapshot, Teardown};
use crate::repository::Repository;
use crate::session::Session;
use crate::store::SharedStore;

/// First delay before re-attaching after a transient store failure.
const ATTACH_RETRY_INITIAL: Duration = Duration::from_millis(100);

/// Longest delay between attach retries.
const ATTACH_RETRY_MAX: Duration = Duration::from_secs(5);

/// View sink for one entity kind.
struct Slot<E> {
    repository: Repository<E>,
    sink: Arc<watch::Sender<Snapshot<E>>>,
}

impl<E: Entity> Slot<E> {
    fn new(store: &SharedStore, session: &Session) -> Self {
        let (sink, _) = watch::channel(Snapshot::empty());
        Self {
            repository: Repository::new(Arc::clone(store), session.clone()),
            sink: Arc::new(sink),
        }
    }

    fn view(&self) -> LiveView<E> {
        LiveView::new(self.sink.subscribe())
    }

    fn reset(&self, owner: Option<&OwnerId>) {
        self.sink.send_replace(Snapshot::for_owner(owner.cloned()));
    }

    async fn open(&self, owner: &OwnerId, teardowns: &mut Vec<Teardown>) -> Result<(), DataError> {
        let teardown = self
            .repository
            .subscribe_into(owner.clone(), Arc::clone(&self.sink))
            .await?;
        teardowns.push(teardown);
        Ok(())
    }
}

struct Attachment {
    owner: OwnerId,
    teardowns: Vec<Teardown>,
}

impl Attachment {
    fn cancel(&self) {
        for teardown in &self.teardowns {
            teardown.cancel();
        }
    }
}

/// In-memory mirror of the five entity collections.
pub struct LiveMirror {
    session: Session,
    clients: Slot<Client>,
    orders: Slot<Order>,
    employees: Slot<Employee>,
    services: Slot<Service>,
    templates: Slot<Template>,
    attachment: tokio::sync::Mutex<Option<Attachment>>,
    owner: Mutex<Option<OwnerId>>,
}

impl std::fmt::Debug for LiveMirror {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveMirror")
            .field("owner", &self.owner())
            .finish_non_exhaustive()
    }
}

impl LiveMirror {
    /// Create a detached mirror over `store`.
    #[must_use]
    pub fn new(store: &SharedStore, session: Session) -> Self {
        Self {
            clients: Slot::new(store, &session),
            orders: Slot::new(store, &session),
            employees: Slot::new(store, &session),
            services: Slot::new(store, &session),
            templates: Slot::new(store, &session),
            session,
            attachment: tokio::sync::Mutex::new(None),
            owner: Mutex::new(None),
        }
    }

    /// Owner the mirror is attached to.
    #[must_use]
    pub fn owner(&self) -> Option<OwnerId> {
        self.owner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_owner(&self, owner: Option<OwnerId>) {
        *self.owner.lock().unwrap_or_else(PoisonError::into_inner) = owner;
    }

    /// Mirror `owner`'s collections.
    ///
    /// A no-op when already attached to `owner`. Otherwise every existing
    /// subscription is torn down first, then all views are reset to an empty
    /// snapshot for `owner`, then the new subscriptions are opened.
    ///
    /// # Errors
    ///
    /// Returns `DataError::Store` if a subscription cannot be opened. The
    /// mirror is left detached with empty views.
    #[instrument(skip(self), fields(owner = %owner))]
    pub async fn attach(&self, owner: OwnerId) -> Result<(), DataError> {
        let mut attachment = self.attachment.lock().await;
        if attachment.as_ref().is_some_and(|a| a.owner == owner) {
            debug!("already attached");
            return Ok(());
        }

        if let Some(previous) = attachment.take() {
            previous.cancel();
            debug!(previous = %previous.owner, "previous subscriptions torn down");
        }
        self.reset_views(Some(&owner));
        self.set_owner(Some(owner.clone()));

        match self.open_all(&owner).await {
            Ok(teardowns) => {
                *attachment = Some(Attachment {
                    owner: owner.clone(),
                    teardowns,
                });
                info!(owner = %owner, "live mirror attached");
                Ok(())
            }
            Err(e) => {
                self.reset_views(None);
                self.set_owner(None);
                error!(owner = %owner, error = %e, "failed to attach live mirror");
                Err(e)
            }
        }
    }

    /// Tear down every subscription and empty the views.
    #[instrument(skip(self))]
    pub async fn detach(&self) {
        let mut attachment = self.attachment.lock().await;
        if let Some(previous) = attachment.take() {
            previous.cancel();
            info!(owner = %previous.owner, "live mirror detached");
        }
        self.reset_views(None);
        self.set_owner(None);
    }

    /// Keep the mirror attached to the session's owner in a background task.
    ///
    /// Attaches on sign-in, re-attaches on owner change and detaches on
    /// sign-out. A transient store failure while attaching is retried with
    /// exponential backoff until it succeeds or the owner changes. The task
    /// stops, detaching the mirror, when the returned driver is shut down or
    /// dropped.
    #[must_use]
    pub fn follow(self: &Arc<Self>) -> MirrorDriver {
        let mirror = Arc::clone(self);
        let mut owners = self.session.watch();
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let mut backoff = ATTACH_RETRY_INITIAL;
            loop {
                let owner = owners.borrow_and_update().clone();
                let retry_in = match owner {
                    Some(owner) => match mirror.attach(owner).await {
                        Ok(()) => {
                            backoff = ATTACH_RETRY_INITIAL;
                            None
                        }
                        Err(e) if e.is_transient() => {
                            let delay = backoff;
                            backoff = (backoff * 2).min(ATTACH_RETRY_MAX);
                            Some(delay)
                        }
                        // Other failures are logged by attach; the next owner change retries.
                        Err(_) => None,
                    },
                    None => {
                        mirror.detach().await;
                        None
                    }
                };
                let retry = async move {
                    match retry_in {
                        Some(delay) => tokio::time::sleep(delay).await,
                        None => std::future::pending::<()>().await,
                    }
                };

                tokio::select! {
                    changed = owners.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        backoff = ATTACH_RETRY_INITIAL;
                    }
                    () = retry => {
                        debug!(delay = ?retry_in, "retrying live mirror attach");
                    }
                    _ = &mut shutdown_rx => break,
                }
            }
            mirror.detach().await;
            debug!("mirror driver stopped");
        });

        MirrorDriver {
            shutdown: shutdown_tx,
            task,
        }
    }

    /// Live view of the owner's clients.
    #[must_use]
    pub fn clients(&self) -> LiveView<Client> {
        self.clients.view()
    }

    /// Live view of the owner's orders.
    #[must_use]
    pub fn orders(&self) -> LiveView<Order> {
        self.orders.view()
    }

    /// Live view of the owner's employees.
    #[must_use]
    pub fn employees(&self) -> LiveView<Employee> {
        self.employees.view()
    }

    /// Live view of the owner's services.
    #[must_use]
    pub fn services(&self) -> LiveView<Service> {
        self.services.view()
    }

    /// Live view of the owner's templates.
    #[must_use]
    pub fn templates(&self) -> LiveView<Template> {
        self.templates.view()
    }

    /// Orders of one client, from the current orders snapshot.
    #[must_use]
    pub fn orders_for_client(&self, client_id: &ClientId) -> Vec<Order> {
        self.orders
            .sink
            .borrow()
            .records()
            .iter()
            .filter(|order| &order.client_id == client_id)
            .cloned()
            .collect()
    }

    async fn open_all(&self, owner: &OwnerId) -> Result<Vec<Teardown>, DataError> {
        let mut teardowns = Vec::with_capacity(5);
        // Dropping `teardowns` on error cancels whatever was opened.
        self.clients.open(owner, &mut teardowns).await?;
        self.orders.open(owner, &mut teardowns).await?;
        self.employees.open(owner, &mut teardowns).await?;
        self.services.open(owner, &mut teardowns).await?;
        self.templates.open(owner, &mut teardowns).await?;
        Ok(teardowns)
    }

    fn reset_views(&self, owner: Option<&OwnerId>) {
        self.clients.reset(owner);
        self.orders.reset(owner);
        self.employees.reset(owner);
        self.services.reset(owner);
        self.templates.reset(owner);
    }
}

/// Background task started by [`LiveMirror::follow`].
#[derive(Debug)]
pub struct MirrorDriver {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl MirrorDriver {
    /// Stop following the session and detach the mirror.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(());
        if let Err(e) = self.task.await {
            error!(error = %e, "mirror driver task failed");
        }
    }
}
