//! Entity kinds and their collection layout.

use core::fmt;

use serde::Serialize;
use serde::de::DeserializeOwned;

use atelier_core::{
    Client, ClientId, ClientPatch, Employee, EmployeeId, EmployeePatch, NewEmployee, NewOrder,
    NewService, NewTemplate, Order, OrderId, OrderPatch, OwnerId, Service, ServiceId,
    ServicePatch, Template, TemplateId, TemplatePatch,
};

use crate::clients::ClientDocument;
use crate::store::{CollectionPath, Query};

/// Field holding the owner on globally stored records.
pub const OWNER_FIELD: &str = "ownerIdentity";
/// Field holding the creation time.
pub const CREATED_AT_FIELD: &str = Query::CREATED_AT;
/// Field holding the last modification time.
pub const UPDATED_AT_FIELD: &str = "updatedAt";

/// The five entity kinds the live mirror keeps in sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Clients,
    Orders,
    Employees,
    Services,
    Templates,
}

impl EntityKind {
    /// All kinds, in the order the mirror opens them.
    pub const ALL: [Self; 5] = [
        Self::Clients,
        Self::Orders,
        Self::Employees,
        Self::Services,
        Self::Templates,
    ];

    /// Collection name.
    #[must_use]
    pub const fn collection_name(self) -> &'static str {
        match self {
            Self::Clients => CollectionPath::CLIENTS,
            Self::Orders => "orders",
            Self::Employees => "employees",
            Self::Services => "services",
            Self::Templates => "templates",
        }
    }

    /// Whether records live in one global collection filtered by owner
    /// rather than under `users/{owner}`.
    #[must_use]
    pub const fn is_global(self) -> bool {
        matches!(self, Self::Clients)
    }

    /// Collection holding this kind's records for `owner`.
    #[must_use]
    pub fn path(self, owner: &OwnerId) -> CollectionPath {
        if self.is_global() {
            CollectionPath::new(self.collection_name())
        } else {
            CollectionPath::owned(owner, self.collection_name())
        }
    }

    /// Subscription query for `owner`'s records, newest first.
    #[must_use]
    pub fn query(self, owner: &OwnerId) -> Query {
        let query = Query::collection(self.path(owner));
        if self.is_global() {
            query.where_eq(OWNER_FIELD, owner.as_str())
        } else {
            query
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.collection_name())
    }
}

/// A record type stored in one of the entity collections.
pub trait Entity: DeserializeOwned + Send + Sync + 'static {
    /// Typed document id.
    type Id: From<String>
        + AsRef<str>
        + Clone
        + PartialEq
        + fmt::Debug
        + fmt::Display
        + Send
        + Sync;
    /// Fields written on creation (timestamps and owner are added).
    type Draft: Serialize + Send + Sync;
    /// Fields merged on update (`updatedAt` is added).
    type Patch: Serialize + Send + Sync;

    /// Which collection the records live in.
    const KIND: EntityKind;

    /// The record's id.
    fn id(&self) -> &Self::Id;
}

impl Entity for Client {
    type Id = ClientId;
    type Draft = ClientDocument;
    type Patch = ClientPatch;

    const KIND: EntityKind = EntityKind::Clients;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Entity for Order {
    type Id = OrderId;
    type Draft = NewOrder;
    type Patch = OrderPatch;

    const KIND: EntityKind = EntityKind::Orders;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Entity for Employee {
    type Id = EmployeeId;
    type Draft = NewEmployee;
    type Patch = EmployeePatch;

    const KIND: EntityKind = EntityKind::Employees;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Entity for Service {
    type Id = ServiceId;
    type Draft = NewService;
    type Patch = ServicePatch;

    const KIND: EntityKind = EntityKind::Services;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Entity for Template {
    type Id = TemplateId;
    type Draft = NewTemplate;
    type Patch = TemplatePatch;

    const KIND: EntityKind = EntityKind::Templates;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
