//! Device identity and one-time registration.
//!
//! ```text
//!  register(owner)
//!    1. create   feeders/{auto-id}  {owner_uid, online: true}
//!    2. parse    response name  ──▶  identity = last path segment
//!    3. patch    users/{owner}      {feederId: identity}
//!    4. persist  identity_id        (only after 3 succeeded)
//! ```
//!
//! An identity without an owner link is not a registration: if step 3 fails
//! nothing is persisted and the next bring-up starts over.  There is no
//! automatic retry within a session.

use core::fmt;

use log::{error, info};

use crate::app::ports::{DocumentStore, StoragePort};
use crate::cloud::firestore::{self, OWNER_LINK_FIELD};
use crate::cloud::{FEEDERS_COLLECTION, command_path, owner_path};
use crate::error::{Error, ParseError};
use crate::persist::{self, IdString};

/// The feeder's registered id in the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity(IdString);

impl Identity {
    pub fn new(id: IdString) -> Self {
        Self(id)
    }

    /// Accepts a non-empty, path-safe id that fits in storage.
    pub fn parse(id: &str) -> Option<Self> {
        if id.is_empty() || id.contains('/') {
            return None;
        }
        IdString::try_from(id).ok().map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Realtime node the backend writes commands to.
    pub fn command_path(&self) -> String {
        command_path(self.as_str())
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Owner uid captured at provisioning.  Missing is a configuration error.
pub fn provisioned_owner(storage: &impl StoragePort) -> Result<IdString, Error> {
    persist::load_owner_id(storage)?.ok_or(Error::Config("owner id missing"))
}

/// Create, link and persist a new identity for `owner_id`.
///
/// Requires an authenticated session.
pub fn register(
    docs: &mut impl DocumentStore,
    storage: &mut impl StoragePort,
    owner_id: &str,
) -> Result<Identity, Error> {
    if owner_id.is_empty() {
        return Err(Error::Config("owner id missing"));
    }

    info!("Registration: creating identity for owner {}", owner_id);
    let response = docs
        .create_document(FEEDERS_COLLECTION, &firestore::identity_create_body(owner_id))
        .inspect_err(|e| error!("Registration: create failed: {}", e))?;

    let identity = firestore::created_identity(&response)
        .and_then(|id| Identity::parse(&id).ok_or(ParseError::InvalidField("name")))
        .inspect_err(|e| error!("Registration: unusable create response: {}", e))?;
    info!("Registration: backend assigned {}", identity);

    docs.patch_document(
        &owner_path(owner_id),
        &firestore::owner_link_body(identity.as_str()),
        OWNER_LINK_FIELD,
    )
    .inspect_err(|e| error!("Registration: owner link failed, identity discarded: {}", e))?;

    persist::save_identity(storage, &identity)
        .inspect_err(|e| error!("Registration: could not persist identity: {}", e))?;

    info!("Registration: complete, feeder {} linked to {}", identity, owner_id);
    Ok(identity)
}
