//! # Live Entries
//!
//! A live entry is the in-memory object reconstructed from one raw record.
//!
//! ## Lifecycle
//!
//! ```text
//! Constructing ──claim──▶ Loading ──▶ Ready ◀──▶ WritingBack
//!                            │
//!                            └──fatal──▶ Failed
//! ```
//!
//! The shell is registered in the resolution context while still
//! `Constructing`, so cyclic references find it. Exactly one caller claims
//! the load; everyone else gets the same `Arc`.
//!
//! ## Ownership
//!
//! References to other entries are shared `Arc`s. References from an owned
//! entry back to its owner (a mech's pilot) are `BackLink`s holding a `Weak`,
//! which keeps ownership graphs free of strong cycles.

use crate::content::EntryBody;
use crate::context::ResolutionContext;
use crate::record::Record;
use crate::registry::Registry;
use crate::primitives::ID_FIELD;
use crate::{ArmoryError, EntryKey, EntryType, RawRecord, RefToken};
use async_trait::async_trait;
use parking_lot::{MappedRwLockReadGuard, Mutex, RwLock, RwLockReadGuard};
use std::fmt;
use std::sync::{Arc, Weak};

/// Shared handle to a live entry. Identity is pointer identity.
pub type LiveRef = Arc<LiveEntry>;

// =============================================================================
// PHASE
// =============================================================================

/// Lifecycle state of a live entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Registered in a context, fields unset.
    Constructing,
    /// Nested load in flight; may be partially observed on a cyclic back-edge.
    Loading,
    /// Fully populated, safe to read and mutate.
    Ready,
    /// Serializing and persisting.
    WritingBack,
    /// Load aborted by a fatal error.
    Failed,
}

// =============================================================================
// ENTRY KIND
// =============================================================================

/// Capability set every concrete entry variant implements.
///
/// `load` receives a `Record` whose missing or malformed optional fields
/// already fall back to `defaults()`; nested references must go through the
/// `Loader`, never be constructed by hand. `save` is the inverse of `load`.
#[async_trait]
pub trait EntryKind: Sized + Send + Sync + 'static {
    /// The tag this variant is selected by.
    const ENTRY_TYPE: EntryType;

    /// Default values backfilled into records missing optional fields.
    fn defaults() -> RawRecord;

    /// Populate a value from a raw record, resolving nested references.
    async fn load(record: Record<'_>, loader: &Loader<'_>) -> Result<Self, ArmoryError>;

    /// Serialize back to a raw record (without the id field).
    fn save(&self) -> RawRecord;

    /// Wrap into the closed variant set.
    fn into_body(self) -> EntryBody;

    /// Borrow out of the closed variant set.
    fn from_body(body: &EntryBody) -> Option<&Self>;

    /// Mutably borrow out of the closed variant set.
    fn from_body_mut(body: &mut EntryBody) -> Option<&mut Self>;
}

// =============================================================================
// LIVE ENTRY
// =============================================================================

/// In-memory object for one record.
pub struct LiveEntry {
    key: EntryKey,
    phase: Mutex<Phase>,
    pending: Mutex<Option<RawRecord>>,
    body: RwLock<Option<EntryBody>>,
}

impl fmt::Debug for LiveEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveEntry")
            .field("key", &self.key)
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}

impl LiveEntry {
    /// Create an unloaded shell holding the raw record it will load from.
    pub(crate) fn shell(key: EntryKey, raw: RawRecord) -> LiveRef {
        Arc::new(Self {
            key,
            phase: Mutex::new(Phase::Constructing),
            pending: Mutex::new(Some(raw)),
            body: RwLock::new(None),
        })
    }

    /// Claim the right to drive this entry's load.
    ///
    /// Returns the raw record exactly once; later callers get `None`.
    pub(crate) fn claim_load(&self) -> Option<RawRecord> {
        let mut phase = self.phase.lock();
        if *phase != Phase::Constructing {
            return None;
        }
        *phase = Phase::Loading;
        self.pending.lock().take()
    }

    pub(crate) fn finish_load(&self, body: EntryBody) {
        *self.body.write() = Some(body);
        *self.phase.lock() = Phase::Ready;
    }

    pub(crate) fn fail_load(&self) {
        *self.phase.lock() = Phase::Failed;
    }

    pub(crate) fn begin_writeback(&self) -> Result<(), ArmoryError> {
        let mut phase = self.phase.lock();
        if *phase != Phase::Ready {
            return Err(ArmoryError::NotReady(self.key.clone()));
        }
        *phase = Phase::WritingBack;
        Ok(())
    }

    pub(crate) fn end_writeback(&self) {
        let mut phase = self.phase.lock();
        if *phase == Phase::WritingBack {
            *phase = Phase::Ready;
        }
    }

    // =========================================================================
    // IDENTITY
    // =========================================================================

    #[must_use]
    pub fn key(&self) -> &EntryKey {
        &self.key
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.key.id
    }

    #[must_use]
    pub fn entry_type(&self) -> EntryType {
        self.key.entry_type
    }

    /// A token pointing at this entry: `{type, id}`.
    #[must_use]
    pub fn to_ref(&self) -> RefToken {
        RefToken::new(self.key.entry_type, self.key.id.clone())
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        *self.phase.lock()
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self.phase(), Phase::Ready | Phase::WritingBack)
    }

    // =========================================================================
    // ACCESS
    // =========================================================================

    /// Borrow the loaded body. `None` while the entry is not populated.
    ///
    /// Do not hold the guard across an `.await`.
    #[must_use]
    pub fn read(&self) -> Option<MappedRwLockReadGuard<'_, EntryBody>> {
        RwLockReadGuard::try_map(self.body.read(), Option::as_ref).ok()
    }

    /// Run a closure against the typed body.
    ///
    /// Returns `None` if the entry is not loaded or is a different kind.
    pub fn view<T: EntryKind, R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        let body = self.body.read();
        (*body).as_ref().and_then(T::from_body).map(f)
    }

    /// Mutate the typed body in place.
    ///
    /// Mutation does not persist anything; call `writeback` afterwards.
    pub fn update<T: EntryKind, R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let mut body = self.body.write();
        (*body).as_mut().and_then(T::from_body_mut).map(f)
    }

    /// Mutate the body whatever its kind.
    pub fn update_body<R>(&self, f: impl FnOnce(&mut EntryBody) -> R) -> Option<R> {
        let mut body = self.body.write();
        (*body).as_mut().map(f)
    }

    /// Display name of the loaded entry.
    #[must_use]
    pub fn name(&self) -> Option<String> {
        self.read().map(|body| body.name().to_string())
    }

    /// Id of the source record this entry was installed from, or its own id
    /// when it was not installed from anywhere.
    #[must_use]
    pub fn origin_id(&self) -> String {
        self.read()
            .and_then(|body| body.origin().map(str::to_string))
            .unwrap_or_else(|| self.key.id.clone())
    }

    /// Serialize to a raw record including the id field.
    pub fn save(&self) -> Result<RawRecord, ArmoryError> {
        if !self.is_ready() {
            return Err(ArmoryError::NotReady(self.key.clone()));
        }
        let body = self.read().ok_or_else(|| ArmoryError::NotReady(self.key.clone()))?;
        let mut raw = body.save();
        raw.insert(ID_FIELD.to_string(), self.key.id.clone().into());
        Ok(raw)
    }

    /// Persist this entry's current state through the registry's category.
    pub async fn writeback(&self, registry: &Registry) -> Result<(), ArmoryError> {
        registry.writeback(self).await
    }
}

// =============================================================================
// BACK LINK
// =============================================================================

/// Non-owning reference from an owned entry back to its owner.
///
/// The token always round-trips through `save`; the target is only reachable
/// while something else keeps the owner alive.
#[derive(Debug, Clone)]
pub struct BackLink {
    token: RefToken,
    target: Weak<LiveEntry>,
}

impl BackLink {
    #[must_use]
    pub fn new(token: RefToken, target: Option<&LiveRef>) -> Self {
        Self {
            token,
            target: target.map(Arc::downgrade).unwrap_or_default(),
        }
    }

    #[must_use]
    pub fn token(&self) -> &RefToken {
        &self.token
    }

    /// The owner, if it is still alive.
    #[must_use]
    pub fn get(&self) -> Option<LiveRef> {
        self.target.upgrade()
    }

    /// Point the link at a different owner.
    pub fn set(&mut self, owner: &LiveRef) {
        self.token = owner.to_ref();
        self.target = Arc::downgrade(owner);
    }
}

// =============================================================================
// LOADER
// =============================================================================

/// Nested-resolution handle given to `EntryKind::load`.
///
/// Every resolution goes through the same context as the entry being loaded.
/// Nested resolution never waits for the target to finish loading: on a
/// cyclic back-edge it hands out the in-progress object.
pub struct Loader<'a> {
    registry: &'a Registry,
    ctx: &'a ResolutionContext,
}

impl<'a> Loader<'a> {
    pub(crate) fn new(registry: &'a Registry, ctx: &'a ResolutionContext) -> Self {
        Self { registry, ctx }
    }

    #[must_use]
    pub fn registry(&self) -> &Registry {
        self.registry
    }

    #[must_use]
    pub fn context(&self) -> &ResolutionContext {
        self.ctx
    }

    /// Resolve one token. `None` when the target does not exist.
    pub async fn resolve(&self, token: &RefToken) -> Result<Option<LiveRef>, ArmoryError> {
        self.registry.resolve_nested(self.ctx, token).await
    }

    /// Resolve an optional token.
    pub async fn resolve_opt(
        &self,
        token: Option<&RefToken>,
    ) -> Result<Option<LiveRef>, ArmoryError> {
        match token {
            Some(token) => self.resolve(token).await,
            None => Ok(None),
        }
    }

    /// Resolve a list, preserving order and length.
    pub async fn resolve_many(
        &self,
        tokens: &[RefToken],
    ) -> Result<Vec<Option<LiveRef>>, ArmoryError> {
        self.registry.resolve_many_nested(self.ctx, tokens).await
    }

    /// Resolve a heterogeneous list, dropping targets that do not exist.
    pub async fn resolve_many_rough(
        &self,
        tokens: &[RefToken],
    ) -> Result<Vec<LiveRef>, ArmoryError> {
        Ok(self
            .resolve_many(tokens)
            .await?
            .into_iter()
            .flatten()
            .collect())
    }

    /// Resolve a back-edge to an owner.
    pub async fn back_link(&self, token: RefToken) -> Result<BackLink, ArmoryError> {
        let target = self.resolve(&token).await?;
        Ok(BackLink::new(token, target.as_ref()))
    }
}
