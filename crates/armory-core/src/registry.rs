//! # Registry
//!
//! The façade over every category of one content universe.
//!
//! A `Registry` maps each entry type to a category table backed by a
//! `BackingStore`. Resolution always goes through a caller-supplied
//! `ResolutionContext`:
//!
//! 1. The context slot for `(type, id)` is fetched single-flight.
//! 2. On a hit in the store, the unloaded shell is registered in the slot.
//! 3. Exactly one caller claims the shell and drives its nested load.
//! 4. Top-level callers wait until the context has no load in flight.
//!
//! ## Storage
//!
//! Categories may share one store (the common case, `Registry::new`) or use
//! separate ones (`RegistryBuilder`). A registry without a category for some
//! type rejects tokens of that type.

use crate::content::EntryBody;
use crate::context::{LoadGuard, ResolutionContext};
use crate::entry::{LiveEntry, LiveRef, Loader};
use crate::primitives::{ID_FIELD, MAX_ID_LENGTH, MAX_RESOLVE_BATCH};
use crate::store::SharedStore;
use crate::{ArmoryError, EntryKey, EntryType, RawRecord, RefToken};
use futures::future::try_join_all;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Weak};

// =============================================================================
// REGISTRY
// =============================================================================

struct RegistryInner {
    label: String,
    tables: BTreeMap<EntryType, Table>,
}

/// Handle to one content universe.
///
/// Cheap to clone; clones share categories and their live sets. There is no
/// global registry: pass the handle to whatever needs it.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("label", &self.inner.label)
            .field("categories", &self.inner.tables.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Registry {
    /// Create a registry with every category backed by one store.
    #[must_use]
    pub fn new(label: impl Into<String>, store: SharedStore) -> Self {
        Self::builder(label).all(store).build()
    }

    /// Start building a registry category by category.
    #[must_use]
    pub fn builder(label: impl Into<String>) -> RegistryBuilder {
        RegistryBuilder {
            label: label.into(),
            stores: BTreeMap::new(),
        }
    }

    /// Name of this content universe (used in logs).
    #[must_use]
    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// Entry types with a registered category.
    #[must_use]
    pub fn entry_types(&self) -> Vec<EntryType> {
        self.inner.tables.keys().copied().collect()
    }

    /// Check if two handles share one universe.
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// The category for an entry type.
    pub fn category(&self, entry_type: EntryType) -> Result<Category<'_>, ArmoryError> {
        self.inner
            .tables
            .get(&entry_type)
            .map(|table| Category {
                registry: self,
                table,
            })
            .ok_or(ArmoryError::UnknownCategory(entry_type))
    }

    // =========================================================================
    // RESOLUTION
    // =========================================================================

    /// Resolve a token to its live entry.
    ///
    /// Returns `Ok(None)` when the target does not exist. Waits until every
    /// load started in `ctx` has finished, so the returned entry and
    /// everything reachable from it are ready.
    pub async fn resolve(
        &self,
        ctx: &ResolutionContext,
        token: &RefToken,
    ) -> Result<Option<LiveRef>, ArmoryError> {
        let entry = self.resolve_nested(ctx, token).await?;
        ctx.settled().await;
        ensure_ready(entry)
    }

    /// Resolve a list concurrently. Output order and length match the input.
    pub async fn resolve_many(
        &self,
        ctx: &ResolutionContext,
        tokens: &[RefToken],
    ) -> Result<Vec<Option<LiveRef>>, ArmoryError> {
        let entries = self.resolve_many_nested(ctx, tokens).await?;
        ctx.settled().await;
        entries.into_iter().map(ensure_ready).collect()
    }

    /// Resolve a heterogeneous list, dropping targets that do not exist.
    pub async fn resolve_many_rough(
        &self,
        ctx: &ResolutionContext,
        tokens: &[RefToken],
    ) -> Result<Vec<LiveRef>, ArmoryError> {
        Ok(self
            .resolve_many(ctx, tokens)
            .await?
            .into_iter()
            .flatten()
            .collect())
    }

    /// Resolution from inside a load: never waits for readiness.
    pub(crate) async fn resolve_nested(
        &self,
        ctx: &ResolutionContext,
        token: &RefToken,
    ) -> Result<Option<LiveRef>, ArmoryError> {
        self.category(token.entry_type())?
            .resolve_nested(ctx, token)
            .await
    }

    pub(crate) async fn resolve_many_nested(
        &self,
        ctx: &ResolutionContext,
        tokens: &[RefToken],
    ) -> Result<Vec<Option<LiveRef>>, ArmoryError> {
        let mut resolved = Vec::with_capacity(tokens.len());
        for batch in tokens.chunks(MAX_RESOLVE_BATCH) {
            let entries =
                try_join_all(batch.iter().map(|token| self.resolve_nested(ctx, token))).await?;
            resolved.extend(entries);
        }
        Ok(resolved)
    }

    // =========================================================================
    // CONVENIENCE
    // =========================================================================

    /// Construct, load and persist a new entry. See `Category::create_live`.
    pub async fn create_live(
        &self,
        ctx: &ResolutionContext,
        entry_type: EntryType,
        raw: RawRecord,
    ) -> Result<LiveRef, ArmoryError> {
        self.category(entry_type)?.create_live(ctx, raw).await
    }

    /// Persist a live entry through its category.
    pub async fn writeback(&self, entry: &LiveEntry) -> Result<(), ArmoryError> {
        self.category(entry.entry_type())?.writeback(entry).await
    }

    /// Delete a record and drop it from the live set.
    pub async fn delete(&self, entry_type: EntryType, id: &str) -> Result<bool, ArmoryError> {
        self.category(entry_type)?.delete(id).await
    }
}

/// After a context settles, a live entry that is not ready was aborted.
fn ensure_ready(entry: Option<LiveRef>) -> Result<Option<LiveRef>, ArmoryError> {
    match entry {
        Some(entry) if !entry.is_ready() => Err(ArmoryError::LoadAborted(entry.key().clone())),
        other => Ok(other),
    }
}

// =============================================================================
// BUILDER
// =============================================================================

/// Builder for registries whose categories use different stores.
#[derive(Debug)]
pub struct RegistryBuilder {
    label: String,
    stores: BTreeMap<EntryType, SharedStore>,
}

impl RegistryBuilder {
    /// Register one category.
    #[must_use]
    pub fn category(mut self, entry_type: EntryType, store: SharedStore) -> Self {
        self.stores.insert(entry_type, store);
        self
    }

    /// Register every entry type against one store.
    #[must_use]
    pub fn all(mut self, store: SharedStore) -> Self {
        for entry_type in EntryType::ALL {
            self.stores.insert(entry_type, Arc::clone(&store));
        }
        self
    }

    #[must_use]
    pub fn build(self) -> Registry {
        let tables = self
            .stores
            .into_iter()
            .map(|(entry_type, store)| (entry_type, Table::new(entry_type, store)))
            .collect();
        Registry {
            inner: Arc::new(RegistryInner {
                label: self.label,
                tables,
            }),
        }
    }
}

// =============================================================================
// CATEGORY
// =============================================================================

/// Per-type state owned by the registry.
struct Table {
    entry_type: EntryType,
    store: SharedStore,
    /// Entries kept alive by the category itself.
    held: Mutex<BTreeMap<String, LiveRef>>,
    /// Entries materialized under any context, while something holds them.
    materialized: Mutex<BTreeMap<String, Weak<LiveEntry>>>,
}

impl Table {
    fn new(entry_type: EntryType, store: SharedStore) -> Self {
        Self {
            entry_type,
            store,
            held: Mutex::new(BTreeMap::new()),
            materialized: Mutex::new(BTreeMap::new()),
        }
    }

    fn track(&self, entry: &LiveRef) {
        let mut materialized = self.materialized.lock();
        materialized.retain(|_, weak| weak.strong_count() > 0);
        materialized.insert(entry.id().to_string(), Arc::downgrade(entry));
    }

    /// Drop a shell whose load failed, unless the id was re-tracked since.
    fn untrack(&self, entry: &LiveEntry) {
        let mut materialized = self.materialized.lock();
        if materialized
            .get(entry.id())
            .is_some_and(|weak| std::ptr::eq(weak.as_ptr(), entry))
        {
            materialized.remove(entry.id());
        }
    }

    /// A ready instance of `id`, if one is alive.
    fn live(&self, id: &str) -> Option<LiveRef> {
        if let Some(entry) = self.held.lock().get(id) {
            return Some(Arc::clone(entry));
        }
        self.materialized
            .lock()
            .get(id)
            .and_then(Weak::upgrade)
            .filter(|entry| entry.is_ready())
    }
}

/// The table of one entry type, borrowed from its registry.
#[derive(Clone, Copy)]
pub struct Category<'r> {
    registry: &'r Registry,
    table: &'r Table,
}

impl fmt::Debug for Category<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Category")
            .field("registry", &self.registry.label())
            .field("entry_type", &self.table.entry_type)
            .finish()
    }
}

impl<'r> Category<'r> {
    #[must_use]
    pub fn entry_type(&self) -> EntryType {
        self.table.entry_type
    }

    /// The store backing this category.
    #[must_use]
    pub fn store(&self) -> &'r SharedStore {
        &self.table.store
    }

    fn check_type(&self, found: EntryType) -> Result<(), ArmoryError> {
        if found == self.table.entry_type {
            Ok(())
        } else {
            Err(ArmoryError::TypeMismatch {
                expected: self.table.entry_type,
                found,
            })
        }
    }

    // =========================================================================
    // RESOLUTION
    // =========================================================================

    /// Top-level resolution of a token of this category's type.
    pub async fn resolve(
        &self,
        ctx: &ResolutionContext,
        token: &RefToken,
    ) -> Result<Option<LiveRef>, ArmoryError> {
        let entry = self.resolve_nested(ctx, token).await?;
        ctx.settled().await;
        ensure_ready(entry)
    }

    async fn resolve_nested(
        &self,
        ctx: &ResolutionContext,
        token: &RefToken,
    ) -> Result<Option<LiveRef>, ArmoryError> {
        self.check_type(token.entry_type())?;

        let key = token.key();
        let slot = ctx.slot(&key);
        let fetched = slot
            .get_or_try_init(|| self.fetch_shell(&key))
            .await?
            .clone();

        let Some(entry) = fetched else {
            tracing::warn!(
                registry = self.registry.label(),
                key = %key,
                brew = token.brew().unwrap_or("-"),
                fallback = token.fallback().unwrap_or("-"),
                "dangling reference"
            );
            return Ok(None);
        };

        // Count the load before claiming it, so a concurrent top-level caller
        // that loses the claim cannot observe a settled context in between.
        let guard = ctx.begin_load();
        match entry.claim_load() {
            Some(raw) => self.drive_load(ctx, &entry, raw, guard).await?,
            None => drop(guard),
        }
        Ok(Some(entry))
    }

    /// Fetch a row and wrap it in an unloaded shell.
    async fn fetch_shell(&self, key: &EntryKey) -> Result<Option<LiveRef>, ArmoryError> {
        let Some(raw) = self.table.store.get(key.entry_type, &key.id).await? else {
            return Ok(None);
        };
        tracing::debug!(registry = self.registry.label(), key = %key, "fetched record");
        let entry = LiveEntry::shell(key.clone(), raw);
        self.table.track(&entry);
        Ok(Some(entry))
    }

    /// Run the nested load of a claimed shell.
    async fn drive_load(
        &self,
        ctx: &ResolutionContext,
        entry: &LiveEntry,
        raw: RawRecord,
        _guard: LoadGuard,
    ) -> Result<(), ArmoryError> {
        let loader = Loader::new(self.registry, ctx);
        match EntryBody::load(self.table.entry_type, &raw, &loader).await {
            Ok(body) => {
                entry.finish_load(body);
                tracing::debug!(key = %entry.key(), "entry ready");
                Ok(())
            }
            Err(e) => {
                entry.fail_load();
                self.table.untrack(entry);
                tracing::warn!(key = %entry.key(), error = %e, "entry load failed");
                Err(e)
            }
        }
    }

    // =========================================================================
    // CREATION
    // =========================================================================

    /// Construct a brand-new entry from a raw record.
    ///
    /// A fresh id is allocated when the record has none; ids longer than
    /// `MAX_ID_LENGTH` are rejected. The entry is fully
    /// loaded without consulting the store for its own row, persisted, held
    /// by the category and registered in `ctx` (replacing whatever the
    /// context had under that key).
    pub async fn create_live(
        &self,
        ctx: &ResolutionContext,
        mut raw: RawRecord,
    ) -> Result<LiveRef, ArmoryError> {
        let id = match raw.remove(ID_FIELD) {
            Some(serde_json::Value::String(id)) if !id.is_empty() => id,
            _ => uuid::Uuid::new_v4().to_string(),
        };
        if id.len() > MAX_ID_LENGTH {
            return Err(ArmoryError::InvalidId(id));
        }
        let key = EntryKey::new(self.table.entry_type, id);

        let entry = LiveEntry::shell(key.clone(), raw);
        ctx.seed(Arc::clone(&entry));
        self.table.track(&entry);

        if let Some(raw) = entry.claim_load() {
            let guard = ctx.begin_load();
            self.drive_load(ctx, &entry, raw, guard).await?;
        }
        ctx.settled().await;
        let entry = ensure_ready(Some(entry))?.ok_or(ArmoryError::LoadAborted(key.clone()))?;

        let record = entry.save()?;
        self.table.store.put(key.entry_type, &key.id, &record).await?;
        self.hold(&entry)?;
        tracing::debug!(registry = self.registry.label(), key = %key, "created entry");
        Ok(entry)
    }

    // =========================================================================
    // DIRECT ACCESS
    // =========================================================================

    /// Fetch one entry, bypassing any caller context.
    ///
    /// A ready instance already live in this category is returned as is;
    /// otherwise the record is loaded under a fresh context.
    pub async fn get_by_id(&self, id: &str) -> Result<Option<LiveRef>, ArmoryError> {
        if let Some(entry) = self.table.live(id) {
            return Ok(Some(entry));
        }
        let token = RefToken::new(self.table.entry_type, id);
        self.resolve(&ResolutionContext::new(), &token).await
    }

    /// Every stored entry, live instances reused, the rest loaded together.
    pub async fn list(&self) -> Result<Vec<LiveRef>, ArmoryError> {
        let ctx = ResolutionContext::new();
        let mut entries = Vec::new();
        let mut missing = Vec::new();
        for id in self.list_ids().await? {
            match self.table.live(&id) {
                Some(entry) => entries.push(entry),
                None => missing.push(RefToken::new(self.table.entry_type, id)),
            }
        }
        entries.extend(self.registry.resolve_many_rough(&ctx, &missing).await?);
        entries.sort_by(|a, b| a.id().cmp(b.id()));
        Ok(entries)
    }

    /// Ids of every stored record.
    pub async fn list_ids(&self) -> Result<Vec<String>, ArmoryError> {
        self.table.store.list_ids(self.table.entry_type).await
    }

    /// Resolve every stored record under a caller context.
    pub async fn list_live(&self, ctx: &ResolutionContext) -> Result<Vec<LiveRef>, ArmoryError> {
        let tokens: Vec<RefToken> = self
            .list_ids()
            .await?
            .into_iter()
            .map(|id| RefToken::new(self.table.entry_type, id))
            .collect();
        self.registry.resolve_many_rough(ctx, &tokens).await
    }

    /// Ready entries currently alive in this category (held or materialized).
    #[must_use]
    pub fn live_entries(&self) -> Vec<LiveRef> {
        let mut live: BTreeMap<String, LiveRef> = self
            .table
            .materialized
            .lock()
            .iter()
            .filter_map(|(id, weak)| weak.upgrade().map(|entry| (id.clone(), entry)))
            .filter(|(_, entry)| entry.is_ready())
            .collect();
        for (id, entry) in self.table.held.lock().iter() {
            live.insert(id.clone(), Arc::clone(entry));
        }
        live.into_values().collect()
    }

    /// Keep an entry alive in this category until it is deleted.
    pub fn hold(&self, entry: &LiveRef) -> Result<(), ArmoryError> {
        self.check_type(entry.entry_type())?;
        self.table
            .held
            .lock()
            .insert(entry.id().to_string(), Arc::clone(entry));
        Ok(())
    }

    // =========================================================================
    // MUTATION
    // =========================================================================

    /// Persist an entry's current state, overwriting its row.
    ///
    /// Fails with `DanglingWriteback` if the row was deleted.
    pub async fn writeback(&self, entry: &LiveEntry) -> Result<(), ArmoryError> {
        self.check_type(entry.entry_type())?;
        let key = entry.key();
        if !self.table.store.contains(key.entry_type, &key.id).await? {
            return Err(ArmoryError::DanglingWriteback(key.clone()));
        }

        entry.begin_writeback()?;
        let saved = entry.save();
        let result = match saved {
            Ok(record) => self.table.store.put(key.entry_type, &key.id, &record).await,
            Err(e) => Err(e),
        };
        entry.end_writeback();

        if result.is_ok() {
            tracing::debug!(registry = self.registry.label(), key = %key, "wrote back entry");
        }
        result
    }

    /// Delete a row and drop the entry from the live set.
    ///
    /// Instances still held elsewhere stay usable in memory, but any later
    /// writeback of them fails.
    pub async fn delete(&self, id: &str) -> Result<bool, ArmoryError> {
        let existed = self.table.store.delete(self.table.entry_type, id).await?;
        self.table.held.lock().remove(id);
        self.table.materialized.lock().remove(id);
        tracing::debug!(
            registry = self.registry.label(),
            entry_type = %self.table.entry_type,
            id,
            existed,
            "deleted entry"
        );
        Ok(existed)
    }
}

// =============================================================================
// TESTS
// =============================================================================
