//! Guest root table
//!
//! Guest heap objects that are referenced from the host must survive guest
//! collection cycles for exactly as long as some host object refers to them.
//! The table maps each host holder (by pointer identity) to the roots it is
//! responsible for, and [`GuestRootTable::reconcile`] releases the roots of
//! holders the host side no longer references.
//!
//! A holder is dead when the table's own `HostRef` is its only strong
//! reference. Roots are shared: the same guest object always maps to the same
//! [`RootId`], and a root is only released once no remaining entry lists it
//! and no in-flight continuation has it pinned.
//!
//! Lists and dicts that cross the boundary are linked to one guest twin. The
//! entry keeps a [`Snapshot`] of what both sides last agreed on so that each
//! sync can tell which side wrote since.
//!
//! Reconciliation runs at the bridge's own checkpoints: `Engine::collect`,
//! and the outermost realm exit once enough registrations have piled up,
//! each followed by a guest collection. QuickJS also starts collection
//! cycles on its own allocation threshold and offers no hook to run first,
//! so those cycles see the table as of the last checkpoint. That only delays
//! releasing roots; it never frees a guest object a live holder needs.

use indexmap::IndexMap;
use rquickjs::{Ctx, Error, Persistent, Value};
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use tether_host::{HostId, HostObject, HostRef};
use tracing::debug;

type Rooted = Persistent<Value<'static>>;

/// Handle to one guest root in the table.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RootId(u64);

impl RootId {
    pub fn index(self) -> u64 {
        self.0
    }
}

struct GuestRoot {
    value: Rooted,
    pins: usize,
}

struct RootEntry {
    holder: HostRef,
    roots: Vec<RootId>,
    snapshot: Option<Snapshot>,
}

/// The items a linked container held when it last matched its guest twin.
/// Items are held weakly: a snapshot never keeps a host object alive, and
/// the allocation it points at cannot be reused while it is compared.
#[derive(Clone)]
pub(crate) enum Snapshot {
    List(Vec<Weak<HostObject>>),
    Dict(IndexMap<String, Weak<HostObject>>),
}

impl Snapshot {
    pub(crate) fn list<'a>(items: impl IntoIterator<Item = &'a HostRef>) -> Self {
        Snapshot::List(items.into_iter().map(Rc::downgrade).collect())
    }

    pub(crate) fn dict<'a>(entries: impl IntoIterator<Item = (&'a String, &'a HostRef)>) -> Self {
        Snapshot::Dict(
            entries
                .into_iter()
                .map(|(key, item)| (key.clone(), Rc::downgrade(item)))
                .collect(),
        )
    }

    pub(crate) fn same(seen: &Weak<HostObject>, current: &HostRef) -> bool {
        std::ptr::eq(seen.as_ptr(), Rc::as_ptr(current))
    }
}

/// Outcome of one [`GuestRootTable::reconcile`] call.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Entries whose holder had no host references left.
    pub dead_entries: usize,
    /// Roots released because no other entry listed them.
    pub released_roots: usize,
    /// Roots of dead entries kept alive because another entry listed them.
    pub shared_roots_kept: usize,
    /// Roots released because nothing listed or pinned them at all.
    pub orphans_swept: usize,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RootStats {
    pub entries: usize,
    pub roots: usize,
    pub pinned: usize,
    pub linked: usize,
    pub pending_registrations: usize,
}

#[derive(Default)]
pub struct GuestRootTable {
    next_id: u64,
    roots: HashMap<RootId, GuestRoot>,
    identity: HashMap<Rooted, RootId>,
    entries: IndexMap<HostId, RootEntry>,
    linked: HashMap<RootId, HostId>,
    pending_registrations: usize,
}

impl GuestRootTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Root `value`, reusing the existing root when the same guest object is
    /// already in the table. The root is unowned until it is registered or
    /// pinned; a reconcile sweeps it otherwise.
    pub fn root<'js>(&mut self, ctx: &Ctx<'js>, value: &Value<'js>) -> RootId {
        let saved = Persistent::save(ctx, value.clone());
        if let Some(id) = self.identity.get(&saved) {
            return *id;
        }

        self.next_id += 1;
        let id = RootId(self.next_id);
        self.identity.insert(saved.clone(), id);
        self.roots.insert(
            id,
            GuestRoot {
                value: saved,
                pins: 0,
            },
        );
        id
    }

    /// Record that `holder` keeps `roots` alive.
    pub fn register(&mut self, holder: &HostRef, roots: &[RootId]) {
        let entry = self
            .entries
            .entry(HostObject::id(holder))
            .or_insert_with(|| RootEntry {
                holder: holder.clone(),
                roots: Vec::with_capacity(roots.len()),
                snapshot: None,
            });
        for root in roots {
            if !entry.roots.contains(root) {
                entry.roots.push(*root);
            }
        }
        self.pending_registrations += 1;
        debug!(holder = ?HostObject::id(holder), roots = roots.len(), "registered guest roots");
    }

    /// The guest object a holder was created from, if it came from the guest.
    pub fn origin(&self, holder: &HostRef) -> Option<RootId> {
        self.entries
            .get(&HostObject::id(holder))
            .and_then(|entry| entry.roots.first().copied())
    }

    /// The root already held for `value`, without creating one.
    pub fn find<'js>(&self, ctx: &Ctx<'js>, value: &Value<'js>) -> Option<RootId> {
        let saved = Persistent::save(ctx, value.clone());
        self.identity.get(&saved).copied()
    }

    /// Register `holder` as the host side of the container rooted at
    /// `origin`. Later coercions of that guest object resolve to `holder`.
    pub(crate) fn link(&mut self, holder: &HostRef, origin: RootId, snapshot: Snapshot) {
        self.register(holder, &[origin]);
        let id = HostObject::id(holder);
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.snapshot = Some(snapshot);
        }
        self.linked.insert(origin, id);
    }

    /// The host container linked to the guest object rooted at `origin`.
    pub fn linked(&self, origin: RootId) -> Option<HostRef> {
        let id = self.linked.get(&origin)?;
        self.entries.get(id).map(|entry| entry.holder.clone())
    }

    pub(crate) fn snapshot(&self, holder: &HostRef) -> Option<Snapshot> {
        self.entries
            .get(&HostObject::id(holder))
            .and_then(|entry| entry.snapshot.clone())
    }

    pub(crate) fn set_snapshot(&mut self, holder: &HostRef, snapshot: Snapshot) {
        if let Some(entry) = self.entries.get_mut(&HostObject::id(holder)) {
            entry.snapshot = Some(snapshot);
        }
    }

    /// Linked containers the host still references.
    pub fn linked_holders(&self) -> Vec<HostRef> {
        self.entries
            .values()
            .filter(|entry| entry.snapshot.is_some() && Rc::strong_count(&entry.holder) > 1)
            .map(|entry| entry.holder.clone())
            .collect()
    }

    pub fn roots_of(&self, holder: &HostRef) -> Option<&[RootId]> {
        self.entries
            .get(&HostObject::id(holder))
            .map(|entry| entry.roots.as_slice())
    }

    pub fn is_rooted(&self, id: RootId) -> bool {
        self.roots.contains_key(&id)
    }

    pub fn restore<'js>(&self, ctx: &Ctx<'js>, id: RootId) -> rquickjs::Result<Value<'js>> {
        let root = self.roots.get(&id).ok_or_else(|| {
            Error::new_from_js_message("root", "value", "guest root has been released")
        })?;
        root.value.clone().restore(ctx)
    }

    /// Root `value` on behalf of a continuation rather than a holder.
    pub fn pin<'js>(&mut self, ctx: &Ctx<'js>, value: &Value<'js>) -> RootId {
        let id = self.root(ctx, value);
        if let Some(root) = self.roots.get_mut(&id) {
            root.pins += 1;
        }
        id
    }

    pub fn unpin(&mut self, id: RootId) {
        if let Some(root) = self.roots.get_mut(&id) {
            root.pins = root.pins.saturating_sub(1);
        }
    }

    /// Drop the entries of dead holders and release every root that is no
    /// longer listed or pinned.
    ///
    /// Dropping a dead holder can make the holders it contained dead as well,
    /// so passes repeat until one finds nothing to remove. Host objects
    /// dropped here must not call back into the engine.
    pub fn reconcile(&mut self) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        loop {
            let dead: Vec<HostId> = self
                .entries
                .iter()
                .filter(|(_, entry)| Rc::strong_count(&entry.holder) == 1)
                .map(|(id, _)| *id)
                .collect();
            if dead.is_empty() {
                break;
            }

            let mut finalized = Vec::with_capacity(dead.len());
            let mut released = Vec::new();
            for id in dead {
                let Some(entry) = self.entries.shift_remove(&id) else {
                    continue;
                };
                report.dead_entries += 1;
                if let Some(origin) = entry.roots.first() {
                    if self.linked.get(origin) == Some(&id) {
                        self.linked.remove(origin);
                    }
                }
                for root in &entry.roots {
                    let shared = self
                        .entries
                        .values()
                        .any(|other| other.roots.contains(root));
                    if shared {
                        report.shared_roots_kept += 1;
                    } else if let Some(value) = self.release(*root) {
                        report.released_roots += 1;
                        released.push(value);
                    }
                }
                finalized.push(entry.holder);
            }
            drop(released);
            drop(finalized);
        }

        let orphans: Vec<RootId> = self
            .roots
            .iter()
            .filter(|(id, root)| {
                root.pins == 0 && !self.entries.values().any(|entry| entry.roots.contains(id))
            })
            .map(|(id, _)| *id)
            .collect();
        for id in orphans {
            if self.release(id).is_some() {
                report.orphans_swept += 1;
            }
        }

        self.pending_registrations = 0;
        debug!(?report, "reconciled guest root table");
        report
    }

    // Pinned roots are never released here; the continuation unpins first.
    fn release(&mut self, id: RootId) -> Option<Rooted> {
        if self.roots.get(&id)?.pins > 0 {
            return None;
        }
        let root = self.roots.remove(&id)?;
        self.identity.remove(&root.value);
        Some(root.value)
    }

    /// Release everything. Must run before the guest runtime is dropped.
    pub fn clear(&mut self) -> usize {
        let released = self.roots.len();
        self.entries.clear();
        self.linked.clear();
        self.identity.clear();
        self.roots.clear();
        self.pending_registrations = 0;
        released
    }

    pub fn pending_registrations(&self) -> usize {
        self.pending_registrations
    }

    pub fn stats(&self) -> RootStats {
        RootStats {
            entries: self.entries.len(),
            roots: self.roots.len(),
            pinned: self.roots.values().filter(|root| root.pins > 0).count(),
            linked: self.linked.len(),
            pending_registrations: self.pending_registrations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rquickjs::{Context, Object, Runtime};

    fn with_table(f: impl FnOnce(&mut GuestRootTable, Ctx<'_>)) {
        let runtime = Runtime::new().unwrap();
        let context = Context::full(&runtime).unwrap();
        let mut table = GuestRootTable::new();
        context.with(|ctx| {
            f(&mut table, ctx.clone());
            table.clear();
        });
    }

    #[test]
    fn test_same_guest_object_shares_root() {
        with_table(|table, ctx| {
            let object = Object::new(ctx.clone()).unwrap().into_value();
            let first = table.root(&ctx, &object);
            let second = table.root(&ctx, &object.clone());
            assert_eq!(first, second);

            let other = Object::new(ctx.clone()).unwrap().into_value();
            assert_ne!(table.root(&ctx, &other), first);
        });
    }

    #[test]
    fn test_shared_root_survives_one_holder() {
        with_table(|table, ctx| {
            let object = Object::new(ctx.clone()).unwrap().into_value();
            let root = table.root(&ctx, &object);

            let a = HostObject::list([]);
            let b = HostObject::list([]);
            table.register(&a, &[root]);
            table.register(&b, &[root]);

            drop(a);
            let report = table.reconcile();
            assert_eq!(report.dead_entries, 1);
            assert_eq!(report.shared_roots_kept, 1);
            assert!(table.is_rooted(root));

            drop(b);
            let report = table.reconcile();
            assert_eq!(report.released_roots, 1);
            assert!(!table.is_rooted(root));
            assert_eq!(table.stats().entries, 0);
        });
    }

    #[test]
    fn test_live_holder_keeps_roots() {
        with_table(|table, ctx| {
            let object = Object::new(ctx.clone()).unwrap().into_value();
            let root = table.root(&ctx, &object);
            let holder = HostObject::dict(Vec::<(String, HostRef)>::new());
            table.register(&holder, &[root]);

            assert_eq!(table.reconcile(), ReconcileReport::default());
            assert_eq!(table.origin(&holder), Some(root));
            assert!(table.restore(&ctx, root).unwrap().is_object());
        });
    }

    #[test]
    fn test_nested_holders_cascade() {
        with_table(|table, ctx| {
            let outer_obj = Object::new(ctx.clone()).unwrap().into_value();
            let inner_obj = Object::new(ctx.clone()).unwrap().into_value();
            let inner = HostObject::list([]);
            let outer = HostObject::list([inner.clone()]);
            let inner_root = table.root(&ctx, &inner_obj);
            let outer_root = table.root(&ctx, &outer_obj);
            table.register(&inner, &[inner_root]);
            table.register(&outer, &[outer_root]);
            drop(inner);
            drop(outer);

            let report = table.reconcile();
            assert_eq!(report.dead_entries, 2);
            assert_eq!(report.released_roots, 2);
            assert_eq!(table.stats().roots, 0);
        });
    }

    #[test]
    fn test_pinned_orphan_survives_sweep() {
        with_table(|table, ctx| {
            let pinned = Object::new(ctx.clone()).unwrap().into_value();
            let loose = Object::new(ctx.clone()).unwrap().into_value();
            let pin = table.pin(&ctx, &pinned);
            let orphan = table.root(&ctx, &loose);

            let report = table.reconcile();
            assert_eq!(report.orphans_swept, 1);
            assert!(table.is_rooted(pin));
            assert!(!table.is_rooted(orphan));
            assert!(table.restore(&ctx, orphan).is_err());

            table.unpin(pin);
            table.reconcile();
            assert!(!table.is_rooted(pin));
        });
    }

    #[test]
    fn test_linked_container_resolves_until_dead() {
        with_table(|table, ctx| {
            let object = Object::new(ctx.clone()).unwrap().into_value();
            let origin = table.root(&ctx, &object);
            let holder = HostObject::list([HostObject::int(1)]);
            let snapshot = Snapshot::list(holder.items().unwrap().iter());
            table.link(&holder, origin, snapshot);

            assert_eq!(table.find(&ctx, &object), Some(origin));
            let found = table.linked(origin).unwrap();
            assert!(Rc::ptr_eq(&found, &holder));
            drop(found);
            assert_eq!(table.linked_holders().len(), 1);
            assert_eq!(table.stats().linked, 1);

            drop(holder);
            assert!(table.linked_holders().is_empty());
            table.reconcile();
            assert!(table.linked(origin).is_none());
            assert_eq!(table.find(&ctx, &object), None);
            assert_eq!(table.stats().linked, 0);
        });
    }
}
