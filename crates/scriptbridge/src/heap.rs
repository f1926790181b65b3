//! Generation-checked storage for native instances.
//!
//! Every native object reachable from script code lives in an [`ObjectHeap`]
//! slot. Script values carry an [`ObjectHandle`] plus a shared
//! [`ScriptAnchor`]; when the interpreter drops the last script reference the
//! anchor queues the handle for release and the heap reclaims the slot on the
//! next [`ObjectHeap::collect`].

use std::{
    any::Any,
    cell::RefCell,
    fmt,
    rc::{Rc, Weak},
};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    error::{BridgeError, BridgeResult},
    types::TypeId,
    value::ValueKind,
};

/// Opaque reference to a live native instance.
///
/// A handle whose slot has been reused or freed fails every lookup with
/// [`BridgeError::StaleHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectHandle {
    index: u32,
    generation: u32,
}

impl ObjectHandle {
    pub(crate) fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Slot index in the heap.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Generation of the slot when this handle was issued.
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

/// Handles whose last script reference has been dropped.
pub(crate) type ReleaseQueue = Rc<RefCell<Vec<ObjectHandle>>>;

/// Shared by every script value that refers to one handle.
///
/// Dropping the last clone notifies the heap.
#[derive(Debug)]
pub(crate) struct ScriptAnchor {
    handle: ObjectHandle,
    released: ReleaseQueue,
}

impl Drop for ScriptAnchor {
    fn drop(&mut self) {
        // The queue may be borrowed if a native value is dropped during collection.
        if let Ok(mut queue) = self.released.try_borrow_mut() {
            queue.push(self.handle);
        }
    }
}

struct Entry {
    type_id: TypeId,
    value: Box<dyn Any>,
    pinned: bool,
    anchor: Weak<ScriptAnchor>,
}

struct Slot {
    generation: u32,
    entry: Option<Entry>,
}

/// Arena owning every native instance of a session.
pub(crate) struct ObjectHeap {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
    released: ReleaseQueue,
}

impl ObjectHeap {
    pub(crate) fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
            released: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// Number of live instances.
    pub(crate) fn len(&self) -> usize {
        self.live
    }

    /// Store a new instance and return its handle.
    pub(crate) fn insert(&mut self, type_id: TypeId, value: Box<dyn Any>, pinned: bool) -> ObjectHandle {
        let entry = Entry {
            type_id,
            value,
            pinned,
            anchor: Weak::new(),
        };
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.entry = Some(entry);
            return ObjectHandle::new(index, slot.generation);
        }
        let index = u32::try_from(self.slots.len()).unwrap_or(u32::MAX);
        self.slots.push(Slot {
            generation: 0,
            entry: Some(entry),
        });
        ObjectHandle::new(index, 0)
    }

    fn entry(&self, handle: ObjectHandle) -> BridgeResult<&Entry> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.entry.as_ref())
            .ok_or(BridgeError::StaleHandle(handle))
    }

    fn entry_mut(&mut self, handle: ObjectHandle) -> BridgeResult<&mut Entry> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.entry.as_mut())
            .ok_or(BridgeError::StaleHandle(handle))
    }

    /// Whether the handle names a live instance.
    pub(crate) fn contains(&self, handle: ObjectHandle) -> bool {
        self.entry(handle).is_ok()
    }

    /// Registered type of a live instance.
    pub(crate) fn type_of(&self, handle: ObjectHandle) -> BridgeResult<TypeId> {
        self.entry(handle).map(|e| e.type_id)
    }

    /// Borrow an instance as its concrete Rust type.
    pub(crate) fn get<T: 'static>(&self, handle: ObjectHandle) -> BridgeResult<&T> {
        self.entry(handle)?
            .value
            .downcast_ref::<T>()
            .ok_or_else(|| BridgeError::type_mismatch(ValueKind::Object, "object of another type"))
    }

    pub(crate) fn get_any(&self, handle: ObjectHandle) -> BridgeResult<&dyn Any> {
        self.entry(handle).map(|e| e.value.as_ref())
    }

    pub(crate) fn get_any_mut(&mut self, handle: ObjectHandle) -> BridgeResult<&mut dyn Any> {
        self.entry_mut(handle).map(|e| e.value.as_mut())
    }

    /// The shared anchor for script references to `handle`, created on demand.
    pub(crate) fn anchor(&mut self, handle: ObjectHandle) -> BridgeResult<Rc<ScriptAnchor>> {
        let released = self.released.clone();
        let entry = self.entry_mut(handle)?;
        if let Some(anchor) = entry.anchor.upgrade() {
            return Ok(anchor);
        }
        let anchor = Rc::new(ScriptAnchor { handle, released });
        entry.anchor = Rc::downgrade(&anchor);
        Ok(anchor)
    }

    /// Keep the instance alive on behalf of the host.
    pub(crate) fn pin(&mut self, handle: ObjectHandle) -> BridgeResult<()> {
        self.entry_mut(handle)?.pinned = true;
        Ok(())
    }

    /// Drop the host's claim on an instance, freeing it if no script
    /// reference remains.
    pub(crate) fn unpin(&mut self, handle: ObjectHandle) -> BridgeResult<()> {
        let entry = self.entry_mut(handle)?;
        entry.pinned = false;
        if entry.anchor.strong_count() == 0 {
            self.remove(handle);
        }
        Ok(())
    }

    fn is_unreferenced(&self, handle: ObjectHandle) -> bool {
        self.entry(handle)
            .map(|e| !e.pinned && e.anchor.strong_count() == 0)
            .unwrap_or(false)
    }

    fn remove(&mut self, handle: ObjectHandle) {
        let Some(slot) = self.slots.get_mut(handle.index as usize) else {
            return;
        };
        if slot.generation != handle.generation || slot.entry.is_none() {
            return;
        }
        let entry = slot.entry.take();
        self.live -= 1;
        // A slot whose generation would wrap is retired instead of reused.
        if slot.generation < u32::MAX {
            slot.generation += 1;
            self.free.push(handle.index);
        }
        drop(entry);
    }

    /// Free instances whose script references have all been dropped.
    pub(crate) fn collect(&mut self) -> usize {
        let released = std::mem::take(&mut *self.released.borrow_mut());
        let mut freed = 0;
        for handle in released {
            if self.is_unreferenced(handle) {
                self.remove(handle);
                freed += 1;
            }
        }
        if freed > 0 {
            debug!(freed, live = self.live, "released native objects");
        }
        freed
    }

    /// Free the given fresh allocations unless something now refers to them.
    pub(crate) fn sweep(&mut self, handles: &[ObjectHandle]) {
        for &handle in handles {
            if self.is_unreferenced(handle) {
                self.remove(handle);
            }
        }
    }

    /// Invalidate every handle at once.
    pub(crate) fn clear(&mut self) -> usize {
        let mut freed = 0;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.entry.take().is_some() {
                freed += 1;
                if slot.generation < u32::MAX {
                    slot.generation += 1;
                    self.free.push(index as u32);
                }
            }
        }
        self.live = 0;
        self.released.borrow_mut().clear();
        freed
    }
}
