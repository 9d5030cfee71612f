//! The hash map
//!
//! Open addressing with linear probing over a flat entry array. Slot
//! states are encoded in the entry itself:
//!
//! - empty:     key undefined, value false
//! - tombstone: key undefined, value true
//! - occupied:  key anything else
//!
//! Tombstones keep probe chains intact after removals; they are recycled
//! on insert and dropped wholesale on resize. Capacity is zero or at least
//! `MIN_CAPACITY`, and the load factor never exceeds `MAP_LOAD_PERCENT`.

use crate::heap::Heap;
use crate::object::{MapEntry, ObjMap};
use crate::value::{hash_value, values_equal};
use crate::{FALSE_VAL, NULL_VAL, TRUE_VAL, UNDEFINED_VAL, Value};
use skein_core::{Alloc, GROW_FACTOR, MIN_CAPACITY};
use std::ptr;

/// The maximum percentage of entries that may be occupied before the map
/// grows. Lower load spends memory to shorten probe chains.
pub const MAP_LOAD_PERCENT: u32 = 75;

const MIN_ENTRIES: u32 = MIN_CAPACITY as u32;
const GROW: u32 = GROW_FACTOR as u32;

impl ObjMap {
    /// Look up `key`, returning its value or undefined when absent.
    pub fn get(&self, key: Value) -> Value {
        let entry = self.find_entry(key);
        if entry.is_null() {
            return UNDEFINED_VAL;
        }
        // Safety: find_entry returns a pointer into the live entry array.
        unsafe { (*entry).value }
    }

    /// Whether `key` is present.
    pub fn contains_key(&self, key: Value) -> bool {
        !self.find_entry(key).is_null()
    }

    /// Associate `key` with `value`, overwriting any existing entry.
    ///
    /// `key` must be a hashable value and not undefined; if key or value
    /// are objects, the caller keeps them reachable across the call.
    pub fn set(&mut self, heap: &mut Heap, key: Value, value: Value) {
        debug_assert!(!key.is_undefined(), "undefined cannot be a map key");

        // Make room first if this entry would push the load too high.
        if self.count + 1 > self.capacity * MAP_LOAD_PERCENT / 100 {
            let capacity = (self.capacity * GROW).max(MIN_ENTRIES);
            self.resize(heap, capacity);
        }

        if Self::insert_entry(self.entries, self.capacity, key, value) {
            self.count += 1;
        }
    }

    /// Remove `key`, returning its value, or null if it was absent.
    pub fn remove_key(&mut self, heap: &mut Heap, key: Value) -> Value {
        let entry = self.find_entry(key);
        if entry.is_null() {
            return NULL_VAL;
        }

        // Safety: entry points into the live entry array.
        let value = unsafe {
            let value = (*entry).value;
            // Tombstone the slot so later probes keep walking past it.
            (*entry).key = UNDEFINED_VAL;
            (*entry).value = TRUE_VAL;
            value
        };

        if value.is_obj() {
            // This may have been the only reference; hold it across the
            // shrink below.
            heap.push_root(value.as_obj());
        }

        self.count -= 1;

        if self.count == 0 {
            // The last entry is gone; drop the array entirely.
            self.clear(heap);
        } else if self.capacity > MIN_ENTRIES
            && self.count < self.capacity / GROW * MAP_LOAD_PERCENT / 100
        {
            let capacity = (self.capacity / GROW).max(MIN_ENTRIES);
            self.resize(heap, capacity);
        }

        if value.is_obj() {
            heap.pop_root();
        }

        value
    }

    /// Release the entry array and reset to the empty state.
    pub fn clear(&mut self, heap: &mut Heap) {
        heap.dealloc_array(self.entries, self.capacity as usize);
        self.entries = ptr::null_mut();
        self.capacity = 0;
        self.count = 0;
    }

    /// Probe for `key`. Returns a pointer to its entry, or null when the
    /// probe hits an empty slot first. Tombstones are skipped.
    fn find_entry(&self, key: Value) -> *mut MapEntry {
        // An empty map has no entry array at all.
        if self.capacity == 0 {
            return ptr::null_mut();
        }

        let mut index = (hash_value(key) % self.capacity) as usize;
        loop {
            // Safety: index stays below capacity, and the load invariant
            // guarantees an empty slot so the probe terminates.
            unsafe {
                let entry = self.entries.add(index);
                if (*entry).key.is_undefined() {
                    if (*entry).value.is_false() {
                        return ptr::null_mut();
                    }
                    // A tombstone: the key may still be further along.
                } else if values_equal((*entry).key, key) {
                    return entry;
                }
            }

            index = (index + 1) % self.capacity as usize;
        }
    }

    /// Insert into `entries` directly. Returns true when `key` was not
    /// already present. Recycles the first tombstone crossed when the
    /// probe ends at an empty slot.
    fn insert_entry(entries: *mut MapEntry, capacity: u32, key: Value, value: Value) -> bool {
        debug_assert!(capacity > 0, "inserting into an unallocated map");

        let mut index = (hash_value(key) % capacity) as usize;
        let mut tombstone: Option<usize> = None;

        loop {
            // Safety: index stays below capacity; the caller resized ahead
            // of this insert, so an empty slot exists and the probe
            // terminates.
            unsafe {
                let entry = entries.add(index);
                if (*entry).key.is_undefined() {
                    if (*entry).value.is_false() {
                        // Empty: the key is new. Prefer a tombstone slot
                        // passed on the way here.
                        let target = match tombstone {
                            Some(recycled) => entries.add(recycled),
                            None => entry,
                        };
                        (*target).key = key;
                        (*target).value = value;
                        return true;
                    }
                    if tombstone.is_none() {
                        tombstone = Some(index);
                    }
                } else if values_equal((*entry).key, key) {
                    (*entry).value = value;
                    return false;
                }
            }

            index = (index + 1) % capacity as usize;
        }
    }

    /// Rebuild the entry array at `capacity`, re-adding occupied entries
    /// and dropping tombstones.
    fn resize(&mut self, heap: &mut Heap, capacity: u32) {
        // The allocation may collect; the map still holds its old,
        // consistent array at that point.
        let entries: *mut MapEntry = heap.alloc_array(capacity as usize);
        for i in 0..capacity as usize {
            // Safety: entries has capacity slots.
            unsafe {
                entries.add(i).write(MapEntry {
                    key: UNDEFINED_VAL,
                    value: FALSE_VAL,
                });
            }
        }

        if self.capacity > 0 {
            for i in 0..self.capacity as usize {
                // Safety: the old array has self.capacity initialized
                // entries.
                unsafe {
                    let entry = self.entries.add(i);
                    if (*entry).key.is_undefined() {
                        continue;
                    }
                    Self::insert_entry(entries, capacity, (*entry).key, (*entry).value);
                }
            }
        }

        heap.dealloc_array(self.entries, self.capacity as usize);
        self.entries = entries;
        self.capacity = capacity;
    }
}
