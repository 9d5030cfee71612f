//! List insertion and removal
//!
//! Both operations are O(n) shifts over the element buffer. The growth
//! happens before the shift so a collection triggered by it always sees a
//! consistent list, and the value being moved in or out is held on the
//! root stack across that window.

use crate::heap::Heap;
use crate::object::ObjList;
use crate::{NULL_VAL, Value};
use skein_core::GROW_FACTOR;

impl ObjList {
    /// Insert `value` at `index`, shifting later elements up.
    ///
    /// The list itself must be reachable by the collector, as must `value`
    /// once this returns (the interpreter keeps both on the fiber stack).
    pub fn insert(&mut self, heap: &mut Heap, value: Value, index: usize) {
        assert!(index <= self.elements.count(), "list index out of bounds");

        if value.is_obj() {
            heap.push_root(value.as_obj());
        }

        // Grow by appending a placeholder slot; this is the only point
        // that can allocate (and therefore collect).
        self.elements.write(heap, NULL_VAL);

        if value.is_obj() {
            heap.pop_root();
        }

        // Shift the existing elements down.
        let elements = self.elements.as_mut_slice();
        for i in (index + 1..elements.len()).rev() {
            elements[i] = elements[i - 1];
        }

        elements[index] = value;
    }

    /// Remove and return the element at `index`, shifting later elements
    /// down. Shrinks the storage once half of it is unused.
    pub fn remove_at(&mut self, heap: &mut Heap, index: usize) -> Value {
        let count = self.elements.count();
        assert!(index < count, "list index out of bounds");

        let removed = self.elements.as_slice()[index];
        if removed.is_obj() {
            // The removed value may have no other reference; hold it
            // across the shrink below.
            heap.push_root(removed.as_obj());
        }

        let elements = self.elements.as_mut_slice();
        for i in index..count - 1 {
            elements[i] = elements[i + 1];
        }

        if self.elements.capacity() / GROW_FACTOR >= count {
            let capacity = self.elements.capacity() / GROW_FACTOR;
            self.elements.shrink_capacity(heap, capacity);
        }

        if removed.is_obj() {
            heap.pop_root();
        }

        self.elements.truncate(count - 1);
        removed
    }
}
