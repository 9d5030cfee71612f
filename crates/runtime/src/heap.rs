//! The heap and allocator
//!
//! One `Heap` owns every object the runtime ever creates. Objects live in
//! a singly-linked intrusive list threaded through their headers; they are
//! never moved, and they die only in a sweep. All allocation funnels
//! through `reallocate`, which keeps the live-byte count and decides when
//! to collect — which is why callers hold in-flight objects on the
//! temporary root stack across any allocating call.
//!
//! The heap also carries the runtime-global state the collector needs to
//! see: the current fiber, the module map, the well-known class registry,
//! the method-name symbol table, and an optional external root marker the
//! compiler registers while a compilation is underway.

use crate::config::GcConfig;
use crate::object::{Obj, ObjClass, ObjFiber, ObjMap};
use crate::report::{self, GcStats};
use skein_core::{Alloc, SymbolTable, SystemAlloc};
use std::alloc::Layout;
use std::mem::{align_of, size_of};
use std::ptr;

/// Depth of the temporary root stack. Deep enough for the worst
/// constructor chain; overflowing it is a bug in the caller.
pub const MAX_TEMP_ROOTS: usize = 8;

/// Roots owned by an external collaborator, typically the compiler while a
/// compilation is in progress. The collector calls back into it during the
/// mark phase.
pub trait MarkRoots {
    fn mark_roots(&mut self, heap: &mut Heap);
}

/// Nullable slots for the classes the runtime knows by name. The
/// interpreter's bootstrap fills these in; constructors read them when
/// stamping object headers, and the collector treats every slot as a root.
#[derive(Clone, Copy)]
pub struct CoreClasses {
    /// The root class `Class`, its own class's class.
    pub class_class: *mut ObjClass,
    pub object_class: *mut ObjClass,
    pub bool_class: *mut ObjClass,
    pub null_class: *mut ObjClass,
    pub num_class: *mut ObjClass,
    pub string_class: *mut ObjClass,
    pub list_class: *mut ObjClass,
    pub map_class: *mut ObjClass,
    pub range_class: *mut ObjClass,
    pub fn_class: *mut ObjClass,
    pub fiber_class: *mut ObjClass,
}

impl CoreClasses {
    const fn new() -> Self {
        CoreClasses {
            class_class: ptr::null_mut(),
            object_class: ptr::null_mut(),
            bool_class: ptr::null_mut(),
            null_class: ptr::null_mut(),
            num_class: ptr::null_mut(),
            string_class: ptr::null_mut(),
            list_class: ptr::null_mut(),
            map_class: ptr::null_mut(),
            range_class: ptr::null_mut(),
            fn_class: ptr::null_mut(),
            fiber_class: ptr::null_mut(),
        }
    }

    pub(crate) fn slots(&self) -> [*mut ObjClass; 11] {
        [
            self.class_class,
            self.object_class,
            self.bool_class,
            self.null_class,
            self.num_class,
            self.string_class,
            self.list_class,
            self.map_class,
            self.range_class,
            self.fn_class,
            self.fiber_class,
        ]
    }
}

/// The runtime's heap: allocator, object list, and garbage collector.
pub struct Heap {
    /// Head of the all-objects list.
    pub(crate) first: *mut Obj,

    /// Bytes currently attributed to live data. Grows in `reallocate`,
    /// rebuilt from scratch during each mark phase.
    pub(crate) bytes_allocated: usize,
    /// Collect when `bytes_allocated` crosses this.
    pub(crate) next_gc: usize,
    gc_enabled: bool,
    pub(crate) config: GcConfig,

    pub(crate) temp_roots: [*mut Obj; MAX_TEMP_ROOTS],
    pub(crate) num_temp_roots: usize,

    /// The fiber the interpreter is currently running, or null.
    pub(crate) fiber: *mut ObjFiber,
    /// The global module map: module name string → module.
    pub(crate) modules: *mut ObjMap,
    /// Method names, indexed by the global method symbols class method
    /// tables are keyed on.
    pub method_names: SymbolTable,
    pub classes: CoreClasses,
    pub(crate) root_marker: Option<*mut dyn MarkRoots>,

    pub(crate) next_fiber_id: u32,
    pub(crate) stats: GcStats,
}

impl Heap {
    /// A heap configured from the environment (`SKEIN_MIN_HEAP`,
    /// `SKEIN_HEAP_GROWTH`, `SKEIN_GC_STRESS`), with defaults where unset.
    pub fn new() -> Heap {
        Heap::with_config(GcConfig::from_env())
    }

    pub fn with_config(config: GcConfig) -> Heap {
        let next_gc = config.min_heap_size;
        let mut heap = Heap {
            first: ptr::null_mut(),
            bytes_allocated: 0,
            next_gc,
            gc_enabled: true,
            config,
            temp_roots: [ptr::null_mut(); MAX_TEMP_ROOTS],
            num_temp_roots: 0,
            fiber: ptr::null_mut(),
            modules: ptr::null_mut(),
            method_names: SymbolTable::new(),
            classes: CoreClasses::new(),
            root_marker: None,
            next_fiber_id: 1,
            stats: GcStats::default(),
        };

        heap.modules = heap.new_map();
        heap
    }

    /// Allocate a single `T`. The storage is uninitialized.
    pub fn allocate<T>(&mut self) -> *mut T {
        self.reallocate(ptr::null_mut(), Layout::new::<()>(), Layout::new::<T>()) as *mut T
    }

    /// Allocate a `T` followed in the same allocation by `tail_count`
    /// elements of `Tail`. The storage is uninitialized.
    pub fn allocate_flex<T, Tail>(&mut self, tail_count: usize) -> *mut T {
        let layout = flex_layout::<T, Tail>(tail_count);
        self.reallocate(ptr::null_mut(), Layout::new::<()>(), layout) as *mut T
    }

    /// Release a single `T` obtained from `allocate`.
    pub fn deallocate<T>(&mut self, ptr: *mut T) {
        self.reallocate(ptr as *mut u8, Layout::new::<T>(), Layout::new::<()>());
    }

    /// Release an allocation by explicit layout (the flex-tail kinds).
    pub(crate) fn deallocate_layout(&mut self, ptr: *mut u8, layout: Layout) {
        self.reallocate(ptr, layout, Layout::new::<()>());
    }

    /// Protect `obj` from collection until the matching `pop_root`. The
    /// stack is tiny and strictly LIFO; it exists only to bridge the gap
    /// between creating an object and storing it somewhere reachable.
    pub fn push_root(&mut self, obj: *mut Obj) {
        debug_assert!(!obj.is_null(), "rooting a null object");
        assert!(
            self.num_temp_roots < MAX_TEMP_ROOTS,
            "temporary root stack overflow"
        );
        self.temp_roots[self.num_temp_roots] = obj;
        self.num_temp_roots += 1;
    }

    /// Release the most recently pushed temporary root.
    pub fn pop_root(&mut self) {
        debug_assert!(self.num_temp_roots > 0, "popping an empty root stack");
        self.num_temp_roots -= 1;
    }

    pub(crate) fn temp_roots(&self) -> &[*mut Obj] {
        &self.temp_roots[..self.num_temp_roots]
    }

    /// The fiber the collector will treat as the live execution context.
    pub fn set_current_fiber(&mut self, fiber: *mut ObjFiber) {
        self.fiber = fiber;
    }

    pub fn current_fiber(&self) -> *mut ObjFiber {
        self.fiber
    }

    /// The global module map.
    pub fn modules(&self) -> *mut ObjMap {
        self.modules
    }

    /// Register an external source of roots (the compiler, while it is
    /// running). The collector calls `mark_roots` on it each cycle.
    ///
    /// # Safety
    /// `marker` must stay valid until `clear_root_marker` is called.
    pub unsafe fn set_root_marker(&mut self, marker: *mut dyn MarkRoots) {
        self.root_marker = Some(marker);
    }

    pub fn clear_root_marker(&mut self) {
        self.root_marker = None;
    }

    /// Turn automatic collection off (and back on). Allocation still
    /// accounts bytes while disabled; the threshold check is skipped.
    pub fn set_gc_enabled(&mut self, enabled: bool) {
        self.gc_enabled = enabled;
    }

    pub fn gc_enabled(&self) -> bool {
        self.gc_enabled
    }

    pub fn bytes_allocated(&self) -> usize {
        self.bytes_allocated
    }

    pub fn next_gc(&self) -> usize {
        self.next_gc
    }

    pub fn config(&self) -> &GcConfig {
        &self.config
    }

    /// Collector counters since this heap was created.
    pub fn stats(&self) -> &GcStats {
        &self.stats
    }
}

impl Alloc for Heap {
    /// The single allocation entry point: account the size delta, collect
    /// first if the threshold (or stress mode) says so, then hand the
    /// request to the host allocator. Failure aborts inside `SystemAlloc`.
    fn reallocate(&mut self, ptr: *mut u8, old: Layout, new: Layout) -> *mut u8 {
        self.bytes_allocated =
            (self.bytes_allocated as isize + new.size() as isize - old.size() as isize) as usize;
        if self.bytes_allocated as u64 > self.stats.peak_live_bytes {
            self.stats.peak_live_bytes = self.bytes_allocated as u64;
        }

        if new.size() > 0
            && self.gc_enabled
            && (self.config.stress || self.bytes_allocated > self.next_gc)
        {
            self.collect();
        }

        SystemAlloc.reallocate(ptr, old, new)
    }
}

impl Default for Heap {
    fn default() -> Self {
        Heap::new()
    }
}

impl Drop for Heap {
    fn drop(&mut self) {
        // Free every object unconditionally; reachability no longer
        // matters.
        let mut obj = self.first;
        while !obj.is_null() {
            // Safety: the list links every live object exactly once.
            unsafe {
                let next = (*obj).next;
                self.free_obj(obj);
                obj = next;
            }
        }
        self.first = ptr::null_mut();

        let mut method_names = std::mem::take(&mut self.method_names);
        method_names.clear(self);

        report::emit_if_configured(&self.stats);
    }
}

/// Layout of a `T` followed by `tail_count` elements of `Tail` in one
/// allocation.
pub(crate) fn flex_layout<T, Tail>(tail_count: usize) -> Layout {
    debug_assert!(
        align_of::<Tail>() <= align_of::<T>(),
        "flex tail more aligned than its header"
    );

    let size = size_of::<Tail>()
        .checked_mul(tail_count)
        .and_then(|tail_size| size_of::<T>().checked_add(tail_size));
    let layout = match size {
        Some(size) => Layout::from_size_align(size, align_of::<T>()),
        None => panic!("allocation size overflow"),
    };
    match layout {
        Ok(layout) => layout,
        Err(_) => panic!("allocation size overflow"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_heap() -> Heap {
        Heap::with_config(GcConfig::default())
    }

    #[test]
    fn test_new_heap_has_module_map() {
        let heap = test_heap();
        assert!(!heap.modules().is_null());
        unsafe {
            assert_eq!((*heap.modules()).count, 0);
        }
    }

    #[test]
    fn test_bytes_accounting_tracks_alloc_and_free() {
        let mut heap = test_heap();
        let baseline = heap.bytes_allocated();

        let data: *mut u64 = heap.alloc_array(100);
        assert_eq!(heap.bytes_allocated(), baseline + 800);

        let data: *mut u64 = heap.resize_array(data, 100, 50);
        assert_eq!(heap.bytes_allocated(), baseline + 400);

        heap.dealloc_array(data, 50);
        assert_eq!(heap.bytes_allocated(), baseline);
    }

    #[test]
    fn test_root_stack_is_lifo() {
        let mut heap = test_heap();
        let a = 0x10 as *mut Obj;
        let b = 0x20 as *mut Obj;

        heap.push_root(a);
        heap.push_root(b);
        assert_eq!(heap.temp_roots(), &[a, b]);

        heap.pop_root();
        assert_eq!(heap.temp_roots(), &[a]);
        heap.pop_root();
        assert!(heap.temp_roots().is_empty());
    }

    #[test]
    #[should_panic(expected = "temporary root stack overflow")]
    fn test_root_stack_overflow_is_fatal() {
        let mut heap = test_heap();
        for i in 0..MAX_TEMP_ROOTS + 1 {
            heap.push_root((0x10 + i * 8) as *mut Obj);
        }
    }

    #[test]
    fn test_initial_next_gc_is_min_heap() {
        let config = GcConfig::default().with_min_heap_size(4096);
        let heap = Heap::with_config(config);
        assert_eq!(heap.next_gc(), 4096);
    }

    #[test]
    fn test_flex_layout_sizes() {
        use crate::object::{ObjInstance, ObjString};
        use crate::Value;

        let strings = flex_layout::<ObjString, u8>(6);
        assert_eq!(strings.size(), size_of::<ObjString>() + 6);

        let instances = flex_layout::<ObjInstance, Value>(3);
        assert_eq!(
            instances.size(),
            size_of::<ObjInstance>() + 3 * size_of::<Value>()
        );
        assert_eq!(instances.align(), align_of::<ObjInstance>());
    }

    #[test]
    fn test_gc_disabled_skips_threshold() {
        let mut heap = Heap::with_config(GcConfig::default().with_min_heap_size(1));
        let collections = heap.stats().collections;
        heap.set_gc_enabled(false);

        // Unrooted garbage would be collected if the threshold fired.
        let list = heap.new_list(8);
        let data: *mut u64 = heap.alloc_array(4096);
        heap.dealloc_array(data, 4096);
        unsafe {
            assert_eq!((*list).elements.count(), 8);
        }
        assert_eq!(heap.stats().collections, collections);
    }
}
