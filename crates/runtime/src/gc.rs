//! Mark-and-sweep collection
//!
//! A cycle rebuilds the live-byte count from scratch: marking accrues each
//! reached object's size (tail arrays and owned side buffers included), so
//! the sweep's survivors are exactly what `bytes_allocated` describes
//! afterwards. Roots are the temporary root stack, the current fiber, the
//! module map, the well-known class registry, and whatever an external
//! marker (the compiler) reports. Cycles in the object graph are handled
//! by the mark bit; the sweep walks the intrusive list once, unlinking and
//! freeing everything left unmarked.

use crate::heap::{Heap, flex_layout};
use crate::object::{
    MapEntry, Method, Obj, ObjClass, ObjClosure, ObjFiber, ObjFn, ObjInstance, ObjKind, ObjList,
    ObjMap, ObjModule, ObjRange, ObjString, ObjUpvalue, obj_allocation_size,
};
use crate::Value;
use skein_core::{Alloc, Buffer};
use std::mem::size_of;
use std::time::Instant;
use tracing::{debug, trace};

impl Heap {
    /// Run a full collection: mark from the roots, sweep the object list,
    /// and recompute the collection threshold from what survived.
    pub fn collect(&mut self) {
        let before = self.bytes_allocated;
        let start = Instant::now();

        // Marking re-accrues the live set from zero.
        self.bytes_allocated = 0;

        let temp_roots = self.temp_roots;
        for &root in &temp_roots[..self.num_temp_roots] {
            self.mark_obj(root);
        }

        self.mark_obj(self.fiber as *mut Obj);
        self.mark_obj(self.modules as *mut Obj);
        for class_obj in self.classes.slots() {
            self.mark_obj(class_obj as *mut Obj);
        }

        if let Some(marker) = self.root_marker {
            // Safety: whoever registered the marker guarantees it stays
            // valid until cleared.
            unsafe {
                (*marker).mark_roots(self);
            }
        }

        // Sweep: unlink and free every unmarked object, clearing the mark
        // on survivors for the next cycle.
        // Safety: the list threads every object exactly once, and nothing
        // freed here is reachable from a marked object.
        unsafe {
            let mut link: *mut *mut Obj = &raw mut self.first;
            while !(*link).is_null() {
                if !(**link).marked {
                    let unreached = *link;
                    *link = (*unreached).next;
                    self.free_obj(unreached);
                } else {
                    (**link).marked = false;
                    link = &raw mut (**link).next;
                }
            }
        }

        self.next_gc = ((self.bytes_allocated as f64 * self.config.heap_growth) as usize)
            .max(self.config.min_heap_size);

        let elapsed = start.elapsed();
        self.stats.collections += 1;
        self.stats.bytes_reclaimed += before.saturating_sub(self.bytes_allocated) as u64;
        self.stats.total_pause_micros += elapsed.as_micros() as u64;

        debug!(
            before_bytes = before,
            live_bytes = self.bytes_allocated,
            next_gc = self.next_gc,
            elapsed_micros = elapsed.as_micros() as u64,
            "collection finished"
        );
    }

    /// Mark `obj` and everything reachable from it. Null and
    /// already-marked objects are no-ops, which is what terminates cycles.
    pub fn mark_obj(&mut self, obj: *mut Obj) {
        if obj.is_null() {
            return;
        }

        // Safety: obj is a live object (reachable from a root).
        unsafe {
            if (*obj).marked {
                return;
            }
            (*obj).marked = true;

            let kind = (*obj).kind;
            trace!(obj = ?obj, kind = ?kind, "mark");

            // Every reached object re-contributes its own allocation to
            // the live count; the per-kind markers below add any side
            // buffers they own.
            self.bytes_allocated += obj_allocation_size(obj);

            match (*obj).kind {
                ObjKind::Class => self.mark_class(obj as *mut ObjClass),
                ObjKind::Closure => self.mark_closure(obj as *mut ObjClosure),
                ObjKind::Fiber => self.mark_fiber(obj as *mut ObjFiber),
                ObjKind::Fn => self.mark_fn(obj as *mut ObjFn),
                ObjKind::Instance => self.mark_instance(obj as *mut ObjInstance),
                ObjKind::List => self.mark_list(obj as *mut ObjList),
                ObjKind::Map => self.mark_map(obj as *mut ObjMap),
                ObjKind::Module => self.mark_module(obj as *mut ObjModule),
                // Strings and ranges hold no references.
                ObjKind::Range | ObjKind::String => {}
                ObjKind::Upvalue => self.mark_upvalue(obj as *mut ObjUpvalue),
            }
        }
    }

    /// Mark the object behind `value`, if it is one.
    pub fn mark_value(&mut self, value: Value) {
        if value.is_obj() {
            self.mark_obj(value.as_obj());
        }
    }

    /// Mark every value in `buffer`.
    pub fn mark_buffer(&mut self, buffer: &Buffer<Value>) {
        for &value in buffer.as_slice() {
            self.mark_value(value);
        }
    }

    unsafe fn mark_class(&mut self, class_obj: *mut ObjClass) {
        // Safety: live object, per mark_obj.
        unsafe {
            // The metaclass.
            self.mark_obj((*class_obj).obj.class_obj as *mut Obj);
            self.mark_obj((*class_obj).superclass as *mut Obj);

            // Method function objects; primitives and foreign methods are
            // bare function pointers.
            for symbol in 0..(*class_obj).methods.count() {
                if let Method::Block(fn_obj) = (*class_obj).methods.as_slice()[symbol] {
                    self.mark_obj(fn_obj);
                }
            }

            self.mark_obj((*class_obj).name as *mut Obj);

            self.bytes_allocated += (*class_obj).methods.capacity() * size_of::<Method>();
        }
    }

    unsafe fn mark_closure(&mut self, closure: *mut ObjClosure) {
        // Safety: live object, per mark_obj.
        unsafe {
            self.mark_obj((*closure).fn_obj as *mut Obj);

            for i in 0..(*closure).num_upvalues as usize {
                let upvalue = (*closure).upvalues()[i];
                self.mark_obj(upvalue as *mut Obj);
            }
        }
    }

    unsafe fn mark_fiber(&mut self, fiber: *mut ObjFiber) {
        // Safety: live object, per mark_obj.
        unsafe {
            // Every frame's function.
            for i in 0..(*fiber).num_frames as usize {
                self.mark_obj((*fiber).frames[i].fn_obj);
            }

            // Every live stack slot.
            let mut slot = (&raw mut (*fiber).stack) as *mut Value;
            while slot < (*fiber).stack_top {
                self.mark_value(slot.read());
                slot = slot.add(1);
            }

            // Open upvalues still pointing into that stack.
            let mut upvalue = (*fiber).open_upvalues;
            while !upvalue.is_null() {
                self.mark_obj(upvalue as *mut Obj);
                upvalue = (*upvalue).next;
            }

            self.mark_obj((*fiber).caller as *mut Obj);
            self.mark_value((*fiber).error);
        }
    }

    unsafe fn mark_fn(&mut self, fn_obj: *mut ObjFn) {
        // Safety: live object, per mark_obj.
        unsafe {
            for i in 0..(*fn_obj).num_constants as usize {
                self.mark_value(*(*fn_obj).constants.add(i));
            }

            self.mark_obj((*(*fn_obj).debug).source_path as *mut Obj);

            self.bytes_allocated += (*fn_obj).bytecode_length as usize;
            self.bytes_allocated += size_of::<Value>() * (*fn_obj).num_constants as usize;
            if !(*(*fn_obj).debug).source_lines.is_null() {
                self.bytes_allocated += size_of::<u32>() * (*fn_obj).bytecode_length as usize;
            }
        }
    }

    unsafe fn mark_instance(&mut self, instance: *mut ObjInstance) {
        // Safety: live object, per mark_obj.
        unsafe {
            self.mark_obj((*instance).obj.class_obj as *mut Obj);

            for i in 0..(*instance).num_fields as usize {
                let field = (*instance).fields()[i];
                self.mark_value(field);
            }
        }
    }

    unsafe fn mark_list(&mut self, list: *mut ObjList) {
        // Safety: live object, per mark_obj.
        unsafe {
            for i in 0..(*list).elements.count() {
                let element = (*list).elements.as_slice()[i];
                self.mark_value(element);
            }

            self.bytes_allocated += size_of::<Value>() * (*list).elements.capacity();
        }
    }

    unsafe fn mark_map(&mut self, map: *mut ObjMap) {
        // Safety: live object, per mark_obj.
        unsafe {
            for i in 0..(*map).capacity as usize {
                let entry = (*map).entries.add(i);
                if (*entry).key.is_undefined() {
                    continue;
                }
                self.mark_value((*entry).key);
                self.mark_value((*entry).value);
            }

            self.bytes_allocated += size_of::<MapEntry>() * (*map).capacity as usize;
        }
    }

    unsafe fn mark_module(&mut self, module: *mut ObjModule) {
        // Safety: live object, per mark_obj.
        unsafe {
            for i in 0..(*module).variables.count() {
                let variable = (*module).variables.as_slice()[i];
                self.mark_value(variable);
            }

            self.mark_obj((*module).name as *mut Obj);
        }
    }

    unsafe fn mark_upvalue(&mut self, upvalue: *mut ObjUpvalue) {
        // Safety: live object, per mark_obj.
        unsafe {
            // The captured value, in case the upvalue is closed. The open
            // case points into a fiber stack marked by its owner.
            self.mark_value((*upvalue).closed);
        }
    }

    /// Release `obj`: per-kind owned buffers first, then the object's own
    /// allocation. No reference chasing; everything freed here is owned by
    /// `obj` alone.
    ///
    /// # Safety
    /// `obj` must be a valid object that is no longer reachable, already
    /// unlinked (or being unlinked) from the object list.
    pub unsafe fn free_obj(&mut self, obj: *mut Obj) {
        // Safety: obj is valid per the caller contract.
        let kind = unsafe { (*obj).kind };
        trace!(obj = ?obj, kind = ?kind, "free");

        // Safety: obj is valid per the caller contract; each owned buffer
        // is released exactly once.
        unsafe {
            match (*obj).kind {
                ObjKind::Class => {
                    (*(obj as *mut ObjClass)).methods.clear(self);
                    self.deallocate(obj as *mut ObjClass);
                }

                ObjKind::Closure => {
                    let num_upvalues = (*(obj as *mut ObjClosure)).num_upvalues as usize;
                    self.deallocate_layout(
                        obj as *mut u8,
                        flex_layout::<ObjClosure, *mut ObjUpvalue>(num_upvalues),
                    );
                }

                ObjKind::Fiber => self.deallocate(obj as *mut ObjFiber),

                ObjKind::Fn => {
                    let fn_obj = obj as *mut ObjFn;
                    let debug_info = (*fn_obj).debug;
                    self.dealloc_array((*fn_obj).constants, (*fn_obj).num_constants as usize);
                    self.dealloc_array((*fn_obj).bytecode, (*fn_obj).bytecode_length as usize);
                    self.dealloc_array((*debug_info).name, (*debug_info).name_len);
                    if !(*debug_info).source_lines.is_null() {
                        self.dealloc_array(
                            (*debug_info).source_lines,
                            (*fn_obj).bytecode_length as usize,
                        );
                    }
                    self.deallocate(debug_info);
                    self.deallocate(fn_obj);
                }

                ObjKind::Instance => {
                    let num_fields = (*(obj as *mut ObjInstance)).num_fields as usize;
                    self.deallocate_layout(
                        obj as *mut u8,
                        flex_layout::<ObjInstance, Value>(num_fields),
                    );
                }

                ObjKind::List => {
                    (*(obj as *mut ObjList)).elements.clear(self);
                    self.deallocate(obj as *mut ObjList);
                }

                ObjKind::Map => {
                    let map = obj as *mut ObjMap;
                    self.dealloc_array((*map).entries, (*map).capacity as usize);
                    self.deallocate(map);
                }

                ObjKind::Module => {
                    let module = obj as *mut ObjModule;
                    (*module).variable_names.clear(self);
                    (*module).variables.clear(self);
                    self.deallocate(module);
                }

                ObjKind::Range => self.deallocate(obj as *mut ObjRange),

                ObjKind::String => {
                    let length = (*(obj as *mut ObjString)).length as usize;
                    self.deallocate_layout(obj as *mut u8, flex_layout::<ObjString, u8>(length + 1));
                }

                ObjKind::Upvalue => self.deallocate(obj as *mut ObjUpvalue),
            }
        }
    }
}
