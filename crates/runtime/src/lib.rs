//! Skein Runtime: the heap object model and memory manager
//!
//! This crate is the engineering core of the Skein runtime: how values are
//! represented, how heap objects are laid out and linked, and how the
//! mark-and-sweep collector traverses them. The interpreter, compiler, and
//! embedding API live elsewhere and talk to this crate through the value
//! constructors, container operations, and GC entry points re-exported
//! below.
//!
//! # Value encodings
//!
//! `Value` is 64 bits wide either way; the `nan-boxing` feature (default)
//! selects the quiet-NaN packing in `nanbox.rs`, and disabling it selects
//! the tagged union in `tagged.rs`. Identity, equality, and hashing are
//! bit-for-bit identical across the two.
//!
//! # The collection contract
//!
//! Any allocation may trigger a collection, so any object held only in a
//! local must be protected with `Heap::push_root` / `Heap::pop_root`
//! across allocating calls. The collector's root set is the temporary root
//! stack, the current fiber, the module map, the well-known class
//! registry, and an optionally registered external marker.
//!
//! # Modules
//!
//! - `nanbox` / `tagged`: the two `Value` encodings
//! - `value`: identity, equality, hashing, class lookup
//! - `heap`: allocator, byte accounting, root stack, registries
//! - `object`: object kinds and constructors
//! - `strings`: string building, number formatting, substring search
//! - `list` / `map`: container operations
//! - `gc`: mark and sweep
//! - `config` / `report`: tuning and diagnostics

#[cfg(feature = "nan-boxing")]
mod nanbox;
#[cfg(feature = "nan-boxing")]
pub use nanbox::{FALSE_VAL, NULL_VAL, TRUE_VAL, UNDEFINED_VAL, Value};

#[cfg(not(feature = "nan-boxing"))]
mod tagged;
#[cfg(not(feature = "nan-boxing"))]
pub use tagged::{FALSE_VAL, NULL_VAL, TRUE_VAL, UNDEFINED_VAL, Value};

pub mod config;
pub mod gc;
pub mod heap;
pub mod list;
pub mod map;
pub mod object;
pub mod report;
pub mod strings;
pub mod value;

pub use config::GcConfig;
pub use heap::{CoreClasses, Heap, MAX_TEMP_ROOTS, MarkRoots};
pub use map::MAP_LOAD_PERCENT;
pub use object::{
    CallFrame, FIBER_MAX_FRAMES, FIBER_STACK_SIZE, FnDebug, ForeignFn, MapEntry, Method, Obj,
    ObjClass, ObjClosure, ObjFiber, ObjFn, ObjInstance, ObjKind, ObjList, ObjMap, ObjModule,
    ObjRange, ObjString, ObjUpvalue, PrimitiveFn, reset_fiber,
};
pub use report::GcStats;
pub use strings::{FormatArg, NOT_FOUND, fnv1a, string_find};
pub use value::{hash_value, values_equal, values_same};

// The shared primitives, re-exported so embedders need only this crate.
pub use skein_core::{
    Alloc, Buffer, GROW_FACTOR, MIN_CAPACITY, Symbol, SymbolTable, utf8_decode, utf8_encode,
    utf8_num_bytes,
};
