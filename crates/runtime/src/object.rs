//! The heap object model
//!
//! Every heap value starts with an `Obj` header: a kind tag, the mark bit,
//! a back-pointer to the value's class, and the link threading the heap's
//! intrusive list of all objects. The concrete kinds follow, each laid out
//! `#[repr(C)]` so a `*mut ObjFoo` can be viewed as a `*mut Obj` and back.
//!
//! Strings, instances, and closures carry their variable-length payload as
//! a flexible tail in the same allocation as the header. Splitting the
//! tail into a second allocation would desynchronize the collector's size
//! accounting, so the tail accessors below are the only way in.
//!
//! # Safety
//!
//! Object pointers are owned by the heap's object list and stay valid until
//! the collector frees them. Constructors that take object pointers require
//! the caller to keep those objects reachable (rooted, on a fiber stack, or
//! stored in a live object) across the call: any allocation may trigger a
//! collection.

use crate::heap::Heap;
use crate::strings::FormatArg;
use crate::{NULL_VAL, Value};
use skein_core::{Alloc, Buffer, SymbolTable};
use std::mem::size_of;
use std::ptr;
use std::slice;

/// Fixed depth of a fiber's value stack.
pub const FIBER_STACK_SIZE: usize = 1024;

/// Fixed depth of a fiber's call-frame stack.
pub const FIBER_MAX_FRAMES: usize = 256;

/// Identifies the concrete type behind an `Obj` header.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObjKind {
    Class,
    Closure,
    Fiber,
    Fn,
    Instance,
    List,
    Map,
    Module,
    Range,
    String,
    Upvalue,
}

/// Header shared by all heap objects.
#[repr(C)]
pub struct Obj {
    pub kind: ObjKind,
    /// Set during the mark phase, cleared again during the sweep.
    pub marked: bool,
    /// The object's class. Null for modules and upvalues, which are never
    /// first-class values.
    pub class_obj: *mut ObjClass,
    /// Next object in the heap's all-objects list.
    pub next: *mut Obj,
}

/// An immutable string: byte length, FNV-1a hash, then `length + 1` bytes
/// of data in the tail (the final byte is a null terminator).
///
/// The hash is computed exactly once, when the string is built.
#[repr(C)]
pub struct ObjString {
    pub obj: Obj,
    pub length: u32,
    pub hash: u32,
}

impl ObjString {
    #[inline]
    pub fn len(&self) -> usize {
        self.length as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    #[inline]
    fn data_ptr(&self) -> *const u8 {
        (self as *const ObjString).wrapping_add(1) as *const u8
    }

    #[inline]
    pub(crate) fn data_mut_ptr(&mut self) -> *mut u8 {
        (self as *mut ObjString).wrapping_add(1) as *mut u8
    }

    /// The string's bytes, without the null terminator.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        // Safety: the tail holds length + 1 initialized bytes.
        unsafe { slice::from_raw_parts(self.data_ptr(), self.length as usize) }
    }

    /// View the bytes as text.
    ///
    /// # Safety
    /// Most strings come from source text and are valid UTF-8, but
    /// byte-level slicing (`string_code_point_at` on a continuation byte)
    /// can produce strings that are not. The caller must know this one is.
    #[inline]
    pub unsafe fn as_str(&self) -> &str {
        unsafe { std::str::from_utf8_unchecked(self.as_bytes()) }
    }
}

/// A growable sequence of values.
#[repr(C)]
pub struct ObjList {
    pub obj: Obj,
    pub elements: Buffer<Value>,
}

/// One slot in a map's entry array. See `map.rs` for the empty/tombstone
/// encoding.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct MapEntry {
    pub key: Value,
    pub value: Value,
}

/// An open-addressed hash table. `capacity` is zero or at least
/// `MIN_CAPACITY`; `entries` is null exactly when `capacity` is zero.
#[repr(C)]
pub struct ObjMap {
    pub obj: Obj,
    pub capacity: u32,
    pub count: u32,
    pub entries: *mut MapEntry,
}

/// A numeric range.
#[repr(C)]
pub struct ObjRange {
    pub obj: Obj,
    pub from: f64,
    pub to: f64,
    pub is_inclusive: bool,
}

/// A primitive method implemented by the host: receives the running fiber
/// and a pointer to the arguments on its stack.
pub type PrimitiveFn = fn(heap: &mut Heap, fiber: *mut ObjFiber, args: *mut Value) -> Value;

/// A foreign method provided through the embedding API.
pub type ForeignFn = fn(heap: &mut Heap);

/// One slot in a class's method table, indexed by global method symbol.
#[derive(Clone, Copy)]
pub enum Method {
    /// No method bound at this symbol.
    None,
    /// Host-implemented method.
    Primitive(PrimitiveFn),
    /// Embedder-implemented method.
    Foreign(ForeignFn),
    /// A method written in Skein: an `ObjFn` or `ObjClosure`.
    Block(*mut Obj),
}

/// A class. `num_fields` includes inherited fields; the method table is a
/// dense buffer so dispatch is a single index, with inherited methods
/// copied down at bind time.
#[repr(C)]
pub struct ObjClass {
    pub obj: Obj,
    pub superclass: *mut ObjClass,
    pub num_fields: u32,
    pub name: *mut ObjString,
    pub methods: Buffer<Method>,
}

/// An instance of a class: the header plus `num_fields` values in the
/// tail. The field count is stored here so the destructor never has to
/// chase the class pointer.
#[repr(C)]
pub struct ObjInstance {
    pub obj: Obj,
    pub num_fields: u32,
}

impl ObjInstance {
    #[inline]
    fn fields_ptr(&self) -> *const Value {
        (self as *const ObjInstance).wrapping_add(1) as *const Value
    }

    #[inline]
    fn fields_mut_ptr(&mut self) -> *mut Value {
        (self as *mut ObjInstance).wrapping_add(1) as *mut Value
    }

    #[inline]
    pub fn fields(&self) -> &[Value] {
        // Safety: the tail holds num_fields initialized values.
        unsafe { slice::from_raw_parts(self.fields_ptr(), self.num_fields as usize) }
    }

    #[inline]
    pub fn fields_mut(&mut self) -> &mut [Value] {
        // Safety: as for `fields`.
        unsafe { slice::from_raw_parts_mut(self.fields_mut_ptr(), self.num_fields as usize) }
    }
}

/// Per-function debug information, allocated alongside the function.
#[repr(C)]
pub struct FnDebug {
    /// Path of the defining source file. Nullable.
    pub source_path: *mut ObjString,
    /// Owned copy of the function's name.
    pub name: *mut u8,
    pub name_len: usize,
    /// One source line per bytecode byte. Owned; nullable.
    pub source_lines: *mut u32,
}

impl FnDebug {
    #[inline]
    pub fn name_bytes(&self) -> &[u8] {
        if self.name_len == 0 {
            return &[];
        }
        // Safety: name holds name_len owned bytes.
        unsafe { slice::from_raw_parts(self.name, self.name_len) }
    }
}

/// A compiled function: bytecode, constant pool, and enough metadata for
/// the interpreter to call it.
#[repr(C)]
pub struct ObjFn {
    pub obj: Obj,
    /// Owned bytecode array of `bytecode_length` bytes.
    pub bytecode: *mut u8,
    /// Owned constant pool of `num_constants` values.
    pub constants: *mut Value,
    pub module: *mut ObjModule,
    pub num_upvalues: u32,
    pub num_constants: u32,
    pub arity: u32,
    pub bytecode_length: u32,
    pub debug: *mut FnDebug,
}

impl ObjFn {
    #[inline]
    pub fn constants(&self) -> &[Value] {
        if self.num_constants == 0 {
            return &[];
        }
        // Safety: constants holds num_constants initialized values.
        unsafe { slice::from_raw_parts(self.constants, self.num_constants as usize) }
    }
}

/// A function plus its captured upvalues, stored as a flexible tail of
/// `num_upvalues` pointers. The count is duplicated from the function so
/// the destructor and collector never chase the function pointer.
#[repr(C)]
pub struct ObjClosure {
    pub obj: Obj,
    pub fn_obj: *mut ObjFn,
    pub num_upvalues: u32,
}

impl ObjClosure {
    #[inline]
    fn upvalues_ptr(&self) -> *const *mut ObjUpvalue {
        (self as *const ObjClosure).wrapping_add(1) as *const *mut ObjUpvalue
    }

    #[inline]
    fn upvalues_mut_ptr(&mut self) -> *mut *mut ObjUpvalue {
        (self as *mut ObjClosure).wrapping_add(1) as *mut *mut ObjUpvalue
    }

    #[inline]
    pub fn upvalues(&self) -> &[*mut ObjUpvalue] {
        // Safety: the tail holds num_upvalues initialized pointers.
        unsafe { slice::from_raw_parts(self.upvalues_ptr(), self.num_upvalues as usize) }
    }

    #[inline]
    pub fn upvalues_mut(&mut self) -> &mut [*mut ObjUpvalue] {
        // Safety: as for `upvalues`.
        unsafe { slice::from_raw_parts_mut(self.upvalues_mut_ptr(), self.num_upvalues as usize) }
    }
}

/// A captured variable. While the defining frame is live the upvalue is
/// *open*: `value` points into that fiber's stack. When the frame returns
/// the interpreter closes it: the value moves into `closed` and `value`
/// points there instead.
#[repr(C)]
pub struct ObjUpvalue {
    pub obj: Obj,
    pub value: *mut Value,
    pub closed: Value,
    /// Open upvalues form a list threaded through the owning fiber.
    pub next: *mut ObjUpvalue,
}

/// One function invocation within a fiber.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct CallFrame {
    /// The `ObjFn` or `ObjClosure` being executed.
    pub fn_obj: *mut Obj,
    /// Next instruction to execute.
    pub ip: *mut u8,
    /// First stack slot usable by this invocation.
    pub stack_start: *mut Value,
}

/// A coroutine: a private value stack, a call-frame stack, the list of
/// upvalues still pointing into that stack, and the fiber that invoked
/// this one (if any).
#[repr(C)]
pub struct ObjFiber {
    pub obj: Obj,
    /// Monotonically-increasing id, doubling as the fiber's hash code.
    pub id: u32,
    pub num_frames: u32,
    /// One past the last live stack slot.
    pub stack_top: *mut Value,
    pub open_upvalues: *mut ObjUpvalue,
    /// The fiber that ran this one, resumed when this fiber completes.
    pub caller: *mut ObjFiber,
    /// The error that aborted this fiber, or null.
    pub error: Value,
    /// Whether the caller invoked this fiber with a try, so errors should
    /// transfer there rather than aborting.
    pub caller_is_trying: bool,
    pub stack: [Value; FIBER_STACK_SIZE],
    pub frames: [CallFrame; FIBER_MAX_FRAMES],
}

impl ObjFiber {
    #[inline]
    pub fn stack_base(&mut self) -> *mut Value {
        (&raw mut self.stack) as *mut Value
    }

    /// Push onto the value stack.
    ///
    /// # Safety
    /// The stack must not be full; the interpreter checks frame arity
    /// before pushing.
    #[inline]
    pub unsafe fn push(&mut self, value: Value) {
        unsafe {
            self.stack_top.write(value);
            self.stack_top = self.stack_top.add(1);
        }
    }

    /// Pop from the value stack.
    ///
    /// # Safety
    /// The stack must not be empty.
    #[inline]
    pub unsafe fn pop(&mut self) -> Value {
        unsafe {
            self.stack_top = self.stack_top.sub(1);
            self.stack_top.read()
        }
    }
}

/// Rewind `fiber` to run `fn_obj` (an `ObjFn` or `ObjClosure`) from
/// scratch: one call frame, empty stack, no open upvalues, no caller, no
/// error.
///
/// # Safety
/// Both pointers must be live, and `fn_obj` must be a function or closure.
pub unsafe fn reset_fiber(fiber: *mut ObjFiber, fn_obj: *mut Obj) {
    unsafe {
        let stack_base = (&raw mut (*fiber).stack) as *mut Value;
        (*fiber).stack_top = stack_base;
        (*fiber).num_frames = 1;
        (*fiber).open_upvalues = ptr::null_mut();
        (*fiber).caller = ptr::null_mut();
        (*fiber).error = NULL_VAL;
        (*fiber).caller_is_trying = false;

        let ip = match (*fn_obj).kind {
            ObjKind::Fn => (*(fn_obj as *mut ObjFn)).bytecode,
            ObjKind::Closure => (*(*(fn_obj as *mut ObjClosure)).fn_obj).bytecode,
            kind => panic!("cannot run a {kind:?} in a fiber"),
        };

        (*fiber).frames[0] = CallFrame {
            fn_obj,
            ip,
            stack_start: stack_base,
        };
    }
}

/// A module: the unit of top-level scope. Holds its variable names and a
/// parallel buffer of their values. Not user-visible, so it has no class.
#[repr(C)]
pub struct ObjModule {
    pub obj: Obj,
    pub variable_names: SymbolTable,
    pub variables: Buffer<Value>,
    pub name: *mut ObjString,
}

impl Heap {
    /// Stamp a freshly-allocated header and link the object into the
    /// all-objects list.
    pub(crate) fn init_obj(&mut self, obj: *mut Obj, kind: ObjKind, class_obj: *mut ObjClass) {
        // Safety: obj was just allocated with room for at least an Obj.
        unsafe {
            (*obj).kind = kind;
            (*obj).marked = false;
            (*obj).class_obj = class_obj;
            (*obj).next = self.first;
        }
        self.first = obj;
    }

    /// Create a bare class: no metaclass wiring, no superclass. This is
    /// the bootstrap building block; almost everything else wants
    /// [`Heap::new_class`].
    ///
    /// # Safety
    /// `name` must be live and reachable across the allocation.
    pub unsafe fn new_single_class(&mut self, num_fields: u32, name: *mut ObjString) -> *mut ObjClass {
        let class_obj: *mut ObjClass = self.allocate::<ObjClass>();
        self.init_obj(class_obj as *mut Obj, ObjKind::Class, ptr::null_mut());
        // Safety: freshly allocated, header just initialized.
        unsafe {
            (*class_obj).superclass = ptr::null_mut();
            (*class_obj).num_fields = num_fields;
            (*class_obj).name = name;
            (*class_obj).methods = Buffer::new();
        }
        class_obj
    }

    /// Wire `superclass` under `subclass`: the subclass absorbs the
    /// superclass's field count and inherits every method slot, so
    /// dispatch stays a direct index with no superclass walking.
    ///
    /// # Safety
    /// Both classes must be live; `subclass` must be reachable across the
    /// method-table growth.
    pub unsafe fn bind_superclass(&mut self, subclass: *mut ObjClass, superclass: *mut ObjClass) {
        assert!(!superclass.is_null(), "must have superclass");

        unsafe {
            (*subclass).superclass = superclass;
            (*subclass).num_fields += (*superclass).num_fields;

            for symbol in 0..(*superclass).methods.count() {
                let method = (*superclass).methods.as_slice()[symbol];
                self.bind_method(subclass, symbol, method);
            }
        }
    }

    /// Store `method` at `symbol` in the class's method table, padding
    /// intervening slots with `Method::None`.
    ///
    /// # Safety
    /// `class_obj` must be live and reachable across the table growth.
    pub unsafe fn bind_method(&mut self, class_obj: *mut ObjClass, symbol: usize, method: Method) {
        unsafe {
            let count = (*class_obj).methods.count();
            if symbol >= count {
                (*class_obj).methods.fill(self, Method::None, symbol - count + 1);
            }
            (*class_obj).methods.as_mut_slice()[symbol] = method;
        }
    }

    /// Create a class named `name` with `num_fields` of its own fields,
    /// under `superclass`. Builds the metaclass (named "`name` metaclass",
    /// inheriting the root Class) and wires the inheritance on both sides.
    ///
    /// # Safety
    /// `superclass` and `name` must be live and reachable; the root Class
    /// must already be registered in `classes.class_class`.
    pub unsafe fn new_class(
        &mut self,
        superclass: *mut ObjClass,
        num_fields: u32,
        name: *mut ObjString,
    ) -> *mut ObjClass {
        unsafe {
            let metaclass_name =
                self.string_format("@ metaclass", &[FormatArg::Value(Value::obj(name as *mut Obj))]);
            self.push_root(metaclass_name.as_obj());

            let metaclass = self.new_single_class(0, metaclass_name.as_obj() as *mut ObjString);
            (*metaclass).obj.class_obj = self.classes.class_class;

            self.pop_root();

            // Hold the metaclass while the class itself is allocated.
            self.push_root(metaclass as *mut Obj);

            // Metaclasses all inherit the root Class; they do not parallel
            // the non-metaclass hierarchy.
            self.bind_superclass(metaclass, self.classes.class_class);

            let class_obj = self.new_single_class(num_fields, name);

            // Hold the class while the inherited methods are bound.
            self.push_root(class_obj as *mut Obj);

            (*class_obj).obj.class_obj = metaclass;
            self.bind_superclass(class_obj, superclass);

            self.pop_root();
            self.pop_root();

            class_obj
        }
    }

    /// Create a closure over `fn_obj` with its upvalue slots cleared; the
    /// interpreter fills them in as it captures.
    ///
    /// # Safety
    /// `fn_obj` must be live and reachable across the allocation.
    pub unsafe fn new_closure(&mut self, fn_obj: *mut ObjFn) -> *mut ObjClosure {
        unsafe {
            let num_upvalues = (*fn_obj).num_upvalues;
            let closure: *mut ObjClosure =
                self.allocate_flex::<ObjClosure, *mut ObjUpvalue>(num_upvalues as usize);
            self.init_obj(closure as *mut Obj, ObjKind::Closure, self.classes.fn_class);

            (*closure).fn_obj = fn_obj;
            (*closure).num_upvalues = num_upvalues;

            // Clear the upvalue slots so a collection between here and the
            // interpreter's capture loop sees initialized pointers.
            for slot in (*closure).upvalues_mut() {
                *slot = ptr::null_mut();
            }

            closure
        }
    }

    /// Create a fiber that will run `fn_obj` (an `ObjFn` or `ObjClosure`).
    ///
    /// # Safety
    /// `fn_obj` must be live and reachable across the allocation.
    pub unsafe fn new_fiber(&mut self, fn_obj: *mut Obj) -> *mut ObjFiber {
        let fiber: *mut ObjFiber = self.allocate::<ObjFiber>();
        self.init_obj(fiber as *mut Obj, ObjKind::Fiber, self.classes.fiber_class);

        // Safety: header initialized; reset fills every live field. The
        // stack and frame arrays beyond the live region stay untouched.
        unsafe {
            (*fiber).id = self.next_fiber_id;
            self.next_fiber_id += 1;
            reset_fiber(fiber, fn_obj);
        }

        fiber
    }

    /// Create a compiled function. `bytecode` and `source_lines` must have
    /// been allocated from this heap; the function takes ownership of
    /// both. Constants are copied.
    ///
    /// # Safety
    /// Every object reachable from the arguments must be live and
    /// reachable across the allocations here (the compiler keeps them on
    /// its root set).
    #[allow(clippy::too_many_arguments)]
    pub unsafe fn new_fn(
        &mut self,
        module: *mut ObjModule,
        constants: &[Value],
        num_upvalues: u32,
        arity: u32,
        bytecode: *mut u8,
        bytecode_length: u32,
        debug_source_path: *mut ObjString,
        debug_name: &str,
        source_lines: *mut u32,
    ) -> *mut ObjFn {
        // Copy the constants and build the debug record before the
        // function header, so a collection during those allocations cannot
        // see a half-initialized function.
        let copied_constants: *mut Value = if constants.is_empty() {
            ptr::null_mut()
        } else {
            let copied: *mut Value = self.alloc_array(constants.len());
            // Safety: copied has room for constants.len() values.
            unsafe {
                ptr::copy_nonoverlapping(constants.as_ptr(), copied, constants.len());
            }
            copied
        };

        let name: *mut u8 = if debug_name.is_empty() {
            ptr::null_mut()
        } else {
            let copy: *mut u8 = self.alloc_array(debug_name.len());
            // Safety: copy has room for the name bytes.
            unsafe {
                ptr::copy_nonoverlapping(debug_name.as_ptr(), copy, debug_name.len());
            }
            copy
        };

        let debug: *mut FnDebug = self.allocate::<FnDebug>();
        // Safety: freshly allocated.
        unsafe {
            (*debug).source_path = debug_source_path;
            (*debug).name = name;
            (*debug).name_len = debug_name.len();
            (*debug).source_lines = source_lines;
        }

        let fn_obj: *mut ObjFn = self.allocate::<ObjFn>();
        self.init_obj(fn_obj as *mut Obj, ObjKind::Fn, self.classes.fn_class);
        // Safety: freshly allocated, header just initialized.
        unsafe {
            (*fn_obj).bytecode = bytecode;
            (*fn_obj).constants = copied_constants;
            (*fn_obj).module = module;
            (*fn_obj).num_upvalues = num_upvalues;
            (*fn_obj).num_constants = constants.len() as u32;
            (*fn_obj).arity = arity;
            (*fn_obj).bytecode_length = bytecode_length;
            (*fn_obj).debug = debug;
        }

        fn_obj
    }

    /// Create an instance of `class_obj` with every field null.
    ///
    /// # Safety
    /// `class_obj` must be live and reachable across the allocation.
    pub unsafe fn new_instance(&mut self, class_obj: *mut ObjClass) -> Value {
        unsafe {
            let num_fields = (*class_obj).num_fields;
            let instance: *mut ObjInstance =
                self.allocate_flex::<ObjInstance, Value>(num_fields as usize);
            self.init_obj(instance as *mut Obj, ObjKind::Instance, class_obj);

            (*instance).num_fields = num_fields;
            for field in (*instance).fields_mut() {
                *field = NULL_VAL;
            }

            Value::obj(instance as *mut Obj)
        }
    }

    /// Create a list with `num_elements` slots, all null.
    pub fn new_list(&mut self, num_elements: usize) -> *mut ObjList {
        // Allocate the element storage before the list object, so a
        // collection triggered here cannot see a half-built list.
        let elements: *mut Value = if num_elements > 0 {
            self.alloc_array(num_elements)
        } else {
            ptr::null_mut()
        };
        for i in 0..num_elements {
            // Safety: elements has room for num_elements values.
            unsafe {
                elements.add(i).write(NULL_VAL);
            }
        }

        let list: *mut ObjList = self.allocate::<ObjList>();
        self.init_obj(list as *mut Obj, ObjKind::List, self.classes.list_class);
        // Safety: freshly allocated, header just initialized; elements came
        // from this heap with num_elements initialized slots.
        unsafe {
            (*list).elements = Buffer::from_raw_parts(elements, num_elements, num_elements);
        }
        list
    }

    /// Create an empty map. The entry array is allocated on first insert.
    pub fn new_map(&mut self) -> *mut ObjMap {
        let map: *mut ObjMap = self.allocate::<ObjMap>();
        self.init_obj(map as *mut Obj, ObjKind::Map, self.classes.map_class);
        // Safety: freshly allocated, header just initialized.
        unsafe {
            (*map).capacity = 0;
            (*map).count = 0;
            (*map).entries = ptr::null_mut();
        }
        map
    }

    /// Create a module named `name`.
    ///
    /// # Safety
    /// `name` must be live and reachable across the allocation.
    pub unsafe fn new_module(&mut self, name: *mut ObjString) -> *mut ObjModule {
        let module: *mut ObjModule = self.allocate::<ObjModule>();
        // Modules are never first-class values, so they have no class.
        self.init_obj(module as *mut Obj, ObjKind::Module, ptr::null_mut());
        // Safety: freshly allocated, header just initialized.
        unsafe {
            (*module).variable_names = SymbolTable::new();
            (*module).variables = Buffer::new();
            (*module).name = name;
        }
        module
    }

    /// Create a range value.
    pub fn new_range(&mut self, from: f64, to: f64, is_inclusive: bool) -> Value {
        let range: *mut ObjRange = self.allocate::<ObjRange>();
        self.init_obj(range as *mut Obj, ObjKind::Range, self.classes.range_class);
        // Safety: freshly allocated, header just initialized.
        unsafe {
            (*range).from = from;
            (*range).to = to;
            (*range).is_inclusive = is_inclusive;
        }
        Value::obj(range as *mut Obj)
    }

    /// Create an open upvalue pointing at the stack slot `value`.
    ///
    /// # Safety
    /// `value` must point into a live fiber's stack.
    pub unsafe fn new_upvalue(&mut self, value: *mut Value) -> *mut ObjUpvalue {
        let upvalue: *mut ObjUpvalue = self.allocate::<ObjUpvalue>();
        // Upvalues are never first-class values, so they have no class.
        self.init_obj(upvalue as *mut Obj, ObjKind::Upvalue, ptr::null_mut());
        // Safety: freshly allocated, header just initialized.
        unsafe {
            (*upvalue).value = value;
            (*upvalue).closed = NULL_VAL;
            (*upvalue).next = ptr::null_mut();
        }
        upvalue
    }
}

/// Size in bytes of an object's own allocation, including any flexible
/// tail. Used by the collector's live-set accounting.
pub(crate) fn obj_allocation_size(obj: *const Obj) -> usize {
    // Safety: called on live objects only.
    unsafe {
        match (*obj).kind {
            ObjKind::Class => size_of::<ObjClass>(),
            ObjKind::Closure => {
                size_of::<ObjClosure>()
                    + size_of::<*mut ObjUpvalue>()
                        * (*(obj as *const ObjClosure)).num_upvalues as usize
            }
            ObjKind::Fiber => size_of::<ObjFiber>(),
            ObjKind::Fn => size_of::<ObjFn>(),
            ObjKind::Instance => {
                size_of::<ObjInstance>()
                    + size_of::<Value>() * (*(obj as *const ObjInstance)).num_fields as usize
            }
            ObjKind::List => size_of::<ObjList>(),
            ObjKind::Map => size_of::<ObjMap>(),
            ObjKind::Module => size_of::<ObjModule>(),
            ObjKind::Range => size_of::<ObjRange>(),
            ObjKind::String => {
                size_of::<ObjString>() + (*(obj as *const ObjString)).length as usize + 1
            }
            ObjKind::Upvalue => size_of::<ObjUpvalue>(),
        }
    }
}
