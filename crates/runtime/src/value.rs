//! Value semantics: identity, equality, hashing, class lookup
//!
//! These operate on either value encoding through the shared predicate and
//! accessor surface, so the observable semantics are bit-for-bit identical
//! whether or not `nan-boxing` is enabled.
//!
//! The functions that look through object pointers assume the values
//! reference live objects on the owning heap, which is the standing
//! invariant for every value the interpreter can see.

use crate::heap::Heap;
use crate::object::{Obj, ObjClass, ObjFiber, ObjKind, ObjRange, ObjString};
use crate::Value;

/// Identity: tag equality, pointer equality for objects, IEEE 754 equality
/// for numbers (so NaN is not the same as itself and -0 is the same as
/// +0).
#[cfg(feature = "nan-boxing")]
#[inline]
pub fn values_same(a: Value, b: Value) -> bool {
    if a.is_num() && b.is_num() {
        return a.as_num() == b.as_num();
    }
    a.bits() == b.bits()
}

/// Identity: tag equality, pointer equality for objects, IEEE 754 equality
/// for numbers (so NaN is not the same as itself and -0 is the same as
/// +0).
#[cfg(not(feature = "nan-boxing"))]
#[inline]
pub fn values_same(a: Value, b: Value) -> bool {
    match (a, b) {
        (Value::Num(x), Value::Num(y)) => x == y,
        (Value::Obj(x), Value::Obj(y)) => std::ptr::eq(x, y),
        _ => std::mem::discriminant(&a) == std::mem::discriminant(&b),
    }
}

/// Structural equality: identity, or equal string contents, or equal range
/// endpoints. Everything else compares by identity only.
pub fn values_equal(a: Value, b: Value) -> bool {
    if values_same(a, b) {
        return true;
    }

    // Beyond identity, only heap-allocated immutable kinds can be equal.
    if !a.is_obj() || !b.is_obj() {
        return false;
    }

    // Safety: values reference live objects (module invariant).
    unsafe {
        let a_obj = a.as_obj();
        let b_obj = b.as_obj();

        if (*a_obj).kind != (*b_obj).kind {
            return false;
        }

        match (*a_obj).kind {
            ObjKind::Range => {
                let a_range = a_obj as *const ObjRange;
                let b_range = b_obj as *const ObjRange;
                (*a_range).from == (*b_range).from
                    && (*a_range).to == (*b_range).to
                    && (*a_range).is_inclusive == (*b_range).is_inclusive
            }

            ObjKind::String => {
                let a_string = &*(a_obj as *const ObjString);
                let b_string = &*(b_obj as *const ObjString);
                a_string.length == b_string.length
                    && a_string.hash == b_string.hash
                    && a_string.as_bytes() == b_string.as_bytes()
            }

            _ => false,
        }
    }
}

/// Hash a number by folding the two halves of its raw bits together. No
/// canonicalization: -0 and +0 hash differently even though they compare
/// equal, and distinct NaN payloads hash differently.
#[inline]
fn hash_number(num: f64) -> u32 {
    let bits = num.to_bits();
    (bits as u32) ^ ((bits >> 32) as u32)
}

/// Hash an object. Only the immutable kinds are hashable; the map never
/// stores anything else as a key.
fn hash_obj(obj: *const Obj) -> u32 {
    // Safety: callers pass live objects.
    unsafe {
        match (*obj).kind {
            // Classes hash by name.
            ObjKind::Class => hash_obj((*(obj as *const ObjClass)).name as *const Obj),

            ObjKind::Fiber => (*(obj as *const ObjFiber)).id,

            ObjKind::Range => {
                let range = &*(obj as *const ObjRange);
                hash_number(range.from) ^ hash_number(range.to)
            }

            ObjKind::String => (*(obj as *const ObjString)).hash,

            kind => panic!("only immutable objects can be hashed, not {kind:?}"),
        }
    }
}

/// Hash any hashable value: numbers by raw bits, singletons by fixed small
/// codes, objects per kind.
pub fn hash_value(value: Value) -> u32 {
    if value.is_obj() {
        return hash_obj(value.as_obj());
    }
    if value.is_num() {
        return hash_number(value.as_num());
    }
    if value.is_true() {
        return 2;
    }
    if value.is_false() {
        return 0;
    }
    if value.is_null() {
        return 1;
    }
    panic!("only immutable values can be hashed");
}

impl Heap {
    /// The class of any value the interpreter can see. Numbers, booleans,
    /// and null resolve through the well-known class registry; objects
    /// carry their class in the header.
    pub fn get_class(&self, value: Value) -> *mut ObjClass {
        if value.is_num() {
            return self.classes.num_class;
        }
        if value.is_obj() {
            // Safety: values reference live objects (module invariant).
            return unsafe { (*value.as_obj()).class_obj };
        }
        if value.is_bool() {
            return self.classes.bool_class;
        }
        if value.is_null() {
            return self.classes.null_class;
        }
        panic!("undefined has no class");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GcConfig;
    use crate::strings::fnv1a;
    use crate::{FALSE_VAL, NULL_VAL, TRUE_VAL, UNDEFINED_VAL};
    use skein_core::Alloc;
    use std::ptr;

    fn test_heap() -> Heap {
        Heap::with_config(GcConfig::default())
    }

    #[test]
    fn test_same_on_numbers_is_ieee() {
        assert!(values_same(Value::num(1.5), Value::num(1.5)));
        assert!(!values_same(Value::num(1.5), Value::num(2.5)));
        // -0 and +0 are the same number.
        assert!(values_same(Value::num(0.0), Value::num(-0.0)));
        // NaN is not the same as itself.
        assert!(!values_same(Value::num(f64::NAN), Value::num(f64::NAN)));
    }

    #[test]
    fn test_same_on_singletons() {
        assert!(values_same(NULL_VAL, NULL_VAL));
        assert!(values_same(TRUE_VAL, TRUE_VAL));
        assert!(values_same(UNDEFINED_VAL, UNDEFINED_VAL));
        assert!(!values_same(TRUE_VAL, FALSE_VAL));
        assert!(!values_same(NULL_VAL, FALSE_VAL));
        assert!(!values_same(NULL_VAL, Value::num(0.0)));
    }

    #[test]
    fn test_same_on_objects_is_identity() {
        let mut heap = test_heap();
        let a = heap.new_string("abc");
        heap.push_root(a.as_obj());
        let b = heap.new_string("abc");
        heap.pop_root();

        assert!(values_same(a, a));
        assert!(!values_same(a, b));
    }

    #[test]
    fn test_equal_strings_by_content() {
        let mut heap = test_heap();
        let a = heap.new_string("hello");
        heap.push_root(a.as_obj());
        let b = heap.new_string("hello");
        heap.push_root(b.as_obj());
        let c = heap.new_string("world");
        heap.pop_root();
        heap.pop_root();

        assert!(values_equal(a, b));
        assert!(!values_equal(a, c));
    }

    #[test]
    fn test_equal_ranges_by_bounds() {
        let mut heap = test_heap();
        let a = heap.new_range(1.0, 4.0, true);
        let b = heap.new_range(1.0, 4.0, true);
        let c = heap.new_range(1.0, 4.0, false);
        let d = heap.new_range(1.0, 5.0, true);

        assert!(values_equal(a, b));
        assert!(!values_equal(a, c));
        assert!(!values_equal(a, d));
    }

    #[test]
    fn test_equal_mixed_kinds_is_false() {
        let mut heap = test_heap();
        let string = heap.new_string("1");
        heap.push_root(string.as_obj());
        let range = heap.new_range(1.0, 1.0, true);
        heap.pop_root();

        assert!(!values_equal(string, range));
        assert!(!values_equal(string, Value::num(1.0)));
        assert!(!values_equal(NULL_VAL, FALSE_VAL));
    }

    #[test]
    fn test_hash_singletons() {
        assert_eq!(hash_value(FALSE_VAL), 0);
        assert_eq!(hash_value(NULL_VAL), 1);
        assert_eq!(hash_value(TRUE_VAL), 2);
    }

    #[test]
    fn test_hash_number_folds_bits() {
        let bits = 2.5f64.to_bits();
        let expected = (bits as u32) ^ ((bits >> 32) as u32);
        assert_eq!(hash_value(Value::num(2.5)), expected);
        assert_eq!(hash_value(Value::num(0.0)), 0);
    }

    #[test]
    fn test_hash_string_is_fnv1a() {
        let mut heap = test_heap();
        let string = heap.new_string("symbol");
        assert_eq!(hash_value(string), fnv1a(b"symbol"));
    }

    #[test]
    fn test_hash_range_xors_bounds() {
        let mut heap = test_heap();
        let range = heap.new_range(2.0, 8.0, false);
        let expected = hash_value(Value::num(2.0)) ^ hash_value(Value::num(8.0));
        assert_eq!(hash_value(range), expected);
    }

    #[test]
    fn test_hash_class_uses_name() {
        let mut heap = test_heap();
        unsafe {
            let name = heap.new_string("Vector");
            heap.push_root(name.as_obj());
            let class_obj = heap.new_single_class(0, name.as_obj() as *mut ObjString);
            heap.pop_root();

            assert_eq!(
                hash_value(Value::obj(class_obj as *mut Obj)),
                hash_value(name)
            );
        }
    }

    #[test]
    fn test_hash_fiber_is_id() {
        let mut heap = test_heap();
        unsafe {
            let bytecode: *mut u8 = heap.alloc_array(1);
            bytecode.write(0);
            let fn_obj = heap.new_fn(
                ptr::null_mut(),
                &[],
                0,
                0,
                bytecode,
                1,
                ptr::null_mut(),
                "",
                ptr::null_mut(),
            );
            heap.push_root(fn_obj as *mut Obj);
            let fiber = heap.new_fiber(fn_obj as *mut Obj);
            heap.pop_root();

            assert_eq!(hash_value(Value::obj(fiber as *mut Obj)), (*fiber).id);
        }
    }

    #[test]
    fn test_get_class() {
        let mut heap = test_heap();
        unsafe {
            let name = heap.new_string("Num");
            heap.push_root(name.as_obj());
            let num_class = heap.new_single_class(0, name.as_obj() as *mut ObjString);
            heap.pop_root();
            heap.classes.num_class = num_class;

            assert_eq!(heap.get_class(Value::num(3.0)), num_class);
            // Objects resolve through their header.
            let string = heap.new_string("x");
            assert_eq!(heap.get_class(string), heap.classes.string_class);
        }
    }
}
