//! Property tests over the container and string invariants
//!
//! The map is checked against a std `HashMap` model move-for-move, the
//! list against its own insert/remove round trip, and substring search
//! against a naive scan.

use proptest::prelude::*;
use skein_runtime::{
    GcConfig, Heap, MAP_LOAD_PERCENT, NOT_FOUND, Obj, ObjString, Value, fnv1a, hash_value,
    string_find, values_equal,
};
use std::collections::HashMap;

fn test_heap() -> Heap {
    Heap::with_config(GcConfig::default())
}

#[derive(Debug, Clone)]
enum MapOp {
    Set(u16, i32),
    Remove(u16),
}

fn map_op() -> impl Strategy<Value = MapOp> {
    prop_oneof![
        (any::<u16>(), any::<i32>()).prop_map(|(key, value)| MapOp::Set(key % 64, value)),
        any::<u16>().prop_map(|key| MapOp::Remove(key % 64)),
    ]
}

fn naive_find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    if needle.len() > haystack.len() {
        return None;
    }
    (0..=haystack.len() - needle.len()).find(|&i| &haystack[i..i + needle.len()] == needle)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_map_matches_model(ops in proptest::collection::vec(map_op(), 1..80)) {
        let mut heap = test_heap();
        let map = heap.new_map();
        let mut model: HashMap<u16, i32> = HashMap::new();

        unsafe {
            for op in ops {
                match op {
                    MapOp::Set(key, value) => {
                        (*map).set(&mut heap, Value::num(key as f64), Value::num(value as f64));
                        model.insert(key, value);
                    }
                    MapOp::Remove(key) => {
                        let removed = (*map).remove_key(&mut heap, Value::num(key as f64));
                        match model.remove(&key) {
                            Some(value) => prop_assert_eq!(removed.as_num(), value as f64),
                            None => prop_assert!(removed.is_null()),
                        }
                    }
                }

                // The structural invariants hold at every observable point.
                prop_assert_eq!((*map).count as usize, model.len());
                prop_assert!((*map).count <= (*map).capacity * MAP_LOAD_PERCENT / 100);
                prop_assert!(
                    (*map).capacity == 0
                        || ((*map).capacity >= 16 && (*map).capacity.is_power_of_two())
                );

                // Both sides agree on every key.
                for (&key, &value) in &model {
                    let found = (*map).get(Value::num(key as f64));
                    prop_assert_eq!(found.as_num(), value as f64);
                }
            }
        }
    }

    #[test]
    fn prop_list_insert_remove_restores(
        elements in proptest::collection::vec(any::<f64>(), 1..40),
        index in any::<prop::sample::Index>(),
        inserted in any::<f64>(),
    ) {
        let mut heap = test_heap();
        let list = heap.new_list(0);

        unsafe {
            for (i, &element) in elements.iter().enumerate() {
                (*list).insert(&mut heap, Value::num(element), i);
            }
            let index = index.index(elements.len() + 1);

            (*list).insert(&mut heap, Value::num(inserted), index);
            let removed = (*list).remove_at(&mut heap, index);

            prop_assert_eq!(removed.as_num().to_bits(), inserted.to_bits());
            prop_assert_eq!((*list).elements.count(), elements.len());
            for (i, &element) in elements.iter().enumerate() {
                let survivor = (*list).elements.as_slice()[i];
                prop_assert_eq!(survivor.as_num().to_bits(), element.to_bits());
            }
        }
    }

    #[test]
    fn prop_string_find_agrees_with_naive(
        haystack in "[abc]{0,24}",
        needle in "[abc]{0,6}",
    ) {
        let mut heap = test_heap();
        let haystack_value = heap.new_string(&haystack);
        heap.push_root(haystack_value.as_obj());
        let needle_value = heap.new_string(&needle);
        heap.pop_root();

        unsafe {
            let result = string_find(
                &*(haystack_value.as_obj() as *const ObjString),
                &*(needle_value.as_obj() as *const ObjString),
            );
            match naive_find(haystack.as_bytes(), needle.as_bytes()) {
                Some(index) => prop_assert_eq!(result, index as u32),
                None => prop_assert_eq!(result, NOT_FOUND),
            }
        }
    }

    #[test]
    fn prop_string_equality_and_hash(text in "\\PC{0,24}") {
        let mut heap = test_heap();
        let a = heap.new_string(&text);
        heap.push_root(a.as_obj());
        let b = heap.new_string(&text);
        heap.pop_root();

        // Distinct objects, equal contents.
        prop_assert!(!std::ptr::eq(a.as_obj(), b.as_obj()));
        prop_assert!(values_equal(a, b));
        prop_assert_eq!(hash_value(a), fnv1a(text.as_bytes()));
        prop_assert_eq!(hash_value(a), hash_value(b));
    }

    #[test]
    fn prop_collect_preserves_rooted_lists(
        elements in proptest::collection::vec(any::<i32>(), 0..32),
    ) {
        let mut heap = test_heap();
        let list = heap.new_list(0);
        heap.push_root(list as *mut Obj);

        unsafe {
            for (i, &element) in elements.iter().enumerate() {
                (*list).insert(&mut heap, Value::num(element as f64), i);
            }
            heap.new_string("garbage");
            heap.collect();

            prop_assert_eq!((*list).elements.count(), elements.len());
            for (i, &element) in elements.iter().enumerate() {
                prop_assert_eq!((*list).elements.as_slice()[i].as_num(), element as f64);
            }
        }
        heap.pop_root();
    }
}
