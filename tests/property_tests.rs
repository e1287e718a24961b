mod common;

use common::{check_directory, Pair};
use proptest::prelude::*;
use rusty_ext_hash::{Error, HashStorage, IndexOptions};
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
enum Operation {
    Insert { key: u16, value: i64 },
    Update { key: u16, new_key: u16, value: i64 },
    Delete { key: u16 },
    Find { key: u16 },
    Reopen,
}

fn arb_operation() -> impl Strategy<Value = Operation> {
    prop_oneof![
        4 => (0u16..96, any::<i64>()).prop_map(|(key, value)| Operation::Insert { key, value }),
        1 => (0u16..96, 0u16..96, any::<i64>())
            .prop_map(|(key, new_key, value)| Operation::Update { key, new_key, value }),
        3 => (0u16..96).prop_map(|key| Operation::Delete { key }),
        2 => (0u16..96).prop_map(|key| Operation::Find { key }),
        1 => Just(Operation::Reopen),
    ]
}

/// Spreads small keys over the whole hash window.
fn hashed(key: u16) -> i32 {
    (key as u32).wrapping_mul(0x9E37_79B9) as i32
}

fn run_model(max_depth: u32, ops: Vec<Operation>) -> Result<(), TestCaseError> {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    runtime.block_on(async move {
        let dir = tempfile::tempdir().unwrap();
        let options = IndexOptions::with_cluster_size(64).max_depth(max_depth);
        let mut index: HashStorage<Pair> = HashStorage::create(dir.path(), options).await.unwrap();
        let (block_factor, overflow_factor) = (index.block_factor(), index.overflow_block_factor());
        let mut model: BTreeMap<i32, i64> = BTreeMap::new();

        for op in ops {
            match op {
                Operation::Insert { key, value } => {
                    let key = hashed(key);
                    let result = index.insert(Pair::new(key, value)).await;
                    if model.contains_key(&key) {
                        prop_assert!(matches!(result, Err(Error::Duplicate)));
                    } else {
                        result.unwrap();
                        model.insert(key, value);
                    }
                }
                Operation::Update { key, new_key, value } => {
                    let (key, new_key) = (hashed(key), hashed(new_key));
                    let result = index.update(&Pair::new(key, 0), Pair::new(new_key, value)).await;
                    if key != new_key && model.contains_key(&new_key) {
                        prop_assert!(matches!(result, Err(Error::Duplicate)));
                    } else if !model.contains_key(&key) {
                        prop_assert!(matches!(result, Err(Error::NotFound(_))));
                    } else {
                        result.unwrap();
                        model.remove(&key);
                        model.insert(new_key, value);
                    }
                }
                Operation::Delete { key } => {
                    let key = hashed(key);
                    let result = index.delete(&Pair::new(key, 0)).await;
                    match model.remove(&key) {
                        Some(value) => prop_assert_eq!(result.unwrap().value, value),
                        None => prop_assert!(matches!(result, Err(Error::NotFound(_)))),
                    }
                }
                Operation::Find { key } => {
                    let key = hashed(key);
                    let found = index.find(&Pair::new(key, 0)).await.unwrap();
                    prop_assert_eq!(found.map(|pair| pair.value), model.get(&key).copied());
                }
                Operation::Reopen => {
                    index.close().await.unwrap();
                    index = HashStorage::open(dir.path(), options).await.unwrap();
                }
            }
            prop_assert_eq!(
                check_directory(index.directory(), block_factor, overflow_factor),
                model.len()
            );
        }

        let mut stored: Vec<(i32, i64)> = index
            .to_vec()
            .await
            .unwrap()
            .into_iter()
            .map(|pair| (pair.key, pair.value))
            .collect();
        stored.sort();
        prop_assert_eq!(stored, model.into_iter().collect::<Vec<_>>());
        index.close().await.unwrap();
        Ok(())
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_index_matches_model(ops in prop::collection::vec(arb_operation(), 1..300)) {
        run_model(24, ops)?;
    }

    #[test]
    fn prop_index_matches_model_with_overflow(
        ops in prop::collection::vec(arb_operation(), 1..300)
    ) {
        run_model(2, ops)?;
    }
}
