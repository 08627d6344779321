// tests/weight_cache.rs
//
// Resolver against the on-disk weight cache and the built-in reference tables.
//
use std::fs;

use mmn_prices::domain::{NullPolicy, PackageWeightStore, WeightResolver};
use mmn_prices::infra::{CsvWeightStore, NetWeightTable, WeightRules};
use tempfile::tempdir;

fn builtin_resolver() -> WeightResolver<WeightRules, NetWeightTable> {
    WeightResolver::new(
        WeightRules::embedded().unwrap(),
        NetWeightTable::embedded().unwrap(),
    )
}

#[test]
fn weights_persist_across_runs() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("package_weights.csv");

    let mut store = CsvWeightStore::new(&path);
    let weights = builtin_resolver()
        .resolve(
            &mut store,
            "Tomatoes",
            ["Roma", "Cherry"],
            ["25 lb cartons", "10 kg boxes", "cartons 2 layer", "flats 12 1-pint cups"],
        )
        .unwrap()
        .unwrap();

    let get = |variety: &str, package: &str| weights[&(variety.to_string(), package.to_string())];
    assert_eq!(get("Roma", "25 lb cartons"), Some(25));
    assert_eq!(get("Cherry", "10 kg boxes"), Some(22));
    assert_eq!(get("Roma", "cartons 2 layer"), Some(20));
    assert_eq!(get("Cherry", "flats 12 1-pint cups"), Some(12));
    assert_eq!(get("Roma", "flats 12 1-pint cups"), None);
    assert_eq!(get("Cherry", "cartons 2 layer"), None);

    let first_run = fs::read_to_string(&path).unwrap();
    assert_eq!(first_run.lines().count(), 1 + 8);

    // A fresh process sees the same answers and leaves the file unchanged.
    let mut reopened = CsvWeightStore::new(&path);
    let again = builtin_resolver()
        .resolve(
            &mut reopened,
            "Tomatoes",
            ["Roma", "Cherry"],
            ["25 lb cartons", "10 kg boxes", "cartons 2 layer", "flats 12 1-pint cups"],
        )
        .unwrap()
        .unwrap();
    assert_eq!(again, weights);
    assert_eq!(fs::read_to_string(&path).unwrap(), first_run);
}

#[test]
fn hand_edited_cache_takes_priority() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("package_weights.csv");
    fs::write(
        &path,
        "commodity,variety,package,pounds\n\
         Tomatoes,Roma,cartons 2 layer,19\n\
         Tomatoes,Roma,bushel baskets,\n",
    )
    .unwrap();

    let mut store = CsvWeightStore::new(&path);
    let weights = builtin_resolver()
        .resolve(&mut store, "Tomatoes", ["Roma"], ["cartons 2 layer", "bushel baskets"])
        .unwrap()
        .unwrap();

    assert_eq!(weights[&("Roma".into(), "cartons 2 layer".into())], Some(19));
    assert_eq!(weights[&("Roma".into(), "bushel baskets".into())], None);
    assert_eq!(store.load().unwrap().len(), 2);
}

#[test]
fn retry_policy_fills_in_newly_published_weights() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("package_weights.csv");
    fs::write(
        &path,
        "commodity,variety,package,pounds\n\
         Tomatoes,Roma,cartons 3 layer,\n",
    )
    .unwrap();

    let mut store = CsvWeightStore::new(&path);
    let sticky = builtin_resolver()
        .resolve(&mut store, "Tomatoes", ["Roma"], ["cartons 3 layer"])
        .unwrap()
        .unwrap();
    assert_eq!(sticky[&("Roma".into(), "cartons 3 layer".into())], None);

    let retried = builtin_resolver()
        .with_null_policy(NullPolicy::Retry)
        .resolve(&mut store, "Tomatoes", ["Roma"], ["cartons 3 layer"])
        .unwrap()
        .unwrap();
    assert_eq!(retried[&("Roma".into(), "cartons 3 layer".into())], Some(30));
    assert_eq!(store.load().unwrap().len(), 2);
}

#[test]
fn unknown_commodity_leaves_no_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("package_weights.csv");
    let mut store = CsvWeightStore::new(&path);

    let result = builtin_resolver()
        .resolve(&mut store, "Durian", ["Monthong"], ["10 kg boxes"])
        .unwrap();

    assert!(result.is_none());
    assert!(!path.exists());
}
