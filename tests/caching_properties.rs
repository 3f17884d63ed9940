//! Property-based tests for cache key canonicalization and storage round-trips

use std::convert::Infallible;
use std::sync::atomic::{AtomicUsize, Ordering};

use proptest::prelude::*;
use resultcache::{
    cache, BoundArgs, CacheConfig, CacheKey, CallArgs, DiskBackend, FunctionIdentifier,
    MemoryBackend, Signature, StorageBackend,
};
use serde_json::{json, Value};
use tempfile::TempDir;

/// Strategy for argument values that cover the common JSON shapes
fn value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<i64>().prop_map(|n| json!(n)),
        any::<bool>().prop_map(|b| json!(b)),
        "[a-zA-Z0-9_/.-]{0,16}".prop_map(|s| json!(s)),
        proptest::collection::vec(any::<i32>(), 0..4).prop_map(|v| json!(v)),
    ]
}

proptest! {
    /// Calling with the same values positionally or by keyword must hit the
    /// same entry: the function runs exactly once across both calls.
    #[test]
    fn prop_argument_form_does_not_affect_caching(a in value_strategy(), b in value_strategy()) {
        let calls = AtomicUsize::new(0);
        let config = CacheConfig::default();
        let echo = cache::<_, Vec<Value>, Infallible>(
            FunctionIdentifier::new("props::modx", "echo"),
            Signature::new(["a", "b"]),
            &config,
            |args: &BoundArgs| {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(vec![args.get("a").unwrap().clone(), args.get("b").unwrap().clone()])
            },
        );

        let positional = CallArgs::new().arg(a.clone()).unwrap().arg(b.clone()).unwrap();
        let keyword = CallArgs::new().kwarg("b", b).unwrap().kwarg("a", a).unwrap();

        let first = echo.call(positional).unwrap();
        let second = echo.call(keyword).unwrap();
        prop_assert_eq!(first, second);
        prop_assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    /// Any serializable value written to the durable backend reads back equal.
    #[test]
    fn prop_disk_backend_round_trips_values(v in value_strategy()) {
        let home = TempDir::new().unwrap();
        let backend = DiskBackend::new(home.path());
        let bound = Signature::new(["a"])
            .bind(&CallArgs::new().arg(1).unwrap())
            .unwrap();
        let key = CacheKey::new(FunctionIdentifier::new("props::modx", "roundtrip"), bound.call_key());

        backend.put(&key, &v).unwrap();
        prop_assert!(backend.contains(&key).unwrap());
        prop_assert_eq!(backend.get(&key).unwrap(), Some(v));
    }

    /// Memory and durable backends agree on lookups for the same writes.
    #[test]
    fn prop_backends_agree(v in value_strategy(), probe in any::<i64>()) {
        let home = TempDir::new().unwrap();
        let disk = DiskBackend::new(home.path());
        let memory = MemoryBackend::new();
        let sig = Signature::new(["a"]);

        let written = CacheKey::new(
            FunctionIdentifier::new("props::modx", "agree"),
            sig.bind(&CallArgs::new().arg(1).unwrap()).unwrap().call_key(),
        );
        let probed = CacheKey::new(
            FunctionIdentifier::new("props::modx", "agree"),
            sig.bind(&CallArgs::new().arg(probe).unwrap()).unwrap().call_key(),
        );

        disk.put(&written, &v).unwrap();
        memory.put(&written, &v).unwrap();

        prop_assert_eq!(disk.contains(&probed).unwrap(), memory.contains(&probed).unwrap());
        prop_assert_eq!(disk.get(&probed).unwrap(), memory.get(&probed).unwrap());
    }
}
