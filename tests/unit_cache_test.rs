use bytes::Bytes;
use convergence_control::cache::{with_encoding_cache, EncodingCache};
use convergence_control::core::model::Deployment;

#[test]
fn inactive_cache_still_encodes_but_does_not_remember() {
    let mut cache = EncodingCache::new();
    assert!(!cache.is_active());
    let a = cache.encode_configuration(&Deployment::empty()).unwrap();
    let b = cache.encode_configuration(&Deployment::empty()).unwrap();
    assert_eq!(a, b);
}

#[test]
fn scope_memoizes_within_closure_and_deactivates_after() {
    let mut cache = EncodingCache::new();
    let deployment = Deployment { generation: 1, payload: Bytes::from_static(b"x") };

    let (first, second) = with_encoding_cache(&mut cache, |c| {
        assert!(c.is_active());
        let first = c.encode_configuration(&deployment).unwrap();
        let second = c.encode_configuration(&deployment).unwrap();
        (first, second)
    });
    assert_eq!(first, second);
    assert!(!cache.is_active());
}

#[test]
fn scope_deactivates_even_if_closure_panics() {
    let mut cache = EncodingCache::new();
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        with_encoding_cache(&mut cache, |_c| panic!("boom"));
    }));
    assert!(result.is_err());
    assert!(!cache.is_active());
}
