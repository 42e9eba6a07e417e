// tests/path_transform_property_test.rs

//! `transform(key)` must be a pure function of its input, and the
//! content-addressable variant must always yield exactly four
//! 10-character lowercase-hex path components.

use hyperstore::core::path::PathTransform;
use proptest::prelude::*;

proptest! {
    #[test]
    fn content_addressable_transform_is_deterministic_and_well_shaped(key in ".{0,200}") {
        let transform = PathTransform::ContentAddressable;
        let first = transform.relative_dir(&key);
        let second = transform.relative_dir(&key);
        prop_assert_eq!(&first, &second);

        let components: Vec<_> = first.components().collect();
        prop_assert_eq!(components.len(), 4);
        for c in components {
            let s = c.as_os_str().to_str().unwrap();
            prop_assert_eq!(s.len(), 10);
            prop_assert!(s.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        }
    }

    #[test]
    fn identity_transform_returns_the_key_unchanged(key in "[^/\\\\]{1,100}") {
        let transform = PathTransform::Identity;
        prop_assert_eq!(transform.relative_dir(&key), std::path::PathBuf::from(&key));
    }
}
