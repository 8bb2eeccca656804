//! Validation tests
//!
//! - rule builder outcomes
//! - path shape checks
//! - input size limits

use crate::validation::{
    FieldError, Validate, ValidationResult, ValidationRules, check_path, validate_input_size,
    validate_path, validate_subscription_id, validation_error,
};
use crate::{RpcErrorCode, SubscriptionId};
use proptest::prelude::*;
use serde_json::json;

struct Signup {
    name: String,
    email: String,
    age: i64,
}

impl Validate for Signup {
    fn validate(&self) -> ValidationResult {
        ValidationRules::new()
            .required("name", &self.name)
            .min_length("name", &self.name, 2)
            .email("email", &self.email)
            .range("age", self.age, 0, 150)
            .build()
    }
}

#[test]
fn test_rules_collect_every_failure() {
    let result = Signup {
        name: "".into(),
        email: "nope".into(),
        age: 200,
    }
    .validate();

    assert!(!result.is_valid());
    let by_field = result.errors_by_field();
    assert_eq!(by_field["name"].len(), 2);
    assert_eq!(by_field["email"][0].code, "email");
    assert_eq!(by_field["age"][0].code, "range");
}

#[test]
fn test_valid_input_passes() {
    let result = Signup {
        name: "Alice".into(),
        email: "alice@example.com".into(),
        age: 30,
    }
    .validate();
    assert!(result.is_valid());
    assert!(result.into_rpc_result().is_ok());
}

#[test]
fn test_email_rule() {
    for ok in ["a@b.co", "first.last@example.org"] {
        assert!(ValidationRules::new().email("e", ok).build().is_valid(), "{}", ok);
    }
    for bad in ["", "a", "@b.co", "a@b", "a@.co", "a@b.", "a@b@c.co"] {
        assert!(!ValidationRules::new().email("e", bad).build().is_valid(), "{}", bad);
    }
}

#[test]
fn test_pattern_and_custom_rules() {
    let result = ValidationRules::new()
        .pattern("phone", "12ab", r"^\d+$")
        .pattern("bad", "x", "(")
        .custom("tags", || false, "too many tags")
        .build();
    let codes: Vec<_> = result.errors.iter().map(|e| e.code.as_str()).collect();
    assert_eq!(codes, vec!["pattern", "invalid_pattern", "custom"]);
}

#[test]
fn test_validation_error_carries_fields() {
    let error = validation_error(vec![FieldError::required("name")]);
    assert_eq!(error.code, RpcErrorCode::ValidationError);
    assert_eq!(
        error.details,
        Some(json!({"fields": [{"field": "name", "message": "name is required", "code": "required"}]}))
    );
}

#[test]
fn test_option_and_vec_delegate() {
    let items = vec![
        Signup { name: "Al".into(), email: "a@b.co".into(), age: 1 },
        Signup { name: "".into(), email: "a@b.co".into(), age: 1 },
    ];
    assert!(!items.validate().is_valid());
    assert!(None::<Signup>.validate().is_valid());
}

#[test]
fn test_path_shapes() {
    assert!(check_path("hello").is_ok());
    assert!(check_path("user.getById").is_ok());
    assert!(check_path("a.b_c.d1").is_ok());
    for bad in ["", ".", "a.", ".a", "a..b", "a b", "a/b", "ü"] {
        assert!(check_path(bad).is_err(), "{:?}", bad);
    }
    assert_eq!(validate_path("a..b").unwrap_err().code, RpcErrorCode::NotFound);
}

#[test]
fn test_input_size_limit() {
    assert!(validate_input_size(&json!({"text": "abc"}), 64).is_ok());
    let error = validate_input_size(&json!({"text": "x".repeat(100)}), 64).unwrap_err();
    assert_eq!(error.code, RpcErrorCode::PayloadTooLarge);
    assert!(validate_input_size(&json!(null), 4).is_ok());
    assert!(validate_input_size(&json!("abc"), 4).is_err());
}

#[test]
fn test_subscription_id_parsing() {
    let id = SubscriptionId::new();
    assert_eq!(validate_subscription_id(&id.to_string()).unwrap(), id);
    assert_eq!(
        validate_subscription_id(&id.as_uuid().to_string()).unwrap(),
        id
    );
    assert_eq!(
        validate_subscription_id("").unwrap_err().code,
        RpcErrorCode::BadRequest
    );
    assert_eq!(
        validate_subscription_id("sub_nope").unwrap_err().code,
        RpcErrorCode::BadRequest
    );
}

proptest! {
    /// Dotted identifiers always pass the path check.
    #[test]
    fn prop_dotted_identifiers_are_valid(path in "[a-zA-Z_][a-zA-Z0-9_]{0,10}(\\.[a-zA-Z_][a-zA-Z0-9_]{0,10}){0,4}") {
        prop_assert!(check_path(&path).is_ok());
    }

    /// Any path with an empty segment fails.
    #[test]
    fn prop_empty_segments_are_invalid(left in "[a-z]{0,5}", right in "[a-z]{0,5}") {
        let path = format!("{}..{}", left, right);
        prop_assert!(check_path(&path).is_err());
    }

    /// Input size checks agree with the serialized length.
    #[test]
    fn prop_input_size_matches_serialization(text in ".{0,200}", limit in 1usize..256) {
        let input = json!({"text": text});
        let size = serde_json::to_vec(&input).unwrap().len();
        prop_assert_eq!(validate_input_size(&input, limit).is_ok(), size <= limit);
    }

    /// `min_length` counts characters, not bytes.
    #[test]
    fn prop_min_length_counts_chars(value in "\\PC{0,20}", min in 0usize..25) {
        let valid = ValidationRules::new().min_length("f", &value, min).build().is_valid();
        prop_assert_eq!(valid, value.chars().count() >= min);
    }
}
