//! Property-Based Tests for Callback Payload Extraction
//!
//! Properties:
//! - extraction never panics, whatever the body bytes and headers
//! - ordered merge: every key survives, and the later layer wins on overlap
//! - the provider's double-wrapped `data=` form decodes to the inner id

use dossier_core::payload::{decode, ordered_merge, CallbackInput, FlatMap, PayloadExtractor};
use proptest::prelude::*;
use serde_json::{json, Value};

// ============================================================================
// GENERATORS
// ============================================================================

fn arb_header() -> impl Strategy<Value = (String, String)> {
    (
        prop_oneof![
            Just("x-callback-id".to_string()),
            Just("X-Request-Id".to_string()),
            Just("session-id".to_string()),
            Just("Content-Type".to_string()),
            "[a-zA-Z][a-zA-Z0-9-]{0,15}",
        ],
        "[ -~]{0,24}",
    )
}

fn arb_body() -> impl Strategy<Value = Vec<u8>> {
    prop_oneof![
        proptest::collection::vec(any::<u8>(), 0..256),
        "[ -~]{0,128}".prop_map(String::into_bytes),
        "[a-z_]{1,8}=[a-zA-Z0-9%+]{0,12}(&[a-z_]{1,8}=[a-zA-Z0-9%+]{0,12}){0,4}"
            .prop_map(String::into_bytes),
        "data=[a-zA-Z0-9%+]{0,64}".prop_map(String::into_bytes),
    ]
}

fn arb_flat_map() -> impl Strategy<Value = FlatMap> {
    proptest::collection::btree_map("[a-e]{1,2}", any::<i32>(), 0..8).prop_map(|entries| {
        entries
            .into_iter()
            .map(|(key, value)| (key, json!(value)))
            .collect()
    })
}

fn urlencoded(value: &Value) -> String {
    url::form_urlencoded::byte_serialize(value.to_string().as_bytes()).collect()
}

// ============================================================================
// PROPERTIES
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Any input yields a map; correlation id and status are either absent
    /// or non-empty.
    #[test]
    fn prop_extraction_never_panics(
        body in arb_body(),
        headers in proptest::collection::vec(arb_header(), 0..6),
    ) {
        let input = CallbackInput { body, headers };
        let out = PayloadExtractor::extract(&input);

        if let Some(id) = &out.correlation_id {
            prop_assert!(!id.is_empty());
        }
        if let Some(status) = &out.status {
            prop_assert!(!status.is_empty());
        }
        for (name, _) in &input.headers {
            let key = format!("header_{}", name.to_ascii_lowercase().replace('-', "_"));
            prop_assert!(out.fields.contains_key(&key), "missing {}", key);
        }
    }

    /// Later layer wins on overlap; nothing from either side is dropped.
    #[test]
    fn prop_ordered_merge_precedence(earlier in arb_flat_map(), later in arb_flat_map()) {
        let mut merged = earlier.clone();
        ordered_merge(&mut merged, later.clone());

        for (key, value) in &later {
            prop_assert_eq!(merged.get(key), Some(value));
        }
        for (key, value) in &earlier {
            if !later.contains_key(key) {
                prop_assert_eq!(merged.get(key), Some(value));
            }
        }
        prop_assert!(merged.len() <= earlier.len() + later.len());
    }

    /// A header always beats a body field that happens to share its key.
    #[test]
    fn prop_header_overwrites_body_field(body_value in "[a-z]{1,10}", header_value in "[A-Z]{1,10}") {
        let body = json!({ "header_x_state": body_value }).to_string();
        let input = CallbackInput::new(body).with_header("X-State", header_value.clone());
        let fields = decode(&input);
        prop_assert_eq!(fields.get("header_x_state"), Some(&json!(header_value)));
    }

    /// `data=<urlencoded json>` recovers the correlation id and the nested
    /// `esito` object, with or without a form content type.
    #[test]
    fn prop_double_wrapped_id_recovered(id in "[A-Za-z0-9]{1,16}", with_form_header in any::<bool>()) {
        let inner = json!({"id": id, "data": {"id": id, "esito": {"k": "v"}}});
        let mut input = CallbackInput::new(format!("data={}", urlencoded(&inner)));
        if with_form_header {
            input = input.with_header("Content-Type", "application/x-www-form-urlencoded");
        }

        let out = PayloadExtractor::extract(&input);
        prop_assert_eq!(out.correlation_id.as_deref(), Some(id.as_str()));

        prop_assert_eq!(out.fields.get("data_inner_esito"), Some(&json!({"k": "v"})));
    }
}
