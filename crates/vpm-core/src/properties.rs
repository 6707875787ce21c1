// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Process-global typed property store.
//!
//! Backs `PropertyNode` writers and the per-action enable properties. Keys
//! are free-form strings; values are stored as strings and parsed on read.
//! `teardown` clears the store so tests start from a clean slate.

use std::collections::HashMap;
use std::str::FromStr;

use once_cell::sync::Lazy;
use parking_lot::RwLock;

static STORE: Lazy<RwLock<HashMap<String, String>>> = Lazy::new(|| RwLock::new(HashMap::new()));

/// Set a property, replacing any previous value.
pub fn set(key: &str, value: impl ToString) {
    STORE.write().insert(key.to_string(), value.to_string());
}

/// Raw string lookup.
pub fn get_raw(key: &str) -> Option<String> {
    STORE.read().get(key).cloned()
}

/// Typed lookup; unparsable or missing values fall back to `default`.
pub fn get<T: FromStr>(key: &str, default: T) -> T {
    match STORE.read().get(key) {
        Some(raw) => raw.parse().unwrap_or(default),
        None => default,
    }
}

/// Boolean lookup accepting `true/false` and `1/0`.
pub fn get_bool(key: &str, default: bool) -> bool {
    match STORE.read().get(key).map(String::as_str) {
        Some("true") | Some("1") => true,
        Some("false") | Some("0") => false,
        _ => default,
    }
}

/// Clear the store. Test hook.
pub fn teardown() {
    STORE.write().clear();
}

/// Serializes in-crate tests that mutate the global store.
#[cfg(test)]
pub(crate) static TEST_LOCK: parking_lot::Mutex<()> = parking_lot::Mutex::new(());

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_get_falls_back_on_missing_or_garbage() {
        let _guard = TEST_LOCK.lock();
        teardown();
        assert_eq!(get("vendor.powerhal.adpf.rate", -1i64), -1);
        set("vendor.powerhal.adpf.rate", 120);
        assert_eq!(get("vendor.powerhal.adpf.rate", -1i64), 120);
        set("vendor.powerhal.adpf.rate", "not-a-number");
        assert_eq!(get("vendor.powerhal.adpf.rate", -1i64), -1);
    }

    #[test]
    fn bool_accepts_numeric_forms() {
        let _guard = TEST_LOCK.lock();
        teardown();
        assert!(get_bool("vendor.powerhal.enable", true));
        set("vendor.powerhal.enable", "0");
        assert!(!get_bool("vendor.powerhal.enable", true));
        set("vendor.powerhal.enable", "1");
        assert!(get_bool("vendor.powerhal.enable", false));
        set("vendor.powerhal.enable", "false");
        assert!(!get_bool("vendor.powerhal.enable", true));
    }
}
