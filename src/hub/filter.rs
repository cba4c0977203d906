//! Subscription filters and permissive wire parsing.

use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

use crate::domain::ProbeResult;

/// A pure predicate over probe results.
///
/// Empty lists widen: a fully empty filter accepts everything; otherwise a
/// result must match the payer list (when non-empty) and the type list
/// (when non-empty).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubscriptionFilter {
    pub payers: Vec<String>,
    pub types: Vec<String>,
}

impl SubscriptionFilter {
    pub fn accepts(&self, result: &ProbeResult) -> bool {
        let payer_ok = self.payers.is_empty() || self.payers.iter().any(|p| *p == result.payer);
        let type_ok =
            self.types.is_empty() || self.types.iter().any(|t| *t == result.endpoint_type);
        payer_ok && type_ok
    }
}

/// Filter slot shared between a session's read loop (writer) and the hub
/// loop (reader). Evaluation never blocks on the writer for long: the read
/// loop only swaps the value.
#[derive(Debug, Clone, Default)]
pub struct SharedFilter(Arc<RwLock<SubscriptionFilter>>);

impl SharedFilter {
    pub fn accepts(&self, result: &ProbeResult) -> bool {
        self.0.read().accepts(result)
    }

    pub fn replace(&self, filter: SubscriptionFilter) {
        *self.0.write() = filter;
    }

    pub fn current(&self) -> SubscriptionFilter {
        self.0.read().clone()
    }
}

/// Parse an inbound client message.
///
/// Parsing is deliberately permissive for forward compatibility: anything
/// that is not a JSON object with `action == "subscribe"` is ignored, as
/// are non-string entries in the filter arrays. Both `payers` and the
/// legacy singular `payer` key are accepted (plural wins when both are
/// present), and likewise `types`/`type`.
pub fn parse_subscription(text: &str) -> Option<SubscriptionFilter> {
    let value: Value = serde_json::from_str(text).ok()?;
    if value.get("action")?.as_str()? != "subscribe" {
        return None;
    }

    Some(SubscriptionFilter {
        payers: string_list(&value, "payers")
            .or_else(|| string_list(&value, "payer"))
            .unwrap_or_default(),
        types: string_list(&value, "types")
            .or_else(|| string_list(&value, "type"))
            .unwrap_or_default(),
    })
}

/// Read `key` as a list of strings; absent key yields `None`, a present
/// but malformed value yields the strings it does contain.
fn string_list(value: &Value, key: &str) -> Option<Vec<String>> {
    let raw = value.get(key)?;
    let items = raw.as_array()?;
    Some(
        items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
    )
}
