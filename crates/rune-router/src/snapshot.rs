//! JSON snapshot of the page stack for continuation and recovery.
//!
//! ```json
//! {
//!   "stackInfo": ["pages/index.js", "pages/detail.js"],
//!   "nodeInfo": { ... },
//!   "namedRouterInfo": [ ... ],
//!   "fullPathInfo": [ ... ]
//! }
//! ```
//!
//! Resource-schedule recovery writes objects instead of url strings so params survive,
//! and leaves out pages that opted out of recovery. Decoding accepts both shapes.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, RouterError};
use crate::manifest::PAGE_SCRIPT_SUFFIX;

const STACK_INFO: &str = "stackInfo";
const NODE_INFO: &str = "nodeInfo";
const NAMED_ROUTER_INFO: &str = "namedRouterInfo";
const FULL_PATH_INFO: &str = "fullPathInfo";

/// Why the snapshot is taken or restored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RestoreKind {
    #[default]
    None,
    Continuation,
    AppRecovery,
    ResourceScheduleRecovery,
}

impl RestoreKind {
    pub fn carries_node_info(self) -> bool {
        matches!(self, RestoreKind::Continuation | RestoreKind::AppRecovery)
    }
}

/// One stack entry as written to or read from `stackInfo`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackEntry {
    pub url: String,
    #[serde(default)]
    pub params: String,
    #[serde(default)]
    pub is_named_route: bool,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StackItem {
    Url(String),
    Entry(StackEntry),
}

/// What the caller should bring back up after a restore: the top page.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RouterRecoverRecord {
    /// Logical url, without the script suffix.
    pub url: String,
    pub params: String,
    pub is_named_route: bool,
}

impl From<&StackEntry> for RouterRecoverRecord {
    fn from(entry: &StackEntry) -> Self {
        let url = entry
            .url
            .strip_suffix(PAGE_SCRIPT_SUFFIX)
            .unwrap_or(&entry.url)
            .to_string();
        Self {
            url,
            params: entry.params.clone(),
            is_named_route: entry.is_named_route,
        }
    }
}

/// Snapshot content, split into its parts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub entries: Vec<StackEntry>,
    pub node_info: Option<Value>,
    pub named_router_info: Option<Value>,
    pub full_path_info: Option<Value>,
}

impl Snapshot {
    pub fn encode(&self, kind: RestoreKind) -> String {
        let stack = match kind {
            RestoreKind::ResourceScheduleRecovery => {
                serde_json::to_value(&self.entries).unwrap_or(Value::Array(Vec::new()))
            }
            _ => Value::Array(
                self.entries
                    .iter()
                    .map(|entry| Value::String(entry.url.clone()))
                    .collect(),
            ),
        };

        let mut root = Map::new();
        root.insert(STACK_INFO.to_string(), stack);
        if kind.carries_node_info() {
            if let Some(node_info) = &self.node_info {
                root.insert(NODE_INFO.to_string(), node_info.clone());
            }
        }
        if let Some(info) = &self.named_router_info {
            root.insert(NAMED_ROUTER_INFO.to_string(), info.clone());
        }
        if let Some(info) = &self.full_path_info {
            root.insert(FULL_PATH_INFO.to_string(), info.clone());
        }
        Value::Object(root).to_string()
    }

    /// Parses and validates a snapshot without touching any router state.
    pub fn decode(content: &str, kind: RestoreKind) -> Result<Self> {
        let root: Value = serde_json::from_str(content)
            .map_err(|err| RouterError::WrongPageRouter(format!("not json: {err}")))?;
        let Value::Object(mut root) = root else {
            return Err(RouterError::WrongPageRouter("root is not an object".into()));
        };

        let items = match root.remove(STACK_INFO) {
            Some(Value::Array(items)) if !items.is_empty() => items,
            Some(Value::Array(_)) => {
                return Err(RouterError::WrongPageRouter("stackInfo is empty".into()));
            }
            _ => return Err(RouterError::WrongPageRouter("stackInfo is not an array".into())),
        };

        let mut entries = Vec::with_capacity(items.len());
        for item in items {
            let entry = match serde_json::from_value::<StackItem>(item) {
                Ok(StackItem::Url(url)) => StackEntry {
                    url,
                    params: String::new(),
                    is_named_route: false,
                },
                Ok(StackItem::Entry(entry)) => entry,
                Err(err) => {
                    return Err(RouterError::WrongPageRouter(format!("bad stack entry: {err}")));
                }
            };
            if entry.url.is_empty() {
                return Err(RouterError::WrongPageRouter("stack entry without url".into()));
            }
            entries.push(entry);
        }

        let node_info = if kind.carries_node_info() {
            root.remove(NODE_INFO)
        } else {
            None
        };

        Ok(Self {
            entries,
            node_info,
            named_router_info: root.remove(NAMED_ROUTER_INFO),
            full_path_info: root.remove(FULL_PATH_INFO),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(url: &str, params: &str) -> StackEntry {
        StackEntry {
            url: url.into(),
            params: params.into(),
            is_named_route: false,
        }
    }

    #[test]
    fn continuation_writes_urls_and_node_info() {
        let snapshot = Snapshot {
            entries: vec![entry("pages/a.js", "{}"), entry("pages/b.js", "")],
            node_info: Some(json!({"focus": 3})),
            ..Default::default()
        };
        let encoded: Value = serde_json::from_str(&snapshot.encode(RestoreKind::Continuation)).unwrap();
        assert_eq!(encoded["stackInfo"], json!(["pages/a.js", "pages/b.js"]));
        assert_eq!(encoded["nodeInfo"], json!({"focus": 3}));

        let encoded: Value = serde_json::from_str(&snapshot.encode(RestoreKind::None)).unwrap();
        assert!(encoded.get("nodeInfo").is_none());
    }

    #[test]
    fn resource_schedule_keeps_params() {
        let snapshot = Snapshot {
            entries: vec![entry("pages/a.js", r#"{"id":7}"#)],
            ..Default::default()
        };
        let encoded = snapshot.encode(RestoreKind::ResourceScheduleRecovery);
        let decoded = Snapshot::decode(&encoded, RestoreKind::ResourceScheduleRecovery).unwrap();
        assert_eq!(decoded.entries, snapshot.entries);
    }

    #[test]
    fn decode_accepts_mixed_entry_shapes() {
        let decoded = Snapshot::decode(
            r#"{"stackInfo":["pages/a.js",{"url":"pages/b.js","isNamedRoute":true}]}"#,
            RestoreKind::AppRecovery,
        )
        .unwrap();
        assert_eq!(decoded.entries.len(), 2);
        assert!(decoded.entries[1].is_named_route);
        assert!(decoded.node_info.is_none());
    }

    #[test]
    fn malformed_snapshots_are_rejected() {
        for content in [
            "not json",
            "[]",
            r#"{"stackInfo":"pages/a.js"}"#,
            r#"{"stackInfo":[]}"#,
            r#"{"nodeInfo":{}}"#,
            r#"{"stackInfo":[42]}"#,
            r#"{"stackInfo":[""]}"#,
        ] {
            let err = Snapshot::decode(content, RestoreKind::Continuation).unwrap_err();
            assert!(matches!(err, RouterError::WrongPageRouter(_)), "{content}");
        }
    }

    #[test]
    fn recover_record_drops_script_suffix() {
        let record = RouterRecoverRecord::from(&entry("pages/detail.js", "p"));
        assert_eq!(record.url, "pages/detail");
        assert_eq!(record.params, "p");
    }
}
