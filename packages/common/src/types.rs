use std::collections::BTreeMap;

use serde_json::Value;

/// Server-assigned entity identifier
pub type Id = String;

/// Free-form field-name → value mapping carried by documents, tokens and spans
pub type Metadata = BTreeMap<String, Value>;

/// Namespaced configuration: namespace → key → value
pub type Config = BTreeMap<String, BTreeMap<String, Value>>;

/// Opaque optimistic-lock token returned by the server for a document
pub type VersionToken = String;
