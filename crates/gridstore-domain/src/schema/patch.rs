//! Restricted JSON Patch vocabulary for schema versioning.
//!
//! Six operations (`add`, `remove`, `replace`, `move`, `copy`, `test`) over
//! JSON Pointer paths. Application is fail-at-first: the first failing
//! operation stops the batch, and the caller receives the prefix that was
//! applied. The structural diff emits whole-array replaces; it is pragmatic,
//! not minimal.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// One parsed token of a JSON Pointer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PointerToken {
    /// Object property name (or array index when it parses as one).
    Key(String),
    /// Canonical array index.
    Index(usize),
    /// The `-` append token: one past the current array extent.
    End,
}

impl PointerToken {
    fn parse(raw: &str) -> Self {
        if raw == "-" {
            return Self::End;
        }
        // Only canonical integers are indices: no sign, no leading zero.
        if raw == "0" || (!raw.starts_with('0') && raw.chars().all(|c| c.is_ascii_digit())) {
            if let Ok(index) = raw.parse::<usize>() {
                return Self::Index(index);
            }
        }
        Self::Key(raw.to_owned())
    }

    fn as_key(&self) -> String {
        match self {
            Self::Key(k) => k.clone(),
            Self::Index(i) => i.to_string(),
            Self::End => "-".to_owned(),
        }
    }
}

/// A parsed JSON Pointer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pointer(pub Vec<PointerToken>);

impl Pointer {
    /// Parse an encoded pointer. The empty string is the document root;
    /// anything else must start with `/`. `~1` unescapes to `/` and `~0`
    /// to `~`, in that order.
    pub fn parse(encoded: &str) -> Result<Self> {
        if encoded.is_empty() {
            return Ok(Self(Vec::new()));
        }
        if !encoded.starts_with('/') {
            return Err(Error::bad_request(format!(
                "malformed JSON pointer: {encoded:?}"
            )));
        }
        let tokens = encoded
            .split('/')
            .skip(1)
            .map(|raw| PointerToken::parse(&raw.replace("~1", "/").replace("~0", "~")))
            .collect();
        Ok(Self(tokens))
    }

    /// Read the value at this pointer, if the full path exists.
    #[must_use]
    pub fn get<'a>(&self, doc: &'a Value) -> Option<&'a Value> {
        let mut node = doc;
        for token in &self.0 {
            node = match (node, token) {
                (Value::Object(fields), token) => fields.get(&token.as_key())?,
                (Value::Array(items), PointerToken::Index(i)) => items.get(*i)?,
                _ => return None,
            };
        }
        Some(node)
    }
}

/// One operation of the restricted patch vocabulary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum PatchOp {
    /// Insert into an array / upsert an object key.
    Add {
        /// Target pointer.
        path: String,
        /// Value to insert.
        value: Value,
    },
    /// Delete an array element or object key.
    Remove {
        /// Target pointer.
        path: String,
    },
    /// Overwrite an existing path.
    Replace {
        /// Target pointer; must exist.
        path: String,
        /// Replacement value.
        value: Value,
    },
    /// Remove from `from`, add at `path`.
    Move {
        /// Source pointer.
        from: String,
        /// Target pointer.
        path: String,
    },
    /// Read from `from`, add at `path`.
    Copy {
        /// Source pointer.
        from: String,
        /// Target pointer.
        path: String,
    },
    /// Fail unless the value at `path` deep-equals `value`.
    Test {
        /// Target pointer.
        path: String,
        /// Expected value.
        value: Value,
    },
}

/// Result of applying a patch batch.
#[derive(Debug)]
pub struct PatchOutcome {
    /// The longest prefix of the batch that applied cleanly.
    pub applied: Vec<PatchOp>,
    /// The failure that stopped the batch, if any.
    pub error: Option<Error>,
}

impl PatchOutcome {
    /// Whether the whole batch applied.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }
}

/// Apply a batch fail-at-first. Operations applied before a failure are
/// kept; the outcome lists exactly those.
pub fn apply_patch(doc: &mut Value, ops: Vec<PatchOp>) -> PatchOutcome {
    let mut applied = Vec::with_capacity(ops.len());
    for op in ops {
        match apply_one(doc, &op) {
            Ok(()) => applied.push(op),
            Err(error) => {
                return PatchOutcome {
                    applied,
                    error: Some(error),
                };
            }
        }
    }
    PatchOutcome {
        applied,
        error: None,
    }
}

fn apply_one(doc: &mut Value, op: &PatchOp) -> Result<()> {
    match op {
        PatchOp::Add { path, value } => add(doc, &Pointer::parse(path)?, value.clone()),
        PatchOp::Remove { path } => remove(doc, &Pointer::parse(path)?).map(|_| ()),
        PatchOp::Replace { path, value } => {
            let pointer = Pointer::parse(path)?;
            let target = resolve_mut(doc, &pointer.0)
                .ok_or_else(|| Error::bad_request(format!("replace: no value at {path}")))?;
            *target = value.clone();
            Ok(())
        }
        PatchOp::Move { from, path } => {
            let from_ptr = Pointer::parse(from)?;
            let to_ptr = Pointer::parse(path)?;
            if to_ptr.0.len() > from_ptr.0.len() && to_ptr.0[..from_ptr.0.len()] == from_ptr.0[..] {
                return Err(Error::bad_request(format!(
                    "move: {path} is inside {from}"
                )));
            }
            let value = remove(doc, &from_ptr)?;
            add(doc, &to_ptr, value)
        }
        PatchOp::Copy { from, path } => {
            let value = Pointer::parse(from)?
                .get(doc)
                .cloned()
                .ok_or_else(|| Error::bad_request(format!("copy: no value at {from}")))?;
            add(doc, &Pointer::parse(path)?, value)
        }
        PatchOp::Test { path, value } => {
            let actual = Pointer::parse(path)?.get(doc);
            if actual == Some(value) {
                Ok(())
            } else {
                Err(Error::validation(format!("test failed at {path}")))
            }
        }
    }
}

fn resolve_mut<'a>(doc: &'a mut Value, tokens: &[PointerToken]) -> Option<&'a mut Value> {
    let mut node = doc;
    for token in tokens {
        node = match (node, token) {
            (Value::Object(fields), token) => fields.get_mut(&token.as_key())?,
            (Value::Array(items), PointerToken::Index(i)) => items.get_mut(*i)?,
            _ => return None,
        };
    }
    Some(node)
}

fn add(doc: &mut Value, pointer: &Pointer, value: Value) -> Result<()> {
    let Some((last, parents)) = pointer.0.split_last() else {
        *doc = value;
        return Ok(());
    };
    let parent = resolve_mut(doc, parents)
        .ok_or_else(|| Error::bad_request("add: parent path does not exist"))?;
    match (parent, last) {
        (Value::Object(fields), token) => {
            fields.insert(token.as_key(), value);
            Ok(())
        }
        (Value::Array(items), PointerToken::Index(i)) => {
            if *i > items.len() {
                return Err(Error::bad_request(format!(
                    "add: index {i} out of bounds (len {})",
                    items.len()
                )));
            }
            items.insert(*i, value);
            Ok(())
        }
        (Value::Array(items), PointerToken::End) => {
            items.push(value);
            Ok(())
        }
        _ => Err(Error::bad_request("add: parent is not a container")),
    }
}

fn remove(doc: &mut Value, pointer: &Pointer) -> Result<Value> {
    let Some((last, parents)) = pointer.0.split_last() else {
        return Err(Error::bad_request("remove: cannot remove document root"));
    };
    let parent = resolve_mut(doc, parents)
        .ok_or_else(|| Error::bad_request("remove: parent path does not exist"))?;
    match (parent, last) {
        (Value::Object(fields), token) => fields
            .shift_remove(&token.as_key())
            .ok_or_else(|| Error::bad_request(format!("remove: no key {}", token.as_key()))),
        (Value::Array(items), PointerToken::Index(i)) => {
            if *i >= items.len() {
                return Err(Error::bad_request(format!(
                    "remove: index {i} out of bounds (len {})",
                    items.len()
                )));
            }
            Ok(items.remove(*i))
        }
        _ => Err(Error::bad_request("remove: parent is not a container")),
    }
}

fn escape(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

/// Structural diff from `a` to `b`: `add` for new keys, `remove` for
/// missing keys, `replace` for any differing primitive or array value.
/// Array diffs are a whole-array replace, not a minimal edit script.
#[must_use]
pub fn diff(a: &Value, b: &Value) -> Vec<PatchOp> {
    let mut out = Vec::new();
    diff_inner(a, b, "", &mut out);
    out
}

fn diff_inner(a: &Value, b: &Value, path: &str, out: &mut Vec<PatchOp>) {
    match (a, b) {
        (Value::Object(a_fields), Value::Object(b_fields)) => {
            for key in a_fields.keys() {
                if !b_fields.contains_key(key) {
                    out.push(PatchOp::Remove {
                        path: format!("{path}/{}", escape(key)),
                    });
                }
            }
            for (key, b_value) in b_fields {
                let child = format!("{path}/{}", escape(key));
                match a_fields.get(key) {
                    None => out.push(PatchOp::Add {
                        path: child,
                        value: b_value.clone(),
                    }),
                    Some(a_value) => diff_inner(a_value, b_value, &child, out),
                }
            }
        }
        _ if a != b => out.push(PatchOp::Replace {
            path: path.to_owned(),
            value: b.clone(),
        }),
        _ => {}
    }
}
