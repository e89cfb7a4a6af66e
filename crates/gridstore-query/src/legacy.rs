//! Legacy string parsers.
//!
//! Compatibility shims for the positional `(field,op,value)~and(...)`
//! filter string and the `+f,-f,f:asc` sort string. Malformed fragments are
//! dropped with a warning, never raised. Neither form supports nested
//! groups; callers wanting structure use the filter tree directly.

use gridstore_domain::filter::{
    ComparisonOp, FilterLeaf, FilterNode, LogicalOp, SortDirection, SortSpec,
};
use serde_json::Value;
use tracing::warn;

/// Parse a legacy where string into a filter tree. Returns `None` when no
/// fragment survives.
#[must_use]
pub fn parse_where(input: &str) -> Option<FilterNode> {
    let mut result: Option<FilterNode> = None;
    for (connective, fragment) in split_fragments(input) {
        let Some(leaf) = parse_fragment(fragment) else {
            warn!(fragment, "dropping malformed where-string fragment");
            continue;
        };
        result = Some(match result {
            None => leaf,
            Some(previous) => FilterNode::group(connective, vec![previous, leaf]),
        });
    }
    result
}

/// Split `(a,eq,1)~and(b,gt,2)` into connective/fragment pairs. The first
/// fragment's connective is AND by construction and unused.
fn split_fragments(input: &str) -> Vec<(LogicalOp, &str)> {
    let mut out = Vec::new();
    for (index, piece) in input.split('~').enumerate() {
        let piece = piece.trim();
        if piece.is_empty() {
            continue;
        }
        let (connective, body) = if index == 0 {
            (LogicalOp::And, piece)
        } else if let Some(rest) = piece.strip_prefix("and") {
            (LogicalOp::And, rest)
        } else if let Some(rest) = piece.strip_prefix("or") {
            (LogicalOp::Or, rest)
        } else {
            warn!(piece, "dropping where-string piece with unknown connective");
            continue;
        };
        out.push((connective, body));
    }
    out
}

/// Parse one `(field,op,value)` fragment.
fn parse_fragment(fragment: &str) -> Option<FilterNode> {
    let body = fragment
        .trim()
        .strip_prefix('(')?
        .strip_suffix(')')?;
    let mut parts = body.splitn(3, ',');
    let field = parts.next()?.trim();
    let op = parts.next()?.trim();
    if field.is_empty() || op.is_empty() {
        return None;
    }
    let op = ComparisonOp::parse(op);
    let value = match parts.next() {
        Some(raw) => Value::String(raw.trim().to_owned()),
        None if op.is_unary() => Value::Null,
        None => return None,
    };
    Some(FilterNode::Leaf(FilterLeaf {
        column: field.to_owned(),
        op,
        value,
    }))
}

/// Parse a legacy sort string: `+f` / `f` ascending, `-f` descending,
/// `f:asc` / `f:desc` explicit.
#[must_use]
pub fn parse_sort(input: &str) -> Vec<SortSpec> {
    let mut out = Vec::new();
    for piece in input.split(',') {
        let piece = piece.trim();
        if piece.is_empty() {
            continue;
        }
        let (column, direction) = if let Some(rest) = piece.strip_prefix('-') {
            (rest, SortDirection::Desc)
        } else if let Some(rest) = piece.strip_prefix('+') {
            (rest, SortDirection::Asc)
        } else if let Some((name, dir)) = piece.split_once(':') {
            let direction = match dir.trim().to_ascii_lowercase().as_str() {
                "desc" => SortDirection::Desc,
                _ => SortDirection::Asc,
            };
            (name.trim(), direction)
        } else {
            (piece, SortDirection::Asc)
        };
        if column.is_empty() {
            warn!(piece, "dropping malformed sort-string piece");
            continue;
        }
        out.push(SortSpec {
            column: column.to_owned(),
            direction,
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn where_string_folds_left_with_connectives() {
        let node = parse_where("(priority,gte,3)~or(done,eq,true)").expect("parse");
        let FilterNode::Group(group) = node else {
            panic!("expected group");
        };
        assert_eq!(group.op, LogicalOp::Or);
        assert_eq!(group.children.len(), 2);
    }

    #[test]
    fn malformed_fragments_are_dropped_silently() {
        let node = parse_where("(priority,gte,3)~and(broken").expect("parse");
        assert!(matches!(node, FilterNode::Leaf(_)));
        assert!(parse_where("garbage").is_none());
    }

    #[test]
    fn unary_operators_need_no_value() {
        let node = parse_where("(title,notempty)").expect("parse");
        let FilterNode::Leaf(leaf) = node else {
            panic!("expected leaf");
        };
        assert_eq!(leaf.op, ComparisonOp::NotEmpty);
        assert_eq!(leaf.value, json!(null));
    }

    #[test]
    fn values_keep_embedded_commas() {
        let node = parse_where("(tags,in,a,b,c)").expect("parse");
        let FilterNode::Leaf(leaf) = node else {
            panic!("expected leaf");
        };
        assert_eq!(leaf.value, json!("a,b,c"));
    }

    #[test]
    fn sort_string_accepts_all_forms() {
        let sorts = parse_sort("+alpha,-beta,gamma:desc,delta");
        assert_eq!(sorts.len(), 4);
        assert_eq!(sorts[0].direction, SortDirection::Asc);
        assert_eq!(sorts[1].direction, SortDirection::Desc);
        assert_eq!(sorts[1].column, "beta");
        assert_eq!(sorts[2].direction, SortDirection::Desc);
        assert_eq!(sorts[3].direction, SortDirection::Asc);
    }
}
