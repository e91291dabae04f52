//! Finished statements and SQL fragments.

use relmodel_core::Value;

use crate::dialect::Dialect;

/// A piece of SQL with `?` placeholders and its parameters in order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fragment {
    /// SQL text using `?` placeholders.
    pub sql: String,
    /// Bound parameters, one per placeholder (lists count as one).
    pub params: Vec<Value>,
}

impl Fragment {
    /// Fragment from SQL and parameters.
    pub fn new(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    /// Whether the fragment carries no SQL.
    pub fn is_empty(&self) -> bool {
        self.sql.trim().is_empty()
    }

    /// Append another fragment with a separator.
    pub fn push(&mut self, sep: &str, other: Fragment) {
        if !self.sql.is_empty() {
            self.sql.push_str(sep);
        }
        self.sql.push_str(&other.sql);
        self.params.extend(other.params);
    }
}

/// An immutable, ready-to-run statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    /// Dialect SQL with numbered placeholders.
    pub sql: String,
    /// Flattened parameters.
    pub params: Vec<Value>,
}

impl Statement {
    /// Finish a fragment: expand list parameters and number placeholders.
    pub fn finish(fragment: Fragment, dialect: Dialect) -> Self {
        let (sql, params) = expand_lists(&fragment.sql, fragment.params);
        let sql = dialect.rewrite_placeholders(&sql);
        tracing::trace!(sql = %sql, params = params.len(), "Built statement");
        Self { sql, params }
    }
}

impl std::fmt::Display for Statement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.sql)
    }
}

/// Expand every `List` parameter into one placeholder per element.
///
/// `id IN ?` with a two-element list becomes `id IN (?, ?)`; an already
/// parenthesised `IN (?)` becomes `IN (?, ?)`. An empty list renders as
/// `(NULL)`, which matches nothing. Placeholders inside string literals and
/// quoted identifiers are left alone.
pub fn expand_lists(sql: &str, params: Vec<Value>) -> (String, Vec<Value>) {
    if !params.iter().any(|p| matches!(p, Value::List(_))) {
        return (sql.to_string(), params);
    }
    let chars: Vec<char> = sql.chars().collect();
    let mut out = String::with_capacity(sql.len() + 16);
    let mut flat = Vec::with_capacity(params.len());
    let mut params = params.into_iter();
    let mut quote: Option<char> = None;

    for (i, &c) in chars.iter().enumerate() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            out.push(c);
            continue;
        }
        match c {
            '\'' | '"' | '`' => {
                quote = Some(c);
                out.push(c);
            }
            '?' => match params.next() {
                Some(Value::List(items)) => {
                    let wrapped = prev_non_space(&chars, i) == Some('(')
                        && next_non_space(&chars, i) == Some(')');
                    let inner = if items.is_empty() {
                        "NULL".to_string()
                    } else {
                        vec!["?"; items.len()].join(", ")
                    };
                    if wrapped {
                        out.push_str(&inner);
                    } else {
                        out.push('(');
                        out.push_str(&inner);
                        out.push(')');
                    }
                    flat.extend(items);
                }
                Some(other) => {
                    out.push('?');
                    flat.push(other);
                }
                None => out.push('?'),
            },
            _ => out.push(c),
        }
    }
    flat.extend(params);
    (out, flat)
}

fn prev_non_space(chars: &[char], i: usize) -> Option<char> {
    chars[..i].iter().rev().copied().find(|c| !c.is_whitespace())
}

fn next_non_space(chars: &[char], i: usize) -> Option<char> {
    chars[i + 1..].iter().copied().find(|c| !c.is_whitespace())
}

#[cfg(test)]
mod tests {
    use super::*;
    use relmodel_core::params;

    #[test]
    fn test_expand_bare_list() {
        let (sql, params) = expand_lists(
            "id IN ? AND name = ?",
            params![Value::list(["1", "2", "3"]), "Eko"],
        );
        assert_eq!(sql, "id IN (?, ?, ?) AND name = ?");
        assert_eq!(params.len(), 4);
        assert_eq!(params[3], Value::from("Eko"));
    }

    #[test]
    fn test_expand_parenthesised_list() {
        let (sql, params) = expand_lists("id IN (?)", params![Value::list([1_i64, 2])]);
        assert_eq!(sql, "id IN (?, ?)");
        assert_eq!(params, vec![Value::BigInt(1), Value::BigInt(2)]);
    }

    #[test]
    fn test_expand_empty_list() {
        let (sql, params) = expand_lists("id IN ?", params![Value::List(Vec::new())]);
        assert_eq!(sql, "id IN (NULL)");
        assert!(params.is_empty());
    }

    #[test]
    fn test_finish_numbers_placeholders() {
        let stmt = Statement::finish(
            Fragment::new("a IN ? AND b = ?", params![Value::list(["x", "y"]), 1_i64]),
            Dialect::Postgres,
        );
        assert_eq!(stmt.sql, "a IN ($1, $2) AND b = $3");
        assert_eq!(stmt.params.len(), 3);
    }
}
