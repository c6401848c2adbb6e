//! Condition matching and ordering for table queries.
//!
//! Values are treated the way the table engine stores them: as text. Numeric
//! operators read the leading number of a value (`"42 apples"` is 42, text
//! without a leading number is 0). Token operators split on spaces and
//! commas.

use crate::flags::{Columns, ConditionOp, OrderType, QueryCondition};
use regex::bytes::Regex;
use std::cmp::Ordering;

/// Splits a value into tokens separated by spaces or commas.
pub(crate) fn tokens(value: &[u8]) -> impl Iterator<Item = &[u8]> {
    value
        .split(|b| *b == b' ' || *b == b',')
        .filter(|token| !token.is_empty())
}

/// Reads the leading decimal number of `value`.
pub(crate) fn leading_float(value: &[u8]) -> f64 {
    let text = String::from_utf8_lossy(value);
    let text = text.trim_start();
    let bytes = text.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end += 1;
    }
    let digits_start = end;
    while bytes.get(end).is_some_and(u8::is_ascii_digit) {
        end += 1;
    }
    if bytes.get(end) == Some(&b'.') {
        let mut frac = end + 1;
        while bytes.get(frac).is_some_and(u8::is_ascii_digit) {
            frac += 1;
        }
        if frac > end + 1 || end > digits_start {
            end = frac;
        }
    }
    if end > digits_start && matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exp = end + 1;
        if matches!(bytes.get(exp), Some(b'+' | b'-')) {
            exp += 1;
        }
        let exp_digits = exp;
        while bytes.get(exp).is_some_and(u8::is_ascii_digit) {
            exp += 1;
        }
        if exp > exp_digits {
            end = exp;
        }
    }
    text[..end].trim_end_matches('.').parse().unwrap_or(0.0)
}

/// Reads the leading integer of `value`.
pub(crate) fn leading_int(value: &[u8]) -> i64 {
    let text = String::from_utf8_lossy(value);
    let text = text.trim_start();
    let bytes = text.as_bytes();
    let mut end = usize::from(matches!(bytes.first(), Some(b'+' | b'-')));
    while bytes.get(end).is_some_and(u8::is_ascii_digit) {
        end += 1;
    }
    text[..end].parse().unwrap_or(0)
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    needle.is_empty() || haystack.windows(needle.len()).any(|w| w == needle)
}

fn contains_ignore_case(haystack: &[u8], needle: &[u8]) -> bool {
    contains(&haystack.to_ascii_lowercase(), &needle.to_ascii_lowercase())
}

fn fts_expression(value: &[u8], expr: &[u8]) -> bool {
    let text = String::from_utf8_lossy(expr);
    text.split("||").any(|alternative| {
        let mut negate_next = false;
        let mut matched_any = false;
        for word in alternative.split_whitespace() {
            match word {
                "&&" => continue,
                "!!" => {
                    negate_next = true;
                    continue;
                }
                _ => {}
            }
            let hit = contains_ignore_case(value, word.trim_matches('"').as_bytes());
            if hit == negate_next {
                return false;
            }
            negate_next = false;
            matched_any = true;
        }
        matched_any
    })
}

fn matches_value(op: ConditionOp, value: &[u8], expr: &[u8], regex: Option<&Regex>) -> bool {
    match op {
        ConditionOp::StrEq => value == expr,
        ConditionOp::StrInclude => contains(value, expr),
        ConditionOp::StrBeginsWith => value.starts_with(expr),
        ConditionOp::StrEndsWith => value.ends_with(expr),
        ConditionOp::StrAllTokens => {
            tokens(expr).all(|token| tokens(value).any(|word| word == token))
        }
        ConditionOp::StrAnyToken => {
            tokens(expr).any(|token| tokens(value).any(|word| word == token))
        }
        ConditionOp::StrEqAnyToken => tokens(expr).any(|token| token == value),
        ConditionOp::StrRegex => regex.is_some_and(|re| re.is_match(value)),
        ConditionOp::NumEq => leading_float(value) == leading_float(expr),
        ConditionOp::NumGt => leading_float(value) > leading_float(expr),
        ConditionOp::NumGe => leading_float(value) >= leading_float(expr),
        ConditionOp::NumLt => leading_float(value) < leading_float(expr),
        ConditionOp::NumLe => leading_float(value) <= leading_float(expr),
        ConditionOp::NumBetween => {
            let mut bounds = tokens(expr).map(leading_float);
            let (Some(low), Some(high)) = (bounds.next(), bounds.next()) else {
                return false;
            };
            let (low, high) = if low > high { (high, low) } else { (low, high) };
            let num = leading_float(value);
            low <= num && num <= high
        }
        ConditionOp::NumEqAny => {
            let num = leading_float(value);
            tokens(expr).any(|token| leading_float(token) == num)
        }
        ConditionOp::FtsPhrase => contains_ignore_case(value, expr),
        ConditionOp::FtsAllTokens => {
            let mut words = expr.split(u8::is_ascii_whitespace).filter(|w| !w.is_empty());
            words.all(|word| contains_ignore_case(value, word))
        }
        ConditionOp::FtsAnyToken => {
            let mut words = expr.split(u8::is_ascii_whitespace).filter(|w| !w.is_empty());
            words.any(|word| contains_ignore_case(value, word))
        }
        ConditionOp::FtsExpression => fts_expression(value, expr),
    }
}

/// Returns the value a condition or order reads from a record.
pub(crate) fn column_value<'a>(pk: &'a [u8], columns: &'a Columns, column: &[u8]) -> Option<&'a [u8]> {
    if column.is_empty() {
        Some(pk)
    } else {
        columns.get(column).map(Vec::as_slice)
    }
}

/// A query condition ready for evaluation.
///
/// Regular expression operands are compiled once, when the condition is
/// added to a query. A pattern that does not compile matches nothing.
#[derive(Debug, Clone)]
pub(crate) struct Matcher {
    condition: QueryCondition,
    regex: Option<Regex>,
}

impl Matcher {
    pub(crate) fn new(condition: QueryCondition) -> Self {
        let regex = match condition.op {
            ConditionOp::StrRegex => std::str::from_utf8(&condition.expr)
                .ok()
                .and_then(|pattern| Regex::new(pattern).ok()),
            _ => None,
        };
        Self { condition, regex }
    }

    /// Returns true if a record satisfies the condition.
    ///
    /// A record without the column only satisfies negated conditions.
    pub(crate) fn matches(&self, pk: &[u8], columns: &Columns) -> bool {
        let condition = &self.condition;
        match column_value(pk, columns, &condition.column) {
            Some(value) => {
                matches_value(condition.op, value, &condition.expr, self.regex.as_ref())
                    != condition.negate
            }
            None => condition.negate,
        }
    }
}

/// Compares two column values under `order`.
pub(crate) fn compare(order: OrderType, a: &[u8], b: &[u8]) -> Ordering {
    match order {
        OrderType::StrAsc => a.cmp(b),
        OrderType::StrDesc => b.cmp(a),
        OrderType::NumAsc => leading_float(a).total_cmp(&leading_float(b)),
        OrderType::NumDesc => leading_float(b).total_cmp(&leading_float(a)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn condition(column: &str, op: ConditionOp, expr: &str) -> QueryCondition {
        QueryCondition {
            column: column.as_bytes().to_vec(),
            op,
            negate: false,
            no_index: false,
            expr: expr.as_bytes().to_vec(),
        }
    }

    fn doc(pairs: &[(&str, &str)]) -> Columns {
        pairs
            .iter()
            .map(|(k, v)| (k.as_bytes().to_vec(), v.as_bytes().to_vec()))
            .collect()
    }

    #[test]
    fn leading_numbers() {
        assert_eq!(leading_float(b"42 apples"), 42.0);
        assert_eq!(leading_float(b"  -1.5e2x"), -150.0);
        assert_eq!(leading_float(b"3."), 3.0);
        assert_eq!(leading_float(b"abc"), 0.0);
        assert_eq!(leading_int(b"42.9"), 42);
        assert_eq!(leading_int(b"junk"), 0);
    }

    #[test]
    fn string_operators() {
        let columns = doc(&[("tags", "red, green blue")]);
        let check = |op, expr| Matcher::new(condition("tags", op, expr)).matches(b"pk", &columns);

        assert!(check(ConditionOp::StrInclude, "green"));
        assert!(check(ConditionOp::StrBeginsWith, "red"));
        assert!(check(ConditionOp::StrEndsWith, "blue"));
        assert!(check(ConditionOp::StrAllTokens, "blue red"));
        assert!(!check(ConditionOp::StrAllTokens, "blue yellow"));
        assert!(check(ConditionOp::StrAnyToken, "yellow,green"));
        assert!(check(ConditionOp::StrRegex, r"^red,\s"));
        assert!(!check(ConditionOp::StrRegex, "(unclosed"));
    }

    #[test]
    fn regex_is_compiled_with_the_condition() {
        let matcher = Matcher::new(condition("name", ConditionOp::StrRegex, "^J[a-z]+$"));
        assert!(matcher.regex.is_some());
        assert!(matcher.matches(b"pk", &doc(&[("name", "Jim")])));
        assert!(!matcher.matches(b"pk", &doc(&[("name", "Dana")])));

        let mut broken = condition("name", ConditionOp::StrRegex, "(unclosed");
        broken.negate = true;
        let matcher = Matcher::new(broken);
        assert!(matcher.regex.is_none());
        assert!(matcher.matches(b"pk", &doc(&[("name", "Jim")])));

        assert!(Matcher::new(condition("name", ConditionOp::StrEq, "Jim")).regex.is_none());
    }

    #[test]
    fn numeric_operators() {
        let columns = doc(&[("age", "33")]);
        let check = |op, expr| Matcher::new(condition("age", op, expr)).matches(b"pk", &columns);

        assert!(check(ConditionOp::NumEq, "33.0"));
        assert!(check(ConditionOp::NumGt, "32"));
        assert!(check(ConditionOp::NumBetween, "40 30"));
        assert!(check(ConditionOp::NumEqAny, "1,33"));
        assert!(!check(ConditionOp::NumLt, "33"));
    }

    #[test]
    fn negation_and_missing_columns() {
        let columns = doc(&[("age", "33")]);
        let mut cond = condition("age", ConditionOp::NumEq, "33");
        cond.negate = true;
        assert!(!Matcher::new(cond).matches(b"pk", &columns));

        let mut missing = condition("name", ConditionOp::StrEq, "x");
        assert!(!Matcher::new(missing.clone()).matches(b"pk", &columns));
        missing.negate = true;
        assert!(Matcher::new(missing).matches(b"pk", &columns));
    }

    #[test]
    fn primary_key_is_the_empty_column() {
        let columns = doc(&[]);
        let matcher = Matcher::new(condition("", ConditionOp::StrBeginsWith, "us"));
        assert!(matcher.matches(b"user:1", &columns));
    }

    #[test]
    fn full_text_operators() {
        let columns = doc(&[("text", "The Quick brown fox")]);
        let check = |op, expr| Matcher::new(condition("text", op, expr)).matches(b"pk", &columns);

        assert!(check(ConditionOp::FtsPhrase, "quick BROWN"));
        assert!(check(ConditionOp::FtsAllTokens, "fox quick"));
        assert!(check(ConditionOp::FtsAnyToken, "cat fox"));
        assert!(check(ConditionOp::FtsExpression, "cat || quick && fox"));
        assert!(!check(ConditionOp::FtsExpression, "quick !! fox"));
        assert!(check(ConditionOp::FtsExpression, "quick !! cat"));
    }

    #[test]
    fn ordering() {
        assert_eq!(compare(OrderType::NumAsc, b"9", b"10"), Ordering::Less);
        assert_eq!(compare(OrderType::StrAsc, b"9", b"10"), Ordering::Greater);
        assert_eq!(compare(OrderType::StrDesc, b"a", b"b"), Ordering::Greater);
    }
}
