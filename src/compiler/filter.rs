//! Filter pipe expressions.
//!
//! Rewrites `expr | f | g(x)` into nested runtime filter calls:
//! `_f("g")(_f("f")(expr),x)`. The scan is aware of string literals,
//! template strings, regex literals and bracket depth, so a `|` inside any
//! of those never splits. `||` is never a filter pipe.

pub fn parse_filters(exp: &str) -> String {
    let bytes = exp.as_bytes();
    let mut in_single = false;
    let mut in_double = false;
    let mut in_template = false;
    let mut in_regex = false;
    let mut curly = 0usize;
    let mut square = 0usize;
    let mut paren = 0usize;
    let mut last_filter_index = 0usize;
    let mut expression: Option<String> = None;
    let mut filters: Vec<String> = Vec::new();

    let mut prev = 0u8;
    for i in 0..bytes.len() {
        let c = bytes[i];
        if in_single {
            if c == b'\'' && prev != b'\\' {
                in_single = false;
            }
        } else if in_double {
            if c == b'"' && prev != b'\\' {
                in_double = false;
            }
        } else if in_template {
            if c == b'`' && prev != b'\\' {
                in_template = false;
            }
        } else if in_regex {
            if c == b'/' && prev != b'\\' {
                in_regex = false;
            }
        } else if c == b'|'
            && bytes.get(i + 1) != Some(&b'|')
            && prev != b'|'
            && curly == 0
            && square == 0
            && paren == 0
        {
            if expression.is_none() {
                // first pipe: everything before is the expression
                last_filter_index = i + 1;
                expression = Some(exp[..i].trim().to_string());
            } else {
                filters.push(exp[last_filter_index..i].trim().to_string());
                last_filter_index = i + 1;
            }
        } else {
            match c {
                b'"' => in_double = true,
                b'\'' => in_single = true,
                b'`' => in_template = true,
                b'(' => paren += 1,
                b')' => paren = paren.saturating_sub(1),
                b'[' => square += 1,
                b']' => square = square.saturating_sub(1),
                b'{' => curly += 1,
                b'}' => curly = curly.saturating_sub(1),
                b'/' => {
                    // division only follows an operand character
                    let p = bytes[..i].iter().rev().copied().find(|b| *b != b' ');
                    let is_division = p.is_some_and(|p| {
                        p.is_ascii_alphanumeric()
                            || matches!(p, b')' | b'.' | b'+' | b'-' | b'_' | b'$' | b']')
                    });
                    if !is_division {
                        in_regex = true;
                    }
                }
                _ => {}
            }
        }
        prev = c;
    }

    match &expression {
        None => expression = Some(exp.trim().to_string()),
        Some(_) if last_filter_index != 0 => {
            filters.push(exp[last_filter_index..].trim().to_string());
        }
        _ => {}
    }

    let mut result = expression.unwrap_or_default();
    for filter in &filters {
        result = wrap_filter(&result, filter);
    }
    result
}

fn wrap_filter(exp: &str, filter: &str) -> String {
    match filter.find('(') {
        None => format!("_f(\"{filter}\")({exp})"),
        Some(i) => {
            let name = &filter[..i];
            let args = &filter[i + 1..];
            if args == ")" {
                format!("_f(\"{name}\")({exp}{args}")
            } else {
                format!("_f(\"{name}\")({exp},{args}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_expression_passes_through() {
        assert_eq!(parse_filters("a + b"), "a + b");
    }

    #[test]
    fn test_single_filter() {
        assert_eq!(parse_filters("msg | capitalize"), "_f(\"capitalize\")(msg)");
    }

    #[test]
    fn test_chained_filters() {
        assert_eq!(
            parse_filters("msg | a | b"),
            "_f(\"b\")(_f(\"a\")(msg))"
        );
    }

    #[test]
    fn test_filter_with_args() {
        assert_eq!(
            parse_filters("msg | pad(2, 'x')"),
            "_f(\"pad\")(msg,2, 'x')"
        );
        assert_eq!(parse_filters("msg | id()"), "_f(\"id\")(msg)");
    }

    #[test]
    fn test_logical_or_is_not_a_filter() {
        assert_eq!(parse_filters("a || b"), "a || b");
    }

    #[test]
    fn test_pipe_inside_string_or_brackets() {
        assert_eq!(parse_filters("'a|b'"), "'a|b'");
        assert_eq!(parse_filters("{ a: 1 | 2 }"), "{ a: 1 | 2 }");
        assert_eq!(parse_filters("list[a | b]"), "list[a | b]");
    }
}
