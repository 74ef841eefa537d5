//! Cursor iteration shared by `scan`, `hscan` and `sscan`.

use regex::Regex;

use crate::actors::CommandError;
use crate::payload::Reply;

const DEFAULT_COUNT: usize = 10;

/// Translates a glob pattern into an anchored regular expression.
///
/// `*` becomes `.*`, `?` becomes `.`, and regex metacharacters that have no
/// glob meaning are escaped.
pub fn glob_to_regex(pattern: &str) -> Result<Regex, CommandError> {
    let mut translated = String::with_capacity(pattern.len() + 4);
    translated.push('^');

    for ch in pattern.chars() {
        match ch {
            '*' => translated.push_str(".*"),
            '?' => translated.push('.'),
            '.' | '(' | ')' | '+' | '|' | '^' | '$' | '@' | '%' | '\\' => {
                translated.push('\\');
                translated.push(ch);
            }
            other => translated.push(other),
        }
    }

    translated.push('$');
    Regex::new(&translated).map_err(|_| CommandError::InvalidPattern(pattern.to_string()))
}

/// One cursor step over `items` in their natural order.
///
/// `args` are `[cursor, pattern?, count?]`. The reply is the next cursor
/// followed by the window's matches; the cursor is `"0"` once the iteration
/// is exhausted. Stability across calls is not guaranteed if the container
/// mutates between steps.
pub fn scan_items(items: Vec<String>, args: &[String]) -> Result<Reply, CommandError> {
    let cursor = match args.first() {
        Some(raw) => raw
            .parse::<usize>()
            .map_err(|_| CommandError::InvalidCursor(raw.clone()))?,
        None => 0,
    };

    let matcher = match args.get(1) {
        Some(pattern) => Some(glob_to_regex(pattern)?),
        None => None,
    };

    let count = match args.get(2) {
        Some(raw) => raw
            .parse::<usize>()
            .map_err(|_| CommandError::InvalidCount(raw.clone()))?
            .max(1),
        None => DEFAULT_COUNT,
    };

    let total = items.len();
    let window: Vec<String> = items.into_iter().skip(cursor).take(count).collect();
    let end = cursor + window.len();

    let next_cursor = if end < total {
        end.to_string()
    } else {
        "0".to_string()
    };

    let mut output = vec![next_cursor];
    output.extend(window.into_iter().filter(|item| {
        matcher
            .as_ref()
            .is_none_or(|matcher| matcher.is_match(item))
    }));

    Ok(Reply::Many(output))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn test_glob_translation() {
        let test_cases = [
            ("h*llo", "hello", true),
            ("h*llo", "heeeello", true),
            ("h*llo", "hllo", true),
            ("h?llo", "hello", true),
            ("h?llo", "hllo", false),
            ("h?llo", "heello", false),
            ("user.*", "user.1", true),
            ("user.*", "userx1", false),
            ("a+b", "a+b", true),
            ("a+b", "aab", false),
            ("100%", "100%", true),
            ("*", "anything", true),
        ];

        for (pattern, input, expected) in test_cases {
            let regex = glob_to_regex(pattern).expect("pattern should compile");
            assert_eq!(regex.is_match(input), expected, "{} against {}", pattern, input);
        }
    }

    #[test]
    fn test_glob_is_anchored() {
        let regex = glob_to_regex("ell").expect("pattern should compile");
        assert!(!regex.is_match("hello"));
        assert!(regex.is_match("ell"));
    }

    #[test]
    fn test_scan_pagination_covers_everything_once() {
        let items = strings(&["a", "b", "c", "d", "e"]);
        let mut cursor = "0".to_string();
        let mut seen = Vec::new();
        let mut first = true;

        while first || cursor != "0" {
            first = false;
            let args = vec![cursor.clone(), "*".to_string(), "2".to_string()];
            let Reply::Many(output) = scan_items(items.clone(), &args).expect("scan should succeed")
            else {
                panic!("scan must reply with a sequence");
            };
            cursor = output[0].clone();
            seen.extend(output[1..].iter().cloned());
        }

        assert_eq!(seen, items);
    }

    #[test]
    fn test_scan_filters_window_by_pattern() {
        let items = strings(&["user:1", "job:1", "user:2"]);
        let args = strings(&["0", "user:*", "10"]);

        let reply = scan_items(items, &args).expect("scan should succeed");
        assert_eq!(
            reply,
            Reply::Many(strings(&["0", "user:1", "user:2"]))
        );
    }

    #[test]
    fn test_scan_reports_next_cursor_when_more_remain() {
        let items = strings(&["a", "b", "c"]);
        let reply = scan_items(items, &strings(&["0", "*", "2"])).expect("scan should succeed");
        assert_eq!(reply, Reply::Many(strings(&["2", "a", "b"])));
    }

    #[test]
    fn test_scan_rejects_bad_cursor_and_count() {
        assert_eq!(
            scan_items(Vec::new(), &strings(&["x"])),
            Err(CommandError::InvalidCursor("x".to_string()))
        );
        assert_eq!(
            scan_items(Vec::new(), &strings(&["0", "*", "many"])),
            Err(CommandError::InvalidCount("many".to_string()))
        );
    }
}
