/// Normalize a monitor name: lowercase, dots and spaces become
/// underscores, every other non-alphanumeric character is removed,
/// underscore runs collapse, and leading/trailing underscores are
/// trimmed. Idempotent.
pub fn normalize_monitor_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_was_underscore = false;

    for ch in name.to_lowercase().chars() {
        let mapped = match ch {
            '.' | ' ' | '_' => Some('_'),
            c if c.is_ascii_alphanumeric() => Some(c),
            _ => None,
        };
        match mapped {
            Some('_') => {
                if !last_was_underscore && !out.is_empty() {
                    out.push('_');
                }
                last_was_underscore = true;
            }
            Some(c) => {
                out.push(c);
                last_was_underscore = false;
            }
            None => {}
        }
    }

    if out.ends_with('_') {
        out.pop();
    }
    out
}
