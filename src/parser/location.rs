/// Split a raw `"<state-phrase> - <city-phrase>"` location label.
///
/// `state_prefix` and `city_prefix` are the fixed label tokens the site puts in
/// front of each part (for example `استان` and `شهر`). Returns `None` unless
/// the text holds exactly one separator.
pub fn parse_location(
    raw: &str,
    state_prefix: &str,
    city_prefix: &str,
) -> Option<(String, String)> {
    let mut parts = raw.split('-');
    let state = parts.next()?;
    let city = parts.next()?;
    if parts.next().is_some() {
        return None;
    }

    Some((strip_label(state, state_prefix), strip_label(city, city_prefix)))
}

fn strip_label(part: &str, prefix: &str) -> String {
    let part = part.trim();
    let part = if prefix.is_empty() {
        part
    } else {
        part.strip_prefix(prefix).unwrap_or(part)
    };
    part.trim().to_string()
}
