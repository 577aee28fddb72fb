/// First 12 characters of an API key, safe to put in logs.
pub fn key_prefix(key: &str) -> &str {
    match key.char_indices().nth(12) {
        Some((idx, _)) => &key[..idx],
        None => key,
    }
}
