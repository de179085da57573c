use std::time::{SystemTime, UNIX_EPOCH};

#[inline]
pub(crate) fn unix_now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_secs())
}

#[inline]
pub(crate) fn unix_now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_millis() as u64)
}

/// Mint a `chatcmpl-` completion id from a fresh v4 uuid, 24 hex chars.
pub(crate) fn next_completion_id() -> String {
    let uuid = uuid::Uuid::new_v4().simple().to_string();
    let mut out = String::with_capacity(9 + 24);
    out.push_str("chatcmpl-");
    out.push_str(&uuid[..24]);
    out
}

#[cfg(test)]
mod tests {
    use super::next_completion_id;

    #[test]
    fn completion_ids_have_fixed_shape() {
        let id = next_completion_id();
        assert!(id.starts_with("chatcmpl-"));
        assert_eq!(id.len(), 9 + 24);
        assert!(id[9..].chars().all(|c| c.is_ascii_hexdigit()));
    }
}
