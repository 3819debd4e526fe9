/// Check whether an MQTT topic name matches a subscription filter
///
/// Supports the single-level `+` and multi-level `#` wildcards. `#` must be the
/// last level of the filter.
///
/// # Examples
/// ```
/// use common::transport::topic_matches;
///
/// assert!(topic_matches("fleet/+/positions", "fleet/jakarta/positions"));
/// assert!(topic_matches("fleet/#", "fleet/jakarta/positions"));
/// assert!(!topic_matches("fleet/+", "fleet/jakarta/positions"));
/// ```
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');

    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return filter_levels.next().is_none(),
            (Some("+"), Some(_)) => continue,
            (Some(f), Some(t)) if f == t => continue,
            (None, None) => return true,
            _ => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match() {
        assert!(topic_matches("fleet/positions", "fleet/positions"));
        assert!(!topic_matches("fleet/positions", "fleet/events"));
    }

    #[test]
    fn test_single_level_wildcard() {
        assert!(topic_matches("fleet/+/positions", "fleet/B1234XYZ/positions"));
        assert!(!topic_matches("fleet/+/positions", "fleet/a/b/positions"));
        assert!(!topic_matches("fleet/+", "fleet"));
    }

    #[test]
    fn test_multi_level_wildcard() {
        assert!(topic_matches("fleet/#", "fleet/a/b/c"));
        assert!(topic_matches("#", "anything/at/all"));
        assert!(topic_matches("fleet/#", "fleet"));
    }

    #[test]
    fn test_hash_must_be_last_level() {
        assert!(!topic_matches("fleet/#/positions", "fleet/a/positions"));
    }

    #[test]
    fn test_length_mismatch() {
        assert!(!topic_matches("fleet/positions", "fleet/positions/extra"));
        assert!(!topic_matches("fleet/positions/extra", "fleet/positions"));
    }
}
