/// Build the commit message from what the user typed.
///
/// An empty message falls back to `default`. A user to notify is prefixed as
/// `@user `, an issue reference as `#<issue> `.
pub fn compose(message: &str, default: &str, notify: Option<&str>, issue: Option<u64>) -> String {
    let message = message.trim();
    let mut composed = String::new();
    if let Some(user) = notify.map(|u| u.trim_start_matches('@')).filter(|u| !u.is_empty()) {
        composed.push('@');
        composed.push_str(user);
        composed.push(' ');
    }
    if let Some(issue) = issue {
        composed.push_str(&format!("#{issue} "));
    }
    composed.push_str(if message.is_empty() { default } else { message });
    composed
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::plain("fix typo", None, None, "fix typo")]
    #[case::empty_uses_default("  ", None, None, "Edited with commitflow")]
    #[case::notify("fix typo", Some("reviewer"), None, "@reviewer fix typo")]
    #[case::notify_with_at("fix typo", Some("@reviewer"), None, "@reviewer fix typo")]
    #[case::issue("fix typo", None, Some(42), "#42 fix typo")]
    #[case::both("", Some("reviewer"), Some(7), "@reviewer #7 Edited with commitflow")]
    fn compose_message(
        #[case] message: &str,
        #[case] notify: Option<&str>,
        #[case] issue: Option<u64>,
        #[case] expected: &str,
    ) {
        assert_eq!(
            compose(message, "Edited with commitflow", notify, issue),
            expected
        );
    }
}
