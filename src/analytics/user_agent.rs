//! Browser and platform guessing from `User-Agent` strings.

/// Label used when nothing matches.
pub const UNKNOWN: &str = "Unknown";

/// Browser tokens in priority order. Chrome UAs also carry "Safari", so
/// Chrome has to be checked first.
const BROWSERS: &[&str] = &["Chrome", "Safari", "Firefox", "MSIE", "Opera"];

/// Platform tokens in priority order, with the label each maps to.
///
/// iOS UAs contain "like Mac OS X" and Android UAs contain "Linux", so the
/// more specific tokens come first.
const PLATFORMS: &[(&str, &str)] = &[
    ("iPhone", "iOS"),
    ("iPad", "iOS"),
    ("Windows NT 5.1", "Windows XP"),
    ("Windows NT 6.1", "Windows 7"),
    ("Windows NT 6.2", "Windows 8"),
    ("Mac OS X", "Mac OS X"),
    ("Linux", "Linux"),
];

/// Guess the `(browser, platform)` pair for a user agent.
///
/// Matching is a case-sensitive substring search; either half falls back to
/// [`UNKNOWN`].
pub fn classify_user_agent(ua: &str) -> (&'static str, &'static str) {
    let browser = BROWSERS
        .iter()
        .copied()
        .find(|token| ua.contains(token))
        .unwrap_or(UNKNOWN);

    let platform = PLATFORMS
        .iter()
        .find(|(token, _)| ua.contains(token))
        .map_or(UNKNOWN, |(_, label)| *label);

    (browser, platform)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHROME_MAC: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_8_4) AppleWebKit/537.36 \
        (KHTML, like Gecko) Chrome/28.0.1500.95 Safari/537.36";
    const SAFARI_IPHONE: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 6_1_4 like Mac OS X) \
        AppleWebKit/536.26 (KHTML, like Gecko) Version/6.0 Mobile/10B350 Safari/8536.25";
    const FIREFOX_LINUX: &str =
        "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:22.0) Gecko/20100101 Firefox/22.0";
    const IE_WIN7: &str = "Mozilla/5.0 (compatible; MSIE 10.0; Windows NT 6.1; Trident/6.0)";
    const OPERA_XP: &str = "Opera/9.80 (Windows NT 5.1) Presto/2.12.388 Version/12.16";
    const CHROME_ANDROID: &str = "Mozilla/5.0 (Linux; Android 4.2.2; Nexus 7) \
        AppleWebKit/537.36 (KHTML, like Gecko) Chrome/28.0.1500.94 Safari/537.36";

    #[test]
    fn test_chrome_on_mac() {
        assert_eq!(classify_user_agent(CHROME_MAC), ("Chrome", "Mac OS X"));
    }

    #[test]
    fn test_overlapping_tokens_resolve_by_priority() {
        assert_eq!(classify_user_agent(SAFARI_IPHONE), ("Safari", "iOS"));
        assert_eq!(classify_user_agent(CHROME_ANDROID), ("Chrome", "Linux"));
    }

    #[test]
    fn test_other_browsers() {
        assert_eq!(classify_user_agent(FIREFOX_LINUX), ("Firefox", "Linux"));
        assert_eq!(classify_user_agent(IE_WIN7), ("MSIE", "Windows 7"));
        assert_eq!(classify_user_agent(OPERA_XP), ("Opera", "Windows XP"));
        assert_eq!(
            classify_user_agent("Mozilla/5.0 (Windows NT 6.2; WOW64) Firefox/23.0"),
            ("Firefox", "Windows 8")
        );
    }

    #[test]
    fn test_unknown() {
        assert_eq!(classify_user_agent(""), (UNKNOWN, UNKNOWN));
        assert_eq!(classify_user_agent("curl/7.30.0"), (UNKNOWN, UNKNOWN));
        // Matching is case-sensitive.
        assert_eq!(classify_user_agent("chrome linux"), (UNKNOWN, UNKNOWN));
    }
}
