//! Maps a pasted URL to the site it came from.

use std::fmt;

use serde::Serialize;

/// Site a video URL belongs to. Only the first four are served; `Unknown`
/// exists so detection stays a total function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Youtube,
    Linkedin,
    Twitter,
    Instagram,
    Unknown,
}

/// Checked top to bottom; the first platform with a matching needle wins.
const DOMAINS: &[(Platform, &[&str])] = &[
    (Platform::Youtube, &["youtube.com", "youtu.be"]),
    (Platform::Linkedin, &["linkedin.com"]),
    (Platform::Twitter, &["twitter.com", "x.com"]),
    (Platform::Instagram, &["instagram.com"]),
];

impl Platform {
    /// Case-insensitive substring match against the known domains.
    pub fn detect(url: &str) -> Self {
        let lower = url.to_lowercase();
        DOMAINS
            .iter()
            .find(|(_, needles)| needles.iter().any(|needle| lower.contains(needle)))
            .map(|(platform, _)| *platform)
            .unwrap_or(Platform::Unknown)
    }

    pub fn is_supported(self) -> bool {
        self != Platform::Unknown
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Youtube => "youtube",
            Platform::Linkedin => "linkedin",
            Platform::Twitter => "twitter",
            Platform::Instagram => "instagram",
            Platform::Unknown => "unknown",
        }
    }

    /// Human-facing name used in error messages.
    pub fn display_name(self) -> &'static str {
        match self {
            Platform::Youtube => "YouTube",
            Platform::Linkedin => "LinkedIn",
            Platform::Twitter => "X (Twitter)",
            Platform::Instagram => "Instagram",
            Platform::Unknown => "The video site",
        }
    }

    /// Homepage sent as the `Referer` so requests look like in-site navigation.
    pub fn homepage(self) -> Option<&'static str> {
        match self {
            Platform::Youtube => Some("https://www.youtube.com/"),
            Platform::Linkedin => Some("https://www.linkedin.com/"),
            Platform::Twitter => Some("https://x.com/"),
            Platform::Instagram => Some("https://www.instagram.com/"),
            Platform::Unknown => None,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_youtube_in_any_case() {
        for url in [
            "https://www.youtube.com/watch?v=abc",
            "https://youtu.be/abc",
            "HTTPS://WWW.YOUTUBE.COM/shorts/abc",
            "https://Youtu.Be/abc",
        ] {
            assert_eq!(Platform::detect(url), Platform::Youtube, "{url}");
        }
    }

    #[test]
    fn detects_remaining_platforms() {
        assert_eq!(
            Platform::detect("https://www.linkedin.com/posts/someone_activity-1"),
            Platform::Linkedin
        );
        assert_eq!(
            Platform::detect("https://twitter.com/user/status/1"),
            Platform::Twitter
        );
        assert_eq!(Platform::detect("https://X.com/user/status/1"), Platform::Twitter);
        assert_eq!(
            Platform::detect("https://www.instagram.com/reel/abc/"),
            Platform::Instagram
        );
    }

    #[test]
    fn first_match_wins() {
        assert_eq!(
            Platform::detect("https://youtube.com/redirect?to=instagram.com"),
            Platform::Youtube
        );
        assert_eq!(
            Platform::detect("https://linkedin.com/share?u=https://x.com/a"),
            Platform::Linkedin
        );
    }

    #[test]
    fn unmatched_urls_are_unknown() {
        assert_eq!(
            Platform::detect("https://unsupported.example.com/video"),
            Platform::Unknown
        );
        assert_eq!(Platform::detect(""), Platform::Unknown);
        assert!(!Platform::Unknown.is_supported());
        assert_eq!(Platform::Unknown.homepage(), None);
    }

    #[test]
    fn serializes_lowercase() {
        assert_eq!(
            serde_json::to_value(Platform::Instagram).unwrap(),
            serde_json::json!("instagram")
        );
        assert_eq!(Platform::Twitter.to_string(), "twitter");
    }
}
