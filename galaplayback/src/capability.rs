//! Platform capability detection from the browser's `User-Agent`.
//!
//! Embedded-TV browsers refuse autoplay outright and want the resource fully
//! buffered before `play()`. Everything else is treated as a regular desktop
//! or mobile browser.

use crate::media::PreloadHint;
use galaconfig::Config;
use serde::Serialize;

/// Known embedded-TV signatures, matched case-insensitively.
pub const DEFAULT_RESTRICTED_SIGNATURES: &[&str] =
    &["SMART-TV", "Samsung", "Tizen", "Web0S", "webOS", "HbbTV"];

/// What the current page load can expect from its browser.
///
/// Computed once per page load, never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CapabilityProfile {
    pub is_restricted_platform: bool,
    pub supports_autoplay: bool,
    pub requires_explicit_gesture: bool,
    pub preferred_preload: PreloadHint,
    pub is_tizen: bool,
    /// Platform version taken from `Tizen/x.y`, when present.
    pub version: Option<String>,
    pub user_agent: Option<String>,
}

impl CapabilityProfile {
    /// Profile of an ordinary browser.
    pub fn unrestricted() -> Self {
        Self {
            is_restricted_platform: false,
            supports_autoplay: true,
            requires_explicit_gesture: false,
            preferred_preload: PreloadHint::Auto,
            is_tizen: false,
            version: None,
            user_agent: None,
        }
    }

    /// Profile of an embedded-TV browser.
    pub fn restricted() -> Self {
        Self {
            is_restricted_platform: true,
            supports_autoplay: false,
            requires_explicit_gesture: true,
            preferred_preload: PreloadHint::MetadataOnly,
            ..Self::unrestricted()
        }
    }
}

impl Default for CapabilityProfile {
    fn default() -> Self {
        Self::unrestricted()
    }
}

#[derive(Debug, Clone)]
pub struct CapabilityDetector {
    // minuscules, pour la comparaison insensible à la casse
    signatures: Vec<String>,
}

impl Default for CapabilityDetector {
    fn default() -> Self {
        Self::new(DEFAULT_RESTRICTED_SIGNATURES.iter().copied())
    }
}

impl CapabilityDetector {
    pub fn new<I, S>(signatures: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let signatures = signatures
            .into_iter()
            .map(|s| s.as_ref().trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
        Self { signatures }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.get_restricted_signatures())
    }

    /// Classifies a `User-Agent`. A missing identifier yields the
    /// unrestricted profile.
    pub fn detect(&self, user_agent: Option<&str>) -> CapabilityProfile {
        let Some(ua) = user_agent else {
            return CapabilityProfile::unrestricted();
        };

        let lowered = ua.to_lowercase();
        let restricted = self.signatures.iter().any(|sig| lowered.contains(sig));

        let mut profile = if restricted {
            CapabilityProfile::restricted()
        } else {
            CapabilityProfile::unrestricted()
        };
        profile.is_tizen = lowered.contains("tizen");
        profile.version = tizen_version(ua);
        profile.user_agent = Some(ua.to_string());

        tracing::debug!(
            restricted = profile.is_restricted_platform,
            tizen = profile.is_tizen,
            version = ?profile.version,
            "Detected platform capability"
        );

        profile
    }
}

/// Extracts `x.y` from `Tizen/x.y`, ignoring case.
fn tizen_version(user_agent: &str) -> Option<String> {
    const MARKER: &str = "tizen/";

    let lowered = user_agent.to_ascii_lowercase();
    let start = lowered.find(MARKER)? + MARKER.len();
    let rest = &user_agent[start..];

    let major_len = rest.chars().take_while(char::is_ascii_digit).count();
    if major_len == 0 || !rest[major_len..].starts_with('.') {
        return None;
    }
    let minor = &rest[major_len + 1..];
    let minor_len = minor.chars().take_while(char::is_ascii_digit).count();
    if minor_len == 0 {
        return None;
    }

    Some(rest[..major_len + 1 + minor_len].to_string())
}

/// Whether a MIME type is one an embedded-TV browser is likely to decode
/// (MP4 container, H.264 video, AAC audio).
pub fn is_codec_supported(mime_type: &str) -> bool {
    let lowered = mime_type.to_lowercase();
    ["video/mp4", "avc1", "mp4a"]
        .iter()
        .any(|pattern| lowered.contains(pattern))
}

/// Guidance shown to users of restricted platforms.
pub fn restricted_platform_recommendations() -> &'static [&'static str] {
    &[
        "Use MP4 format with H.264 video codec and AAC audio codec",
        "Avoid WebM or OGG formats - not supported",
        "Keep video file size under 100MB for best performance",
        "Resolution: 1920x1080 or lower recommended",
        "Autoplay will not work - user must click play button",
        "Video must be fully loaded before play() can be called",
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIZEN_UA: &str = "Mozilla/5.0 (SMART-TV; LINUX; Tizen 6.0) AppleWebKit/537.36 \
        (KHTML, like Gecko) 85.0.4183.93/6.0 TV Safari/537.36 Tizen/6.0";
    const DESKTOP_UA: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
        (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

    #[test]
    fn test_samsung_tv_is_restricted() {
        let profile = CapabilityDetector::default().detect(Some(TIZEN_UA));
        assert!(profile.is_restricted_platform);
        assert!(!profile.supports_autoplay);
        assert!(profile.requires_explicit_gesture);
        assert_eq!(profile.preferred_preload, PreloadHint::MetadataOnly);
        assert!(profile.is_tizen);
        assert_eq!(profile.version.as_deref(), Some("6.0"));
    }

    #[test]
    fn test_desktop_is_unrestricted() {
        let profile = CapabilityDetector::default().detect(Some(DESKTOP_UA));
        assert!(!profile.is_restricted_platform);
        assert!(profile.supports_autoplay);
        assert_eq!(profile.preferred_preload, PreloadHint::Auto);
        assert!(!profile.is_tizen);
        assert_eq!(profile.version, None);
    }

    #[test]
    fn test_missing_user_agent() {
        let profile = CapabilityDetector::default().detect(None);
        assert_eq!(profile, CapabilityProfile::unrestricted());
    }

    #[test]
    fn test_matching_ignores_case() {
        let detector = CapabilityDetector::default();
        assert!(detector.detect(Some("something samsungbrowser")).is_restricted_platform);
        assert!(detector.detect(Some("Mozilla/5.0 (WEBOS; Linux)")).is_restricted_platform);
    }

    #[test]
    fn test_detection_is_deterministic() {
        let detector = CapabilityDetector::default();
        assert_eq!(detector.detect(Some(TIZEN_UA)), detector.detect(Some(TIZEN_UA)));
    }

    #[test]
    fn test_custom_signatures() {
        let detector = CapabilityDetector::new(["Roku"]);
        assert!(detector.detect(Some("Roku/DVP-9.10")).is_restricted_platform);
        assert!(!detector.detect(Some(TIZEN_UA)).is_restricted_platform);
        // is_tizen ne dépend pas de la liste
        assert!(detector.detect(Some(TIZEN_UA)).is_tizen);
    }

    #[test]
    fn test_tizen_version() {
        assert_eq!(tizen_version("tizen/5.5 tv").as_deref(), Some("5.5"));
        assert_eq!(tizen_version("Tizen/7"), None);
        assert_eq!(tizen_version("Tizen 6.0"), None);
        assert_eq!(tizen_version("Tizen/2.40.1").as_deref(), Some("2.40"));
    }

    #[test]
    fn test_codec_support() {
        assert!(is_codec_supported(r#"video/mp4; codecs="avc1.42E01E, mp4a.40.2""#));
        assert!(is_codec_supported("VIDEO/MP4"));
        assert!(!is_codec_supported(r#"video/webm; codecs="vp9""#));
    }

    #[test]
    fn test_recommendations() {
        assert_eq!(restricted_platform_recommendations().len(), 6);
    }
}
