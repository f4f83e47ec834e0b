//! Share link handling.

use regex::Regex;
use std::sync::LazyLock;

static PREVIEW_FLAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([?&])dl=0(&|#|$)").expect("valid regex"));

/// Where a published artifact can be reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedLocation {
    /// Remote path the artifact was uploaded to
    pub remote_path: String,
    /// Share URL as returned by the backend
    pub share_url: String,
    /// Share URL forced into direct-download mode
    pub direct_url: String,
}

impl PublishedLocation {
    pub fn new(remote_path: impl Into<String>, share_url: impl Into<String>) -> Self {
        let share_url = share_url.into();
        Self {
            remote_path: remote_path.into(),
            direct_url: direct_download_url(&share_url),
            share_url,
        }
    }
}

/// Force a share URL to serve raw bytes instead of a preview page.
///
/// `dl=0` is flipped to `dl=1`; a URL that already has `dl=1` is returned
/// as-is; otherwise `dl=1` is appended to the query, ahead of any fragment.
pub fn direct_download_url(share_url: &str) -> String {
    let url = share_url.trim();
    if PREVIEW_FLAG.is_match(url) {
        return PREVIEW_FLAG.replace_all(url, "${1}dl=1${2}").into_owned();
    }
    let (base, fragment) = match url.find('#') {
        Some(at) => url.split_at(at),
        None => (url, ""),
    };
    if has_direct_flag(base) {
        return url.to_string();
    }
    let separator = if base.contains('?') { '&' } else { '?' };
    format!("{base}{separator}dl=1{fragment}")
}

fn has_direct_flag(url: &str) -> bool {
    url.split_once('?')
        .is_some_and(|(_, query)| query.split('&').any(|pair| pair == "dl=1"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flips_preview_flag() {
        assert_eq!(direct_download_url("https://example/x?dl=0"), "https://example/x?dl=1");
        assert_eq!(
            direct_download_url("https://www.dropbox.com/scl/fi/abc/p.zip?rlkey=k&dl=0"),
            "https://www.dropbox.com/scl/fi/abc/p.zip?rlkey=k&dl=1"
        );
    }

    #[test]
    fn test_appends_flag() {
        assert_eq!(direct_download_url("https://example/x"), "https://example/x?dl=1");
        assert_eq!(direct_download_url("https://example/x?foo=1"), "https://example/x?foo=1&dl=1");
    }

    #[test]
    fn test_direct_flag_left_alone() {
        assert_eq!(direct_download_url("https://example/x?dl=1"), "https://example/x?dl=1");
        assert_eq!(direct_download_url("https://example/x?a=b&dl=1"), "https://example/x?a=b&dl=1");
    }

    #[test]
    fn test_lookalike_params_are_not_flipped() {
        assert_eq!(
            direct_download_url("https://example/x?dl=01"),
            "https://example/x?dl=01&dl=1"
        );
        assert_eq!(
            direct_download_url("https://example/x?xdl=0"),
            "https://example/x?xdl=0&dl=1"
        );
    }

    #[test]
    fn test_flag_value_must_be_whole() {
        assert_eq!(
            direct_download_url("https://example/x?dl=0.5"),
            "https://example/x?dl=0.5&dl=1"
        );
        assert_eq!(
            direct_download_url("https://example/x?dl=0&rlkey=k"),
            "https://example/x?dl=1&rlkey=k"
        );
    }

    #[test]
    fn test_fragment_stays_last() {
        assert_eq!(direct_download_url("https://example/x?dl=0#top"), "https://example/x?dl=1#top");
        assert_eq!(direct_download_url("https://example/x#top"), "https://example/x?dl=1#top");
        assert_eq!(
            direct_download_url("https://example/x?a=b#top"),
            "https://example/x?a=b&dl=1#top"
        );
        assert_eq!(direct_download_url("https://example/x?dl=1#top"), "https://example/x?dl=1#top");
    }

    #[test]
    fn test_published_location_derives_direct_url() {
        let location = PublishedLocation::new("/packs/p.zip", "https://example/x?dl=0");
        assert_eq!(location.direct_url, "https://example/x?dl=1");
        assert_eq!(location.share_url, "https://example/x?dl=0");
        assert!(location.direct_url.ends_with("dl=1"));
    }
}
