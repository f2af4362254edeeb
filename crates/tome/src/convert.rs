//! deer.social link conversion
//!
//! Turns deer.social profile and post URLs into the AT URIs that Bluesky
//! tooling expects.

use std::sync::LazyLock;

use regex_lite::Regex;
use serde::Serialize;

use crate::error::AccessError;
use crate::response::Envelope;

type LazyRegex = LazyLock<Result<Regex, regex_lite::Error>>;

static POST_URL: LazyRegex = LazyLock::new(|| {
    Regex::new(r"^https?://deer\.social/profile/(did:[^/]+)/post/([^/?#]+)/?$")
});

static PROFILE_URL: LazyRegex =
    LazyLock::new(|| Regex::new(r"^https?://deer\.social/profile/(did:[^/]+)/?$"));

/// What a converted URL points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkKind {
    /// A single post
    Post,
    /// A profile page
    Profile,
}

/// A deer.social URL expressed as an AT URI
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConvertedUrl {
    /// Post or profile
    pub kind: LinkKind,
    /// Decentralized identifier of the account
    pub did: String,
    /// Record key of the post, for post links
    pub post_id: Option<String>,
    /// The `at://` URI
    pub at_uri: String,
}

/// Metadata for [`convert_deer_url`]
#[derive(Debug, Clone, Serialize)]
pub struct ConvertMeta {
    /// URL as given
    pub original_url: String,
}

fn pattern(re: &'static LazyRegex) -> Result<&'static Regex, AccessError> {
    re.as_ref()
        .map_err(|e| AccessError::InvalidPattern(e.to_string()))
}

/// Convert a deer.social profile or post URL.
pub fn convert_deer_url(url: &str) -> Result<Envelope<ConvertedUrl, ConvertMeta>, AccessError> {
    let trimmed = url.trim();
    let converted = if let Some(caps) = pattern(&POST_URL)?.captures(trimmed) {
        let did = caps[1].to_string();
        let post_id = caps[2].to_string();
        ConvertedUrl {
            kind: LinkKind::Post,
            at_uri: format!("at://{}/app.bsky.feed.post/{}", did, post_id),
            did,
            post_id: Some(post_id),
        }
    } else if let Some(caps) = pattern(&PROFILE_URL)?.captures(trimmed) {
        let did = caps[1].to_string();
        ConvertedUrl {
            kind: LinkKind::Profile,
            at_uri: format!("at://{}", did),
            did,
            post_id: None,
        }
    } else {
        return Err(AccessError::UnrecognizedUrl(url.to_string()));
    };

    Ok(Envelope {
        data: converted,
        truncated: false,
        metadata: ConvertMeta {
            original_url: url.to_string(),
        },
    })
}
