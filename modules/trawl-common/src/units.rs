//! Shapes of the rendered units a browser driver hands to the extractors.
//!
//! These carry raw attribute/text values as the page rendered them; turning
//! them into candidates (and rejecting malformed ones) is the extractors' job.

use serde::{Deserialize, Serialize};

/// One row of a following/followers list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserCell {
    /// `href` of the profile link, e.g. `/alice`.
    pub href: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

impl UserCell {
    pub fn new(href: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            display_name: None,
        }
    }
}

/// One rendered timeline card.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TweetCard {
    /// `datetime` attribute of the card's `<time>` element.
    #[serde(default)]
    pub datetime: Option<String>,
    /// `href` of the author link inside the user-name block.
    #[serde(default)]
    pub author_href: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    /// Card carries a "reposted by" social-context header.
    #[serde(default)]
    pub social_context: bool,
    /// Number of avatars rendered in the card; quotes render two.
    #[serde(default)]
    pub avatar_count: u32,
}
