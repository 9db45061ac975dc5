//! Built-in extractors for the two list layouts the scraper walks.

use chrono::{DateTime, Utc};

use trawl_common::{CandidateItem, TweetCard, TweetRecord, TweetType, UserCell};

use crate::traits::Extractor;

/// Usernames longer than this are link noise, not handles.
const MAX_USERNAME_LEN: usize = 15;

/// Following/followers list rows. Key = username taken from the profile href.
#[derive(Debug, Default, Clone, Copy)]
pub struct UserCellExtractor;

impl Extractor<UserCell> for UserCellExtractor {
    fn extract(&self, unit: &UserCell) -> Option<CandidateItem> {
        let username = username_from_href(&unit.href)?;
        let mut item = CandidateItem::new(username);
        if let Some(ref name) = unit.display_name {
            item = item.with_field("display_name", name.clone());
        }
        Some(item)
    }
}

/// `/alice` → `alice`. Rejects nested paths, query strings, empty and
/// over-long handles.
pub fn username_from_href(href: &str) -> Option<&str> {
    let username = href.strip_prefix('/').unwrap_or(href);
    let valid = !username.is_empty()
        && username.len() <= MAX_USERNAME_LEN
        && !username.contains('/')
        && !username.contains('?');
    valid.then_some(username)
}

/// Timeline cards. Key = publication epoch millis + author username.
#[derive(Debug, Default, Clone, Copy)]
pub struct TweetCardExtractor;

impl Extractor<TweetCard> for TweetCardExtractor {
    fn extract(&self, unit: &TweetCard) -> Option<CandidateItem> {
        let published_at = unit
            .datetime
            .as_deref()
            .and_then(|dt| DateTime::parse_from_rfc3339(dt).ok())?
            .with_timezone(&Utc);

        let author_username = unit
            .author_href
            .as_deref()
            .map(|href| href.strip_prefix('/').unwrap_or(href).to_string())
            .unwrap_or_default();

        let is_retweet = unit.social_context;
        let is_quote = unit.avatar_count > 1;
        // Quote takes precedence over the repost marker.
        let tweet_type = if is_quote {
            TweetType::Quote
        } else if is_retweet {
            TweetType::Retweet
        } else {
            TweetType::Original
        };

        let record = TweetRecord {
            tweet_id: TweetRecord::key_for(published_at, &author_username),
            author_username,
            content: unit.text.as_deref().map(str::trim).unwrap_or_default().to_string(),
            published_at,
            tweet_type,
            is_retweet,
            is_quote,
            scraped_at: None,
        };

        Some(CandidateItem {
            key: record.tweet_id.clone(),
            payload: record.to_fields(),
        })
    }
}
