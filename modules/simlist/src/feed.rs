//! Synthetic list content shaped like what a browser driver reads.

use chrono::{DateTime, Duration, Utc};

use trawl_common::{TweetCard, UserCell};

/// `count` following-list rows for `user0000`, `user0001`, ... After every
/// tenth account the list also renders a topic link that is not a profile.
pub fn synthetic_following(count: usize) -> Vec<UserCell> {
    let mut rows = Vec::with_capacity(count + count / 10);
    for i in 0..count {
        rows.push(UserCell {
            href: format!("/user{i:04}"),
            display_name: Some(format!("User {i}")),
        });
        if i % 10 == 9 {
            rows.push(UserCell::new(format!("/i/topics/{i}")));
        }
    }
    rows
}

/// `count` timeline cards for `author`, newest first, seven minutes apart
/// starting at `newest`. Every fifth card is a repost of a friend, every
/// seventh a quote. After every eleventh card the list renders a promoted
/// card without a timestamp.
pub fn synthetic_timeline(author: &str, count: usize, newest: DateTime<Utc>) -> Vec<TweetCard> {
    let mut rows = Vec::with_capacity(count + count / 11);
    for i in 0..count {
        let published = newest - Duration::minutes(7 * i as i64);
        let repost = i % 5 == 4;
        rows.push(TweetCard {
            datetime: Some(published.to_rfc3339()),
            author_href: Some(if repost {
                format!("/friend{i}")
            } else {
                format!("/{author}")
            }),
            text: Some(format!("Post number {i}")),
            social_context: repost,
            avatar_count: if i % 7 == 6 { 2 } else { 1 },
        });
        if i % 11 == 10 {
            rows.push(TweetCard {
                text: Some("Promoted".into()),
                avatar_count: 1,
                ..Default::default()
            });
        }
    }
    rows
}
