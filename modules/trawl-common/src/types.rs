use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Field name → value mapping carried by candidates and persisted entities.
pub type Fields = serde_json::Map<String, Value>;

// ---------------------------------------------------------------------------
// Candidate items
// ---------------------------------------------------------------------------

/// A provisional record extracted from one visible unit during one pass.
/// `key` is the natural identity (username, or published-at + author for
/// timeline items); `payload` is whatever the extractor could read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateItem {
    pub key: String,
    #[serde(default)]
    pub payload: Fields,
}

impl CandidateItem {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            payload: Fields::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(name.into(), value.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Binary artifacts
// ---------------------------------------------------------------------------

/// Descriptive metadata stored alongside artifact bytes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMeta {
    /// Natural key of the item the artifact was captured from.
    pub source_key: Option<String>,
    pub format: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// Captured binary content (element screenshots) plus its metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub bytes: Vec<u8>,
    pub meta: ArtifactMeta,
}

impl Artifact {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            meta: ArtifactMeta::default(),
        }
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.meta.format = Some(format.into());
        self
    }

    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.meta.width = Some(width);
        self.meta.height = Some(height);
        self
    }

    pub fn with_source_key(mut self, key: impl Into<String>) -> Self {
        self.meta.source_key = Some(key.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Persisted entity kinds
// ---------------------------------------------------------------------------

/// Durable entity families owned by the persistence gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    User,
    ContentItem,
}

/// How re-sightings of an existing key are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Merge supplied fields into the stored row.
    Upsert,
    /// Stored fields are immutable; only freshness timestamps move.
    InsertOnly,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::User => "user",
            EntityKind::ContentItem => "content_item",
        }
    }

    pub fn write_mode(&self) -> WriteMode {
        match self {
            EntityKind::User => WriteMode::Upsert,
            EntityKind::ContentItem => WriteMode::InsertOnly,
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(EntityKind::User),
            "content_item" => Ok(EntityKind::ContentItem),
            other => Err(format!("unknown entity kind: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Domain records
// ---------------------------------------------------------------------------

/// Profile page data for a single account. Every field is optional because
/// profile pages render partially more often than not.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub followers_count: Option<u64>,
    pub following_count: Option<u64>,
    pub profile_image_url: Option<String>,
    pub profile_banner_url: Option<String>,
    pub joined_date: Option<NaiveDate>,
    pub website: Option<String>,
}

impl UserProfile {
    /// Fields to merge onto the user row. Absent values are omitted so they
    /// never overwrite what an earlier scrape stored.
    pub fn to_fields(&self) -> Fields {
        let mut fields = Fields::new();
        if let Some(ref v) = self.display_name {
            fields.insert("display_name".into(), v.clone().into());
        }
        if let Some(ref v) = self.bio {
            fields.insert("bio".into(), v.clone().into());
        }
        if let Some(v) = self.followers_count {
            fields.insert("followers_count".into(), v.into());
        }
        if let Some(v) = self.following_count {
            fields.insert("following_count".into(), v.into());
        }
        if let Some(ref v) = self.profile_image_url {
            fields.insert("profile_image_url".into(), v.clone().into());
        }
        if let Some(ref v) = self.profile_banner_url {
            fields.insert("profile_banner_url".into(), v.clone().into());
        }
        if let Some(v) = self.joined_date {
            fields.insert("joined_date".into(), v.to_string().into());
        }
        if let Some(ref v) = self.website {
            fields.insert("website".into(), v.clone().into());
        }
        fields
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TweetType {
    Original,
    Retweet,
    Quote,
}

impl TweetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TweetType::Original => "original",
            TweetType::Retweet => "retweet",
            TweetType::Quote => "quote",
        }
    }
}

/// A timeline item as stored in the content-item table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TweetRecord {
    pub tweet_id: String,
    pub author_username: String,
    pub content: String,
    pub published_at: DateTime<Utc>,
    pub tweet_type: TweetType,
    pub is_retweet: bool,
    pub is_quote: bool,
    pub scraped_at: Option<DateTime<Utc>>,
}

impl TweetRecord {
    /// Natural key of a timeline item: epoch millis of publication followed
    /// by the author's username.
    pub fn key_for(published_at: DateTime<Utc>, author_username: &str) -> String {
        format!("{}{}", published_at.timestamp_millis(), author_username)
    }

    pub fn to_fields(&self) -> Fields {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Fields::new(),
        }
    }

    /// Rebuild a record from a candidate payload produced by the timeline
    /// extractor. Returns `None` when mandatory fields are missing.
    pub fn from_fields(fields: &Fields) -> Option<Self> {
        serde_json::from_value(Value::Object(fields.clone())).ok()
    }
}
