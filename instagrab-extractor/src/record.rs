// JSON-lines records emitted by `gallery-dl --dump-json`

use serde_json::Value;

/// Fields that may carry the image locator, in priority order.
pub const URL_FIELDS: [&str; 3] = ["url", "display_url", "thumbnail_url"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedLine {
    pub line: usize,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecordLine {
    Parsed { line: usize, value: Value },
    Malformed(MalformedLine),
}

/// Lazily parse tool output, one record per non-blank line. Line numbers
/// are 1-based and count blank lines.
pub fn parse_records(stdout: &str) -> impl Iterator<Item = RecordLine> + '_ {
    stdout
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| parse_line(index + 1, line))
}

pub fn parse_line(line: usize, text: &str) -> RecordLine {
    match serde_json::from_str::<Value>(text.trim()) {
        Ok(value) => RecordLine::Parsed { line, value },
        Err(e) => RecordLine::Malformed(MalformedLine {
            line,
            message: format!("JSON decode error - {}", e),
        }),
    }
}

/// First image locator field holding an http(s) URL.
pub fn record_url(value: &Value) -> Option<&str> {
    URL_FIELDS
        .iter()
        .filter_map(|field| value.get(*field).and_then(Value::as_str))
        .find(|url| url.starts_with("http"))
}

/// Profile metadata picked up from records. Only used for reporting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileInfo {
    pub username: Option<String>,
    pub full_name: Option<String>,
    pub post_count: Option<u64>,
    pub followers: Option<u64>,
    pub following: Option<u64>,
}

impl ProfileInfo {
    pub fn from_record(value: &Value) -> Option<Self> {
        let owner = value.get("owner");

        let info = ProfileInfo {
            username: text_field(value, owner, &["username", "owner_username"]),
            full_name: text_field(value, owner, &["fullname", "full_name"]),
            post_count: count_field(value, owner, &["post_count", "mediacount"]),
            followers: count_field(
                value,
                owner,
                &["followers_count", "follower_count", "edge_followed_by"],
            ),
            following: count_field(
                value,
                owner,
                &["follows_count", "following_count", "edge_follow"],
            ),
        };

        if info == ProfileInfo::default() {
            None
        } else {
            Some(info)
        }
    }

    pub fn display(&self) -> String {
        match (&self.full_name, &self.username) {
            (Some(name), Some(user)) => format!("{} (@{})", name, user),
            (None, Some(user)) => format!("@{}", user),
            (Some(name), None) => name.clone(),
            (None, None) => "unknown profile".to_string(),
        }
    }
}

fn text_field(value: &Value, owner: Option<&Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| {
        value
            .get(*key)
            .or_else(|| owner.and_then(|o| o.get(*key)))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    })
}

/// Plain counts, or GraphQL edges of the form `{"count": N}`.
fn count_field(value: &Value, owner: Option<&Value>, keys: &[&str]) -> Option<u64> {
    keys.iter().find_map(|key| {
        let field = value
            .get(*key)
            .or_else(|| owner.and_then(|o| o.get(*key)))?;
        field
            .as_u64()
            .or_else(|| field.get("count").and_then(Value::as_u64))
    })
}
