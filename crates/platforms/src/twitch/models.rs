use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A channel-scoped privileged role on Twitch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelRole {
    Vip,
    #[serde(alias = "mod")]
    Moderator,
}

impl ChannelRole {
    /// Helix path (relative to the API base) for listing and mutating this role.
    pub fn endpoint(&self) -> &'static str {
        match self {
            Self::Vip => "channels/vips",
            Self::Moderator => "moderation/moderators",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vip => "vip",
            Self::Moderator => "moderator",
        }
    }
}

impl std::fmt::Display for ChannelRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ChannelRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "vip" => Ok(Self::Vip),
            "mod" | "moderator" => Ok(Self::Moderator),
            other => Err(format!("unknown channel role: {other}")),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub cursor: Option<String>,
}

/// One page of a cursor-paginated Helix listing.
#[derive(Debug, Clone, Deserialize)]
pub struct Page<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
    #[serde(default)]
    pub pagination: Option<Pagination>,
}

impl<T> Page<T> {
    /// Cursor for the next page, if any. Helix sends `{}` or an empty cursor on the last page.
    pub fn next_cursor(&self) -> Option<&str> {
        self.pagination
            .as_ref()
            .and_then(|p| p.cursor.as_deref())
            .filter(|c| !c.is_empty())
    }
}

/// A user holding a privileged role, as returned by the VIP and moderator listings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RoleMember {
    pub user_id: String,
    pub user_login: String,
    #[serde(default)]
    pub user_name: String,
}

/// A live stream as returned by `GET /helix/streams`.
#[derive(Debug, Clone, Deserialize)]
pub struct Stream {
    pub id: String,
    pub user_id: String,
    pub user_login: String,
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub game_name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_cursor() {
        let page: Page<RoleMember> = serde_json::from_str(
            r#"{"data":[{"user_id":"1","user_login":"a","user_name":"A"}],"pagination":{"cursor":"abc"}}"#,
        )
        .unwrap();
        assert_eq!(page.data.len(), 1);
        assert_eq!(page.next_cursor(), Some("abc"));

        let last: Page<RoleMember> = serde_json::from_str(r#"{"data":[],"pagination":{}}"#).unwrap();
        assert_eq!(last.next_cursor(), None);

        let empty_cursor: Page<RoleMember> =
            serde_json::from_str(r#"{"data":[],"pagination":{"cursor":""}}"#).unwrap();
        assert_eq!(empty_cursor.next_cursor(), None);
    }

    #[test]
    fn test_channel_role_parse() {
        assert_eq!("VIP".parse::<ChannelRole>().unwrap(), ChannelRole::Vip);
        assert_eq!("mod".parse::<ChannelRole>().unwrap(), ChannelRole::Moderator);
        assert_eq!(
            "moderator".parse::<ChannelRole>().unwrap(),
            ChannelRole::Moderator
        );
        assert!("sub".parse::<ChannelRole>().is_err());
    }
}
