use serde::{Deserialize, Serialize};

/// A Discord user bound to a Twitch account.
///
/// Keyed by `discord_user_id`; a new link for the same Discord user replaces the old one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdentityLink {
    #[serde(rename = "platformAUserId", alias = "discord")]
    pub discord_user_id: String,
    /// Empty for links created before the Twitch user id was recorded.
    #[serde(rename = "platformBUserId", alias = "twitch", default)]
    pub twitch_user_id: String,
    #[serde(rename = "platformBLogin", alias = "twitchLogin", default)]
    pub twitch_login: String,
}

impl IdentityLink {
    pub fn new(
        discord_user_id: impl Into<String>,
        twitch_user_id: impl Into<String>,
        twitch_login: impl Into<String>,
    ) -> Self {
        Self {
            discord_user_id: discord_user_id.into(),
            twitch_user_id: twitch_user_id.into(),
            twitch_login: twitch_login.into().to_ascii_lowercase(),
        }
    }

    /// The Twitch user id to mutate, if one was recorded.
    pub fn twitch_id(&self) -> Option<&str> {
        Some(self.twitch_user_id.as_str()).filter(|id| !id.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Replaced,
    Unchanged,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_current_and_legacy_layouts() {
        let links: Vec<IdentityLink> = serde_json::from_str(
            r#"[
                {"platformAUserId":"100","platformBUserId":"55","platformBLogin":"alice"},
                {"discord":"200","twitch":"66","twitchLogin":"bob"}
            ]"#,
        )
        .unwrap();
        assert_eq!(links[0], IdentityLink::new("100", "55", "alice"));
        assert_eq!(links[1], IdentityLink::new("200", "66", "bob"));

        let json = serde_json::to_value(&links[1]).unwrap();
        assert_eq!(json["platformAUserId"], "200");
        assert_eq!(json["platformBUserId"], "66");
        assert_eq!(json["platformBLogin"], "bob");
        assert!(json.get("discord").is_none());
    }

    #[test]
    fn test_missing_twitch_id() {
        let link: IdentityLink =
            serde_json::from_str(r#"{"discord":"1","twitchLogin":"Carol"}"#).unwrap();
        assert_eq!(link.twitch_id(), None);
        assert_eq!(IdentityLink::new("1", "9", "Carol").twitch_login, "carol");
    }
}
