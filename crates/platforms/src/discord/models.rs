use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub bot: bool,
}

/// A guild member with the ids of the roles it currently holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildMember {
    #[serde(default)]
    pub user: Option<User>,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl GuildMember {
    pub fn user_id(&self) -> Option<&str> {
        self.user.as_ref().map(|u| u.id.as_str())
    }

    pub fn is_bot(&self) -> bool {
        self.user.as_ref().is_some_and(|u| u.bot)
    }
}

/// An external account connected to a Discord user (`/users/@me/connections`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Connection {
    #[serde(rename = "type")]
    pub kind: String,
    /// Platform-side account id. Can be blank for some accounts.
    #[serde(default)]
    pub id: String,
    /// Platform-side account name (the Twitch login for Twitch connections).
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub verified: bool,
}

impl Connection {
    pub fn is_twitch(&self) -> bool {
        self.kind.eq_ignore_ascii_case("twitch")
    }
}
