use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Advertising channel identity.
///
/// The three named variants cover the platforms shipped with the reference
/// data set; additional platforms are carried as `Other` so a new source file
/// never requires a code change to ingest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Channel {
    Facebook,
    Google,
    TikTok,
    /// Any other platform, identified by its display name
    Other(String),
}

impl Channel {
    /// Returns the display name of the channel.
    pub fn name(&self) -> &str {
        match self {
            Channel::Facebook => "Facebook",
            Channel::Google => "Google",
            Channel::TikTok => "TikTok",
            Channel::Other(name) => name,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Channel {
    type Err = ChannelParseError;

    /// Parses a channel from its name, case-insensitively.
    ///
    /// # Errors
    /// Returns an error if the name is empty or whitespace-only.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(ChannelParseError::Empty);
        }
        Ok(match trimmed.to_lowercase().as_str() {
            "facebook" => Channel::Facebook,
            "google" => Channel::Google,
            "tiktok" => Channel::TikTok,
            _ => Channel::Other(trimmed.to_string()),
        })
    }
}

impl From<Channel> for String {
    fn from(channel: Channel) -> String {
        channel.name().to_string()
    }
}

impl TryFrom<String> for Channel {
    type Error = ChannelParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Errors that can occur when parsing a channel name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelParseError {
    /// Channel name was empty or whitespace-only
    Empty,
}

impl fmt::Display for ChannelParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelParseError::Empty => write!(f, "Channel name is empty"),
        }
    }
}

impl std::error::Error for ChannelParseError {}
