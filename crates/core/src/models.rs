//! Wire Models
//!
//! Data structures exchanged with the introductions API. Everything the
//! backend stores per member is optional on the wire so that older or partial
//! team records still decode.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A team as stored by the backend. Member order is fixed at creation time and
/// a member's position in `members` is its correlation key.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Team {
    pub team_id: String,
    pub team_name: String,
    #[serde(default)]
    pub members: Vec<Member>,
}

impl Team {
    /// Returns the member at `index`, if any.
    pub fn member(&self, index: usize) -> Option<&Member> {
        self.members.get(index)
    }
}

/// A team member together with the avatar identity the backend assigned to it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Member {
    pub name: String,
    pub intro_text: String,
    #[serde(default)]
    pub photo_url: Option<String>,
    #[serde(default)]
    pub avatar_id: Option<String>,
    #[serde(default)]
    pub avatar_name: Option<String>,
    #[serde(default)]
    pub avatar_preview_image: Option<String>,
    #[serde(default)]
    pub voice_id: Option<String>,
    #[serde(default)]
    pub video_id: Option<String>,
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(default)]
    pub video_status: Option<String>,
}

impl Member {
    /// Avatar and voice used to open a live session for this member.
    pub fn avatar_identity(&self) -> AvatarIdentity {
        AvatarIdentity {
            avatar_id: self.avatar_id.clone().unwrap_or_default(),
            voice_id: self.voice_id.clone(),
        }
    }

    /// The letter shown on a card that has no preview image.
    pub fn placeholder_initial(&self) -> Option<char> {
        self.name.trim().chars().next().and_then(|c| c.to_uppercase().next())
    }
}

/// Identity a live avatar session is opened with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvatarIdentity {
    pub avatar_id: String,
    pub voice_id: Option<String>,
}

/// Member fields submitted when creating a team.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct NewMember {
    pub name: String,
    pub intro_text: String,
}

/// The JSON body of `POST /team`, also embedded as `team_data` in multipart uploads.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CreateTeamPayload {
    pub team_name: String,
    pub members: Vec<NewMember>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct CreateTeamResponse {
    #[serde(default)]
    pub team_id: Option<String>,
    pub team: Team,
}

#[derive(Deserialize, Debug, Clone)]
pub struct TeamEnvelope {
    pub team: Team,
}

/// A row of `GET /teams`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TeamSummary {
    pub team_id: String,
    pub team_name: String,
    #[serde(default)]
    pub member_count: usize,
}

#[derive(Deserialize, Debug, Clone)]
pub struct TeamList {
    #[serde(default)]
    pub teams: Vec<TeamSummary>,
}

/// An avatar the backend can assign to members.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Avatar {
    pub avatar_id: String,
    #[serde(default)]
    pub avatar_name: String,
    #[serde(default)]
    pub gender: String,
    #[serde(default)]
    pub preview_image_url: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct AvatarList {
    #[serde(default)]
    pub count: usize,
    #[serde(default)]
    pub avatars: Vec<Avatar>,
}

/// Body of `POST /generate-intro`.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct GenerateIntroPayload {
    pub team_id: String,
    pub member_index: usize,
}

/// Rendering state reported for a pre-rendered introduction video.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VideoStatus {
    Completed,
    Pending,
    Processing,
    Waiting,
    Failed,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for VideoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            VideoStatus::Completed => "completed",
            VideoStatus::Pending => "pending",
            VideoStatus::Processing => "processing",
            VideoStatus::Waiting => "waiting",
            VideoStatus::Failed => "failed",
            VideoStatus::Unknown => "unknown",
        };
        f.write_str(label)
    }
}

/// Result of `POST /generate-intro`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct IntroResponse {
    pub status: VideoStatus,
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(default)]
    pub video_id: Option<String>,
    #[serde(default)]
    pub member_name: Option<String>,
}

/// Result of `GET /video-status/{video_id}`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct VideoStatusResponse {
    #[serde(default)]
    pub video_id: Option<String>,
    pub status: VideoStatus,
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct StreamingTokenResponse {
    pub token: String,
}

/// Error body carried by non-2xx responses.
#[derive(Deserialize, Debug, Clone)]
pub struct ErrorBody {
    pub detail: Option<String>,
}
