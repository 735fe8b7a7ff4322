//! Team Drafts
//!
//! A draft is the raw, user-entered team before submission. Finalizing it drops
//! incomplete members and re-keys photos so that photo indices line up with the
//! positions of the members that are actually sent.

use crate::models::{CreateTeamPayload, NewMember};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DraftError {
    #[error("Team name is required")]
    MissingTeamName,
    #[error("Add at least one member with name and intro text")]
    NoValidMembers,
}

/// An image attached to a member.
#[derive(Clone, PartialEq, Eq)]
pub struct PhotoUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl PhotoUpload {
    pub fn new(
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }
}

impl fmt::Debug for PhotoUpload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PhotoUpload")
            .field("file_name", &self.file_name)
            .field("content_type", &self.content_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// A member as entered, possibly incomplete.
#[derive(Debug, Clone, Default)]
pub struct MemberDraft {
    pub name: String,
    pub intro_text: String,
    pub photo: Option<PhotoUpload>,
}

impl MemberDraft {
    pub fn new(name: impl Into<String>, intro_text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            intro_text: intro_text.into(),
            photo: None,
        }
    }

    pub fn with_photo(mut self, photo: PhotoUpload) -> Self {
        self.photo = Some(photo);
        self
    }

    fn is_complete(&self) -> bool {
        !self.name.trim().is_empty() && !self.intro_text.trim().is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct TeamDraft {
    pub team_name: String,
    pub members: Vec<MemberDraft>,
}

impl TeamDraft {
    pub fn new(team_name: impl Into<String>) -> Self {
        Self {
            team_name: team_name.into(),
            members: Vec::new(),
        }
    }

    pub fn member(mut self, member: MemberDraft) -> Self {
        self.members.push(member);
        self
    }

    /// Validates the draft and produces the submission.
    ///
    /// Members missing a name or intro text are dropped. Surviving members keep
    /// their relative order and are renumbered from 0; a photo is keyed by its
    /// member's new index, never by the index it had in the draft.
    pub fn finalize(self) -> Result<NewTeam, DraftError> {
        let team_name = self.team_name.trim().to_string();
        if team_name.is_empty() {
            return Err(DraftError::MissingTeamName);
        }

        let mut members = Vec::new();
        let mut photos = BTreeMap::new();
        for draft in self.members.into_iter().filter(MemberDraft::is_complete) {
            if let Some(photo) = draft.photo {
                photos.insert(members.len(), photo);
            }
            members.push(NewMember {
                name: draft.name.trim().to_string(),
                intro_text: draft.intro_text.trim().to_string(),
            });
        }

        if members.is_empty() {
            return Err(DraftError::NoValidMembers);
        }

        Ok(NewTeam {
            team_name,
            members,
            photos,
        })
    }
}

/// A validated team ready to be sent to `POST /team`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTeam {
    pub team_name: String,
    pub members: Vec<NewMember>,
    /// Photos keyed by post-filter member index.
    pub photos: BTreeMap<usize, PhotoUpload>,
}

impl NewTeam {
    pub fn payload(&self) -> CreateTeamPayload {
        CreateTeamPayload {
            team_name: self.team_name.clone(),
            members: self.members.clone(),
        }
    }

    pub fn has_photos(&self) -> bool {
        !self.photos.is_empty()
    }
}

/// Multipart field name for the photo of the member at `index`.
pub fn photo_field(index: usize) -> String {
    format!("photo_{}", index)
}
