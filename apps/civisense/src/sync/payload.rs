//! # Wire Payload
//!
//! The JSON form of an issue as sent to the remote authority. Photos travel
//! as base64 strings.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use civisense_core::{Category, GeoPoint, Issue, Photo, Priority, WardId};
use serde::{Deserialize, Serialize};

/// One photo on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhotoPayload {
    pub media_type: String,
    /// Base64 (standard alphabet, padded) image bytes.
    pub data: String,
}

/// Full issue record, as transmitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssuePayload {
    /// Stable across retransmissions of the same issue.
    pub idempotency_key: String,
    pub local_id: u64,
    pub category: Category,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advisory_note: Option<String>,
    pub location: Option<GeoPoint>,
    pub ward_id: Option<WardId>,
    #[serde(default)]
    pub photos: Vec<PhotoPayload>,
    pub author_ref: String,
    pub priority: Priority,
    pub captured_at: DateTime<Utc>,
}

impl IssuePayload {
    /// Build the payload for a stored issue, photos included.
    #[must_use]
    pub fn from_issue(issue: &Issue) -> Self {
        Self {
            idempotency_key: issue.idempotency_key(),
            local_id: issue.id.0,
            category: issue.category,
            description: issue.description.clone(),
            advisory_note: issue.advisory_note.clone(),
            location: issue.location.clone(),
            ward_id: issue.ward_id,
            photos: issue
                .photos
                .iter()
                .map(|p| PhotoPayload {
                    media_type: p.media_type.clone(),
                    data: STANDARD.encode(&p.bytes),
                })
                .collect(),
            author_ref: issue.author_ref.clone(),
            priority: issue.priority,
            captured_at: issue.captured_at,
        }
    }

    /// Decode the attached photos back into bytes.
    pub fn decode_photos(&self) -> Result<Vec<Photo>, base64::DecodeError> {
        self.photos
            .iter()
            .map(|p| {
                STANDARD
                    .decode(&p.data)
                    .map(|bytes| Photo::new(p.media_type.clone(), bytes))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use civisense_core::{IssueId, NewIssue};

    #[test]
    fn photos_are_base64_on_the_wire() {
        let mut new = NewIssue::draft(Category::Pothole, "fw-7")
            .queued_at(GeoPoint::new(22.3080, 73.1830));
        new.photos.push(Photo::jpeg(vec![0xFF, 0xD8, 0xFF]));
        let issue = Issue::from_new(IssueId(3), new, None, Utc::now());

        let payload = IssuePayload::from_issue(&issue);
        assert_eq!(payload.photos[0].data, "/9j/");
        assert_eq!(payload.idempotency_key, issue.idempotency_key());

        let photos = payload.decode_photos().expect("decode");
        assert_eq!(photos, issue.photos);
    }

    #[test]
    fn bad_base64_is_reported() {
        let issue = Issue::from_new(
            IssueId(1),
            NewIssue::draft(Category::Road, "fw-1"),
            None,
            Utc::now(),
        );
        let mut payload = IssuePayload::from_issue(&issue);
        payload.photos.push(PhotoPayload {
            media_type: "image/jpeg".to_string(),
            data: "not base64!".to_string(),
        });
        assert!(payload.decode_photos().is_err());
    }
}
