use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::users::repo::{User, WritingProfile};

/// Request body for an invite request.
#[derive(Debug, Deserialize)]
pub struct InviteRequest {
    pub email: String,
}

/// Response to an invite request; returned regardless of whether the email
/// already had an account.
#[derive(Debug, Serialize)]
pub struct InviteRequestResponse {
    pub email: String,
}

/// Response to a successful token validation.
#[derive(Debug, Serialize)]
pub struct InviteTokenResponse {
    pub token: String,
}

/// Request body for invite acceptance.
#[derive(Debug, Deserialize)]
pub struct InviteAcceptanceRequest {
    pub username: String,
    pub password: String,
}

/// Combined profile + user fields, as exposed at /profile.
#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: String,
    pub timezone: String,
    pub target_milestone_word_count: i32,
}

impl ProfileResponse {
    pub fn from_parts(user: &User, profile: &WritingProfile) -> Self {
        Self {
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            email: user.email.clone(),
            timezone: profile.timezone.clone(),
            target_milestone_word_count: profile.target_milestone_word_count,
        }
    }
}

/// Partial profile update; absent fields are left untouched. Email is
/// read-only and silently ignored if supplied.
#[derive(Debug, Deserialize)]
pub struct ProfileUpdateRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub timezone: Option<String>,
    pub target_milestone_word_count: Option<i32>,
}

/// Request body for the bulk invite issuance endpoint.
#[derive(Debug, Deserialize)]
pub struct IssueInvitesRequest {
    pub user_ids: Vec<Uuid>,
}

/// Plain human-readable outcome message.
#[derive(Debug, Serialize)]
pub struct DetailResponse {
    pub detail: String,
}

#[cfg(test)]
mod dto_tests {
    use super::*;
    use crate::users::status::InviteStatus;
    use time::OffsetDateTime;

    #[test]
    fn profile_response_combines_user_and_profile_fields() {
        let user = User {
            id: uuid::Uuid::new_v4(),
            username: "tester".into(),
            email: "tester@example.com".into(),
            password_hash: Some("hash".into()),
            first_name: Some("Test".into()),
            last_name: None,
            invite_status: InviteStatus::Accepted,
            email_confirmed: true,
            is_active: true,
            is_staff: false,
            created_at: OffsetDateTime::now_utc(),
        };
        let profile = WritingProfile {
            user_id: user.id,
            timezone: "Australia/Sydney".into(),
            target_milestone_word_count: 700,
        };
        let response = ProfileResponse::from_parts(&user, &profile);
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["email"], "tester@example.com");
        assert_eq!(json["timezone"], "Australia/Sydney");
        assert_eq!(json["target_milestone_word_count"], 700);
        assert_eq!(json["first_name"], "Test");
    }
}
