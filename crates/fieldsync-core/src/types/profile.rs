//! Logged-in user profile.

use serde::{Deserialize, Serialize};

/// The profile record returned by the login endpoint.
///
/// The profile is persisted as the backend sent it; fields not typed here are
/// kept in `extra` so a save/load cycle returns the same document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(alias = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    /// Set for engineers who still have to replace a temporary password.
    #[serde(default)]
    pub is_password_temporary: bool,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl UserProfile {
    /// A short label for display and logs: name, then email, then id.
    pub fn display_name(&self) -> &str {
        self.full_name
            .as_deref()
            .or(self.email.as_deref())
            .or(self.id.as_deref())
            .unwrap_or("unknown user")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_login_user() {
        let user: UserProfile = serde_json::from_value(json!({
            "_id": "u-17",
            "fullName": "Dana Reyes",
            "email": "dana@example.com",
            "role": "Engineer",
            "isPasswordTemporary": true,
            "certifications": 3
        }))
        .unwrap();

        assert_eq!(user.id.as_deref(), Some("u-17"));
        assert_eq!(user.display_name(), "Dana Reyes");
        assert!(user.is_password_temporary);
        assert_eq!(user.extra["certifications"], json!(3));
    }
}
