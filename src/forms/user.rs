use crate::models;
use serde::{Deserialize, Serialize};

/// Identity provider response: `{"user": {...}}`.
#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserForm {
    pub user: UserProfile,
}

#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub email_confirmed: bool,
    #[serde(default)]
    pub role: Option<String>,
}

impl TryFrom<UserForm> for models::User {
    type Error = String;

    fn try_from(form: UserForm) -> Result<Self, Self::Error> {
        let profile = form.user;
        if profile.id.is_empty() {
            return Err("user id is missing in the auth response".to_string());
        }

        Ok(models::User {
            id: profile.id,
            first_name: profile.first_name,
            last_name: profile.last_name,
            email: profile.email,
            role: profile.role.unwrap_or_else(|| "group_user".to_string()),
            email_confirmed: profile.email_confirmed,
            access_token: None,
        })
    }
}
