//! Identity-provider event payloads.

use orgplane_core::error::{PlaneError, PlaneResult};
use serde::Deserialize;
use serde_json::Value;

pub const ORGANIZATION_CREATED: &str = "organization.created";
pub const USER_CREATED: &str = "user.created";
pub const USER_UPDATED: &str = "user.updated";
pub const MEMBERSHIP_CREATED: &str = "organizationMembership.created";
pub const MEMBERSHIP_DELETED: &str = "organizationMembership.deleted";

/// `{ "type": ..., "data": ... }` as delivered by the provider.
#[derive(Debug, Clone, Deserialize)]
pub struct EventPayload {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub data: Value,
}

impl EventPayload {
    pub fn parse(body: &[u8]) -> PlaneResult<Self> {
        let payload: EventPayload = serde_json::from_slice(body)
            .map_err(|e| PlaneError::validation(format!("malformed event payload: {e}")))?;
        if payload.event_type.trim().is_empty() {
            return Err(PlaneError::validation("event payload has no type"));
        }
        Ok(payload)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EmailAddress {
    #[serde(default)]
    pub id: Option<String>,
    pub email_address: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserData {
    pub id: String,
    #[serde(default)]
    pub email_addresses: Vec<EmailAddress>,
    #[serde(default)]
    pub primary_email_address_id: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

impl UserData {
    /// The primary address when flagged, otherwise the first one listed.
    pub fn email(&self) -> Option<&str> {
        let primary = self.primary_email_address_id.as_deref().and_then(|id| {
            self.email_addresses
                .iter()
                .find(|e| e.id.as_deref() == Some(id))
        });
        primary
            .or_else(|| self.email_addresses.first())
            .map(|e| e.email_address.trim())
            .filter(|e| !e.is_empty())
    }
}

/// `created_by` is a bare user id; some deliveries embed the whole user.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrganizationData {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default)]
    pub created_by_user: Option<UserData>,
}

impl OrganizationData {
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or("Unnamed Organization")
    }

    pub fn creator_email(&self) -> Option<&str> {
        self.created_by_user.as_ref().and_then(UserData::email)
    }

    pub fn creator_id(&self) -> Option<&str> {
        self.created_by_user
            .as_ref()
            .map(|u| u.id.as_str())
            .or(self.created_by.as_deref())
            .filter(|id| !id.is_empty())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct OrgRef {
    id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct PublicUserData {
    user_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RawMembership {
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    organization_id: Option<String>,
    #[serde(default)]
    organization: Option<OrgRef>,
    #[serde(default)]
    public_user_data: Option<PublicUserData>,
    #[serde(default)]
    role: Option<String>,
}

/// Membership events arrive flat or nested depending on the API version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipData {
    pub user_id: String,
    pub org_id: String,
    pub role: Option<String>,
}

impl<'de> Deserialize<'de> for MembershipData {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = RawMembership::deserialize(deserializer)?;
        let user_id = raw
            .user_id
            .or(raw.public_user_data.map(|p| p.user_id))
            .filter(|id| !id.is_empty())
            .ok_or_else(|| serde::de::Error::missing_field("user_id"))?;
        let org_id = raw
            .organization_id
            .or(raw.organization.map(|o| o.id))
            .filter(|id| !id.is_empty())
            .ok_or_else(|| serde::de::Error::missing_field("organization_id"))?;
        Ok(MembershipData {
            user_id,
            org_id,
            role: raw.role,
        })
    }
}

/// A typed event. Unknown types keep their name so they can be acknowledged.
#[derive(Debug, Clone)]
pub enum IdentityEvent {
    OrganizationCreated(OrganizationData),
    UserCreated(UserData),
    UserUpdated(UserData),
    MembershipCreated(MembershipData),
    MembershipDeleted(MembershipData),
    Unhandled(String),
}

impl IdentityEvent {
    pub fn from_payload(payload: EventPayload) -> PlaneResult<Self> {
        fn data<T: for<'de> Deserialize<'de>>(event_type: &str, data: Value) -> PlaneResult<T> {
            serde_json::from_value(data).map_err(|e| {
                PlaneError::validation(format!("malformed {event_type} payload: {e}"))
            })
        }

        let t = payload.event_type.as_str();
        Ok(match t {
            ORGANIZATION_CREATED => IdentityEvent::OrganizationCreated(data(t, payload.data)?),
            USER_CREATED => IdentityEvent::UserCreated(data(t, payload.data)?),
            USER_UPDATED => IdentityEvent::UserUpdated(data(t, payload.data)?),
            MEMBERSHIP_CREATED => IdentityEvent::MembershipCreated(data(t, payload.data)?),
            MEMBERSHIP_DELETED => IdentityEvent::MembershipDeleted(data(t, payload.data)?),
            _ => IdentityEvent::Unhandled(payload.event_type),
        })
    }
}
