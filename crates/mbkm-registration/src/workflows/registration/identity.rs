use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::directory::{UpstreamDataError, UpstreamError, UserLookup, UserRecord};
use super::domain::Registration;

/// Bearer credential forwarded untouched to the upstream services.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Parses an `Authorization` header value of the form `Bearer <token>`.
    pub fn from_header(value: &str) -> Option<Self> {
        let mut parts = value.split_whitespace();
        match (parts.next(), parts.next(), parts.next()) {
            (Some(scheme), Some(token), None) if scheme.eq_ignore_ascii_case("bearer") => {
                Some(Self(token.to_string()))
            }
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(***)")
    }
}

/// Closed set of roles issued by the user service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "ADMIN")]
    Admin,
    #[serde(rename = "LO-MBKM")]
    ProgramOffice,
    #[serde(rename = "DOSEN PEMBIMBING")]
    AcademicAdvisor,
    #[serde(rename = "MAHASISWA")]
    Student,
}

impl Role {
    pub const fn label(self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::ProgramOffice => "LO-MBKM",
            Role::AcademicAdvisor => "DOSEN PEMBIMBING",
            Role::Student => "MAHASISWA",
        }
    }

    /// Roles allowed to act on the program-office side of an approval.
    pub const fn is_office(self) -> bool {
        matches!(self, Role::Admin | Role::ProgramOffice)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized role '{0}'")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim() {
            "ADMIN" => Ok(Role::Admin),
            "LO-MBKM" => Ok(Role::ProgramOffice),
            "DOSEN PEMBIMBING" => Ok(Role::AcademicAdvisor),
            "MAHASISWA" => Ok(Role::Student),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

/// Caller identity validated from the user service's `me` payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub name: String,
    pub role: Role,
    pub nrp: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("Unauthorized")]
    Unauthenticated,
    #[error("Unauthorized")]
    Forbidden,
    #[error(transparent)]
    UnknownRole(#[from] UnknownRole),
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

impl Identity {
    /// Resolves the caller behind `token`. A missing user means the token is not valid.
    pub fn resolve(users: &dyn UserLookup, token: &AccessToken) -> Result<Self, IdentityError> {
        let record = users
            .current_user(token)?
            .ok_or(IdentityError::Unauthenticated)?;
        Self::from_record(record)
    }

    pub fn from_record(record: UserRecord) -> Result<Self, IdentityError> {
        let user_id = non_empty(record.id).ok_or(UpstreamError::Data(
            UpstreamDataError::missing("user", "id"),
        ))?;
        let role = non_empty(record.role).ok_or(UpstreamError::Data(
            UpstreamDataError::missing("user", "role"),
        ))?;

        Ok(Self {
            user_id,
            name: record.name.unwrap_or_default(),
            role: role.parse()?,
            nrp: non_empty(record.nrp),
            email: non_empty(record.email),
        })
    }

    /// The NRP of a student caller.
    pub fn student_nrp(&self) -> Result<&str, IdentityError> {
        match (self.role, self.nrp.as_deref()) {
            (Role::Student, Some(nrp)) => Ok(nrp),
            _ => Err(IdentityError::Forbidden),
        }
    }

    /// The e-mail of an academic advisor caller.
    pub fn advisor_email(&self) -> Result<&str, IdentityError> {
        match (self.role, self.email.as_deref()) {
            (Role::AcademicAdvisor, Some(email)) => Ok(email),
            _ => Err(IdentityError::Forbidden),
        }
    }

    pub fn require_office(&self) -> Result<(), IdentityError> {
        if self.role.is_office() {
            Ok(())
        } else {
            Err(IdentityError::Forbidden)
        }
    }

    /// Students see their own registrations, advisors the ones naming them, office roles all.
    pub fn can_access(&self, registration: &Registration) -> bool {
        match self.role {
            Role::Student => registration.user_id == self.user_id,
            Role::AcademicAdvisor => self
                .email
                .as_deref()
                .is_some_and(|email| email == registration.academic_advisor_email),
            Role::Admin | Role::ProgramOffice => true,
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bearer_header() {
        let token = AccessToken::from_header("Bearer abc.def").expect("bearer parses");
        assert_eq!(token.as_str(), "abc.def");
        assert!(AccessToken::from_header("abc.def").is_none());
        assert!(AccessToken::from_header("Bearer a b").is_none());
        assert_eq!(format!("{token:?}"), "AccessToken(***)");
    }

    #[test]
    fn role_strings_round_trip_through_the_wire_names() {
        for role in [
            Role::Admin,
            Role::ProgramOffice,
            Role::AcademicAdvisor,
            Role::Student,
        ] {
            assert_eq!(role.label().parse::<Role>().expect("known role"), role);
        }
        assert!("DOSEN PEMONEV".parse::<Role>().is_err());
    }

    #[test]
    fn identity_requires_id_and_role() {
        let record = UserRecord {
            id: Some("u-1".to_string()),
            nrp: Some("5025201001".to_string()),
            name: Some("Rina".to_string()),
            role: None,
            email: None,
        };
        match Identity::from_record(record) {
            Err(IdentityError::Upstream(UpstreamError::Data(err))) => {
                assert_eq!(err.field, "role");
            }
            other => panic!("expected upstream data error, got {other:?}"),
        }
    }
}
