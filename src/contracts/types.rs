use std::fmt;
use std::io::Write;
use std::str::FromStr;

use diesel::deserialize::{self, FromSql};
use diesel::pg::{Pg, PgValue};
use diesel::serialize::{self, IsNull, Output, ToSql};
use diesel::sql_types::Text;
use diesel::{AsExpression, FromSqlRow};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind}: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

/// Closed set of values persisted as text. Parsing rejects anything outside
/// the declared set, both from JSON and from the database.
macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident, $label:literal { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsExpression, FromSqlRow)]
        #[diesel(sql_type = Text)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value {
                    $($text => Ok($name::$variant),)+
                    other => Err(UnknownVariant {
                        kind: $label,
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                raw.parse().map_err(serde::de::Error::custom)
            }
        }

        impl ToSql<Text, Pg> for $name {
            fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
                out.write_all(self.as_str().as_bytes())?;
                Ok(IsNull::No)
            }
        }

        impl FromSql<Text, Pg> for $name {
            fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
                let raw = <String as FromSql<Text, Pg>>::from_sql(bytes)?;
                Ok(raw.parse()?)
            }
        }
    };
}

text_enum! {
    /// Contract status. `draft → sent → signed`, with `lost`/`void` reachable
    /// from either open state.
    ContractStatus, "contract status" {
        Draft => "draft",
        Sent => "sent",
        Signed => "signed",
        Lost => "lost",
        Void => "void",
    }
}

impl ContractStatus {
    pub fn can_transition_to(self, next: ContractStatus) -> bool {
        use ContractStatus::*;
        matches!(
            (self, next),
            (Draft, Sent) | (Draft, Signed) | (Sent, Signed) | (Draft | Sent, Lost | Void)
        )
    }

    /// Transitions a user may request directly. `Signed` is only reached by
    /// completing the last signature.
    pub fn user_can_transition_to(self, next: ContractStatus) -> bool {
        next != ContractStatus::Signed && self.can_transition_to(next)
    }

    /// Signatures are only collected while the contract is still open.
    pub fn is_open(self) -> bool {
        matches!(self, ContractStatus::Draft | ContractStatus::Sent)
    }
}

impl Default for ContractStatus {
    fn default() -> Self {
        ContractStatus::Draft
    }
}

text_enum! {
    SigningPolicy, "signing policy" {
        AnyOrder => "any_order",
        Sequential => "sequential",
    }
}

impl Default for SigningPolicy {
    fn default() -> Self {
        SigningPolicy::AnyOrder
    }
}

text_enum! {
    EventKind, "event kind" {
        Created => "created",
        StatusChanged => "status_changed",
        TemplateInserted => "template_inserted",
        VersionCreated => "version_created",
        SignerAdded => "signer_added",
        EmailSent => "email_sent",
        OtpSent => "otp_sent",
        OtpVerified => "otp_verified",
        Signed => "signed",
        ProjectCreated => "project_created",
        ProjectSkipped => "project_skipped",
    }
}

text_enum! {
    /// Tag on a template selecting the task list provisioned after signing.
    ServicePackage, "service package" {
        AuditServices => "audit_services",
        TaxCompliance => "tax_compliance",
        VatCompliance => "vat_compliance",
        ReviewServices => "review_services",
        Bookkeeping => "bookkeeping",
        Payroll => "payroll",
        Compliance => "compliance",
        Advisory => "advisory",
        Basic => "basic",
        Standard => "standard",
        Premium => "premium",
    }
}

/// Who caused an event. Rendered as `user:<id>`, `signer:<id>` or `system`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    User(Uuid),
    Signer(Uuid),
    System,
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Actor::User(id) => write!(f, "user:{id}"),
            Actor::Signer(id) => write!(f, "signer:{id}"),
            Actor::System => f.write_str("system"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureMethod {
    Typed,
    Drawn,
    Click,
}

impl SignatureMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignatureMethod::Typed => "typed",
            SignatureMethod::Drawn => "drawn",
            SignatureMethod::Click => "click",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureData {
    pub method: SignatureMethod,
    /// Typed name, drawn-signature image data, or empty for click-to-sign.
    #[serde(default)]
    pub payload: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_text() {
        for status in ContractStatus::ALL {
            assert_eq!(status.as_str().parse::<ContractStatus>().unwrap(), *status);
        }
    }

    #[test]
    fn rejects_unknown_status() {
        let err = "archived".parse::<ContractStatus>().unwrap_err();
        assert_eq!(err.value, "archived");
        assert!(serde_json::from_str::<ContractStatus>("\"Signed\"").is_err());
    }

    #[test]
    fn allowed_transitions() {
        use ContractStatus::*;
        assert!(Draft.can_transition_to(Sent));
        assert!(Sent.can_transition_to(Signed));
        assert!(Sent.can_transition_to(Void));
        assert!(Draft.can_transition_to(Lost));
        assert!(!Signed.can_transition_to(Void));
        assert!(!Sent.can_transition_to(Draft));
        assert!(!Sent.can_transition_to(Sent));
        assert!(!Void.can_transition_to(Sent));
    }

    #[test]
    fn users_cannot_mark_contracts_signed() {
        use ContractStatus::*;
        assert!(Draft.user_can_transition_to(Sent));
        assert!(Sent.user_can_transition_to(Void));
        assert!(Draft.user_can_transition_to(Lost));
        assert!(!Draft.user_can_transition_to(Signed));
        assert!(!Sent.user_can_transition_to(Signed));
        assert!(!Lost.user_can_transition_to(Sent));
    }

    #[test]
    fn actor_formats_like_audit_identities() {
        let id = Uuid::nil();
        assert_eq!(
            Actor::User(id).to_string(),
            "user:00000000-0000-0000-0000-000000000000"
        );
        assert_eq!(Actor::System.to_string(), "system");
    }

    #[test]
    fn service_package_uses_snake_case_tags() {
        let parsed: ServicePackage = serde_json::from_str("\"vat_compliance\"").unwrap();
        assert_eq!(parsed, ServicePackage::VatCompliance);
        assert_eq!(
            serde_json::to_string(&ServicePackage::AuditServices).unwrap(),
            "\"audit_services\""
        );
    }
}
