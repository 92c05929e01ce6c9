// Copyright (C) 2025 Michael Herstine <sp1ff@pobox.com>
//
// This file is part of custorg.
//
// custorg is free software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, either version 3 of the
// License, or (at your option) any later version.
//
// custorg is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without
// even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU
// General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with custorg.  If not,
// see <http://www.gnu.org/licenses/>.

//! # custorg models
//!
//! I hate these sort of "catch-all" modules named "models" or "entities", but these types are truly
//! foundational: the identifiers by which records are addressed and the shape a record takes at
//! creation time.

use std::fmt::Display;

use chrono::{DateTime, SecondsFormat, Utc};
use mongodb::bson::{doc, Document};
use serde::{Deserialize, Serialize};
use snafu::{prelude::*, Backtrace};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("{label} may not be empty"))]
    EmptyId {
        label: &'static str,
        backtrace: Backtrace,
    },
    #[snafu(display("cust_org_data.{field} may not be empty"))]
    EmptyContactField {
        field: &'static str,
        backtrace: Backtrace,
    },
}

type Result<T> = std::result::Result<T, Error>;

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                          Identifiers                                           //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// define_id!
///
/// Declare a newtype intended to be used as an opaque identifier for some other sort of entity.
///
/// Unlike most document stores I've worked with, the identifiers here are *caller-supplied*
/// strings: `cust_org_id` is minted by whatever upstream system onboards the organization, and
/// `user_id` by whatever issues actor ids. We therefore wrap [String] rather than a UUID, and the
/// only invariant we can enforce is non-emptiness (whitespace-only counts as empty). I just
/// couldn't bring myself to use the same type to represent identifiers for organizations and
/// users at the same time.
macro_rules! define_id {
    ($type_name:ident, $label:expr) => {
        #[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $type_name(String);
        impl $type_name {
            pub fn new<S: AsRef<str>>(s: S) -> Result<$type_name> {
                let s = s.as_ref().trim();
                if s.is_empty() {
                    EmptyIdSnafu { label: $label }.fail()
                } else {
                    Ok($type_name(s.to_owned()))
                }
            }
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }
        impl TryFrom<String> for $type_name {
            type Error = Error;
            fn try_from(value: String) -> Result<Self> {
                $type_name::new(value)
            }
        }
        impl From<$type_name> for String {
            fn from(value: $type_name) -> String {
                value.0
            }
        }
        impl Display for $type_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_id!(CustOrgId, "cust_org_id");
define_id!(UserId, "user_id");

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                           OrgContact                                           //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// The business contact block (`cust_org_data`): all three fields are required together at
/// creation. Instances can only be obtained through [OrgContact::new], so holding one is proof
/// that all three fields are non-empty.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct OrgContact {
    name: String,
    email: String,
    phone: String,
}

impl OrgContact {
    pub fn new<S1, S2, S3>(name: S1, email: S2, phone: S3) -> Result<OrgContact>
    where
        S1: AsRef<str>,
        S2: AsRef<str>,
        S3: AsRef<str>,
    {
        fn checked(field: &'static str, value: &str) -> Result<String> {
            let value = value.trim();
            if value.is_empty() {
                EmptyContactFieldSnafu { field }.fail()
            } else {
                Ok(value.to_owned())
            }
        }
        Ok(OrgContact {
            name: checked("name", name.as_ref())?,
            email: checked("email", email.as_ref())?,
            phone: checked("phone", phone.as_ref())?,
        })
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn email(&self) -> &str {
        &self.email
    }
    pub fn phone(&self) -> &str {
        &self.phone
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                           AuditTrail                                           //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Provenance metadata, as born at creation time.
///
/// Only the `created_*` pair lives here: the `updated_*` pair is stamped by the update path's
/// template (see [crate::orgs]) and merged over whatever is stored, overwriting prior update
/// metadata rather than accumulating it.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct AuditTrail {
    created_at: String,
    created_by: UserId,
}

impl AuditTrail {
    pub fn created(now: &DateTime<Utc>, by: &UserId) -> AuditTrail {
        AuditTrail {
            created_at: format_timestamp(now),
            created_by: by.clone(),
        }
    }
    pub fn created_at(&self) -> &str {
        &self.created_at
    }
    pub fn created_by(&self) -> &UserId {
        &self.created_by
    }
}

/// Timestamps are RFC 3339 UTC strings throughout; the record is JSON-shaped end-to-end, so
/// there's no profit in a binary date representation.
pub fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                          CustomerOrg                                           //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A customer-organization record, as created
///
/// This is the *creation-time* shape only. Once stored, a record is a free-form document (callers
/// may grow `cust_org_prefs` arbitrarily through updates), so the read & update paths work in
/// terms of [Document] and this type never round-trips back out of storage.
#[derive(Clone, Debug, Serialize)]
pub struct CustomerOrg {
    cust_org_id: CustOrgId,
    user_id: UserId,
    cust_org_data: OrgContact,
    cust_org_prefs: Document,
    audit_trail: AuditTrail,
    onboarding_stage: i32,
}

impl CustomerOrg {
    /// Every record starts life at stage one; transitions are owned by a collaborator process.
    pub const INITIAL_ONBOARDING_STAGE: i32 = 1;

    /// The preference set every record is created with. Caller-supplied preferences at creation
    /// time are discarded, not merged; they only come into play on update.
    pub fn default_prefs() -> Document {
        doc! { "emissions_output_units": "kg" }
    }

    pub fn create(
        cust_org_id: CustOrgId,
        user_id: UserId,
        cust_org_data: OrgContact,
        now: &DateTime<Utc>,
    ) -> CustomerOrg {
        let audit_trail = AuditTrail::created(now, &user_id);
        CustomerOrg {
            cust_org_id,
            user_id,
            cust_org_data,
            cust_org_prefs: CustomerOrg::default_prefs(),
            audit_trail,
            onboarding_stage: CustomerOrg::INITIAL_ONBOARDING_STAGE,
        }
    }

    pub fn cust_org_id(&self) -> &CustOrgId {
        &self.cust_org_id
    }
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }
    pub fn cust_org_data(&self) -> &OrgContact {
        &self.cust_org_data
    }
    pub fn audit_trail(&self) -> &AuditTrail {
        &self.audit_trail
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn ids() {
        assert!(CustOrgId::new("").is_err());
        assert!(CustOrgId::new("   ").is_err());
        assert!(UserId::new("").is_err());
        assert!(CustOrgId::new("o1").is_ok());
        assert!(UserId::new("我不知道怕在哪里").is_ok());
        // serde round-trip applies the same validation
        assert!(serde_json::from_str::<CustOrgId>("\"\"").is_err());
        assert_eq!(
            serde_json::from_str::<CustOrgId>("\"o1\"").unwrap().as_str(),
            "o1"
        );
    }

    #[test]
    fn contact() {
        assert!(OrgContact::new("Acme", "a@acme.com", "").is_err());
        assert!(OrgContact::new("", "a@acme.com", "555").is_err());
        assert!(OrgContact::new("Acme", " ", "555").is_err());
        let contact = OrgContact::new("Acme", "a@acme.com", "555").unwrap();
        assert_eq!(contact.name(), "Acme");
    }

    #[test]
    fn creation_defaults() {
        let now = chrono::DateTime::parse_from_rfc3339("2025-06-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let org = CustomerOrg::create(
            CustOrgId::new("o1").unwrap(),
            UserId::new("u1").unwrap(),
            OrgContact::new("Acme", "a@acme.com", "555").unwrap(),
            &now,
        );
        let doc = mongodb::bson::to_document(&org).unwrap();
        assert_eq!(doc.get_i32("onboarding_stage").unwrap(), 1);
        assert_eq!(
            doc.get_document("cust_org_prefs").unwrap(),
            &doc! { "emissions_output_units": "kg" }
        );
        let audit = doc.get_document("audit_trail").unwrap();
        assert_eq!(audit.get_str("created_by").unwrap(), "u1");
        assert_eq!(audit.get_str("created_at").unwrap(), "2025-06-01T12:00:00Z");
        assert!(audit.get("updated_at").is_none());
    }
}
