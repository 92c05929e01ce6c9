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

//! # Organizations API
//!
//! CRUD over the customer-organization collection: per-verb request validation, document
//! templates, and dispatch to the storage layer. The update path is the interesting one; it runs
//! the read-merge-write cycle built on [crate::merge].
//!
//! Each verb gets its own request type, produced from the raw body (POST/PUT) or query string
//! (GET/DELETE) at the boundary; core logic only ever sees validated requests. A missing or empty
//! required field fails with exactly `Missing required parameter`, before any collection
//! operation runs.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::{header::CONTENT_TYPE, HeaderValue, Method, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use mongodb::bson::{doc, to_document, Document};
use serde::Deserialize;
use snafu::{prelude::*, Backtrace};
use tower_http::{cors::CorsLayer, set_header::SetResponseHeaderLayer};
use tracing::{error, info};

use crate::{
    custorg::{CustOrg, ErrorResponseBody},
    entities::{self, format_timestamp, CustOrgId, CustomerOrg, OrgContact, UserId},
    merge::{deep_merge, strip_storage_id},
    storage::{self, Backend as StorageBackend},
};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Request body could not be parsed: {source}"))]
    BadBody { source: JsonRejection },
    #[snafu(display("Failed to delete record {cust_org_id}: {source}"))]
    DeleteOrg {
        cust_org_id: CustOrgId,
        source: storage::Error,
    },
    #[snafu(display("Failed to insert record {cust_org_id}: {source}"))]
    InsertOrg {
        cust_org_id: CustOrgId,
        source: storage::Error,
    },
    #[snafu(display("{source}"))]
    #[snafu(context(false))]
    InvalidField {
        source: entities::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("Failed to look up a record: {source}"))]
    Lookup { source: storage::Error },
    #[snafu(display("Missing required parameter ({field})"))]
    MissingParameter {
        field: &'static str,
        backtrace: Backtrace,
    },
    #[snafu(display("No record for cust_org_id {cust_org_id}"))]
    NoSuchOrg { cust_org_id: CustOrgId },
    #[snafu(display("{field} must be a JSON object"))]
    NotAnObject {
        field: &'static str,
        source: mongodb::bson::ser::Error,
    },
    #[snafu(display("No record found"))]
    NotFound,
    #[snafu(display("Failed to write back merged record {cust_org_id}: {source}"))]
    ReplaceOrg {
        cust_org_id: CustOrgId,
        source: storage::Error,
    },
    #[snafu(display("Unsupported method \"{method}\""))]
    UnsupportedMethod { method: String },
}

impl Error {
    pub fn as_status_and_msg(&self) -> (StatusCode, String) {
        match self {
            ////////////////////////////////////////////////////////////////////////////////////////
            // Broken requests-- tell the caller how to fix it
            ////////////////////////////////////////////////////////////////////////////////////////
            // The two validation failures share one message deliberately; which field was at
            // fault is in the logs, not the response.
            Error::MissingParameter { .. } => (
                StatusCode::BAD_REQUEST,
                "Missing required parameter".to_string(),
            ),
            Error::InvalidField { .. } => (
                StatusCode::BAD_REQUEST,
                "Missing required parameter".to_string(),
            ),
            Error::BadBody { source } => (
                StatusCode::BAD_REQUEST,
                format!("Request body could not be parsed: {}", source),
            ),
            Error::NotAnObject { field, .. } => (
                StatusCode::BAD_REQUEST,
                format!("{} must be a JSON object", field),
            ),
            Error::UnsupportedMethod { method } => (
                StatusCode::BAD_REQUEST,
                format!("Unsupported method \"{}\"", method),
            ),
            ////////////////////////////////////////////////////////////////////////////////////////
            // Missing records-- distinct from server faults
            ////////////////////////////////////////////////////////////////////////////////////////
            Error::NotFound => (StatusCode::NOT_FOUND, "No record found".to_string()),
            Error::NoSuchOrg { cust_org_id } => (
                StatusCode::NOT_FOUND,
                format!("No record for cust_org_id {}", cust_org_id),
            ),
            ////////////////////////////////////////////////////////////////////////////////////////
            // Internal failure-- own up to it
            ////////////////////////////////////////////////////////////////////////////////////////
            Error::DeleteOrg {
                cust_org_id,
                source,
            } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to delete record {}: {}", cust_org_id, source),
            ),
            Error::InsertOrg {
                cust_org_id,
                source,
            } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to insert record {}: {}", cust_org_id, source),
            ),
            Error::Lookup { source } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to look up a record: {}", source),
            ),
            Error::ReplaceOrg {
                cust_org_id,
                source,
            } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!(
                    "Failed to write back merged record {}: {}",
                    cust_org_id, source
                ),
            ),
        }
    }
}

impl axum::response::IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        let (code, msg) = self.as_status_and_msg();
        (code, Json(ErrorResponseBody { error: msg })).into_response()
    }
}

type Result<T> = std::result::Result<T, Error>;

type StdResult<T, E> = std::result::Result<T, E>;

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                    Validation (per-verb)                                       //
////////////////////////////////////////////////////////////////////////////////////////////////////

// Raw parameter structs mirror whatever the caller sent (every field optional); the request
// structs below them are the validated forms core logic consumes. Validation is pure: no
// collection operation runs until a `TryFrom` has succeeded.

#[derive(Clone, Debug, Default, Deserialize)]
struct ContactParams {
    name: Option<String>,
    email: Option<String>,
    phone: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
struct CreateParams {
    user_id: Option<String>,
    cust_org_id: Option<String>,
    cust_org_data: Option<ContactParams>,
    // Accepted so that callers who send preferences at creation aren't rejected, but discarded:
    // creation always starts from the default preference set.
    #[allow(dead_code)]
    cust_org_prefs: Option<serde_json::Value>,
}

/// A validated POST: all six required fields present & non-empty.
#[derive(Debug)]
struct CreateRequest {
    user_id: UserId,
    cust_org_id: CustOrgId,
    cust_org_data: OrgContact,
}

impl TryFrom<CreateParams> for CreateRequest {
    type Error = Error;
    fn try_from(params: CreateParams) -> Result<CreateRequest> {
        let user_id = UserId::new(params.user_id.unwrap_or_default())?;
        let cust_org_id = CustOrgId::new(params.cust_org_id.unwrap_or_default())?;
        let data = params.cust_org_data.unwrap_or_default();
        let cust_org_data = OrgContact::new(
            data.name.unwrap_or_default(),
            data.email.unwrap_or_default(),
            data.phone.unwrap_or_default(),
        )?;
        Ok(CreateRequest {
            user_id,
            cust_org_id,
            cust_org_data,
        })
    }
}

impl CreateRequest {
    /// Build the creation-time record: defaults applied, caller-supplied preferences discarded,
    /// `created_*` audit pair stamped.
    fn into_org(self, now: &DateTime<Utc>) -> CustomerOrg {
        CustomerOrg::create(self.cust_org_id, self.user_id, self.cust_org_data, now)
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
struct ReadParams {
    user_id: Option<String>,
    cust_org_id: Option<String>,
}

/// A validated GET: at least one of the two lookup keys. `cust_org_id` is the primary key;
/// `user_id` is only consulted when it's absent.
enum ReadRequest {
    ByOrg(CustOrgId),
    ByUser(UserId),
}

impl TryFrom<ReadParams> for ReadRequest {
    type Error = Error;
    fn try_from(params: ReadParams) -> Result<ReadRequest> {
        if let Some(id) = params
            .cust_org_id
            .as_deref()
            .and_then(|s| CustOrgId::new(s).ok())
        {
            return Ok(ReadRequest::ByOrg(id));
        }
        if let Some(user) = params.user_id.as_deref().and_then(|s| UserId::new(s).ok()) {
            return Ok(ReadRequest::ByUser(user));
        }
        MissingParameterSnafu {
            field: "cust_org_id or user_id",
        }
        .fail()
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
struct UpdateParams {
    user_id: Option<String>,
    cust_org_id: Option<String>,
    cust_org_data: Option<serde_json::Value>,
    cust_org_prefs: Option<serde_json::Value>,
}

/// A validated PUT: the identifying pair is mandatory, the data fields optional (and partial--
/// any subset of sub-fields, at any depth).
#[derive(Debug)]
struct UpdateRequest {
    user_id: UserId,
    cust_org_id: CustOrgId,
    cust_org_data: Option<Document>,
    cust_org_prefs: Option<Document>,
}

fn document_field(field: &'static str, value: serde_json::Value) -> Result<Document> {
    to_document(&value).context(NotAnObjectSnafu { field })
}

impl TryFrom<UpdateParams> for UpdateRequest {
    type Error = Error;
    fn try_from(params: UpdateParams) -> Result<UpdateRequest> {
        Ok(UpdateRequest {
            user_id: UserId::new(params.user_id.unwrap_or_default())?,
            cust_org_id: CustOrgId::new(params.cust_org_id.unwrap_or_default())?,
            cust_org_data: params
                .cust_org_data
                .map(|v| document_field("cust_org_data", v))
                .transpose()?,
            cust_org_prefs: params
                .cust_org_prefs
                .map(|v| document_field("cust_org_prefs", v))
                .transpose()?,
        })
    }
}

impl UpdateRequest {
    fn cust_org_id(&self) -> &CustOrgId {
        &self.cust_org_id
    }
    /// The update template: identifying pair, passthrough data fields (an empty document when
    /// absent-- a no-op under the merge), and *only* the `updated_*` audit pair. The stored
    /// `created_*` fields survive because they live in the existing document and the merge
    /// preserves them.
    fn template(&self, now: &DateTime<Utc>) -> Document {
        doc! {
            "cust_org_id": self.cust_org_id.as_str(),
            "user_id": self.user_id.as_str(),
            "cust_org_data": self.cust_org_data.clone().unwrap_or_default(),
            "cust_org_prefs": self.cust_org_prefs.clone().unwrap_or_default(),
            "audit_trail": doc! {
                "updated_at": format_timestamp(now),
                "updated_by": self.user_id.as_str(),
            },
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
struct DeleteParams {
    user_id: Option<String>,
    cust_org_id: Option<String>,
}

/// A validated DELETE: same identifying pair as PUT.
struct DeleteRequest {
    user_id: UserId,
    cust_org_id: CustOrgId,
}

impl TryFrom<DeleteParams> for DeleteRequest {
    type Error = Error;
    fn try_from(params: DeleteParams) -> Result<DeleteRequest> {
        Ok(DeleteRequest {
            user_id: UserId::new(params.user_id.unwrap_or_default())?,
            cust_org_id: CustOrgId::new(params.cust_org_id.unwrap_or_default())?,
        })
    }
}

/// Unpack a JSON body, treating the *absence* of a body as an empty object (validation will have
/// its say); a body that's present but malformed is an error.
fn unpack_body<T: Default>(body: StdResult<Json<T>, JsonRejection>) -> Result<T> {
    match body {
        Ok(Json(params)) => Ok(params),
        Err(JsonRejection::MissingJsonContentType(_)) => Ok(T::default()),
        Err(source) => Err(Error::BadBody { source }),
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                          POST /orgs                                            //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Create a customer-organization record
///
/// Requires `user_id`, `cust_org_id` and all three of `cust_org_data.{name,email,phone}`,
/// non-empty. The stored record starts at `onboarding_stage` 1 with the default preference set
/// (anything the caller supplied under `cust_org_prefs` is discarded) and a `created_*` audit
/// pair naming the caller.
async fn create_org(
    State(state): State<Arc<CustOrg>>,
    body: StdResult<Json<CreateParams>, JsonRejection>,
) -> axum::response::Response {
    async fn create_org1(
        storage: &(dyn StorageBackend + Send + Sync),
        params: CreateParams,
    ) -> Result<CustomerOrg> {
        let org = CreateRequest::try_from(params)?.into_org(&Utc::now());
        storage.insert_org(&org).await.context(InsertOrgSnafu {
            cust_org_id: org.cust_org_id().clone(),
        })?;
        Ok(org)
    }

    let params = match unpack_body(body) {
        Ok(params) => params,
        Err(err) => {
            info!("{}", err);
            return err.into_response();
        }
    };
    match create_org1(state.storage.as_ref(), params).await {
        Ok(org) => {
            info!("created organization {} for {}", org.cust_org_id(), org.user_id());
            (StatusCode::OK, Json(org)).into_response()
        }
        Err(err) => {
            error!("{:#?}", err);
            err.into_response()
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                           GET /orgs                                            //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Retrieve a record by `cust_org_id`, or by `user_id` when `cust_org_id` is absent
///
/// Identifiers are drawn from the query string. A miss on either key is a 404.
async fn get_org(
    State(state): State<Arc<CustOrg>>,
    Query(params): Query<ReadParams>,
) -> axum::response::Response {
    async fn get_org1(
        storage: &(dyn StorageBackend + Send + Sync),
        params: ReadParams,
    ) -> Result<Document> {
        let found = match ReadRequest::try_from(params)? {
            ReadRequest::ByOrg(id) => storage.org_for_id(&id).await.context(LookupSnafu)?,
            ReadRequest::ByUser(user) => storage.org_for_user(&user).await.context(LookupSnafu)?,
        };
        found.context(NotFoundSnafu)
    }

    match get_org1(state.storage.as_ref(), params).await {
        Ok(doc) => (StatusCode::OK, Json(doc)).into_response(),
        Err(err @ Error::NotFound) => {
            info!("{}", err);
            err.into_response()
        }
        Err(err) => {
            error!("{:#?}", err);
            err.into_response()
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                           PUT /orgs                                            //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Partially update a record: read-merge-write
///
/// Fetches the current document by `cust_org_id`, deep-merges the update template into it (so
/// nested fields the caller didn't mention survive), strips the storage identifier & writes the
/// whole document back. The `updated_*` audit pair is overwritten each time; `created_*` is
/// preserved. Updating a `cust_org_id` with no record is a 404-- the merge never runs against an
/// absent base.
async fn update_org(
    State(state): State<Arc<CustOrg>>,
    body: StdResult<Json<UpdateParams>, JsonRejection>,
) -> axum::response::Response {
    async fn update_org1(
        storage: &(dyn StorageBackend + Send + Sync),
        params: UpdateParams,
    ) -> Result<Document> {
        let req = UpdateRequest::try_from(params)?;
        let mut merged = storage
            .org_for_id(req.cust_org_id())
            .await
            .context(LookupSnafu)?
            .context(NoSuchOrgSnafu {
                cust_org_id: req.cust_org_id().clone(),
            })?;
        // Read-modify-write with no locking or optimistic-concurrency token: two concurrent
        // updates to the same cust_org_id can interleave (lost update).
        deep_merge(&mut merged, req.template(&Utc::now()));
        strip_storage_id(&mut merged);
        let matched = storage
            .replace_org(req.cust_org_id(), merged.clone())
            .await
            .context(ReplaceOrgSnafu {
                cust_org_id: req.cust_org_id().clone(),
            })?;
        if !matched {
            // The record vanished between the read & the write.
            return NoSuchOrgSnafu {
                cust_org_id: req.cust_org_id().clone(),
            }
            .fail();
        }
        info!("updated organization {}", req.cust_org_id());
        Ok(merged)
    }

    let params = match unpack_body(body) {
        Ok(params) => params,
        Err(err) => {
            info!("{}", err);
            return err.into_response();
        }
    };
    match update_org1(state.storage.as_ref(), params).await {
        Ok(doc) => (StatusCode::OK, Json(doc)).into_response(),
        Err(err) => {
            error!("{:#?}", err);
            err.into_response()
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                         DELETE /orgs                                           //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Terminally delete a record by `cust_org_id`
///
/// `user_id` is required (same contract as PUT) but serves only to say who did it.
async fn delete_org(
    State(state): State<Arc<CustOrg>>,
    Query(params): Query<DeleteParams>,
) -> axum::response::Response {
    async fn delete_org1(
        storage: &(dyn StorageBackend + Send + Sync),
        params: DeleteParams,
    ) -> Result<Document> {
        let req = DeleteRequest::try_from(params)?;
        let deleted = storage
            .delete_org(&req.cust_org_id)
            .await
            .context(DeleteOrgSnafu {
                cust_org_id: req.cust_org_id.clone(),
            })?;
        if !deleted {
            return NoSuchOrgSnafu {
                cust_org_id: req.cust_org_id.clone(),
            }
            .fail();
        }
        info!("user {} deleted organization {}", req.user_id, req.cust_org_id);
        Ok(doc! { "cust_org_id": req.cust_org_id.as_str(), "deleted": true })
    }

    match delete_org1(state.storage.as_ref(), params).await {
        Ok(doc) => (StatusCode::OK, Json(doc)).into_response(),
        Err(err) => {
            error!("{:#?}", err);
            err.into_response()
        }
    }
}

/// Any verb outside the routing table fails here, before reaching any of the above.
async fn unsupported(method: Method) -> axum::response::Response {
    let err = Error::UnsupportedMethod {
        method: method.to_string(),
    };
    info!("{}", err);
    err.into_response()
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                           Public API                                           //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Return a router for the Organizations API
pub fn make_router(state: Arc<CustOrg>) -> Router {
    Router::new()
        .route(
            "/orgs",
            get(get_org)
                .post(create_org)
                .put(update_org)
                .delete(delete_org)
                .fallback(unsupported),
        )
        // All responses are JSON; add the appropriate Content-Type header (but leave the existing
        // Content-Type header should a handler set it specially).
        .layer(SetResponseHeaderLayer::if_not_present(
            CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        ))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod test {
    use super::*;

    fn full_create_params() -> CreateParams {
        CreateParams {
            user_id: Some("u1".to_owned()),
            cust_org_id: Some("o1".to_owned()),
            cust_org_data: Some(ContactParams {
                name: Some("Acme".to_owned()),
                email: Some("a@acme.com".to_owned()),
                phone: Some("555".to_owned()),
            }),
            cust_org_prefs: None,
        }
    }

    #[test]
    fn create_requires_all_six_fields() {
        assert!(CreateRequest::try_from(full_create_params()).is_ok());

        let mut missing: Vec<CreateParams> = Vec::new();
        let mut p = full_create_params();
        p.user_id = None;
        missing.push(p);
        let mut p = full_create_params();
        p.cust_org_id = Some("  ".to_owned()); // empty counts as missing
        missing.push(p);
        let mut p = full_create_params();
        p.cust_org_data = None;
        missing.push(p);
        for field in ["name", "email", "phone"] {
            let mut p = full_create_params();
            let data = p.cust_org_data.as_mut().unwrap();
            match field {
                "name" => data.name = None,
                "email" => data.email = Some(String::new()),
                _ => data.phone = None,
            }
            missing.push(p);
        }
        for params in missing {
            let err = CreateRequest::try_from(params).unwrap_err();
            assert_eq!(
                err.as_status_and_msg(),
                (
                    StatusCode::BAD_REQUEST,
                    "Missing required parameter".to_string()
                )
            );
        }
    }

    #[test]
    fn read_prefers_the_primary_key() {
        let both = ReadParams {
            user_id: Some("u1".to_owned()),
            cust_org_id: Some("o1".to_owned()),
        };
        assert!(matches!(
            ReadRequest::try_from(both).unwrap(),
            ReadRequest::ByOrg(ref id) if id.as_str() == "o1"
        ));
        let user_only = ReadParams {
            user_id: Some("u1".to_owned()),
            cust_org_id: None,
        };
        assert!(matches!(
            ReadRequest::try_from(user_only).unwrap(),
            ReadRequest::ByUser(ref id) if id.as_str() == "u1"
        ));
        // an empty cust_org_id is no cust_org_id
        let empty_org = ReadParams {
            user_id: Some("u1".to_owned()),
            cust_org_id: Some(String::new()),
        };
        assert!(matches!(
            ReadRequest::try_from(empty_org).unwrap(),
            ReadRequest::ByUser(_)
        ));
        assert!(ReadRequest::try_from(ReadParams::default()).is_err());
    }

    #[test]
    fn update_requires_the_identifying_pair() {
        assert!(UpdateRequest::try_from(UpdateParams {
            user_id: Some("u1".to_owned()),
            cust_org_id: None,
            ..Default::default()
        })
        .is_err());
        assert!(UpdateRequest::try_from(UpdateParams {
            user_id: None,
            cust_org_id: Some("o1".to_owned()),
            ..Default::default()
        })
        .is_err());
        // data fields are optional...
        assert!(UpdateRequest::try_from(UpdateParams {
            user_id: Some("u1".to_owned()),
            cust_org_id: Some("o1".to_owned()),
            ..Default::default()
        })
        .is_ok());
        // ...but must be objects when present
        let err = UpdateRequest::try_from(UpdateParams {
            user_id: Some("u1".to_owned()),
            cust_org_id: Some("o1".to_owned()),
            cust_org_data: Some(serde_json::json!(42)),
            ..Default::default()
        })
        .unwrap_err();
        assert_eq!(err.as_status_and_msg().0, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn update_template_shape() {
        let req = UpdateRequest::try_from(UpdateParams {
            user_id: Some("u1".to_owned()),
            cust_org_id: Some("o1".to_owned()),
            cust_org_prefs: Some(serde_json::json!({"theme": "dark"})),
            ..Default::default()
        })
        .unwrap();
        let now = chrono::DateTime::parse_from_rfc3339("2025-06-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let template = req.template(&now);
        assert_eq!(
            template,
            doc! {
                "cust_org_id": "o1",
                "user_id": "u1",
                "cust_org_data": {},
                "cust_org_prefs": { "theme": "dark" },
                "audit_trail": {
                    "updated_at": "2025-06-01T12:00:00Z",
                    "updated_by": "u1",
                },
            }
        );
        // no created_* pair: that history lives in the stored document, not the template
        assert!(template
            .get_document("audit_trail")
            .unwrap()
            .get("created_at")
            .is_none());
    }

    #[test]
    fn delete_requires_the_identifying_pair() {
        assert!(DeleteRequest::try_from(DeleteParams {
            user_id: Some("u1".to_owned()),
            cust_org_id: None,
        })
        .is_err());
        assert!(DeleteRequest::try_from(DeleteParams {
            user_id: Some("u1".to_owned()),
            cust_org_id: Some("o1".to_owned()),
        })
        .is_ok());
    }
}
