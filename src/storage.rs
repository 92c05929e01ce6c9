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

//! # storage
//!
//! Abstractions for the custorg storage layer.

use async_trait::async_trait;
use mongodb::bson::Document;

use crate::entities::{CustOrgId, CustomerOrg, UserId};

#[derive(Debug)]
pub struct Error {
    source: Box<dyn std::error::Error + Send + Sync + 'static>,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.source)
    }
}

impl std::error::Error for Error {}

impl Error {
    pub fn new(err: impl std::error::Error + Send + Sync + 'static) -> Error {
        Error {
            source: Box::new(err),
        }
    }
}

/// The five collection operations the request path needs; one implementation per backing store.
///
/// Records come back as raw [Document]s rather than typed entities because stored records are
/// free-form beyond their creation-time shape (update may have grown them), and the update path
/// needs every stored field for its read-merge-write cycle.
#[async_trait]
pub trait Backend {
    /// Retrieve a record by its primary key. None means there is no record by that id.
    async fn org_for_id(&self, id: &CustOrgId) -> Result<Option<Document>, Error>;
    /// Retrieve a record by the secondary, read-only lookup key.
    async fn org_for_user(&self, user: &UserId) -> Result<Option<Document>, Error>;
    /// Insert a freshly-created record. Collection-level uniqueness of `cust_org_id` is assumed,
    /// not enforced here.
    async fn insert_org(&self, org: &CustomerOrg) -> Result<(), Error>;
    /// Write a merged record back in full ("set all fields" semantics), keyed by `cust_org_id`.
    /// `doc` must not carry the storage identifier. Return false if no record matched.
    async fn replace_org(&self, id: &CustOrgId, doc: Document) -> Result<bool, Error>;
    /// Remove a record; return false if there was nothing to remove.
    async fn delete_org(&self, id: &CustOrgId) -> Result<bool, Error>;
}
