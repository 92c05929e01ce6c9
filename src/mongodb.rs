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

//! # mongodb
//!
//! [Storage] implementation for MongoDB.
//!
//! [Storage]: crate::storage

use async_trait::async_trait;
use mongodb::{
    bson::{doc, to_document, Document},
    Collection,
};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use snafu::{prelude::*, Backtrace};
use tracing::debug;

use crate::{
    entities::{CustOrgId, CustomerOrg, UserId},
    storage,
};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Failed to construct a MongoDB client: {source}"))]
    Connect {
        source: mongodb::error::Error,
        backtrace: Backtrace,
    },
}

type Result<T> = std::result::Result<T, Error>;

/// Where to find the collection: a connection URI (which may embed credentials, hence the
/// [SecretString]), a database name & a collection name. Deserialized once at process start;
/// never re-read per request.
#[derive(Clone, Debug, Deserialize)]
pub struct Location {
    pub uri: SecretString,
    #[serde(default = "Location::default_database")]
    pub database: String,
    #[serde(default = "Location::default_collection")]
    pub collection: String,
}

impl Location {
    fn default_database() -> String {
        "custorg".to_owned()
    }
    fn default_collection() -> String {
        "organizations".to_owned()
    }
    /// Assemble a [Location] from `MONGODB_URI`/`MONGODB_DB`/`MONGODB_COLLECTION`, for running
    /// without a configuration file. None if `MONGODB_URI` isn't set.
    pub fn from_env() -> Option<Location> {
        Some(Location {
            uri: SecretString::from(std::env::var("MONGODB_URI").ok()?),
            database: std::env::var("MONGODB_DB").unwrap_or_else(|_| Location::default_database()),
            collection: std::env::var("MONGODB_COLLECTION")
                .unwrap_or_else(|_| Location::default_collection()),
        })
    }
}

pub struct Client {
    orgs: Collection<Document>,
}

impl Client {
    /// The driver doesn't reach out to the cluster here; connections are established lazily on
    /// first use and pooled for the life of the process, which is exactly the warm-start behavior
    /// we want from a handle created once at startup.
    pub async fn new(location: &Location) -> Result<Client> {
        let client = ::mongodb::Client::with_uri_str(location.uri.expose_secret())
            .await
            .context(ConnectSnafu)?;
        let orgs = client
            .database(&location.database)
            .collection::<Document>(&location.collection);
        Ok(Client { orgs })
    }
}

#[async_trait]
impl storage::Backend for Client {
    async fn org_for_id(
        &self,
        id: &CustOrgId,
    ) -> std::result::Result<Option<Document>, storage::Error> {
        debug!("find_one by cust_org_id {}", id);
        self.orgs
            .find_one(doc! { "cust_org_id": id.as_str() })
            .await
            .map_err(storage::Error::new)
    }

    async fn org_for_user(
        &self,
        user: &UserId,
    ) -> std::result::Result<Option<Document>, storage::Error> {
        debug!("find_one by user_id {}", user);
        self.orgs
            .find_one(doc! { "user_id": user.as_str() })
            .await
            .map_err(storage::Error::new)
    }

    async fn insert_org(&self, org: &CustomerOrg) -> std::result::Result<(), storage::Error> {
        let doc = to_document(org).map_err(storage::Error::new)?;
        debug!("insert_one for cust_org_id {}", org.cust_org_id());
        self.orgs
            .insert_one(doc)
            .await
            .map(|_| ())
            .map_err(storage::Error::new)
    }

    async fn replace_org(
        &self,
        id: &CustOrgId,
        doc: Document,
    ) -> std::result::Result<bool, storage::Error> {
        debug!("update_one ($set all fields) for cust_org_id {}", id);
        self.orgs
            .update_one(doc! { "cust_org_id": id.as_str() }, doc! { "$set": doc })
            .await
            .map(|out| out.matched_count > 0)
            .map_err(storage::Error::new)
    }

    async fn delete_org(&self, id: &CustOrgId) -> std::result::Result<bool, storage::Error> {
        debug!("delete_one for cust_org_id {}", id);
        self.orgs
            .delete_one(doc! { "cust_org_id": id.as_str() })
            .await
            .map(|out| out.deleted_count > 0)
            .map_err(storage::Error::new)
    }
}
