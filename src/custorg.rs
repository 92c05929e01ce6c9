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

use std::sync::Arc;

use axum::Json;
use serde::{Deserialize, Serialize};

use crate::storage::Backend as StorageBackend;

/// A serializable struct for use in HTTP error responses
///
/// This is intended to be used in the [IntoResponse] implementations for whatever error type a
/// handler is using, so that the body's shape is either the success payload or this.
///
/// [IntoResponse]: https://docs.rs/axum/latest/axum/response/trait.IntoResponse.html
#[derive(Debug, Deserialize, Serialize)]
pub struct ErrorResponseBody {
    pub error: String,
}

impl axum::response::IntoResponse for ErrorResponseBody {
    fn into_response(self) -> axum::response::Response {
        Json(self).into_response()
    }
}

/// Application state available to all handlers
///
/// The storage handle is created once by the process entry point and shared read-only thereafter;
/// there's no explicit close (its lifetime is the process's).
pub struct CustOrg {
    pub storage: Arc<dyn StorageBackend + Send + Sync>,
}
