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

//! # merge
//!
//! The update engine's core: a deep, structural merge over BSON documents.
//!
//! A partial update must never clobber nested sibling fields the caller didn't mention, so the
//! update path can't use a shallow field replace. Instead it fetches the stored document, merges
//! the update template into it with [deep_merge], strips the storage-assigned identifier with
//! [strip_storage_id], and writes the whole thing back.
//!
//! The merge is deliberately generic: it recurses on the *shape* of the values (document vs.
//! everything else), not on any named field, so the same routine would serve any document
//! collection.

use mongodb::bson::{Bson, Document};

/// The database-assigned identifier. It is immutable, and re-submitting it on a write is
/// invalid/conflicting, so it's the one field stripped from every merged document.
pub const STORAGE_ID: &str = "_id";

/// Deep-merge `overlay` into `base`
///
/// For each key in `overlay`: if both sides hold documents, merge them sub-key by sub-key;
/// otherwise the overlay value overwrites. Keys present only in `base` are untouched. The merge
/// is idempotent for a fixed overlay: applying the same overlay twice yields the same document.
pub fn deep_merge(base: &mut Document, overlay: Document) {
    for (key, value) in overlay {
        // Remove-then-insert rather than get_mut to keep the borrow checker out of the way; the
        // only observable consequence is that merged keys migrate to the end of the document's
        // key order.
        let merged = match (base.remove(&key), value) {
            (Some(Bson::Document(mut sub)), Bson::Document(incoming)) => {
                deep_merge(&mut sub, incoming);
                Bson::Document(sub)
            }
            (_, value) => value,
        };
        base.insert(key, merged);
    }
}

/// Remove the storage-assigned identifier from a merged document prior to write-back.
pub fn strip_storage_id(doc: &mut Document) {
    doc.remove(STORAGE_ID);
}
