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

//! # custorg
//!
//! CRUD over a single collection of customer-organization records.
//!
//! The interesting parts live in [merge] (the read-merge-write engine behind the update path) and
//! [orgs] (per-verb request validation & dispatch); everything else is plumbing around them.
pub mod custorg;
pub mod entities;
pub mod merge;
pub mod mongodb;
pub mod orgs;
pub mod storage;
