//! Authenticated access to the FreightMaster ERP API
//!
//! `AuthenticatedClient` attaches the stored bearer token to every request,
//! and on a 401 refreshes once through the session manager's single-flight
//! guard before re-issuing the request. A refresh failure ends the session.
//! `ErpClient` is the thin data-fetch layer on top: list pages, reference
//! lookups, dashboard data, vehicle log PDFs and whitelisted method calls.

pub mod client;
pub mod erp;
pub mod error;

#[cfg(test)]
pub(crate) mod test_support;

pub use client::{ApiRequest, AuthenticatedClient};
pub use erp::{ErpClient, ListPage, ListResource, LookupResource, ManifestFilters};
pub use error::{Error, Result};
