/*!
# brewdesk

Client for the back office of a coffee-shop chain: the admin dashboard,
branch and account management, and the cashier/staff inventory and sales
screens, all served by a REST backend.

## Overview

Every screen of the back office is the same thing wired to a different
record shape: fetch a list scoped to the signed-in user, keep a local copy,
show the subset matching the search box and the filter dropdowns, and offer
a handful of actions (approve, reject, update, delete) that are reconciled
into the local copy once the server confirms them.

## Architecture

### List layer
- **list_view**: `ScopedListView`, the fetch / derive / mutate cycle of one page
- **filter**: the pure `derive_view` function and the filter types behind it
- **entity**: generic id-plus-fields records and nested field access
- **schema**: the pages, the roles that may open them, and each page's resource

### Backend layer
- **client**: `ApiClient`, bearer attachment and response classification
- **transport**: the `Transport` seam and its reqwest implementation
- **credential**: `CredentialProvider` and its in-memory and file stores
- **token**: claim extraction from bearer credentials
- **error**: `ApiError` and server error message parsing

### Support
- **export**: CSV rendering of a derived view
- **config**: environment configuration

## Flow

1. `ApiClient::login` stores the issued credential.
2. The session's role decides which `Page`s are offered and whether they
   are scoped to the acting cashier.
3. `ScopedListView::load` fetches the page's records once.
4. Filter changes re-derive the view without touching the network.
5. `ScopedListView::apply_mutation` sends one change and folds the
   confirmed result into the local copy.
6. A 401 anywhere clears the credential and the user signs in again.
*/

pub mod client;
pub mod config;
pub mod credential;
pub mod entity;
pub mod error;
pub mod export;
pub mod filter;
pub mod list_view;
pub mod schema;
pub mod token;
pub mod transport;

pub use client::ApiClient;
pub use config::Config;
pub use credential::{CredentialProvider, FileCredentialStore, MemoryCredentialStore};
pub use entity::Entity;
pub use error::{ApiError, ApiResult, parse_server_error};
pub use export::to_csv;
pub use filter::{FieldFilter, ViewFilters, derive_view};
pub use list_view::{MutationIntent, MutationOutcome, ScopedListView, ViewState};
pub use schema::{MutationOp, Page, ResourceSchema, Role};
pub use token::{Claims, TokenError, extract_scope_id};
pub use transport::{ApiRequest, HttpTransport, Method, RawResponse, Transport};
