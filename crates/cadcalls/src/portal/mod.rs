//! Police-to-Citizen portal client.
//!
//! The portal only serves its CAD calls API to sessions that have already
//! loaded its pages, so a fetch walks the site like a browser before
//! calling the API.

pub mod client;
pub mod payload;
pub mod response;
pub mod session;

pub use client::{Exchange, Outcome, PortalClient};
pub use payload::{CadCallsPayload, RequestParams};
pub use response::{ApiResponse, ResponseBody};
