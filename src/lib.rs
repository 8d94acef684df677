//! RIS Monolith
//!
//! Client-side cache and crawler for Redfish/RIS REST services.
//!
//! The monolith fetches a resource, registers it, follows the links found in
//! its body and keeps going until the reachable tree is cached. Schema
//! documents fetched with [`LoadType::Ref`] have their `$ref`/`anyOf` nodes
//! inlined. A dependency graph between collections and their members answers
//! "what else may be stale if this path changes".
//!
//! # Example
//!
//! ```
//! use ris_monolith::{LoadOptions, MemoryTransport, MonolithConfig, ResourceMonolith};
//! use serde_json::json;
//!
//! let mut transport = MemoryTransport::new();
//! transport.insert(
//!     "/redfish/v1/Systems/",
//!     json!({
//!         "@odata.type": "#ComputerSystemCollection.ComputerSystemCollection",
//!         "Members": [{ "@odata.id": "/redfish/v1/Systems/1/" }]
//!     }),
//! );
//! transport.insert(
//!     "/redfish/v1/Systems/1/",
//!     json!({ "@odata.type": "#ComputerSystem.v1_4_0.ComputerSystem" }),
//! );
//!
//! let mut monolith = ResourceMonolith::new(MonolithConfig::default());
//! monolith.load(&transport, LoadOptions::new("/redfish/v1/Systems/")).unwrap();
//!
//! assert!(monolith.contains("/redfish/v1/Systems/1/"));
//!
//! // A modified collection makes its members stale too.
//! monolith.mark_modified("/redfish/v1/Systems/");
//! assert!(monolith.member("/redfish/v1/Systems/1/").unwrap().modified);
//! ```
//!
//! # Fetch outcomes
//!
//! | Status | Effect |
//! |--------|--------|
//! | 200, 201 | Register the member and follow its links |
//! | 401 | `SessionExpired`, load aborted |
//! | non-200 on the BIOS settings path | `BiosUnregistered`, load aborted |
//! | anything else | Path pruned from the cache, crawl continues |

mod config;
mod error;
mod member;
mod monolith;
mod pointer;
mod schema;
mod snapshot;
mod transport;
mod types;
mod validator;

pub use config::{ApiDialect, MonolithConfig, SchemaDialect};
pub use error::{BodyError, MonolithError, ValidateError};
pub use member::{Content, MemberSnapshot, ResourceMember};
pub use monolith::{normalize_path, ResourceMonolith, MONOLITH_TYPE};
pub use pointer::{find_key, JsonPath, Match, Segment};
pub use snapshot::MonolithSnapshot;
pub use transport::{MemoryTransport, RestResponse, Transport};
pub use types::{json_type_name, LoadOptions, LoadType, TypeName};
pub use validator::validate_against_schema;

#[cfg(feature = "remote")]
pub use transport::HttpTransport;
