// === MODULE DEFINITION ===
pub mod module;
pub use module::{ClientsModule, DIRECTORY_SERVICE, MODULE_NAME};

// === SHARED WITH OTHER MODULES ===
pub mod tenancy;
pub use domain::events::{ClientCreated, CLIENT_CREATED};
pub use domain::model::{Client, NewClient};
pub use domain::service::ClientDirectory;
pub use tenancy::TenantId;

// === INTERNAL MODULES ===
// Exposed for tests; not a stable API.
#[doc(hidden)]
pub mod api;
#[doc(hidden)]
pub mod config;
#[doc(hidden)]
pub mod domain;
