pub mod controller;
pub mod crud;
pub mod extractor;
pub mod interface;
pub mod memory;
pub mod model;
pub mod routes;
pub mod schema;

pub use crud::MySqlAccountStore;
pub use extractor::AuthenticatedAccount;
pub use interface::AccountStore;
pub use memory::InMemoryAccountStore;
pub use model::{Account, AccountStatus, Role, UserClaim};
pub use routes::auth_routes;
