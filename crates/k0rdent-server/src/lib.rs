pub mod auth;
pub mod handler;
pub mod http;
pub mod session;
pub mod subscriptions;
pub mod tools;

pub use handler::K0rdentServer;
pub use http::build_router;
pub use session::{ServerState, Session, SessionRuntime};
