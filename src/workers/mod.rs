pub mod query_controller;

pub use query_controller::{QueryController, QueryError, QueryHandle, QueryStatus, QueryView};
