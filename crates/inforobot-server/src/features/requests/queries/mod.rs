pub mod get;
pub mod list_index;

pub use get::{GetRequestError, GetRequestQuery};
pub use list_index::{ListIndexError, ListIndexQuery};
