pub mod create;
pub mod delete;
pub mod submit;
pub mod update;

pub use create::{CreateRequestCommand, CreateRequestError, CreateRequestResponse};
pub use delete::{DeleteRequestCommand, DeleteRequestError, DeleteRequestResponse};
pub use submit::{SubmitUrlCommand, SubmitUrlError, SubmitUrlResponse};
pub use update::{UpdateRequestCommand, UpdateRequestError};
