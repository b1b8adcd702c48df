pub mod error;
pub mod headers;
pub mod requests;
pub mod responses;


pub use error::{ApplicationError, HostwiseError, Result, TransportError, ERROR_CONFLICT};
pub use requests::{Query, RequestBody, RequestOptions};
pub use responses::{Response, ResponseBody};
