pub mod envelope;
pub mod error;
pub mod requests;
pub mod shadows;
pub mod topics;

pub use envelope::*;
pub use error::*;
pub use requests::*;
pub use shadows::*;
