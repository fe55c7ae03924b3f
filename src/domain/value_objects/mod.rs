pub mod client_id;
pub mod mention;
pub mod operation_kind;
pub mod operation_status;
pub mod payload;
pub mod scope;

pub use client_id::ClientId;
pub use mention::MentionReference;
pub use operation_kind::OperationKind;
pub use operation_status::OperationStatus;
pub use payload::{MediaReference, OperationPayload};
pub use scope::Scope;
