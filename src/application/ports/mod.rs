pub mod cache_store;
pub mod content_gateway;
pub mod media_uploader;
pub mod operation_store;
pub mod profile_directory;
pub mod push_channel;

pub use cache_store::CacheStore;
pub use content_gateway::{ContentGateway, SubmitRequest};
pub use media_uploader::MediaUploader;
pub use operation_store::{AttemptUpdate, OperationStore};
pub use profile_directory::ProfileDirectory;
pub use push_channel::PushChannel;
