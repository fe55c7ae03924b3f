pub mod mock_directory;
pub mod mock_gateway;
pub mod mock_push;

pub use mock_directory::*;
pub use mock_gateway::*;
pub use mock_push::*;
