pub mod chat;
pub mod comments;
pub mod error;
pub mod messages;
pub mod pdfs;
pub mod presence;
pub mod reactions;
pub mod state;
pub mod storage;
pub mod trackers;

pub use error::{ApiError, ApiResult};
pub use state::{AppState, AppStateInner};
