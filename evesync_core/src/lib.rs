pub mod ids;
pub mod payload;
pub mod time;

pub use ids::{CategoryId, CharacterId, GroupId, ItemId, JobId, LocationId, TokenId, TypeId};
pub use payload::{AssetPayload, IndustryJobPayload, PayloadError, RawPayload};
pub use time::{Clock, SystemClock, Timestamp};
