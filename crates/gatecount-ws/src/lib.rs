//! Network edge of the collector: the generic broadcast hub, its three
//! channel instances (operator notices, occupancy updates, frame ingest),
//! the frame wire codec and the device-facing HTTP endpoint.

pub mod frame_codec;
pub mod frame_hub;
pub mod http;
pub mod hub;
pub mod notice_hub;
pub mod server;
pub mod update_hub;

pub use frame_codec::{decode_frame, encode_frame};
pub use frame_hub::{FrameHub, FrameIngestConfig};
pub use http::ApiState;
pub use hub::Hub;
pub use notice_hub::NoticeHub;
pub use server::serve;
pub use update_hub::UpdateHub;
