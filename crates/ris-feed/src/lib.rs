#![doc(issue_tracker_base_url = "https://github.com/strebacom/strebacom/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]

//! Bounded tap on the RIPE RIS Live BGP update stream.
//!
//! [`RisLiveStream`] speaks the RIS Live WebSocket protocol and yields decoded
//! [`BgpUpdate`]s. [`FeedTap`] drives a stream in the background and keeps the most
//! recent updates in a [`BoundedBuffer`].

mod buffer;
pub use buffer::{BoundedBuffer, DEFAULT_BUFFER_CAPACITY};

mod error;
pub use error::{FeedError, FeedResult};

mod message;
pub use message::{Announcement, BgpUpdate, PathSegment, RisMessage, RisSubscription};

mod stream;
pub use stream::RisLiveStream;

mod tap;
pub use tap::{FeedCounters, FeedTap, SharedBuffer};

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

/// Public RIS Live endpoint.
pub const DEFAULT_RIS_LIVE_URL: &str = "wss://ris-live.ripe.net/v1/ws/?client=n2n-research";
