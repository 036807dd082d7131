mod client;
mod entry;
mod timestamp;

pub use client::{
    About, ApiErrorClass, ChangeFeed, DriveClient, DriveError, ParentRef, RemoteFile,
};
pub use entry::Entry;
pub use timestamp::Timestamp;
