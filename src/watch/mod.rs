//! Job sources: the local filesystem watcher and the remote poller.

pub mod local;
pub mod remote;

pub use local::LocalWatcher;
pub use remote::RemoteWatcher;
