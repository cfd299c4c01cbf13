//! Host runtime pieces: fleet declaration, node sinks and the bridge directory.

mod channel_sink;
mod directory;
mod fleet;

pub use channel_sink::{ChannelSink, HostEvent, RecordingSink};
pub use directory::BridgeDirectory;
pub use fleet::{BridgeNodeConfig, Fleet, FlowTab};
