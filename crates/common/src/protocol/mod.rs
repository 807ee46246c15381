// Wire protocol shared by the engine and the relay.

pub mod channel;
pub mod versions;
