//! Length-prefixed frames and the request/response packets carried in them.

pub mod framing;
pub mod packet;

pub use framing::{FrameCodec, FrameHeader};
pub use packet::{Command, Packet, Payload, ReturnPacket};
