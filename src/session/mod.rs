pub mod requests;
pub mod streaming;

pub use self::streaming::{ Phase, ResponseMode, SessionEvent, StateHandle, StreamingSession, StreamingState };
