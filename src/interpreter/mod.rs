//! Frame-based interpreter for one class and the debug sessions built on it.

mod execute;
mod frame;
mod heap;
mod session;
mod value;

pub use frame::{Frame, FrameSnapshot, LoadedMethod, LocalSnapshot};
pub use heap::{Heap, HeapObject, ObjectRef};
pub use session::{DebugSession, SessionConfig, SessionSnapshot, SessionState, StopReason};
pub use value::Value;
