mod mutf8;
mod pool;
mod types;

pub use mutf8::{decode_mutf8, encode_mutf8};
pub use pool::{Constant, ConstantPool, MemberRef};
pub use types::*;
