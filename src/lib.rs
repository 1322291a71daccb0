#![deny(rust_2018_idioms, clippy::all)]
#![allow(unused_unsafe)]

mod pinned;
pub use pinned::Pinned;

mod set;
pub use set::{HashSet, Iter};

mod platform;
mod resize;
