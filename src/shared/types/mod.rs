pub mod charging;
pub mod errors;
pub mod time;

pub use charging::*;
pub use errors::*;
pub use time::*;
