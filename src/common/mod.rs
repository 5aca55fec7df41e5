mod fs;
mod io;

pub use fs::*;
pub use io::*;
