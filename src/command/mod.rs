mod line;
mod resolve;

pub use line::{requote, trailing_text, FinalCommandLine};
pub use resolve::{resolve, ResolvedCommand, SHELL};
