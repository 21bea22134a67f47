//! Terminal front-end

mod console;

pub use console::{parse_answer, ConsoleChannel};
