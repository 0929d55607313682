pub mod cli;
pub mod protocol;
pub mod stats;

pub use cli::{CliError, parse_values, prompt, prompt_number, render_reply};
pub use protocol::{Client, ServerConfig, Shutdown, StatServer};
pub use stats::{FrequencyTable, Summary};
