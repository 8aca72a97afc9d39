mod password;
mod tokens;

pub use password::*;
pub use tokens::*;
