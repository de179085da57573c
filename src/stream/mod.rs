pub mod idle;
pub mod line;

pub use idle::with_idle_timeout;
pub use line::LineParser;
