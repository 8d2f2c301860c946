mod activity;
mod batch;
mod history;

pub use activity::*;
pub use batch::*;
pub use history::*;
