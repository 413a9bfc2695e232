// Tool implementations

mod process;

pub use process::ProcessTool;
