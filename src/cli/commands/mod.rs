pub mod completions;
pub mod configure;
pub mod run;
