pub mod cli;
pub mod crawler;
pub mod extract;
pub mod llm;
pub mod storage;
pub mod utils;
pub mod workers;
