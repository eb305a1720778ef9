pub mod command_processor;
pub mod presence_processor;
