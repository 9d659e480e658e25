//! Process and host-facing components

mod exec_command;

pub use exec_command::ExecCommand;
