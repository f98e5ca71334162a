pub mod console;
pub mod output;
pub mod server_process;
