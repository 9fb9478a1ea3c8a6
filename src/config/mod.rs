pub mod seed;

pub use seed::{ load_flow, load_messages, LoadError };
