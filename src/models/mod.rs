pub mod dialog;
pub mod envelope;

pub use dialog::{ Flow, FlowId, Message, MessageId, MessageOption };
pub use envelope::Envelope;
