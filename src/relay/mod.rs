mod handler;

pub use handler::{ConnectionHandler, END_SIGNAL, NORMAL_CLOSURE};
