//! The two run flows: session establishment and ticket creation

mod login;
mod ticket;

pub use login::{LoginFlow, LoginState};
pub use ticket::TicketFlow;
