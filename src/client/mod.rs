//! Filebox client
//!
//! `Connection` speaks the HTTP protocol for one account, `TransferEngine`
//! moves file content (whole or chunked, resumable through tickets), and
//! `Dispatcher` turns named commands into calls on both.

pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod ticket;
pub mod transfer;

pub use connection::{Connection, Credentials};
pub use dispatcher::{AccountReply, CommandKind, DispatchError, Dispatcher, Outcome};
pub use error::{Failure, FailureKind, TransferError, TransferResult};
pub use ticket::{TicketStore, TransferTicket};
pub use transfer::{ChunkedTransfer, TransferEngine, TransferState};
