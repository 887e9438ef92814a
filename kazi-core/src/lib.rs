//! KAZI Core - Resource Types
//!
//! Pure data structures shared by the datastore layer and the gateway:
//! identifiers, lifecycle enums, the polymorphic attachment target, filter
//! expressions, the generic row type, escrow fee math and the error
//! taxonomy. No I/O.

pub mod enums;
pub mod error;
pub mod fees;
pub mod filter;
pub mod health;
pub mod identity;
pub mod record;
pub mod target;

pub use enums::*;
pub use error::*;
pub use fees::*;
pub use filter::*;
pub use health::*;
pub use identity::*;
pub use record::*;
pub use target::*;
