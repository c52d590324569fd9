pub mod events;
pub use events::*;

mod bus;
pub use bus::*;

mod socket;
pub use socket::ws_handler;
