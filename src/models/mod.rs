pub mod message;
pub mod notification;
pub mod presence;
pub mod trip;
