pub mod audit;
pub mod chat;
pub mod gateway;
pub mod lookup;
pub mod onboard;
pub mod status;
