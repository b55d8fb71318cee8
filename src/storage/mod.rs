// SimpleDBM Storage Module

pub mod buffer;
pub mod disk;
pub mod fsm;
pub mod page;
