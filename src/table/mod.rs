pub mod compact;
pub mod lock;
pub mod meta;
pub mod ops;
pub mod row;
pub mod store;
