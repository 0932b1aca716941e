pub mod location;
pub mod product;
pub mod stock_balance;
pub mod stock_transaction;
pub mod warehouse;
