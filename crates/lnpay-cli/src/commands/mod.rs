pub mod balance;
pub mod credit;
pub mod init;
pub mod pay;
pub mod reconcile;
pub mod stale;
pub mod status;
pub mod void;

