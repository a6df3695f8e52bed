pub mod account;
pub mod master;
pub mod medicine;
pub mod org;
pub mod patient;
pub mod prescription;
pub mod record;
